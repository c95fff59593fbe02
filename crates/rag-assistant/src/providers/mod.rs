//! Pluggable provider traits and the Gemini implementations
//!
//! - `EmbeddingProvider`: text to vectors
//! - `LlmProvider`: prompt to answer text

pub mod embedding;
pub mod gemini;
pub mod llm;

pub use embedding::EmbeddingProvider;
pub use gemini::{GeminiClient, GeminiEmbedder, GeminiLlm};
pub use llm::{GenerationParams, LlmProvider};
