//! rag-assistant: question answering over a small document set
//!
//! Loads PDF, text and markdown files, splits them into overlapping chunks,
//! embeds them into a persistent vector index and answers questions with a
//! generative model grounded in the retrieved passages, citing the source
//! files it used.

pub mod config;
pub mod error;
pub mod generation;
pub mod history;
pub mod index;
pub mod ingestion;
pub mod pipeline;
pub mod providers;
pub mod retrieval;
pub mod types;

pub use config::{Credentials, RagConfig, SearchType};
pub use error::{Error, ErrorKind, Result};
pub use history::{ChatHistory, ExportFormat};
pub use pipeline::{PipelineState, PipelineStats, RagOrchestrator};
pub use types::{
    document::{Chunk, Document, FileType},
    response::{AskResponse, Citation, IngestReport},
};
