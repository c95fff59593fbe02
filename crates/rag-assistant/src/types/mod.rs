//! Core types for the RAG pipeline

pub mod document;
pub mod response;

pub use document::{Chunk, ChunkMetadata, Document, DocumentMetadata, FileType};
pub use response::{AskResponse, Citation, IngestReport, LoadFailure, RetrievalResult, ScoredChunk};
