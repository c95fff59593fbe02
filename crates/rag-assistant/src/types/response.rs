//! Response types for retrieval, answers and ingestion

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::document::{Chunk, FileType};
use crate::error::{Error, ErrorKind};

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredChunk {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Cosine similarity to the query (higher is more similar)
    pub score: f32,
}

/// Ordered retrieval output, at most k entries
pub type RetrievalResult = Vec<ScoredChunk>;

/// Citation from a source document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Chunk ID
    pub chunk_id: String,
    /// Source identifier (file path)
    pub source: String,
    /// Source file name
    pub file_name: String,
    /// File type
    pub file_type: FileType,
    /// Page number (if applicable)
    pub page_number: Option<u32>,
    /// Chunk index within the document
    pub chunk_index: u32,
    /// Similarity score
    pub score: f32,
    /// Excerpt from the chunk
    pub snippet: String,
    /// Whether the answer explicitly cites this source
    pub cited: bool,
}

impl Citation {
    /// Format citation for display in text
    pub fn format_inline(&self) -> String {
        match self.page_number {
            Some(page) => format!("[Source: {}, Page {}]", self.file_name, page),
            None => format!("[Source: {}]", self.file_name),
        }
    }
}

/// Answer to a question, or an answer-shaped failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AskResponse {
    /// The question as asked
    pub question: String,
    /// Generated answer, or a readable description of the failure
    pub answer: String,
    /// Source identifiers of the chunks used, in retrieval order, deduplicated
    pub sources: Vec<String>,
    /// Per-chunk citations
    pub citations: Vec<Citation>,
    /// Number of source chunks used
    pub confidence: usize,
    /// When the question was answered
    pub timestamp: DateTime<Utc>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
    /// Whether this response describes a failure
    #[serde(default)]
    pub error: bool,
    /// Failure category, when `error` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl AskResponse {
    /// Build a failure response, preserving the question and timestamp
    pub fn failure(question: impl Into<String>, err: &Error, processing_time_ms: u64) -> Self {
        Self {
            question: question.into(),
            answer: format!("Sorry, an error occurred while processing your question: {}", err),
            sources: Vec::new(),
            citations: Vec::new(),
            confidence: 0,
            timestamp: Utc::now(),
            processing_time_ms,
            error: true,
            error_kind: Some(err.kind()),
        }
    }

    /// Whether this response describes a failure
    pub fn is_error(&self) -> bool {
        self.error
    }
}

/// A file the loader skipped, with the reason
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadFailure {
    /// Path as given by the caller
    pub path: String,
    /// Human-readable reason
    pub reason: String,
}

/// Outcome of an ingest call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Number of paths passed in
    pub files_requested: usize,
    /// Documents (pages) loaded
    pub documents_loaded: usize,
    /// Chunks embedded and written to the index
    pub chunks_indexed: usize,
    /// Files skipped during loading
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<LoadFailure>,
    /// Processing time in milliseconds
    pub processing_time_ms: u64,
}

impl IngestReport {
    /// Fold another batch's report into this one
    pub fn merge(&mut self, other: IngestReport) {
        self.files_requested += other.files_requested;
        self.documents_loaded += other.documents_loaded;
        self.chunks_indexed += other.chunks_indexed;
        self.failures.extend(other.failures);
        self.processing_time_ms += other.processing_time_ms;
    }
}
