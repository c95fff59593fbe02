//! Error types for the RAG pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG pipeline errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (missing credential, invalid settings, or an
    /// operation attempted before its prerequisite state)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller input rejected before any work was done
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// File does not exist
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// File exceeds the configured size limit
    #[error("File '{filename}' is too large: {size} bytes (limit {limit} bytes)")]
    FileTooLarge {
        filename: String,
        size: u64,
        limit: u64,
    },

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// Ingestion produced nothing usable
    #[error("Ingestion failed: {0}")]
    Ingestion(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Vector index error
    #[error("Vector index error: {0}")]
    Index(String),

    /// Text generation error
    #[error("LLM error: {0}")]
    Llm(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML configuration error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse error category, used when reporting failures to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    Validation,
    Ingestion,
    Index,
    Query,
    Internal,
}

impl Error {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a vector index error
    pub fn index(message: impl Into<String>) -> Self {
        Self::Index(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Config(_) | Error::Toml(_) => ErrorKind::Configuration,
            Error::Validation(_) => ErrorKind::Validation,
            Error::UnsupportedFileType(_)
            | Error::FileNotFound(_)
            | Error::FileTooLarge { .. }
            | Error::FileParse { .. }
            | Error::Ingestion(_) => ErrorKind::Ingestion,
            Error::Index(_) | Error::Io(_) | Error::Json(_) => ErrorKind::Index,
            Error::Embedding(_) | Error::Llm(_) | Error::Http(_) => ErrorKind::Query,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }
}
