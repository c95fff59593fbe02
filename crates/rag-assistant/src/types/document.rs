//! Document and chunk types with source tracking for citations

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Supported file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
}

impl FileType {
    /// Detect file type from extension. Returns `None` for unsupported extensions.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            _ => None,
        }
    }

    /// Detect file type from a path's extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical extension, with the leading dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Pdf => ".pdf",
            Self::Txt => ".txt",
            Self::Markdown => ".md",
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
        }
    }
}

/// Metadata attached to a loaded document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    /// Path the document was loaded from (the source identifier)
    pub source_path: String,
    /// File name component of the path
    pub file_name: String,
    /// File type
    pub file_type: FileType,
    /// Load timestamp
    pub loaded_at: chrono::DateTime<chrono::Utc>,
    /// Page number (1-indexed, paginated formats only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    /// Total pages in the file (paginated formats only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
}

impl DocumentMetadata {
    /// Format source for display, e.g. `report.pdf, Page 3`
    pub fn format_citation(&self) -> String {
        match self.page_number {
            Some(page) => format!("{}, Page {}", self.file_name, page),
            None => self.file_name.clone(),
        }
    }
}

/// A loaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Stable document ID derived from source and content
    pub id: String,
    /// Text content
    pub content: String,
    /// Source metadata
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document. The ID is a content hash, so reloading the same
    /// file yields the same ID.
    pub fn new(content: String, metadata: DocumentMetadata) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(metadata.source_path.as_bytes());
        hasher.update(metadata.page_number.unwrap_or(0).to_le_bytes());
        hasher.update(content.as_bytes());
        let digest = hex::encode(hasher.finalize());

        Self {
            id: digest[..16].to_string(),
            content,
            metadata,
        }
    }

    /// Whether the document carries any non-whitespace text
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

/// Chunk metadata: the parent document's metadata plus position
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Inherited document metadata
    #[serde(flatten)]
    pub document: DocumentMetadata,
    /// Parent document ID
    pub document_id: String,
    /// Chunk index within the document
    pub chunk_index: u32,
    /// Offset of the chunk in the document text, in characters
    pub char_offset: usize,
}

/// A chunk of text from a document
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Chunk ID (`{document_id}-{chunk_index}`)
    pub id: String,
    /// Text content
    pub content: String,
    /// Source information for citations
    pub metadata: ChunkMetadata,
}

impl Chunk {
    /// Create a new chunk of `document` starting at `char_offset`
    pub fn new(document: &Document, content: String, chunk_index: u32, char_offset: usize) -> Self {
        Self {
            id: format!("{}-{:04}", document.id, chunk_index),
            content,
            metadata: ChunkMetadata {
                document: document.metadata.clone(),
                document_id: document.id.clone(),
                chunk_index,
                char_offset,
            },
        }
    }

    /// Source identifier used in answers (the originating file path)
    pub fn source_id(&self) -> &str {
        &self.metadata.document.source_path
    }

    /// Length in characters
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}
