//! Document ingestion: decoding, loading and chunking

mod chunker;
pub mod decoder;
mod loader;

pub use chunker::{normalize_whitespace, TextChunker};
pub use decoder::{DecodedPage, FileDecoder, MarkdownDecoder, PdfDecoder, TextDecoder};
pub use loader::{DocumentLoader, LoadReport};
