//! Text chunking with exact, character-based overlap

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};
use crate::types::{Chunk, Document};

/// Splits documents into overlapping windows, preferring natural boundaries
///
/// A window ends at the last paragraph break that fits, else the last line
/// break, else the last whitespace, else it is cut hard at `chunk_size`. The
/// next window starts `chunk_overlap` characters before the previous end, so
/// consecutive chunks share exactly `chunk_overlap` characters.
///
/// Text is whitespace-normalized first (see [`normalize_whitespace`]); chunk
/// offsets refer to the normalized text, which is what the loader stores as
/// document content.
#[derive(Debug, Clone)]
pub struct TextChunker {
    /// Maximum chunk size in characters
    chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    overlap: usize,
}

impl TextChunker {
    /// Create a chunker, rejecting `chunk_size == 0` or `overlap >= chunk_size`
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than 0"));
        }
        if overlap >= chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                overlap, chunk_size
            )));
        }
        Ok(Self { chunk_size, overlap })
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Chunk a batch of documents, preserving document order
    pub fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        let chunks: Vec<Chunk> = documents
            .iter()
            .flat_map(|doc| self.chunk_document(doc))
            .collect();

        tracing::debug!(
            "Split {} documents into {} chunks (size={}, overlap={})",
            documents.len(),
            chunks.len(),
            self.chunk_size,
            self.overlap
        );

        chunks
    }

    /// Chunk a single document
    pub fn chunk_document(&self, doc: &Document) -> Vec<Chunk> {
        self.split_text(&doc.content)
            .into_iter()
            .enumerate()
            .map(|(index, (offset, content))| Chunk::new(doc, content, index as u32, offset))
            .collect()
    }

    /// Split text into `(char_offset, content)` windows
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = normalize_whitespace(text).chars().collect();
        let total = chars.len();

        let mut windows = Vec::new();
        let mut start = 0usize;

        while start < total {
            let window_end = (start + self.chunk_size).min(total);
            if chars[start..window_end].iter().all(|c| c.is_whitespace()) {
                // Only reachable when chunk_size is shorter than a whitespace run
                match chars[start..].iter().position(|c| !c.is_whitespace()) {
                    Some(skip) => {
                        start += skip;
                        continue;
                    }
                    None => break,
                }
            }

            if total - start <= self.chunk_size {
                windows.push((start, chars[start..].iter().collect()));
                break;
            }

            let end = self.find_break(&chars, start);
            windows.push((start, chars[start..end].iter().collect()));
            start = end - self.overlap;
        }

        windows
    }

    /// Pick the end of the window starting at `start`.
    ///
    /// The result lies in `(start + overlap, start + chunk_size]`, which keeps
    /// every step moving forward.
    fn find_break(&self, chars: &[char], start: usize) -> usize {
        let lo = start + self.overlap + 1;
        let hi = start + self.chunk_size;

        // A window must contain at least one non-whitespace character
        let first_text = chars[start..hi]
            .iter()
            .position(|c| !c.is_whitespace())
            .map(|p| start + p);
        let has_text = |end: usize| first_text.map_or(false, |f| f < end);

        let last_matching = |pred: &dyn Fn(usize) -> bool| {
            (lo..=hi).rev().find(|&end| pred(end) && has_text(end))
        };

        let paragraph = |end: usize| end >= 2 && chars[end - 2] == '\n' && chars[end - 1] == '\n';
        let line = |end: usize| chars[end - 1] == '\n';
        let word = |end: usize| chars[end - 1].is_whitespace();

        last_matching(&paragraph)
            .or_else(|| last_matching(&line))
            .or_else(|| last_matching(&word))
            .unwrap_or(hi)
    }
}

/// Collapse whitespace runs and trim the ends.
///
/// A run holding two or more line breaks becomes `\n\n`, a run with one
/// becomes `\n`, anything else becomes a single space.
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run: Option<usize> = None;

    for c in text.chars() {
        if c.is_whitespace() {
            let newlines = run.get_or_insert(0);
            if c == '\n' {
                *newlines += 1;
            }
            continue;
        }

        if let Some(newlines) = run.take() {
            if !out.is_empty() {
                out.push_str(match newlines {
                    0 => " ",
                    1 => "\n",
                    _ => "\n\n",
                });
            }
        }
        out.push(c);
    }

    out
}
