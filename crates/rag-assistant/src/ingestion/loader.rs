//! Document loading: type detection, size limits and per-file isolation

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;

use super::chunker::normalize_whitespace;
use super::decoder::{FileDecoder, MarkdownDecoder, PdfDecoder, TextDecoder};
use crate::config::IngestionConfig;
use crate::error::{Error, Result};
use crate::types::{Document, DocumentMetadata, FileType, LoadFailure};

/// Documents loaded from a batch of paths, plus the files that were skipped
#[derive(Debug, Default)]
pub struct LoadReport {
    pub documents: Vec<Document>,
    pub failures: Vec<LoadFailure>,
}

/// Loads files into documents, one document per PDF page or per text file
pub struct DocumentLoader {
    decoders: HashMap<FileType, Arc<dyn FileDecoder>>,
    max_file_size: u64,
}

impl DocumentLoader {
    /// Create a loader with the built-in decoders
    pub fn new(max_file_size: u64) -> Self {
        let mut decoders: HashMap<FileType, Arc<dyn FileDecoder>> = HashMap::new();
        decoders.insert(FileType::Pdf, Arc::new(PdfDecoder));
        decoders.insert(FileType::Txt, Arc::new(TextDecoder));
        decoders.insert(FileType::Markdown, Arc::new(MarkdownDecoder));

        Self {
            decoders,
            max_file_size,
        }
    }

    pub fn from_config(config: &IngestionConfig) -> Self {
        Self::new(config.max_file_size_bytes)
    }

    /// Replace the decoder used for a file type
    pub fn with_decoder(mut self, file_type: FileType, decoder: Arc<dyn FileDecoder>) -> Self {
        self.decoders.insert(file_type, decoder);
        self
    }

    /// Load every path, skipping files that cannot be loaded
    pub fn load(&self, paths: &[PathBuf]) -> Vec<Document> {
        self.load_with_report(paths).documents
    }

    /// Load every path, recording why skipped files were skipped
    pub fn load_with_report(&self, paths: &[PathBuf]) -> LoadReport {
        let mut report = LoadReport::default();

        for path in paths {
            match self.load_file(path) {
                Ok(documents) => {
                    tracing::debug!("Loaded {} ({} documents)", path.display(), documents.len());
                    report.documents.extend(documents);
                }
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    report.failures.push(LoadFailure {
                        path: path.display().to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::info!(
            "Loaded {} documents from {} files ({} skipped)",
            report.documents.len(),
            paths.len(),
            report.failures.len()
        );

        report
    }

    /// Load a single file
    pub fn load_file(&self, path: &Path) -> Result<Vec<Document>> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        let file_type = FileType::from_path(path).ok_or_else(|| {
            let ext = path
                .extension()
                .map(|e| e.to_string_lossy().to_string())
                .unwrap_or_default();
            Error::UnsupportedFileType(if ext.is_empty() {
                format!("{} has no extension", file_name)
            } else {
                format!(".{}", ext)
            })
        })?;

        let meta = std::fs::metadata(path)
            .map_err(|_| Error::FileNotFound(path.display().to_string()))?;
        if !meta.is_file() {
            return Err(Error::FileNotFound(path.display().to_string()));
        }
        if meta.len() > self.max_file_size {
            return Err(Error::FileTooLarge {
                filename: file_name,
                size: meta.len(),
                limit: self.max_file_size,
            });
        }

        let decoder = self
            .decoders
            .get(&file_type)
            .ok_or_else(|| Error::UnsupportedFileType(file_type.extension().to_string()))?;

        // Some PDF fonts make the extractor panic; contain it to this file
        let pages = catch_unwind(AssertUnwindSafe(|| decoder.decode(path))).map_err(|_| {
            Error::file_parse(&file_name, format!("{} decoder crashed", decoder.name()))
        })??;

        let loaded_at = Utc::now();
        let source_path = path.display().to_string();

        let documents: Vec<Document> = pages
            .into_iter()
            .map(|page| (normalize_whitespace(&page.text), page))
            .filter(|(text, _)| !text.is_empty())
            .map(|(text, page)| {
                Document::new(
                    text,
                    DocumentMetadata {
                        source_path: source_path.clone(),
                        file_name: file_name.clone(),
                        file_type,
                        loaded_at,
                        page_number: page.page_number,
                        page_count: page.page_count,
                    },
                )
            })
            .collect();

        if documents.is_empty() {
            return Err(Error::file_parse(&file_name, "no text content could be extracted"));
        }

        Ok(documents)
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::from_config(&IngestionConfig::default())
    }
}
