//! Per-format file decoders

use pulldown_cmark::{Event, Parser, Tag, TagEnd};
use std::path::Path;

use crate::error::{Error, Result};

/// Text decoded from one page (or the whole file for unpaginated formats)
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedPage {
    /// Extracted text
    pub text: String,
    /// Page number (1-indexed), if the format is paginated
    pub page_number: Option<u32>,
    /// Total pages, if the format is paginated
    pub page_count: Option<u32>,
}

impl DecodedPage {
    /// A single unpaginated page
    pub fn whole(text: String) -> Self {
        Self {
            text,
            page_number: None,
            page_count: None,
        }
    }
}

/// Decodes a file of one format into text pages
pub trait FileDecoder: Send + Sync {
    /// Decode the file at `path`
    fn decode(&self, path: &Path) -> Result<Vec<DecodedPage>>;

    /// Decoder name for logging
    fn name(&self) -> &str;
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// PDF decoder: page-by-page text via lopdf, whole-document fallback via pdf-extract
pub struct PdfDecoder;

impl PdfDecoder {
    fn decode_pages(data: &[u8]) -> Option<Vec<DecodedPage>> {
        let doc = lopdf::Document::load_mem(data).ok()?;
        let pages = doc.get_pages();
        let page_count = pages.len() as u32;

        let mut decoded = Vec::with_capacity(pages.len());
        for page_number in pages.keys() {
            match doc.extract_text(&[*page_number]) {
                Ok(text) => decoded.push(DecodedPage {
                    text,
                    page_number: Some(*page_number),
                    page_count: Some(page_count),
                }),
                Err(e) => {
                    tracing::debug!("lopdf could not extract page {}: {}", page_number, e);
                    return None;
                }
            }
        }

        // Scanned or oddly encoded PDFs come back empty from lopdf
        if decoded.iter().all(|p| p.text.trim().is_empty()) {
            return None;
        }

        Some(decoded)
    }
}

impl FileDecoder for PdfDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<DecodedPage>> {
        let data = std::fs::read(path)?;

        if let Some(pages) = Self::decode_pages(&data) {
            return Ok(pages);
        }

        tracing::debug!("Falling back to pdf-extract for {}", path.display());
        let content = pdf_extract::extract_text_from_mem(&data)
            .map_err(|e| Error::file_parse(display_name(path), e.to_string()))?;

        // Page boundaries are lost here, so no page label
        Ok(vec![DecodedPage::whole(content)])
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

/// Plain text decoder (UTF-8)
pub struct TextDecoder;

impl FileDecoder for TextDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<DecodedPage>> {
        let data = std::fs::read(path)?;
        let text = String::from_utf8(data)
            .map_err(|e| Error::file_parse(display_name(path), format!("invalid UTF-8: {}", e)))?;
        Ok(vec![DecodedPage::whole(text)])
    }

    fn name(&self) -> &str {
        "text"
    }
}

/// Markdown decoder: renders to plain text, keeping paragraph and line breaks
pub struct MarkdownDecoder;

impl MarkdownDecoder {
    /// Strip markdown markup from `source`
    pub fn to_plain_text(source: &str) -> String {
        let mut out = String::with_capacity(source.len());

        for event in Parser::new(source) {
            match event {
                Event::Text(text) | Event::Code(text) => out.push_str(&text),
                Event::SoftBreak | Event::HardBreak => out.push('\n'),
                Event::Start(Tag::Item) => out.push_str("- "),
                Event::End(TagEnd::Paragraph)
                | Event::End(TagEnd::Heading(_))
                | Event::End(TagEnd::CodeBlock)
                | Event::End(TagEnd::List(_))
                | Event::End(TagEnd::Table) => out.push_str("\n\n"),
                Event::End(TagEnd::Item) | Event::End(TagEnd::TableRow) => {
                    if !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
                Event::End(TagEnd::TableCell) => out.push(' '),
                Event::Rule => out.push_str("\n\n"),
                _ => {}
            }
        }

        // Collapse runs of blank lines left by nested blocks
        let mut collapsed = String::with_capacity(out.len());
        let mut newlines = 0;
        for ch in out.chars() {
            if ch == '\n' {
                newlines += 1;
                if newlines > 2 {
                    continue;
                }
            } else {
                newlines = 0;
            }
            collapsed.push(ch);
        }

        collapsed.trim().to_string()
    }
}

impl FileDecoder for MarkdownDecoder {
    fn decode(&self, path: &Path) -> Result<Vec<DecodedPage>> {
        let data = std::fs::read(path)?;
        let source = String::from_utf8(data)
            .map_err(|e| Error::file_parse(display_name(path), format!("invalid UTF-8: {}", e)))?;
        Ok(vec![DecodedPage::whole(Self::to_plain_text(&source))])
    }

    fn name(&self) -> &str {
        "markdown"
    }
}
