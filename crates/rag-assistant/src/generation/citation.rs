//! Citation building and linking

use regex::Regex;
use std::sync::OnceLock;

use crate::types::{Citation, ScoredChunk};

/// Snippet length shown with each citation, in characters
pub const SNIPPET_CHARS: usize = 200;

fn citation_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"\[Source:\s*([^,\]]+)(?:,\s*Page\s*(\d+))?\]").ok())
        .as_ref()
}

/// One citation per retrieved chunk, in retrieval order
pub fn build_citations(results: &[ScoredChunk]) -> Vec<Citation> {
    results
        .iter()
        .map(|r| {
            let meta = &r.chunk.metadata;
            Citation {
                chunk_id: r.chunk.id.clone(),
                source: meta.document.source_path.clone(),
                file_name: meta.document.file_name.clone(),
                file_type: meta.document.file_type,
                page_number: meta.document.page_number,
                chunk_index: meta.chunk_index,
                score: r.score,
                snippet: truncate_snippet(r.chunk.content.trim(), SNIPPET_CHARS),
                cited: false,
            }
        })
        .collect()
}

/// Flag citations the answer references with `[Source: name]` or
/// `[Source: name, Page N]`. Returns how many were flagged.
pub fn mark_cited(answer: &str, citations: &mut [Citation]) -> usize {
    let Some(pattern) = citation_pattern() else {
        return 0;
    };

    for cap in pattern.captures_iter(answer) {
        let name = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let page: Option<u32> = cap.get(2).and_then(|m| m.as_str().parse().ok());
        if name.is_empty() {
            continue;
        }

        for citation in citations.iter_mut() {
            let name_matches = citation.file_name.eq_ignore_ascii_case(name)
                || citation.file_name.contains(name)
                || name.contains(&citation.file_name);
            let page_matches = page.is_none() || citation.page_number == page;
            if name_matches && page_matches {
                citation.cited = true;
            }
        }
    }

    citations.iter().filter(|c| c.cited).count()
}

/// Truncate snippet to at most `max_chars` characters, ending on a word
/// boundary where possible
pub fn truncate_snippet(snippet: &str, max_chars: usize) -> String {
    if snippet.chars().count() <= max_chars {
        return snippet.to_string();
    }

    let cut: String = snippet.chars().take(max_chars).collect();
    match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => format!("{}...", cut[..pos].trim_end()),
        _ => format!("{}...", cut),
    }
}
