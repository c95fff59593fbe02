//! Prompt templates for grounded answer generation

use crate::config::LlmConfig;
use crate::types::ScoredChunk;

/// Marker appended to a context block cut short by the context budget
const TRUNCATION_MARKER: &str = " [...]";

/// Prompt text plus how many retrieved chunks made it into the context
#[derive(Debug, Clone)]
pub struct BuiltPrompt {
    pub text: String,
    pub chunks_used: usize,
}

/// Prompt builder for RAG queries
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    language: String,
    max_context_chars: usize,
}

impl PromptBuilder {
    pub fn new(language: impl Into<String>, max_context_chars: usize) -> Self {
        Self {
            language: language.into(),
            max_context_chars,
        }
    }

    pub fn from_config(config: &LlmConfig) -> Self {
        Self::new(config.response_language.clone(), config.max_context_chars)
    }

    /// Build the numbered context block, keeping within `max_context_chars`
    /// of chunk text. Returns the context and the number of chunks included.
    pub fn build_context(&self, results: &[ScoredChunk]) -> (String, usize) {
        let mut context = String::new();
        let mut budget = self.max_context_chars;
        let mut used = 0;

        for (i, result) in results.iter().enumerate() {
            if budget == 0 {
                break;
            }

            let content = result.chunk.content.trim();
            let len = content.chars().count();
            let body = if len <= budget {
                budget -= len;
                content.to_string()
            } else {
                let cut: String = content.chars().take(budget).collect();
                budget = 0;
                format!("{}{}", cut, TRUNCATION_MARKER)
            };

            context.push_str(&format!(
                "[{}] {}\n\nContent:\n{}\n\n---\n\n",
                i + 1,
                result.chunk.metadata.document.format_citation(),
                body
            ));
            used += 1;
        }

        (context, used)
    }

    fn format_sources_list(results: &[ScoredChunk]) -> String {
        if results.is_empty() {
            return "(none)".to_string();
        }
        results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("[{}] {}", i + 1, r.chunk.metadata.document.format_citation()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Build the full RAG prompt with strict grounding
    pub fn build(&self, question: &str, results: &[ScoredChunk]) -> BuiltPrompt {
        let (context, chunks_used) = self.build_context(results);
        let context = if context.is_empty() {
            "(no relevant passages were found in the documents)".to_string()
        } else {
            context
        };

        let text = format!(
            r#"You are an assistant that answers questions using only the documents provided below.

INSTRUCTIONS:
1. Answer ONLY from the information in the CONTEXT below
2. If the context does not contain the answer, say clearly that the documents do not contain that information
3. Give a detailed, well-structured answer
4. Cite the sources you use inline, in the format [Source: filename] or [Source: filename, Page X]
5. Keep a professional but friendly tone
6. Respond in {language}

CONTEXT FROM DOCUMENTS:
{context}
AVAILABLE SOURCES:
{sources}

QUESTION: {question}

Answer:"#,
            language = self.language,
            context = context,
            sources = Self::format_sources_list(&results[..chunks_used]),
            question = question.trim(),
        );

        BuiltPrompt { text, chunks_used }
    }
}
