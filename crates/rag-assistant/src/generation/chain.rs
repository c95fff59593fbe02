//! Query chain: retrieve, prompt, generate, cite

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use super::citation::{build_citations, mark_cited};
use super::prompt::PromptBuilder;
use crate::config::{LlmConfig, RetrievalConfig};
use crate::error::{Error, Result};
use crate::index::VectorIndex;
use crate::providers::{GenerationParams, LlmProvider};
use crate::retrieval::Retriever;
use crate::types::AskResponse;

/// Reject empty or whitespace-only questions
pub fn validate_question(question: &str) -> Result<()> {
    if question.trim().is_empty() {
        return Err(Error::validation("question must not be empty"));
    }
    Ok(())
}

/// Retriever + generator bound to one retrieval and generation configuration
pub struct QueryChain {
    retriever: Retriever,
    generator: Arc<dyn LlmProvider>,
    prompt: PromptBuilder,
    params: GenerationParams,
}

impl QueryChain {
    pub fn new(
        index: Arc<VectorIndex>,
        generator: Arc<dyn LlmProvider>,
        retrieval: &RetrievalConfig,
        llm: &LlmConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(index, retrieval.clone()),
            generator,
            prompt: PromptBuilder::from_config(llm),
            params: GenerationParams::from(llm),
        }
    }

    /// Answer `question`. Failures come back as error responses.
    pub async fn ask(&self, question: &str) -> AskResponse {
        let start = Instant::now();

        match self.answer(question, start).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Failed to answer question: {}", e);
                AskResponse::failure(question, &e, start.elapsed().as_millis() as u64)
            }
        }
    }

    async fn answer(&self, question: &str, start: Instant) -> Result<AskResponse> {
        validate_question(question)?;

        let preview: String = question.chars().take(100).collect();
        tracing::info!("Processing question: {}", preview);

        let results = self.retriever.retrieve(question).await?;
        if results.is_empty() {
            tracing::warn!("No chunks above the score threshold; answering without context");
        }

        let prompt = self.prompt.build(question, &results);
        let answer = self.generator.generate(&prompt.text, &self.params).await?;

        let used = &results[..prompt.chunks_used];
        let mut sources: Vec<String> = Vec::with_capacity(used.len());
        for result in used {
            let source = result.chunk.source_id();
            if !sources.iter().any(|s| s == source) {
                sources.push(source.to_string());
            }
        }

        let mut citations = build_citations(used);
        let cited = mark_cited(&answer, &mut citations);

        let processing_time_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            "Answered with {} chunks from {} sources ({} cited) in {}ms",
            used.len(),
            sources.len(),
            cited,
            processing_time_ms
        );

        Ok(AskResponse {
            question: question.to_string(),
            answer,
            sources,
            citations,
            confidence: used.len(),
            timestamp: Utc::now(),
            processing_time_ms,
            error: false,
            error_kind: None,
        })
    }
}
