//! Retrieval: the query-time view of the vector index

pub mod mmr;

use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::types::RetrievalResult;

/// Retrieves chunks for a question with a fixed retrieval configuration
pub struct Retriever {
    index: Arc<VectorIndex>,
    config: RetrievalConfig,
}

impl Retriever {
    pub fn new(index: Arc<VectorIndex>, config: RetrievalConfig) -> Self {
        Self { index, config }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// At most `k` chunks scoring at least `score_threshold`, best first
    /// (MMR order when `search_type` is `mmr`)
    pub async fn retrieve(&self, query: &str) -> Result<RetrievalResult> {
        self.index.search(query, &self.config).await
    }
}
