//! Vector index: embeds chunks, persists them and answers similarity queries

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::store::{EmbeddingFingerprint, IndexEntry, PersistentVectorStore, StoreMatch};
use crate::config::{RetrievalConfig, SearchType};
use crate::error::{Error, Result};
use crate::providers::EmbeddingProvider;
use crate::retrieval::mmr::{mmr_rerank, MmrCandidate};
use crate::types::{Chunk, RetrievalResult, ScoredChunk};

/// Whether an index is open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexStatus {
    NotBuilt,
    Ready,
    /// Open, but the in-memory store disagrees with its manifest or files
    Error,
}

/// Snapshot of the index state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub status: IndexStatus,
    /// Directory of the open store, or the configured build directory
    pub persist_directory: PathBuf,
    pub embedding_model: String,
    pub entry_count: usize,
    pub dimensions: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Embedding-backed index over a persistent store
pub struct VectorIndex {
    embedder: Arc<dyn EmbeddingProvider>,
    directory: PathBuf,
    batch_size: usize,
    store: RwLock<Option<Arc<PersistentVectorStore>>>,
    /// Serializes build/add
    writer: Mutex<()>,
}

impl VectorIndex {
    /// Create an index that builds into `directory`
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        directory: impl Into<PathBuf>,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            directory: directory.into(),
            batch_size: batch_size.max(1),
            store: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    /// Whether a store is open
    pub fn is_open(&self) -> bool {
        self.store.read().is_some()
    }

    fn current(&self) -> Option<Arc<PersistentVectorStore>> {
        self.store.read().clone()
    }

    /// Embed `chunks` and write them to a fresh store, replacing the open one.
    ///
    /// On failure the previously open store (if any) stays open.
    pub async fn build(&self, chunks: &[Chunk]) -> Result<usize> {
        let _guard = self.writer.lock().await;
        self.build_locked(chunks).await
    }

    async fn build_locked(&self, chunks: &[Chunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Err(Error::index("no chunks to index"));
        }

        let embeddings = self.embed_chunks(chunks).await?;
        let dimensions = uniform_dimensions(&embeddings)?;
        let fingerprint = EmbeddingFingerprint {
            model_id: self.embedder.model_id().to_string(),
            dimensions,
        };

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry::from_chunk(chunk, embedding))
            .collect();

        let directory = self.directory.clone();
        let store = tokio::task::spawn_blocking(move || {
            PersistentVectorStore::create(directory, fingerprint, entries)
        })
        .await
        .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        let count = store.len();
        *self.store.write() = Some(Arc::new(store));

        tracing::info!("Built vector index with {} entries", count);
        Ok(count)
    }

    /// Open the store at `directory`, replacing the open one on success
    pub async fn load(&self, directory: &Path) -> Result<usize> {
        let dir = directory.to_path_buf();
        let store = tokio::task::spawn_blocking(move || PersistentVectorStore::open(dir))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        let fingerprint = store.fingerprint();
        if fingerprint.model_id != self.embedder.model_id() {
            return Err(Error::index(format!(
                "index at {} was built with embedding model '{}', but the configured model is '{}'",
                directory.display(),
                fingerprint.model_id,
                self.embedder.model_id()
            )));
        }

        let count = store.len();
        *self.store.write() = Some(Arc::new(store));
        Ok(count)
    }

    /// Embed `chunks` and add them to the open store. With nothing open a new
    /// store is built, unless one already exists on disk (it must be opened
    /// first so a model mismatch cannot overwrite it). Returns the number of
    /// new entries.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<usize> {
        let _guard = self.writer.lock().await;

        let Some(store) = self.current() else {
            if PersistentVectorStore::exists(&self.directory) {
                return Err(Error::index(format!(
                    "an index already exists at {} but is not open; open it or rebuild it with ingest",
                    self.directory.display()
                )));
            }
            tracing::info!("No index open, building a new one");
            return self.build_locked(chunks).await;
        };

        if chunks.is_empty() {
            return Ok(0);
        }

        let embeddings = self.embed_chunks(chunks).await?;
        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry::from_chunk(chunk, embedding))
            .collect();

        let added = tokio::task::spawn_blocking(move || store.upsert(entries))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))??;

        tracing::info!("Added {} entries to vector index", added);
        Ok(added)
    }

    /// Retrieve chunks for `query` according to `config`
    pub async fn search(&self, query: &str, config: &RetrievalConfig) -> Result<RetrievalResult> {
        let store = self
            .current()
            .ok_or_else(|| Error::index("no vector index is open"))?;

        let query_vector = self.embedder.embed(query).await?;

        let fetch = match config.search_type {
            SearchType::Similarity => config.k,
            SearchType::Mmr => config.effective_fetch_k(),
        };

        let matches: Vec<StoreMatch> = store
            .query(&query_vector, fetch)?
            .into_iter()
            .filter(|m| m.score >= config.score_threshold)
            .collect();

        let selected: Vec<StoreMatch> = match config.search_type {
            SearchType::Similarity => matches,
            SearchType::Mmr => {
                let candidates: Vec<MmrCandidate<'_>> = matches
                    .iter()
                    .map(|m| MmrCandidate {
                        relevance: m.score,
                        vector: &m.entry.embedding,
                    })
                    .collect();
                let order = mmr_rerank(&candidates, config.k, config.mmr_lambda);
                order.into_iter().map(|i| matches[i].clone()).collect()
            }
        };

        tracing::debug!(
            "Search returned {} chunks ({} search)",
            selected.len(),
            config.search_type
        );

        Ok(selected
            .into_iter()
            .map(|m| ScoredChunk {
                chunk: m.entry.to_chunk(),
                score: m.score,
            })
            .collect())
    }

    /// Index status; never fails
    pub fn stats(&self) -> IndexStats {
        match self.current() {
            Some(store) => {
                let fingerprint = store.fingerprint();
                let (status, error) = match store.check_consistency() {
                    Ok(()) => (IndexStatus::Ready, None),
                    Err(e) => {
                        tracing::warn!("Vector index check failed: {}", e);
                        (IndexStatus::Error, Some(e.to_string()))
                    }
                };
                IndexStats {
                    status,
                    persist_directory: store.directory().to_path_buf(),
                    embedding_model: fingerprint.model_id,
                    entry_count: store.len(),
                    dimensions: Some(fingerprint.dimensions),
                    error,
                }
            }
            None => IndexStats {
                status: IndexStatus::NotBuilt,
                persist_directory: self.directory.clone(),
                embedding_model: self.embedder.model_id().to_string(),
                entry_count: 0,
                dimensions: None,
                error: None,
            },
        }
    }

    async fn embed_chunks(&self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let batch_embeddings = self.embedder.embed_batch(batch).await?;
            if batch_embeddings.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "{} returned {} embeddings for {} texts",
                    self.embedder.name(),
                    batch_embeddings.len(),
                    batch.len()
                )));
            }
            embeddings.extend(batch_embeddings);
            tracing::debug!("Embedded {}/{} chunks", embeddings.len(), texts.len());
        }

        Ok(embeddings)
    }
}

fn uniform_dimensions(embeddings: &[Vec<f32>]) -> Result<usize> {
    let dimensions = embeddings.first().map(|e| e.len()).unwrap_or(0);
    if dimensions == 0 {
        return Err(Error::embedding("provider returned empty embeddings"));
    }
    if embeddings.iter().any(|e| e.len() != dimensions) {
        return Err(Error::embedding(
            "provider returned embeddings of differing dimensions",
        ));
    }
    Ok(dimensions)
}
