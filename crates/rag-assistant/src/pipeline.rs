//! RAG orchestrator: owns providers, the vector index and the query chain

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::config::{ConfigSection, Credentials, RagConfig};
use crate::error::{Error, Result};
use crate::generation::{validate_question, QueryChain};
use crate::index::{IndexStatus, VectorIndex};
use crate::ingestion::{DocumentLoader, LoadReport, TextChunker};
use crate::providers::{EmbeddingProvider, GeminiClient, GeminiEmbedder, GeminiLlm, LlmProvider};
use crate::types::{AskResponse, Chunk, IngestReport};

/// Lifecycle of the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// No index open
    Uninitialized,
    /// Index open, query chain not built yet
    Indexed,
    /// Index open and query chain built
    Queryable,
}

/// Pipeline status for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub status: IndexStatus,
    pub persist_directory: PathBuf,
    pub embedding_model: String,
    pub generation_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub entry_count: usize,
    pub dimensions: Option<usize>,
    pub state: PipelineState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_error: Option<String>,
}

struct Inner {
    config: RagConfig,
    chain: Option<Arc<QueryChain>>,
}

/// Ingests documents and answers questions over them
///
/// Shared behind `Arc` by concurrent callers. Mutating operations take the
/// write lock; `ask` only holds the read lock long enough to clone the chain.
pub struct RagOrchestrator {
    llm: Arc<dyn LlmProvider>,
    index: Arc<VectorIndex>,
    inner: RwLock<Inner>,
}

impl RagOrchestrator {
    /// Create an orchestrator over the given providers
    pub fn new(
        config: RagConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let index = Arc::new(VectorIndex::new(
            embedder,
            config.vector_db.persist_directory.clone(),
            config.embeddings.batch_size,
        ));

        Ok(Self {
            llm,
            index,
            inner: RwLock::new(Inner {
                config,
                chain: None,
            }),
        })
    }

    /// Create an orchestrator backed by the Gemini API
    pub fn with_gemini(config: RagConfig, credentials: Credentials) -> Result<Self> {
        let client = Arc::new(GeminiClient::new(credentials, &config.provider)?);
        let embedder = Arc::new(GeminiEmbedder::new(Arc::clone(&client), &config.embeddings));
        let llm = Arc::new(GeminiLlm::new(client));

        tracing::info!(
            "Using Gemini (embeddings: {}, generation: {})",
            embedder.model_id(),
            config.llm.model
        );

        Self::new(config, embedder, llm)
    }

    /// Create a Gemini-backed orchestrator with the API key from `GOOGLE_API_KEY`
    pub fn from_env(config: RagConfig) -> Result<Self> {
        Self::with_gemini(config, Credentials::from_env()?)
    }

    /// Load, chunk and index `paths` into a fresh index, replacing the open one
    pub async fn ingest(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let (report, indexed) = self.index_batch(paths, true).await?;
        if !indexed {
            return Err(nothing_indexed(&report));
        }

        tracing::info!(
            "Ingested {} documents into {} chunks in {}ms",
            report.documents_loaded,
            report.chunks_indexed,
            report.processing_time_ms
        );
        Ok(report)
    }

    /// Load, chunk and append `paths` to the open index (building one if none is open)
    pub async fn add_documents(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        let (report, indexed) = self.index_batch(paths, false).await?;
        if !indexed {
            return Err(nothing_indexed(&report));
        }
        Ok(report)
    }

    /// Index any number of paths, `max_files_per_batch` at a time, replacing
    /// the open index with the first batch that loads.
    ///
    /// A batch in which nothing loads only adds to the report's failures.
    /// Fails when no batch could be indexed or on a non-ingestion error.
    pub async fn ingest_all(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        self.index_in_batches(paths, true).await
    }

    /// Like [`ingest_all`](Self::ingest_all), but every batch is appended to
    /// the open index
    pub async fn add_all(&self, paths: &[PathBuf]) -> Result<IngestReport> {
        self.index_in_batches(paths, false).await
    }

    async fn index_in_batches(&self, paths: &[PathBuf], replace: bool) -> Result<IngestReport> {
        if paths.is_empty() {
            return Err(Error::validation("no files were given"));
        }
        let batch_size = self.inner.read().await.config.ingestion.max_files_per_batch.max(1);

        let mut total = IngestReport::default();
        let mut replace_next = replace;
        let mut indexed_any = false;

        for batch in paths.chunks(batch_size) {
            let (report, indexed) = self.index_batch(batch, replace_next).await?;
            if indexed {
                replace_next = false;
                indexed_any = true;
            } else {
                tracing::warn!("Nothing indexed from a batch of {} files", batch.len());
            }
            total.merge(report);
        }

        if !indexed_any {
            return Err(nothing_indexed(&total));
        }

        tracing::info!(
            "Indexed {} documents into {} chunks ({} files skipped)",
            total.documents_loaded,
            total.chunks_indexed,
            total.failures.len()
        );
        Ok(total)
    }

    /// Load and chunk one batch and write it to the index. The flag is false
    /// when the batch produced no chunks, in which case the index is untouched.
    async fn index_batch(&self, paths: &[PathBuf], replace: bool) -> Result<(IngestReport, bool)> {
        let start = Instant::now();
        let mut inner = self.inner.write().await;

        let (load, chunks) = self.load_and_chunk(&inner.config, paths).await?;
        let indexed = !chunks.is_empty();

        let chunks_indexed = if !indexed {
            0
        } else if replace {
            let count = self.index.build(&chunks).await?;
            inner.chain = None;
            count
        } else {
            self.index.add(&chunks).await?
        };

        let report = IngestReport {
            files_requested: paths.len(),
            documents_loaded: load.documents.len(),
            chunks_indexed,
            failures: load.failures,
            processing_time_ms: start.elapsed().as_millis() as u64,
        };
        Ok((report, indexed))
    }

    async fn load_and_chunk(
        &self,
        config: &RagConfig,
        paths: &[PathBuf],
    ) -> Result<(LoadReport, Vec<Chunk>)> {
        if paths.is_empty() {
            return Err(Error::validation("no files were given"));
        }
        let limit = config.ingestion.max_files_per_batch;
        if paths.len() > limit {
            return Err(Error::validation(format!(
                "{} files given, at most {} can be processed at once",
                paths.len(),
                limit
            )));
        }

        let chunker = TextChunker::from_config(&config.chunking)?;
        let loader = DocumentLoader::from_config(&config.ingestion);
        let owned = paths.to_vec();
        let load = tokio::task::spawn_blocking(move || loader.load_with_report(&owned))
            .await
            .map_err(|e| Error::Internal(format!("Task join error: {}", e)))?;

        let chunks = chunker.split_documents(&load.documents);
        Ok((load, chunks))
    }

    /// Open a previously built index. On failure the current state is kept.
    pub async fn open_existing(&self, directory: impl AsRef<Path>) -> Result<usize> {
        let mut inner = self.inner.write().await;
        let count = self.index.load(directory.as_ref()).await?;
        inner.chain = None;

        tracing::info!(
            "Opened index at {} with {} entries",
            directory.as_ref().display(),
            count
        );
        Ok(count)
    }

    /// Merge a JSON object into one configuration section
    /// (`chunking`, `retrieval`, `generation` or its alias `llm`)
    pub async fn configure(&self, section: &str, patch: serde_json::Value) -> Result<()> {
        let section = ConfigSection::from_str(section)?;
        let mut inner = self.inner.write().await;

        inner.config.apply_patch(section, patch)?;
        if inner.chain.take().is_some() {
            tracing::debug!("Query chain dropped after {} update", section);
        }

        tracing::info!("Updated {} configuration", section);
        Ok(())
    }

    /// Answer a question. Always returns a response; failures are flagged.
    pub async fn ask(&self, question: &str) -> AskResponse {
        if let Err(e) = validate_question(question) {
            return AskResponse::failure(question, &e, 0);
        }

        let start = Instant::now();
        match self.query_chain().await {
            Ok(chain) => chain.ask(question).await,
            Err(e) => {
                tracing::error!("Cannot answer question: {}", e);
                AskResponse::failure(question, &e, start.elapsed().as_millis() as u64)
            }
        }
    }

    /// The current query chain, built on first use
    async fn query_chain(&self) -> Result<Arc<QueryChain>> {
        if let Some(chain) = self.inner.read().await.chain.as_ref() {
            return Ok(Arc::clone(chain));
        }

        let mut inner = self.inner.write().await;
        if let Some(chain) = inner.chain.as_ref() {
            return Ok(Arc::clone(chain));
        }

        if !self.index.is_open() {
            return Err(Error::config(
                "no documents have been indexed; ingest documents or open an existing index first",
            ));
        }

        let chain = Arc::new(QueryChain::new(
            Arc::clone(&self.index),
            Arc::clone(&self.llm),
            &inner.config.retrieval,
            &inner.config.llm,
        ));
        inner.chain = Some(Arc::clone(&chain));

        tracing::debug!("Query chain built");
        Ok(chain)
    }

    /// Current status; never fails
    pub async fn stats(&self) -> PipelineStats {
        let inner = self.inner.read().await;
        let index = self.index.stats();

        PipelineStats {
            status: index.status,
            persist_directory: index.persist_directory,
            embedding_model: index.embedding_model,
            generation_model: inner.config.llm.model.clone(),
            chunk_size: inner.config.chunking.chunk_size,
            chunk_overlap: inner.config.chunking.chunk_overlap,
            entry_count: index.entry_count,
            dimensions: index.dimensions,
            state: Self::state_of(&self.index, &inner),
            index_error: index.error,
        }
    }

    pub async fn state(&self) -> PipelineState {
        let inner = self.inner.read().await;
        Self::state_of(&self.index, &inner)
    }

    fn state_of(index: &VectorIndex, inner: &Inner) -> PipelineState {
        match (index.is_open(), inner.chain.is_some()) {
            (false, _) => PipelineState::Uninitialized,
            (true, false) => PipelineState::Indexed,
            (true, true) => PipelineState::Queryable,
        }
    }

    /// Snapshot of the configuration
    pub async fn config(&self) -> RagConfig {
        self.inner.read().await.config.clone()
    }
}

/// Error for a load that left nothing to index, listing why files were skipped
fn nothing_indexed(report: &IngestReport) -> Error {
    if report.documents_loaded > 0 {
        return Error::Ingestion("the loaded documents contain no text to index".to_string());
    }

    let reasons: Vec<String> = report
        .failures
        .iter()
        .map(|f| format!("{}: {}", f.path, f.reason))
        .collect();
    Error::Ingestion(if reasons.is_empty() {
        "no documents could be loaded".to_string()
    } else {
        format!("no documents could be loaded ({})", reasons.join("; "))
    })
}
