//! Configuration for the RAG pipeline

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Environment variable holding the Gemini API key
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Environment variable pointing at a TOML configuration file
pub const CONFIG_PATH_ENV: &str = "RAG_CONFIG";

/// Main RAG pipeline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Answer generation configuration
    pub llm: LlmConfig,
    /// Vector index configuration
    pub vector_db: VectorDbConfig,
    /// Document loading limits
    pub ingestion: IngestionConfig,
    /// HTTP provider settings
    pub provider: ProviderConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        let config: RagConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve configuration from an explicit path, `RAG_CONFIG`, or the user
    /// config directory, falling back to defaults when no file exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::from_file(path);
        }

        if let Some(path) = default_config_path().filter(|p| p.exists()) {
            tracing::info!("Using config file {}", path.display());
            return Self::from_file(path);
        }

        Ok(Self::default())
    }

    /// Check cross-field invariants
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.embeddings.validate()?;
        self.retrieval.validate()?;
        self.llm.validate()?;
        self.provider.validate()?;
        Ok(())
    }

    /// Merge a JSON patch into one section.
    ///
    /// Unknown keys and invalid values are rejected and leave the
    /// configuration unchanged.
    pub fn apply_patch(&mut self, section: ConfigSection, patch: serde_json::Value) -> Result<()> {
        let mut candidate = self.clone();

        match section {
            ConfigSection::Chunking => {
                let patch: ChunkingPatch = parse_patch(section, patch)?;
                patch.apply(&mut candidate.chunking);
            }
            ConfigSection::Retrieval => {
                let patch: RetrievalPatch = parse_patch(section, patch)?;
                patch.apply(&mut candidate.retrieval);
            }
            ConfigSection::Generation => {
                let patch: GenerationPatch = parse_patch(section, patch)?;
                patch.apply(&mut candidate.llm);
            }
        }

        candidate.validate()?;
        *self = candidate;
        Ok(())
    }
}

/// Default location of the config file (`<config dir>/rag-assistant/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("rag-assistant").join("config.toml"))
}

fn parse_patch<T: DeserializeOwned>(section: ConfigSection, patch: serde_json::Value) -> Result<T> {
    if !patch.is_object() {
        return Err(Error::validation(format!(
            "Patch for section '{}' must be a JSON object",
            section
        )));
    }
    serde_json::from_value(patch)
        .map_err(|e| Error::validation(format!("Invalid patch for section '{}': {}", section, e)))
}

/// Configuration sections that can be changed at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSection {
    Chunking,
    Retrieval,
    Generation,
}

impl FromStr for ConfigSection {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chunking" => Ok(Self::Chunking),
            "retrieval" => Ok(Self::Retrieval),
            "generation" | "llm" => Ok(Self::Generation),
            other => Err(Error::validation(format!(
                "Unknown configuration section '{}' (expected chunking, retrieval or generation)",
                other
            ))),
        }
    }
}

impl fmt::Display for ConfigSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Chunking => "chunking",
            Self::Retrieval => "retrieval",
            Self::Generation => "generation",
        };
        f.write_str(name)
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
        }
    }
}

impl ChunkingConfig {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::config("chunk_size must be greater than 0"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Embedding model identifier
    pub model: String,
    /// Texts per embedding request
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "models/embedding-001".to_string(),
            batch_size: 100,
        }
    }
}

impl EmbeddingConfig {
    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("embedding model must not be empty"));
        }
        if self.batch_size == 0 {
            return Err(Error::config("embedding batch_size must be greater than 0"));
        }
        Ok(())
    }
}

/// Similarity algorithm used by the retriever
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Plain cosine similarity ranking
    #[default]
    Similarity,
    /// Maximal marginal relevance re-ranking for diversity
    Mmr,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Similarity => f.write_str("similarity"),
            Self::Mmr => f.write_str("mmr"),
        }
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Similarity algorithm
    pub search_type: SearchType,
    /// Number of chunks to retrieve
    pub k: usize,
    /// Minimum cosine similarity for a chunk to be returned
    pub score_threshold: f32,
    /// Candidates considered by MMR before re-ranking
    pub fetch_k: usize,
    /// MMR balance: 1.0 = pure relevance, 0.0 = pure diversity
    pub mmr_lambda: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            search_type: SearchType::Similarity,
            k: 4,
            score_threshold: 0.5,
            fetch_k: 20,
            mmr_lambda: 0.5,
        }
    }
}

impl RetrievalConfig {
    fn validate(&self) -> Result<()> {
        if self.k == 0 {
            return Err(Error::config("retrieval k must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(Error::config(format!(
                "score_threshold must be within 0.0..=1.0, got {}",
                self.score_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.mmr_lambda) {
            return Err(Error::config(format!(
                "mmr_lambda must be within 0.0..=1.0, got {}",
                self.mmr_lambda
            )));
        }
        Ok(())
    }

    /// Candidate pool size for MMR (never smaller than k)
    pub fn effective_fetch_k(&self) -> usize {
        self.fetch_k.max(self.k)
    }
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LlmConfig {
    /// Generation model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum tokens in the generated answer
    pub max_output_tokens: u32,
    /// Language the answer must be written in
    pub response_language: String,
    /// Upper bound on retrieved context placed in the prompt, in characters
    pub max_context_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_string(),
            temperature: 0.1,
            max_output_tokens: 2048,
            response_language: "English".to_string(),
            max_context_chars: 12_000,
        }
    }
}

impl LlmConfig {
    fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::config("generation model must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(Error::config(format!(
                "temperature must be within 0.0..=2.0, got {}",
                self.temperature
            )));
        }
        if self.max_output_tokens == 0 {
            return Err(Error::config("max_output_tokens must be greater than 0"));
        }
        if self.max_context_chars == 0 {
            return Err(Error::config("max_context_chars must be greater than 0"));
        }
        Ok(())
    }
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VectorDbConfig {
    /// Directory the index is persisted to
    pub persist_directory: PathBuf,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            persist_directory: PathBuf::from("./vector_index"),
        }
    }
}

/// Document loading limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionConfig {
    /// Files larger than this are skipped
    pub max_file_size_bytes: u64,
    /// Maximum number of files accepted per ingest call
    pub max_files_per_batch: usize,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024, // 50MB
            max_files_per_batch: 10,
        }
    }
}

/// HTTP provider settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    /// Gemini API base URL
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Number of retries for failed requests
    pub max_retries: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            timeout_secs: 120,
            max_retries: 2,
        }
    }
}

impl ProviderConfig {
    /// Upper bound on `max_retries`
    pub const MAX_RETRIES: u32 = 10;

    fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::config("provider timeout_secs must be at least 1"));
        }
        if self.max_retries > Self::MAX_RETRIES {
            return Err(Error::config(format!(
                "provider max_retries must be at most {}, got {}",
                Self::MAX_RETRIES,
                self.max_retries
            )));
        }
        Ok(())
    }
}

/// Credential for the external AI provider
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    /// Wrap an API key
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(Error::config(format!("{} is empty", API_KEY_ENV)));
        }
        Ok(Self { api_key })
    }

    /// Read the API key from `GOOGLE_API_KEY`
    pub fn from_env() -> Result<Self> {
        let key = std::env::var(API_KEY_ENV)
            .map_err(|_| Error::config(format!("{} is not set", API_KEY_ENV)))?;
        Self::new(key)
    }

    /// The raw API key
    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChunkingPatch {
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
}

impl ChunkingPatch {
    fn apply(self, target: &mut ChunkingConfig) {
        if let Some(v) = self.chunk_size {
            target.chunk_size = v;
        }
        if let Some(v) = self.chunk_overlap {
            target.chunk_overlap = v;
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RetrievalPatch {
    search_type: Option<SearchType>,
    k: Option<usize>,
    score_threshold: Option<f32>,
    fetch_k: Option<usize>,
    mmr_lambda: Option<f32>,
}

impl RetrievalPatch {
    fn apply(self, target: &mut RetrievalConfig) {
        if let Some(v) = self.search_type {
            target.search_type = v;
        }
        if let Some(v) = self.k {
            target.k = v;
        }
        if let Some(v) = self.score_threshold {
            target.score_threshold = v;
        }
        if let Some(v) = self.fetch_k {
            target.fetch_k = v;
        }
        if let Some(v) = self.mmr_lambda {
            target.mmr_lambda = v;
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GenerationPatch {
    #[serde(alias = "model_id")]
    model: Option<String>,
    temperature: Option<f32>,
    #[serde(alias = "max_tokens")]
    max_output_tokens: Option<u32>,
    response_language: Option<String>,
    max_context_chars: Option<usize>,
}

impl GenerationPatch {
    fn apply(self, target: &mut LlmConfig) {
        if let Some(v) = self.model {
            target.model = v;
        }
        if let Some(v) = self.temperature {
            target.temperature = v;
        }
        if let Some(v) = self.max_output_tokens {
            target.max_output_tokens = v;
        }
        if let Some(v) = self.response_language {
            target.response_language = v;
        }
        if let Some(v) = self.max_context_chars {
            target.max_context_chars = v;
        }
    }
}
