//! Deterministic in-process providers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use rag_assistant::error::{Error, Result};
use rag_assistant::providers::{EmbeddingProvider, GenerationParams, LlmProvider};
use rag_assistant::{RagConfig, RagOrchestrator};

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn fnv1a(token: &str) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in token.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

/// Bag-of-words embedder: each token is hashed into one of `dimensions` buckets
pub struct MockEmbedder {
    model: String,
    dimensions: usize,
    vocabulary: Option<Vec<String>>,
    pub calls: AtomicUsize,
    pub fail: AtomicBool,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::with_model("mock-embedding")
    }

    pub fn with_model(model: &str) -> Self {
        Self {
            model: model.to_string(),
            dimensions: 4096,
            vocabulary: None,
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    /// One dimension per listed word; other words are ignored
    pub fn with_vocabulary(words: &[&str]) -> Self {
        Self {
            model: "mock-vocabulary".to_string(),
            dimensions: words.len(),
            vocabulary: Some(words.iter().map(|w| w.to_string()).collect()),
            calls: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn vectorize(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for token in tokens(text) {
            let slot = match &self.vocabulary {
                Some(vocab) => vocab.iter().position(|w| *w == token),
                None => Some((fnv1a(&token) % self.dimensions as u64) as usize),
            };
            if let Some(slot) = slot {
                v[slot] += 1.0;
            }
        }
        normalize(v)
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::embedding("mock embedder failure"));
        }
        Ok(self.vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::embedding("mock embedder failure"));
        }
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Generator that answers with the first context passage and records prompts
pub struct MockLlm {
    pub prompts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl MockLlm {
    pub fn new() -> Self {
        Self {
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().last().cloned()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());

        let passage = prompt
            .split("Content:\n")
            .nth(1)
            .and_then(|rest| rest.lines().next())
            .map(str::trim)
            .filter(|line| !line.is_empty());

        Ok(match passage {
            Some(passage) => format!("{} [Source: {}]", passage, first_source(prompt)),
            None => "The documents do not contain that information.".to_string(),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// File name from the `[1] name` header of the first context block
fn first_source(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("[1] "))
        .map(|s| s.split(',').next().unwrap_or(s).trim().to_string())
        .unwrap_or_default()
}

/// Config whose index lives under `dir`
pub fn test_config(dir: &Path) -> RagConfig {
    let mut config = RagConfig::default();
    config.vector_db.persist_directory = dir.join("index");
    config.chunking.chunk_size = 200;
    config.chunking.chunk_overlap = 20;
    config
}

pub struct Harness {
    pub rag: RagOrchestrator,
    pub embedder: Arc<MockEmbedder>,
    pub llm: Arc<MockLlm>,
}

pub fn harness(config: RagConfig) -> Harness {
    harness_with(config, MockEmbedder::new())
}

pub fn harness_with(config: RagConfig, embedder: MockEmbedder) -> Harness {
    let embedder = Arc::new(embedder);
    let llm = Arc::new(MockLlm::new());
    let rag = RagOrchestrator::new(config, embedder.clone(), llm.clone()).unwrap();
    Harness { rag, embedder, llm }
}

pub fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
