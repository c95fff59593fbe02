//! Directory-backed vector store
//!
//! Layout under the store directory:
//! - `manifest.json`: format version, embedding fingerprint, entry count, timestamps
//! - `entries.json`: every entry (id, text, embedding, chunk metadata)
//!
//! Files are written to a temporary sibling and renamed into place, so a
//! reader never observes a half-written file. Search is exact (brute-force
//! cosine), which is plenty for a few thousand chunks.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::{Chunk, ChunkMetadata};

const MANIFEST_FILE: &str = "manifest.json";
const ENTRIES_FILE: &str = "entries.json";
const FORMAT_VERSION: u32 = 1;

/// Which embedding model produced the stored vectors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddingFingerprint {
    pub model_id: String,
    pub dimensions: usize,
}

/// Store manifest, persisted as `manifest.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub format_version: u32,
    pub fingerprint: EmbeddingFingerprint,
    pub entry_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One stored chunk and its embedding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub id: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: ChunkMetadata,
}

impl IndexEntry {
    pub fn from_chunk(chunk: &Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.id.clone(),
            content: chunk.content.clone(),
            embedding,
            metadata: chunk.metadata.clone(),
        }
    }

    pub fn to_chunk(&self) -> Chunk {
        Chunk {
            id: self.id.clone(),
            content: self.content.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// A stored entry matched by a query
#[derive(Debug, Clone)]
pub struct StoreMatch {
    pub entry: IndexEntry,
    pub score: f32,
}

/// Cosine similarity, 0.0 when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

struct StoreState {
    manifest: StoreManifest,
    entries: Vec<IndexEntry>,
}

/// Persistent vector store rooted at a directory
pub struct PersistentVectorStore {
    directory: PathBuf,
    state: RwLock<StoreState>,
}

impl PersistentVectorStore {
    /// Create a store at `directory`, replacing any store already there
    pub fn create(
        directory: impl AsRef<Path>,
        fingerprint: EmbeddingFingerprint,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        if fingerprint.dimensions == 0 {
            return Err(Error::index("embedding dimensions must be greater than 0"));
        }
        check_dimensions(&entries, fingerprint.dimensions)?;

        let entries = dedup_by_id(entries);
        let now = Utc::now();
        let manifest = StoreManifest {
            format_version: FORMAT_VERSION,
            fingerprint,
            entry_count: entries.len(),
            created_at: now,
            updated_at: now,
        };

        fs::create_dir_all(&directory)?;
        write_files(&directory, &manifest, &entries)?;

        tracing::info!(
            "Created vector store at {} ({} entries)",
            directory.display(),
            entries.len()
        );

        Ok(Self {
            directory,
            state: RwLock::new(StoreState { manifest, entries }),
        })
    }

    /// Whether a store has been persisted at `directory`
    pub fn exists(directory: impl AsRef<Path>) -> bool {
        directory.as_ref().join(MANIFEST_FILE).is_file()
    }

    /// Check that the in-memory state agrees with its manifest and that the
    /// manifest is still on disk
    pub fn check_consistency(&self) -> Result<()> {
        let state = self.state.read();
        if state.manifest.entry_count != state.entries.len() {
            return Err(Error::index(format!(
                "index is inconsistent: manifest lists {} entries, {} are loaded",
                state.manifest.entry_count,
                state.entries.len()
            )));
        }
        if !Self::exists(&self.directory) {
            return Err(Error::index(format!(
                "index files are missing from {}",
                self.directory.display()
            )));
        }
        Ok(())
    }

    /// Open the store persisted at `directory`
    pub fn open(directory: impl AsRef<Path>) -> Result<Self> {
        let directory = directory.as_ref().to_path_buf();
        let manifest_path = directory.join(MANIFEST_FILE);

        if !manifest_path.is_file() {
            return Err(Error::index(format!(
                "no vector index found at {}",
                directory.display()
            )));
        }

        let manifest: StoreManifest = serde_json::from_slice(&fs::read(&manifest_path)?)
            .map_err(|e| Error::index(format!("invalid manifest: {}", e)))?;

        if manifest.format_version != FORMAT_VERSION {
            return Err(Error::index(format!(
                "unsupported index format version {} (expected {})",
                manifest.format_version, FORMAT_VERSION
            )));
        }

        let entries: Vec<IndexEntry> =
            serde_json::from_slice(&fs::read(directory.join(ENTRIES_FILE))?)
                .map_err(|e| Error::index(format!("invalid entries file: {}", e)))?;

        if entries.len() != manifest.entry_count {
            return Err(Error::index(format!(
                "index is inconsistent: manifest lists {} entries, found {}",
                manifest.entry_count,
                entries.len()
            )));
        }
        check_dimensions(&entries, manifest.fingerprint.dimensions)?;

        tracing::info!(
            "Opened vector store at {} ({} entries, model {})",
            directory.display(),
            entries.len(),
            manifest.fingerprint.model_id
        );

        Ok(Self {
            directory,
            state: RwLock::new(StoreState { manifest, entries }),
        })
    }

    /// Insert entries, replacing existing entries with the same id.
    ///
    /// Persists before updating memory; on error the store is unchanged.
    pub fn upsert(&self, new_entries: Vec<IndexEntry>) -> Result<usize> {
        let mut state = self.state.write();
        check_dimensions(&new_entries, state.manifest.fingerprint.dimensions)?;

        let mut entries = state.entries.clone();
        let mut added = 0;
        for entry in dedup_by_id(new_entries) {
            match entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry,
                None => {
                    entries.push(entry);
                    added += 1;
                }
            }
        }

        let mut manifest = state.manifest.clone();
        manifest.entry_count = entries.len();
        manifest.updated_at = Utc::now();

        write_files(&self.directory, &manifest, &entries)?;
        *state = StoreState { manifest, entries };

        Ok(added)
    }

    /// Top `k` entries by cosine similarity, highest first.
    /// Ties keep insertion order.
    pub fn query(&self, vector: &[f32], k: usize) -> Result<Vec<StoreMatch>> {
        let state = self.state.read();
        let dimensions = state.manifest.fingerprint.dimensions;
        if vector.len() != dimensions {
            return Err(Error::index(format!(
                "query vector has {} dimensions, index expects {}",
                vector.len(),
                dimensions
            )));
        }

        let mut scored: Vec<(usize, f32)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| StoreMatch {
                entry: state.entries[i].clone(),
                score,
            })
            .collect())
    }

    /// Snapshot of every entry
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.state.read().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn fingerprint(&self) -> EmbeddingFingerprint {
        self.state.read().manifest.fingerprint.clone()
    }

    pub fn manifest(&self) -> StoreManifest {
        self.state.read().manifest.clone()
    }
}

fn check_dimensions(entries: &[IndexEntry], dimensions: usize) -> Result<()> {
    if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimensions) {
        return Err(Error::index(format!(
            "entry {} has {} dimensions, index expects {}",
            bad.id,
            bad.embedding.len(),
            dimensions
        )));
    }
    Ok(())
}

/// Later entries win over earlier ones with the same id
fn dedup_by_id(entries: Vec<IndexEntry>) -> Vec<IndexEntry> {
    let mut out: Vec<IndexEntry> = Vec::with_capacity(entries.len());
    for entry in entries {
        match out.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => *existing = entry,
            None => out.push(entry),
        }
    }
    out
}

fn write_files(directory: &Path, manifest: &StoreManifest, entries: &[IndexEntry]) -> Result<()> {
    // Entries first: a manifest never points at entries that are not on disk
    write_atomic(&directory.join(ENTRIES_FILE), &serde_json::to_vec(entries)?)?;
    write_atomic(
        &directory.join(MANIFEST_FILE),
        &serde_json::to_vec_pretty(manifest)?,
    )
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DocumentMetadata, FileType};

    fn entry(id: &str, embedding: Vec<f32>) -> IndexEntry {
        IndexEntry {
            id: id.to_string(),
            content: format!("content of {}", id),
            embedding,
            metadata: ChunkMetadata {
                document: DocumentMetadata {
                    source_path: format!("/docs/{}.txt", id),
                    file_name: format!("{}.txt", id),
                    file_type: FileType::Txt,
                    loaded_at: Utc::now(),
                    page_number: None,
                    page_count: None,
                },
                document_id: id.to_string(),
                chunk_index: 0,
                char_offset: 0,
            },
        }
    }

    fn fingerprint() -> EmbeddingFingerprint {
        EmbeddingFingerprint {
            model_id: "test-model".to_string(),
            dimensions: 2,
        }
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_create_open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = PersistentVectorStore::create(
            dir.path(),
            fingerprint(),
            vec![entry("a", vec![1.0, 0.0]), entry("b", vec![0.0, 1.0])],
        )
        .unwrap();
        assert_eq!(store.len(), 2);

        let reopened = PersistentVectorStore::open(dir.path()).unwrap();
        assert_eq!(reopened.fingerprint(), fingerprint());
        let hits = reopened.query(&[0.9, 0.1], 1).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].entry.id, "a");
        assert!(!dir.path().join("entries.json.tmp").exists());
    }

    #[test]
    fn test_consistency_check_notices_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!PersistentVectorStore::exists(dir.path()));

        let store =
            PersistentVectorStore::create(dir.path(), fingerprint(), vec![entry("a", vec![1.0, 0.0])])
                .unwrap();
        assert!(PersistentVectorStore::exists(dir.path()));
        assert!(store.check_consistency().is_ok());

        std::fs::remove_file(dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(matches!(store.check_consistency(), Err(Error::Index(_))));
    }

    #[test]
    fn test_open_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = PersistentVectorStore::open(dir.path().join("nope")).err().unwrap();
        assert!(matches!(err, Error::Index(_)));
    }

    #[test]
    fn test_upsert_replaces_by_id_and_checks_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            PersistentVectorStore::create(dir.path(), fingerprint(), vec![entry("a", vec![1.0, 0.0])])
                .unwrap();

        let added = store
            .upsert(vec![entry("a", vec![0.0, 1.0]), entry("c", vec![1.0, 1.0])])
            .unwrap();
        assert_eq!(added, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.query(&[0.0, 1.0], 1).unwrap()[0].entry.id, "a");

        let err = store.upsert(vec![entry("d", vec![1.0, 0.0, 0.0])]).unwrap_err();
        assert!(matches!(err, Error::Index(_)));
        assert_eq!(store.len(), 2);
        assert_eq!(PersistentVectorStore::open(dir.path()).unwrap().len(), 2);
    }

    #[test]
    fn test_query_rejects_wrong_dimensions() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            PersistentVectorStore::create(dir.path(), fingerprint(), vec![entry("a", vec![1.0, 0.0])])
                .unwrap();
        assert!(store.query(&[1.0, 0.0, 0.0], 4).is_err());
    }
}
