//! Vector index and its on-disk store

pub mod store;
mod vector_index;

pub use store::{cosine_similarity, EmbeddingFingerprint, IndexEntry, PersistentVectorStore};
pub use vector_index::{IndexStats, IndexStatus, VectorIndex};
