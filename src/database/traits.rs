use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VectorDBError {
    #[error("Connection error: {0}")]
    Connection(String),
    #[error("Operation failed: {0}")]
    Operation(String),
    #[error("Vector has {actual} dimensions, collection expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// One chunk ready to be stored: its vector plus what we need to cite it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub chunk_index: usize,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A stored passage returned by a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub text: String,
    pub document_id: String,
    pub chunk_index: usize,
    pub score: f32,
}

/// Nearest-neighbour store keyed by owning document.
///
/// Similarity is cosine for every implementation, both when entries are
/// written and when they are queried.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Checks the backend is reachable.
    async fn ping(&self) -> Result<(), VectorDBError> {
        Ok(())
    }

    /// Creates the collection if needed and checks that an existing one was
    /// built for vectors of `dimension`.
    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDBError>;

    /// Replaces every entry of `document_id` with `entries`.
    async fn upsert(&self, document_id: &str, entries: Vec<IndexEntry>) -> Result<(), VectorDBError>;

    /// Returns at most `top_k` passages ordered by descending score. An
    /// empty index yields an empty result.
    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, VectorDBError>;

    async fn remove_document(&self, document_id: &str) -> Result<(), VectorDBError>;

    async fn count(&self) -> Result<usize, VectorDBError>;

    async fn count_document(&self, document_id: &str) -> Result<usize, VectorDBError>;

    fn backend_name(&self) -> &'static str;
}
