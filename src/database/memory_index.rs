use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::traits::{IndexEntry, ScoredPassage, VectorDBError, VectorIndex};

/// In-process [`VectorIndex`] for offline use and tests.
///
/// Entries live in `document_id -> entries`, so replacing a document is a
/// single map insert.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    dimension: RwLock<Option<usize>>,
    documents: RwLock<HashMap<String, Vec<IndexEntry>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of every stored entry, sorted. Handy for comparing index states.
    pub async fn entry_ids(&self) -> Vec<String> {
        let documents = self.documents.read().await;
        let mut ids: Vec<String> = documents
            .values()
            .flat_map(|entries| entries.iter().map(|e| e.chunk_id.clone()))
            .collect();
        ids.sort();
        ids
    }
}

/// Returns 0.0 when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn ensure_collection(&self, dimension: usize) -> Result<(), VectorDBError> {
        let mut current = self.dimension.write().await;
        match *current {
            Some(expected) if expected != dimension => {
                Err(VectorDBError::DimensionMismatch { expected, actual: dimension })
            }
            _ => {
                *current = Some(dimension);
                Ok(())
            }
        }
    }

    async fn upsert(&self, document_id: &str, entries: Vec<IndexEntry>) -> Result<(), VectorDBError> {
        let dimension = self.dimension.read().await
            .ok_or_else(|| VectorDBError::Operation("collection has not been created".to_string()))?;

        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimension) {
            return Err(VectorDBError::DimensionMismatch {
                expected: dimension,
                actual: bad.vector.len(),
            });
        }

        let mut documents = self.documents.write().await;
        if entries.is_empty() {
            documents.remove(document_id);
        } else {
            documents.insert(document_id.to_string(), entries);
        }
        Ok(())
    }

    async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, VectorDBError> {
        let documents = self.documents.read().await;

        let mut scored: Vec<ScoredPassage> = documents
            .iter()
            .flat_map(|(document_id, entries)| {
                entries.iter().map(move |entry| ScoredPassage {
                    text: entry.text.clone(),
                    document_id: document_id.clone(),
                    chunk_index: entry.chunk_index,
                    score: cosine_similarity(&entry.vector, vector),
                })
            })
            .collect();

        // Ties resolve by document and position so results are stable
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.document_id.cmp(&b.document_id))
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn remove_document(&self, document_id: &str) -> Result<(), VectorDBError> {
        self.documents.write().await.remove(document_id);
        Ok(())
    }

    async fn count(&self) -> Result<usize, VectorDBError> {
        Ok(self.documents.read().await.values().map(Vec::len).sum())
    }

    async fn count_document(&self, document_id: &str) -> Result<usize, VectorDBError> {
        Ok(self.documents.read().await.get(document_id).map(Vec::len).unwrap_or(0))
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
