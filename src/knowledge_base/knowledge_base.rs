use chrono::Utc;
use futures::stream::{self, StreamExt, TryStreamExt};
use log::{debug, info, warn};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::config::AppConfig;
use crate::database::{Database, IndexEntry, ManifestEntry, ScoredPassage, VectorIndex};
use crate::document::loader::document_id;
use crate::document::{Chunk, Chunker, Document, DocumentLoader};
use crate::error::AssistantError;
use crate::llm::embeddings::CachedEmbedder;
use crate::providers::traits::EmbeddingProvider;

/// Tunables of ingestion and retrieval, lifted out of [`AppConfig`].
#[derive(Debug, Clone)]
pub struct KnowledgeSettings {
    pub embed_timeout: Duration,
    pub index_timeout: Duration,
    pub embed_concurrency: usize,
    pub cache_capacity: usize,
    pub min_score: f32,
    pub query_attempts: usize,
    pub retry_backoff: Duration,
}

impl KnowledgeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            embed_timeout: config.embedder.timeout,
            index_timeout: config.index.timeout,
            embed_concurrency: config.embedder.concurrency,
            cache_capacity: config.embedder.cache_capacity,
            min_score: config.retrieval.min_score,
            query_attempts: config.index.query_attempts,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl Default for KnowledgeSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What the index had to say about a question.
#[derive(Debug, Clone, PartialEq)]
pub enum Retrieval {
    Found(Vec<ScoredPassage>),
    NothingIndexed,
    NothingRelevant { best_score: f32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    EmptyText,
    Unchanged,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyText => write!(f, "no extractable text"),
            Self::Unchanged => write!(f, "unchanged since last ingestion"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Indexed { chunks: usize },
    Skipped(SkipReason),
}

/// Per-document progress of an ingestion run.
#[derive(Debug)]
pub enum IngestProgress<'a> {
    Started { document: &'a str, position: usize, total: usize },
    Indexed { document: &'a str, chunks: usize },
    Skipped { document: &'a str, reason: SkipReason },
    Failed { document: &'a str, error: &'a AssistantError },
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: Vec<(String, String)>,
    pub removed: Vec<String>,
    pub chunks: usize,
}

impl IngestionReport {
    /// True when documents were attempted and not a single one made it in.
    pub fn all_failed(&self) -> bool {
        !self.failed.is_empty() && self.succeeded == 0 && self.skipped == 0
    }
}

/// The indexed corpus: turns documents into stored passages and questions
/// into relevant ones.
pub struct KnowledgeBase {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    query_embedder: CachedEmbedder,
    index: Arc<dyn VectorIndex>,
    manifest: Option<Database>,
    dimension: usize,
    settings: KnowledgeSettings,
    documents: RwLock<BTreeMap<String, ManifestEntry>>,
}

impl KnowledgeBase {
    /// Prepares the index collection for `dimension`-sized vectors.
    pub async fn new(
        chunker: Chunker,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        manifest: Option<Database>,
        dimension: usize,
        settings: KnowledgeSettings,
    ) -> Result<Self, AssistantError> {
        timeout(settings.index_timeout, index.ensure_collection(dimension))
            .await
            .map_err(|_| AssistantError::IndexUnavailable("timed out creating collection".to_string()))?
            .map_err(AssistantError::from_startup_index)?;

        info!(
            "Knowledge base ready: {} backend, {} dimensions, model {}",
            index.backend_name(),
            dimension,
            embedder.embedding_model()
        );

        let query_embedder = CachedEmbedder::new(embedder.clone(), settings.cache_capacity);
        Ok(Self {
            chunker,
            embedder,
            query_embedder,
            index,
            manifest,
            dimension,
            settings,
            documents: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub fn embedding_model(&self) -> &str {
        self.embedder.embedding_model()
    }

    /// Discovers the folder's documents and ingests all of them.
    pub async fn ingest_folder<F>(
        &self,
        loader: &DocumentLoader,
        force: bool,
        progress: F,
    ) -> Result<IngestionReport, AssistantError>
    where
        F: FnMut(IngestProgress<'_>),
    {
        let paths = loader.discover().await?;
        self.ingest_paths(loader, &paths, force, progress).await
    }

    /// Ingests each path in turn. A failing document is recorded in the
    /// report and the run moves on to the next one.
    pub async fn ingest_paths<F>(
        &self,
        loader: &DocumentLoader,
        paths: &[PathBuf],
        force: bool,
        mut progress: F,
    ) -> Result<IngestionReport, AssistantError>
    where
        F: FnMut(IngestProgress<'_>),
    {
        let mut report = IngestionReport::default();
        let total = paths.len();

        for (position, path) in paths.iter().enumerate() {
            let id = document_id(path);
            progress(IngestProgress::Started { document: &id, position: position + 1, total });

            let result = match loader.load(path).await {
                Ok(document) => self.ingest_document(&document, force).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(IngestOutcome::Indexed { chunks }) => {
                    report.succeeded += 1;
                    report.chunks += chunks;
                    progress(IngestProgress::Indexed { document: &id, chunks });
                }
                Ok(IngestOutcome::Skipped(reason)) => {
                    report.skipped += 1;
                    progress(IngestProgress::Skipped { document: &id, reason });
                }
                Err(error) => {
                    warn!("Failed to ingest {}: {}", id, error);
                    progress(IngestProgress::Failed { document: &id, error: &error });
                    report.failed.push((id.clone(), error.to_string()));
                }
            }
        }

        let present: HashSet<String> = paths.iter().map(|p| document_id(p)).collect();
        report.removed = self.prune_missing(&present).await?;

        info!(
            "Ingestion finished: {} indexed, {} skipped, {} failed, {} removed",
            report.succeeded,
            report.skipped,
            report.failed.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// Chunks, embeds and stores one document, replacing whatever the index
    /// held for it before.
    pub async fn ingest_document(
        &self,
        document: &Document,
        force: bool,
    ) -> Result<IngestOutcome, AssistantError> {
        if document.text.trim().is_empty() {
            warn!("{} has no extractable text, skipping", document.id);
            return Ok(IngestOutcome::Skipped(SkipReason::EmptyText));
        }

        let fingerprint = document.fingerprint();
        if !force {
            if let Some(entry) = self.unchanged_entry(&document.id, &fingerprint).await? {
                debug!("{} unchanged, {} chunks already indexed", document.id, entry.chunk_count);
                self.documents.write().insert(entry.document_id.clone(), entry);
                return Ok(IngestOutcome::Skipped(SkipReason::Unchanged));
            }
        }

        let chunks = self.chunker.chunk(document);
        let vectors: Vec<Vec<f32>> = stream::iter(chunks.iter())
            .map(|chunk| self.embed_chunk(chunk))
            .buffered(self.settings.embed_concurrency)
            .try_collect()
            .await?;

        let entries: Vec<IndexEntry> = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| IndexEntry {
                chunk_id: chunk.chunk_id(),
                chunk_index: chunk.index,
                text: chunk.text.clone(),
                vector,
            })
            .collect();
        let chunk_count = entries.len();

        timeout(self.settings.index_timeout, self.index.upsert(&document.id, entries))
            .await
            .map_err(|_| AssistantError::IndexQuery(format!("timed out storing {}", document.id)))?
            .map_err(AssistantError::from_query_index)?;

        let entry = ManifestEntry {
            document_id: document.id.clone(),
            fingerprint,
            chunk_count,
            ingested_at: Utc::now(),
        };
        if let Some(manifest) = &self.manifest {
            manifest.record_document(&entry).await?;
        }
        self.documents.write().insert(entry.document_id.clone(), entry);

        info!("Indexed {} ({} chunks)", document.id, chunk_count);
        Ok(IngestOutcome::Indexed { chunks: chunk_count })
    }

    /// Finds the passages relevant to `question`.
    pub async fn retrieve(&self, question: &str, top_k: usize) -> Result<Retrieval, AssistantError> {
        let vector = timeout(self.settings.embed_timeout, self.query_embedder.generate_embedding(question))
            .await
            .map_err(|_| AssistantError::EmbeddingQuery("timed out".to_string()))?
            .map_err(|e| AssistantError::EmbeddingQuery(e.to_string()))?;
        self.check_dimension(&vector)?;

        let passages = self.query_with_retry(&vector, top_k).await?;
        let Some(best_score) = passages.first().map(|p| p.score) else {
            return Ok(Retrieval::NothingIndexed);
        };

        let relevant: Vec<ScoredPassage> = passages
            .into_iter()
            .filter(|p| p.score >= self.settings.min_score)
            .collect();

        debug!(
            "Retrieved {} relevant passages (best score {:.3}, threshold {:.3})",
            relevant.len(),
            best_score,
            self.settings.min_score
        );

        if relevant.is_empty() {
            Ok(Retrieval::NothingRelevant { best_score })
        } else {
            Ok(Retrieval::Found(relevant))
        }
    }

    /// Drops every entry of a document from the index and the manifest.
    /// Returns whether the document was known at all.
    pub async fn remove_document(&self, document_id: &str) -> Result<bool, AssistantError> {
        let stored = self.index
            .count_document(document_id)
            .await
            .map_err(AssistantError::from_query_index)?;
        self.index
            .remove_document(document_id)
            .await
            .map_err(AssistantError::from_query_index)?;

        let in_manifest = match &self.manifest {
            Some(manifest) => manifest.remove_document(document_id).await?,
            None => false,
        };
        let in_session = self.documents.write().remove(document_id).is_some();

        if stored > 0 {
            info!("Removed {} ({} entries)", document_id, stored);
        }
        Ok(stored > 0 || in_manifest || in_session)
    }

    /// Documents ingested or verified unchanged during this process.
    pub fn documents(&self) -> Vec<ManifestEntry> {
        self.documents.read().values().cloned().collect()
    }

    pub async fn entry_count(&self) -> Result<usize, AssistantError> {
        self.index.count().await.map_err(AssistantError::from_query_index)
    }

    async fn embed_chunk(&self, chunk: &Chunk) -> Result<Vec<f32>, AssistantError> {
        let vector = timeout(self.settings.embed_timeout, self.embedder.generate_embedding(&chunk.text))
            .await
            .map_err(|_| {
                AssistantError::EmbeddingQuery(format!(
                    "timed out embedding chunk {} of {}",
                    chunk.index, chunk.document_id
                ))
            })?
            .map_err(|e| AssistantError::EmbeddingQuery(e.to_string()))?;
        self.check_dimension(&vector)?;
        Ok(vector)
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), AssistantError> {
        if vector.len() != self.dimension {
            return Err(AssistantError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    async fn query_with_retry(
        &self,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<ScoredPassage>, AssistantError> {
        let attempts = self.settings.query_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let error = match timeout(self.settings.index_timeout, self.index.query(vector, top_k)).await {
                Ok(Ok(passages)) => return Ok(passages),
                Ok(Err(e)) => AssistantError::from_query_index(e),
                Err(_) => AssistantError::IndexQuery("timed out".to_string()),
            };

            if matches!(error, AssistantError::DimensionMismatch { .. }) {
                return Err(error);
            }
            warn!("Index query attempt {}/{} failed: {}", attempt, attempts, error);
            last_error = Some(error);

            if attempt < attempts {
                tokio::time::sleep(self.settings.retry_backoff * attempt as u32).await;
            }
        }

        Err(last_error.unwrap_or_else(|| AssistantError::IndexQuery("no attempts made".to_string())))
    }

    async fn unchanged_entry(
        &self,
        document_id: &str,
        fingerprint: &str,
    ) -> Result<Option<ManifestEntry>, AssistantError> {
        let Some(manifest) = &self.manifest else {
            return Ok(None);
        };
        let Some(entry) = manifest.get_document(document_id).await? else {
            return Ok(None);
        };
        if entry.fingerprint != fingerprint {
            return Ok(None);
        }

        // The manifest can outlive the collection, so make sure the entries
        // are still there before trusting it.
        let stored = self.index
            .count_document(document_id)
            .await
            .map_err(AssistantError::from_query_index)?;
        Ok((stored == entry.chunk_count).then_some(entry))
    }

    async fn prune_missing(&self, present: &HashSet<String>) -> Result<Vec<String>, AssistantError> {
        let Some(manifest) = &self.manifest else {
            return Ok(Vec::new());
        };

        let mut removed = Vec::new();
        for entry in manifest.list_documents().await? {
            if present.contains(&entry.document_id) {
                continue;
            }
            info!("{} is no longer in the documents folder, removing it", entry.document_id);
            self.remove_document(&entry.document_id).await?;
            removed.push(entry.document_id);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryIndex;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Letter-frequency vectors: similar words land close together.
    struct Letters {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for Letters {
        async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut v = vec![0.0; 26];
            for c in text.to_lowercase().chars().filter(|c| c.is_ascii_lowercase()) {
                v[(c as u8 - b'a') as usize] += 1.0;
            }
            Ok(v)
        }

        fn embedding_model(&self) -> &str {
            "letters"
        }
    }

    struct FlakyIndex {
        inner: InMemoryIndex,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for FlakyIndex {
        async fn ensure_collection(&self, dimension: usize) -> Result<(), crate::database::VectorDBError> {
            self.inner.ensure_collection(dimension).await
        }

        async fn upsert(&self, id: &str, entries: Vec<IndexEntry>) -> Result<(), crate::database::VectorDBError> {
            self.inner.upsert(id, entries).await
        }

        async fn query(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredPassage>, crate::database::VectorDBError> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(crate::database::VectorDBError::Connection("reset by peer".into()));
            }
            self.inner.query(vector, top_k).await
        }

        async fn remove_document(&self, id: &str) -> Result<(), crate::database::VectorDBError> {
            self.inner.remove_document(id).await
        }

        async fn count(&self) -> Result<usize, crate::database::VectorDBError> {
            self.inner.count().await
        }

        async fn count_document(&self, id: &str) -> Result<usize, crate::database::VectorDBError> {
            self.inner.count_document(id).await
        }

        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    fn settings() -> KnowledgeSettings {
        KnowledgeSettings {
            retry_backoff: Duration::from_millis(1),
            ..KnowledgeSettings::default()
        }
    }

    async fn knowledge_base(index: Arc<dyn VectorIndex>, manifest: Option<Database>) -> (KnowledgeBase, Arc<Letters>) {
        let embedder = Arc::new(Letters { calls: AtomicUsize::new(0) });
        let kb = KnowledgeBase::new(
            Chunker::new(40, 5).unwrap(),
            embedder.clone(),
            index,
            manifest,
            26,
            settings(),
        )
        .await
        .unwrap();
        (kb, embedder)
    }

    #[tokio::test]
    async fn empty_index_reports_nothing_indexed() {
        let (kb, _) = knowledge_base(Arc::new(InMemoryIndex::new()), None).await;
        assert_eq!(kb.retrieve("stack", 3).await.unwrap(), Retrieval::NothingIndexed);
    }

    #[tokio::test]
    async fn empty_text_is_skipped() {
        let (kb, embedder) = knowledge_base(Arc::new(InMemoryIndex::new()), None).await;
        let outcome = kb.ingest_document(&Document::new("blank.pdf", "  \n "), false).await.unwrap();
        assert_eq!(outcome, IngestOutcome::Skipped(SkipReason::EmptyText));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn reingesting_replaces_entries() {
        let index = Arc::new(InMemoryIndex::new());
        let (kb, _) = knowledge_base(index.clone(), None).await;
        let document = Document::new("ds.pdf", "A stack follows LIFO order. A queue follows FIFO order.");

        kb.ingest_document(&document, false).await.unwrap();
        let first = index.entry_ids().await;
        kb.ingest_document(&document, false).await.unwrap();

        assert_eq!(index.entry_ids().await, first);
        assert_eq!(kb.documents().len(), 1);
    }

    #[tokio::test]
    async fn unchanged_documents_skip_with_manifest() {
        let index = Arc::new(InMemoryIndex::new());
        let manifest = Database::in_memory().await.unwrap();
        let (kb, embedder) = knowledge_base(index, Some(manifest)).await;
        let document = Document::new("ds.pdf", "A stack follows LIFO order.");

        kb.ingest_document(&document, false).await.unwrap();
        let calls = embedder.calls.load(Ordering::SeqCst);

        let again = kb.ingest_document(&document, false).await.unwrap();
        assert_eq!(again, IngestOutcome::Skipped(SkipReason::Unchanged));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), calls);

        let forced = kb.ingest_document(&document, true).await.unwrap();
        assert_eq!(forced, IngestOutcome::Indexed { chunks: 1 });
    }

    #[tokio::test]
    async fn low_scores_are_nothing_relevant() {
        let (kb, _) = knowledge_base(Arc::new(InMemoryIndex::new()), None).await;
        kb.ingest_document(&Document::new("a.pdf", "aaaa aaaa"), false).await.unwrap();

        match kb.retrieve("zzz", 3).await.unwrap() {
            Retrieval::NothingRelevant { best_score } => assert!(best_score < 0.3),
            other => panic!("expected NothingRelevant, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn retries_failed_queries() {
        let index = Arc::new(FlakyIndex {
            inner: InMemoryIndex::new(),
            failures_left: AtomicUsize::new(1),
        });
        let (kb, _) = knowledge_base(index.clone(), None).await;
        kb.ingest_document(&Document::new("a.pdf", "stack stack"), false).await.unwrap();

        assert!(matches!(kb.retrieve("stack", 3).await.unwrap(), Retrieval::Found(_)));

        index.failures_left.store(5, Ordering::SeqCst);
        let err = kb.retrieve("stack", 3).await.unwrap_err();
        assert!(matches!(err, AssistantError::IndexQuery(_)));
    }

    #[tokio::test]
    async fn remove_document_forgets_entries() {
        let index = Arc::new(InMemoryIndex::new());
        let (kb, _) = knowledge_base(index.clone(), None).await;
        kb.ingest_document(&Document::new("a.pdf", "stack stack"), false).await.unwrap();

        assert!(kb.remove_document("a.pdf").await.unwrap());
        assert_eq!(kb.entry_count().await.unwrap(), 0);
        assert!(!kb.remove_document("a.pdf").await.unwrap());
        assert!(kb.documents().is_empty());
    }
}
