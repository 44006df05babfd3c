use anyhow::Result;
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

use crate::providers::traits::EmbeddingProvider;

/// Memoises embeddings of repeated questions.
///
/// Only successful embeddings are cached. A capacity of zero turns the cache
/// off and every call goes to the wrapped provider.
pub struct CachedEmbedder {
    inner: Arc<dyn EmbeddingProvider>,
    cache: Option<Mutex<LruCache<String, Vec<f32>>>>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn EmbeddingProvider>, capacity: usize) -> Self {
        let cache = NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap)));
        Self { inner, cache }
    }

    pub fn cached_len(&self) -> usize {
        self.cache.as_ref().map(|c| c.lock().len()).unwrap_or(0)
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedder {
    async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let key = text.trim();

        let hit = self.cache.as_ref().and_then(|cache| cache.lock().get(key).cloned());
        if let Some(hit) = hit {
            log::debug!("Embedding cache hit ({} chars)", key.chars().count());
            return Ok(hit);
        }

        let embedding = self.inner.generate_embedding(key).await?;

        if let Some(cache) = &self.cache {
            cache.lock().put(key.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    fn embedding_model(&self) -> &str {
        self.inner.embedding_model()
    }
}
