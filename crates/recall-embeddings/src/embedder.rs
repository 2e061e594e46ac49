//! Memoizing wrapper around an [`EmbeddingModel`].

use recall_types::Settings;
use tracing::{debug, trace};

use crate::cache::{CacheStats, EmbeddingCache};
use crate::error::EmbeddingError;
use crate::model::{EmbedOptions, Embedding, EmbeddingModel, ModelInfo};

/// Calls the wrapped provider at most once per distinct `(text, options)`
/// while the result stays cached.
///
/// The cache lock is held across the provider call, so concurrent callers
/// asking for the same text wait for the first result instead of issuing a
/// second request.
pub struct CachedEmbedder<E> {
    model: E,
    options: EmbedOptions,
    cache: EmbeddingCache,
}

impl<E: EmbeddingModel> CachedEmbedder<E> {
    pub fn new(model: E, capacity: usize) -> Self {
        Self {
            model,
            options: EmbedOptions::default(),
            cache: EmbeddingCache::new(capacity),
        }
    }

    pub fn from_settings(model: E, settings: &Settings) -> Self {
        Self::new(model, settings.embedding_cache_capacity)
    }

    /// Options used by [`embed`](Self::embed).
    pub fn with_options(mut self, options: EmbedOptions) -> Self {
        self.options = options;
        self
    }

    pub fn info(&self) -> &ModelInfo {
        self.model.info()
    }

    pub fn model(&self) -> &E {
        &self.model
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Embed with the configured options.
    pub fn embed(&self, text: &str) -> Result<Embedding, EmbeddingError> {
        let options = self.options;
        self.embed_with(text, &options)
    }

    /// Embed with explicit options.
    pub fn embed_with(
        &self,
        text: &str,
        options: &EmbedOptions,
    ) -> Result<Embedding, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let key = (text.to_string(), *options);
        let mut entries = self.cache.lock();
        if let Some(hit) = entries.get(&key) {
            trace!(chars = text.len(), "Embedding cache hit");
            self.cache.record_hit();
            return Ok(hit.clone());
        }
        self.cache.record_miss();

        let embedding = self.model.embed(text, options)?;
        let expected = self.model.info().dimension;
        if embedding.dimension() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                actual: embedding.dimension(),
            });
        }

        debug!(model = %self.model.info().name, chars = text.len(), "Embedded text");
        entries.put(key, embedding.clone());
        Ok(embedding)
    }

    /// Embed several texts, reusing cached vectors where present.
    pub fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Embedding>, EmbeddingError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}
