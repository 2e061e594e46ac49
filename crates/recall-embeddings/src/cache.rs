//! Bounded memo cache for embeddings.
//!
//! Keyed by text and options, so the same text embedded with different
//! pooling or normalization is cached separately.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use lru::LruCache;

use crate::model::{EmbedOptions, Embedding};

/// Entries kept when no capacity is configured.
pub const DEFAULT_CAPACITY: usize = 1024;

type CacheKey = (String, EmbedOptions);

/// Hit/miss counters since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// LRU cache protected by a Mutex; holds at most `capacity` embeddings.
pub struct EmbeddingCache {
    entries: Mutex<LruCache<CacheKey, Embedding>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for EmbeddingCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EmbeddingCache {
    /// A capacity of 0 is raised to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, text: &str, options: &EmbedOptions) -> Option<Embedding> {
        let key = (text.to_string(), *options);
        let found = self.lock().get(&key).cloned();
        match found {
            Some(_) => self.record_hit(),
            None => self.record_miss(),
        }
        found
    }

    pub fn insert(&self, text: &str, options: &EmbedOptions, embedding: Embedding) {
        self.lock().put((text.to_string(), *options), embedding);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.lock().cap().get()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Take the cache lock. A poisoned lock still guards a consistent LRU.
    pub(crate) fn lock(&self) -> MutexGuard<'_, LruCache<CacheKey, Embedding>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
