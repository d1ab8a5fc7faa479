//! LRU cache in front of a sample provider.
//!
//! Bounded by entry count. Repeated switches between the same few keys in a
//! set are served from memory instead of decoding the file again.

use crate::provider::{PadKey, PadSource, SampleProvider};
use crate::Result;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct CachedProvider<P> {
    inner: P,
    cache: DashMap<(String, PadKey), CacheEntry>,
    max_entries: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

struct CacheEntry {
    source: PadSource,
    last_access: AtomicU64,
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub hits: u64,
    pub misses: u64,
}

impl<P: SampleProvider> CachedProvider<P> {
    pub fn new(inner: P, max_entries: usize) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
            max_entries: max_entries.max(1),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    pub fn contains(&self, key: &PadKey, pad_set: &str) -> bool {
        self.cache.contains_key(&(pad_set.to_string(), *key))
    }

    fn insert(&self, id: (String, PadKey), source: PadSource) {
        while self.cache.len() >= self.max_entries {
            if !self.evict_lru() {
                break;
            }
        }
        self.cache.insert(
            id,
            CacheEntry {
                source,
                last_access: AtomicU64::new(self.tick()),
            },
        );
    }

    /// Returns false if the cache was empty.
    fn evict_lru(&self) -> bool {
        let oldest = self
            .cache
            .iter()
            .min_by_key(|entry| entry.value().last_access.load(Ordering::Relaxed))
            .map(|entry| entry.key().clone());

        match oldest {
            Some(id) => {
                tracing::trace!(key = %id.1, pad_set = %id.0, "evicting cached pad");
                self.cache.remove(&id).is_some()
            }
            None => false,
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: SampleProvider> SampleProvider for CachedProvider<P> {
    fn resolve_pad_source(&self, key: &PadKey, pad_set: &str) -> Result<PadSource> {
        let id = (pad_set.to_string(), *key);
        if let Some(entry) = self.cache.get(&id) {
            entry.last_access.store(self.tick(), Ordering::Relaxed);
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.source.clone());
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let source = self.inner.resolve_pad_source(key, pad_set)?;
        self.insert(id, source.clone());
        Ok(source)
    }
}
