//! Entry-count eviction for the named caches.
//!
//! FIFO by write time, not LRU: tracking access recency would mean
//! intercepting every cache read, and write-time order is close enough
//! for media that re-fetches cheaply. Runs after every cache write, so a
//! cache only ever exceeds its bound between the write and this pass.

use crate::store::{CacheNamespace, CacheStore};

/// Per-namespace entry limits
#[derive(Debug, Clone, Copy)]
pub struct EvictionConfig {
    pub static_max: usize,
    pub dynamic_max: usize,
    pub image_max: usize,
    pub remote_media_max: usize,
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            static_max: 50,
            // The original shipped this namespace unbounded; a limit
            // between the two image caches closes that growth risk.
            dynamic_max: 150,
            image_max: 200,
            remote_media_max: 100,
        }
    }
}

impl EvictionConfig {
    pub fn limit_for(&self, namespace: CacheNamespace) -> usize {
        match namespace {
            CacheNamespace::Static => self.static_max,
            CacheNamespace::Dynamic => self.dynamic_max,
            CacheNamespace::Image => self.image_max,
            CacheNamespace::RemoteMedia => self.remote_media_max,
        }
    }
}

/// Enforces the per-namespace entry bounds
pub struct EvictionManager {
    config: EvictionConfig,
}

impl EvictionManager {
    pub fn new(config: EvictionConfig) -> Self {
        Self { config }
    }

    /// Trim a cache back to its bound after a write; returns evicted count
    pub fn after_write(&self, namespace: CacheNamespace, store: &CacheStore) -> usize {
        let limit = self.config.limit_for(namespace);
        let evicted = store.evict_oldest(limit);
        if evicted > 0 {
            log::debug!(
                "evicted {} entries from {} (limit {})",
                evicted,
                store.name(),
                limit
            );
        }
        evicted
    }
}

impl Default for EvictionManager {
    fn default() -> Self {
        Self::new(EvictionConfig::default())
    }
}
