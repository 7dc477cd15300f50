//! Named response caches, versioned by build.
//!
//! Each namespace (`static-vN`, `dynamic-vN`, `image-vN`, `remote-media-vN`)
//! is its own keyed store of responses stamped with a wall-clock write time.
//! Deploying a new build id leaves the previous build's caches orphaned;
//! `drop_stale_builds` clears them out.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use aula_core::Response;

/// The four cache namespaces the router writes into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheNamespace {
    /// App shell and placeholder assets
    Static,
    /// API responses and navigations
    Dynamic,
    /// App-local images
    Image,
    /// Derived variants from the remote media service
    RemoteMedia,
}

impl CacheNamespace {
    pub const ALL: [CacheNamespace; 4] = [
        CacheNamespace::Static,
        CacheNamespace::Dynamic,
        CacheNamespace::Image,
        CacheNamespace::RemoteMedia,
    ];

    fn prefix(&self) -> &'static str {
        match self {
            CacheNamespace::Static => "static",
            CacheNamespace::Dynamic => "dynamic",
            CacheNamespace::Image => "image",
            CacheNamespace::RemoteMedia => "remote-media",
        }
    }

    /// Versioned cache name, e.g. `image-v7`
    pub fn name(&self, build: &str) -> String {
        format!("{}-v{}", self.prefix(), build)
    }
}

/// One cached response with its freshness clock
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub response: Response,
    /// When the entry was written, per the origin's `date` header when
    /// present, else the local clock
    pub cached_at: DateTime<Utc>,
}

impl CachedResponse {
    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.cached_at
    }
}

/// One named cache
pub struct CacheStore {
    name: String,
    entries: RwLock<HashMap<String, CachedResponse>>,
}

impl CacheStore {
    fn new(name: String) -> Self {
        Self {
            name,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a response under its URL key
    pub fn put(&self, response: &Response) {
        let cached_at = response.freshness_date().unwrap_or_else(Utc::now);
        let key = response.url().as_str().to_string();
        let mut entries = self.entries.write();
        entries.insert(
            key,
            CachedResponse {
                response: response.clone(),
                cached_at,
            },
        );
    }

    /// Fetch an entry; the returned response is flagged as cache-served
    pub fn get(&self, key: &url::Url) -> Option<Response> {
        let entries = self.entries.read();
        entries.get(key.as_str()).map(|entry| {
            let mut response = entry.response.clone();
            response.set_from_cache(true);
            response
        })
    }

    /// Fetch an entry together with its write time
    pub fn get_entry(&self, key: &url::Url) -> Option<CachedResponse> {
        self.entries.read().get(key.as_str()).cloned()
    }

    pub fn contains(&self, key: &url::Url) -> bool {
        self.entries.read().contains_key(key.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Trim to `max_entries`, dropping oldest-by-write-time first.
    ///
    /// The whole read-modify-delete pass holds the write lock, so a
    /// concurrent cache write cannot interleave with the trim.
    pub fn evict_oldest(&self, max_entries: usize) -> usize {
        let mut entries = self.entries.write();
        if entries.len() <= max_entries {
            return 0;
        }

        let mut by_age: Vec<(String, DateTime<Utc>)> = entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.cached_at))
            .collect();
        by_age.sort_by_key(|(_, cached_at)| *cached_at);

        let excess = entries.len() - max_entries;
        for (key, _) in by_age.into_iter().take(excess) {
            entries.remove(&key);
            log::debug!("evicted {} from {}", key, self.name);
        }
        excess
    }

    /// Keys currently cached, unordered
    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

/// All named caches for one build
pub struct CacheSet {
    build: String,
    caches: RwLock<HashMap<String, Arc<CacheStore>>>,
}

impl CacheSet {
    pub fn new(build: &str) -> Self {
        Self {
            build: build.to_string(),
            caches: RwLock::new(HashMap::new()),
        }
    }

    pub fn build(&self) -> &str {
        &self.build
    }

    /// Open (creating if needed) the current build's cache for a namespace
    pub fn open(&self, namespace: CacheNamespace) -> Arc<CacheStore> {
        let name = namespace.name(&self.build);
        {
            let caches = self.caches.read();
            if let Some(store) = caches.get(&name) {
                return Arc::clone(store);
            }
        }

        let mut caches = self.caches.write();
        Arc::clone(
            caches
                .entry(name.clone())
                .or_insert_with(|| Arc::new(CacheStore::new(name))),
        )
    }

    /// Names of every cache currently held, any build
    pub fn cache_names(&self) -> Vec<String> {
        self.caches.read().keys().cloned().collect()
    }

    /// Delete caches left over from other builds; returns their names
    pub fn drop_stale_builds(&self) -> Vec<String> {
        let current: Vec<String> = CacheNamespace::ALL
            .iter()
            .map(|ns| ns.name(&self.build))
            .collect();

        let mut caches = self.caches.write();
        let stale: Vec<String> = caches
            .keys()
            .filter(|name| !current.contains(name))
            .cloned()
            .collect();
        for name in &stale {
            caches.remove(name);
            log::info!("dropped stale cache {}", name);
        }
        stale
    }

    /// Carry caches over from a previous build's set (upgrade path)
    pub fn adopt(&self, name: String, store: Arc<CacheStore>) {
        self.caches.write().insert(name, store);
    }
}
