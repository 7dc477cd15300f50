//! Strategy routing for intercepted requests.
//!
//! A request is classified exactly once, by URL shape, into one of five
//! routes; the order of the checks is part of the contract (media wins
//! over the static-asset extension check, so an `.svg` cover art goes to
//! the image handler, not cache-first).

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use url::Url;

use aula_core::media::{self, MediaKind};
use aula_core::{Fetch, Method, Request, Response};

use crate::error::OfflineError;
use crate::eviction::EvictionManager;
use crate::store::{CacheNamespace, CacheSet, CacheStore};

/// Extensions served cache-first from the static namespace
const STATIC_EXTENSIONS: [&str; 7] = ["css", "js", "mjs", "woff", "woff2", "ico", "map"];

/// Route a request is dispatched to, decided once at interception
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Media asset by extension or media host
    MediaAsset,
    /// Write or auth endpoint
    WriteEndpoint,
    /// Known-stable content (catalog listings)
    StableContent,
    /// Static asset by extension
    StaticAsset,
    /// Everything else
    Default,
}

/// Router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Path prefixes of write/auth endpoints
    pub write_prefixes: Vec<String>,
    /// Path prefixes of known-stable content
    pub stable_prefixes: Vec<String>,
    /// App origin the offline document and placeholders resolve against
    pub app_origin: Url,
    /// Path of the offline fallback document for navigations
    pub offline_document: String,
    /// Freshness window for app-local images
    pub image_max_age: chrono::Duration,
    /// Freshness window for remote media variants
    pub remote_media_max_age: chrono::Duration,
}

impl RouterConfig {
    pub fn new(app_origin: Url) -> Self {
        Self {
            write_prefixes: vec!["/api/".to_string(), "/auth/".to_string()],
            stable_prefixes: vec!["/catalog/".to_string()],
            app_origin,
            offline_document: "/offline.html".to_string(),
            image_max_age: chrono::Duration::days(7),
            remote_media_max_age: chrono::Duration::days(1),
        }
    }
}

/// Router counters, exposed by snapshot
#[derive(Debug, Default, Clone, Serialize)]
pub struct RouterStats {
    pub network_served: usize,
    pub cache_served: usize,
    pub stale_served: usize,
    pub placeholders_served: usize,
    pub offline_documents_served: usize,
}

/// Intercepts requests and serves them through the caching strategies
pub struct CacheRouter {
    fetch: Arc<dyn Fetch>,
    caches: Arc<CacheSet>,
    eviction: Arc<EvictionManager>,
    config: RouterConfig,
    stats: Mutex<RouterStats>,
}

impl CacheRouter {
    pub fn new(
        fetch: Arc<dyn Fetch>,
        caches: Arc<CacheSet>,
        eviction: Arc<EvictionManager>,
        config: RouterConfig,
    ) -> Self {
        Self {
            fetch,
            caches,
            eviction,
            config,
            stats: Mutex::new(RouterStats::default()),
        }
    }

    /// Classify a URL into its route; first match wins
    pub fn classify(&self, url: &Url) -> RouteClass {
        if media::is_media_asset(url) {
            return RouteClass::MediaAsset;
        }

        let path = url.path();
        if self
            .config
            .write_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            return RouteClass::WriteEndpoint;
        }
        if self
            .config
            .stable_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix))
        {
            return RouteClass::StableContent;
        }
        if path
            .rsplit('.')
            .next()
            .map(|ext| STATIC_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
        {
            return RouteClass::StaticAsset;
        }

        RouteClass::Default
    }

    /// Serve one intercepted request
    pub async fn handle(&self, request: Request) -> Result<Response, OfflineError> {
        match self.classify(request.url()) {
            RouteClass::MediaAsset => self.image_strategy(request).await,
            RouteClass::WriteEndpoint => self.network_first(request).await,
            RouteClass::StableContent => {
                self.cache_first(request, CacheNamespace::Dynamic).await
            }
            RouteClass::StaticAsset => self.cache_first(request, CacheNamespace::Static).await,
            RouteClass::Default => self.stale_while_revalidate(request).await,
        }
    }

    /// Warm the static cache (app shell, placeholders) at worker start.
    ///
    /// Returns how many assets were cached; failures are logged and
    /// skipped so one missing asset does not abort installation.
    pub async fn precache_static(&self, assets: &[Url]) -> usize {
        let store = self.caches.open(CacheNamespace::Static);
        let fetches = assets
            .iter()
            .map(|url| self.fetch.fetch(Request::from_url(Method::GET, url.clone())));
        let results = futures::future::join_all(fetches).await;

        let mut cached = 0;
        for (url, result) in assets.iter().zip(results) {
            match result {
                Ok(response) if response.is_success() => {
                    store.put(&response);
                    cached += 1;
                }
                Ok(response) => {
                    log::warn!("precache of {} got status {}", url, response.status())
                }
                Err(error) => log::warn!("precache of {} failed: {}", url, error),
            }
        }
        self.eviction.after_write(CacheNamespace::Static, &store);
        cached
    }

    pub fn stats(&self) -> RouterStats {
        self.stats.lock().clone()
    }

    /// Network first, cache fallback, offline document for navigations
    async fn network_first(&self, request: Request) -> Result<Response, OfflineError> {
        let store = self.caches.open(CacheNamespace::Dynamic);
        let url = request.url().clone();
        let is_navigation = request.is_navigation();

        match self.fetch.fetch(request).await {
            Ok(response) => {
                if response.is_success() {
                    store.put(&response);
                    self.eviction.after_write(CacheNamespace::Dynamic, &store);
                }
                self.stats.lock().network_served += 1;
                Ok(response)
            }
            Err(error) => {
                log::debug!("network-first fetch of {} failed: {}", url, error);
                if let Some(cached) = store.get(&url) {
                    self.stats.lock().cache_served += 1;
                    return Ok(cached);
                }
                if is_navigation {
                    if let Some(offline) = self.offline_document() {
                        self.stats.lock().offline_documents_served += 1;
                        return Ok(offline);
                    }
                }
                Err(OfflineError::Upstream(error))
            }
        }
    }

    /// Cache first, network on miss
    async fn cache_first(
        &self,
        request: Request,
        namespace: CacheNamespace,
    ) -> Result<Response, OfflineError> {
        let store = self.caches.open(namespace);
        if let Some(cached) = store.get(request.url()) {
            self.stats.lock().cache_served += 1;
            return Ok(cached);
        }

        let response = self.fetch.fetch(request).await?;
        if response.is_success() {
            store.put(&response);
            self.eviction.after_write(namespace, &store);
        }
        self.stats.lock().network_served += 1;
        Ok(response)
    }

    /// Serve cache immediately, refresh in the background; block on the
    /// network only when nothing is cached yet
    async fn stale_while_revalidate(&self, request: Request) -> Result<Response, OfflineError> {
        let store = self.caches.open(CacheNamespace::Dynamic);

        if let Some(cached) = store.get(request.url()) {
            self.spawn_revalidation(request, Arc::clone(&store));
            self.stats.lock().cache_served += 1;
            return Ok(cached);
        }

        let response = self.fetch.fetch(request).await?;
        if response.is_success() {
            store.put(&response);
            self.eviction.after_write(CacheNamespace::Dynamic, &store);
        }
        self.stats.lock().network_served += 1;
        Ok(response)
    }

    fn spawn_revalidation(&self, request: Request, store: Arc<CacheStore>) {
        let fetch = Arc::clone(&self.fetch);
        let eviction = Arc::clone(&self.eviction);
        let url = request.url().clone();
        tokio::spawn(async move {
            match fetch.fetch(request).await {
                Ok(response) if response.is_success() => {
                    store.put(&response);
                    eviction.after_write(CacheNamespace::Dynamic, &store);
                }
                Ok(response) => {
                    log::debug!("revalidation of {} got status {}", url, response.status())
                }
                Err(error) => log::debug!("revalidation of {} failed: {}", url, error),
            }
        });
    }

    /// Freshness-checked image serving with stale and placeholder fallback.
    ///
    /// A recognized image path never resolves to a hard error: the order
    /// is fresh cache, network, stale cache, kind placeholder.
    async fn image_strategy(&self, request: Request) -> Result<Response, OfflineError> {
        let url = request.url().clone();
        let (namespace, max_age) = if media::is_remote_media_host(&url) {
            (
                CacheNamespace::RemoteMedia,
                self.config.remote_media_max_age,
            )
        } else {
            (CacheNamespace::Image, self.config.image_max_age)
        };
        let store = self.caches.open(namespace);

        if let Some(entry) = store.get_entry(&url) {
            if entry.age_at(Utc::now()) < max_age {
                self.stats.lock().cache_served += 1;
                let mut response = entry.response;
                response.set_from_cache(true);
                return Ok(response);
            }
        }

        let failure = match self.fetch.fetch(request).await {
            Ok(response) if response.is_success() => {
                store.put(&response);
                self.eviction.after_write(namespace, &store);
                self.stats.lock().network_served += 1;
                return Ok(response);
            }
            Ok(response) => format!("status {}", response.status()),
            Err(error) => error.to_string(),
        };
        log::debug!("image fetch of {} failed: {}", url, failure);

        if let Some(stale) = store.get(&url) {
            self.stats.lock().stale_served += 1;
            return Ok(stale);
        }

        self.placeholder_response(&url).await
    }

    /// Resolve the kind-appropriate placeholder, from the static cache
    /// when possible, fetching it once otherwise
    async fn placeholder_response(&self, original: &Url) -> Result<Response, OfflineError> {
        let path = match media::kind_for_url(original) {
            Some(MediaKind::Course) => media::placeholder_path(MediaKind::Course, None),
            Some(MediaKind::User) => media::placeholder_path(MediaKind::User, None),
            Some(MediaKind::Video) => media::placeholder_path(MediaKind::Video, None),
            None => media::GENERIC_PLACEHOLDER_PATH,
        };
        let placeholder = self
            .config
            .app_origin
            .join(path)
            .map_err(|_| OfflineError::Unreachable(original.clone()))?;

        let store = self.caches.open(CacheNamespace::Static);
        if let Some(cached) = store.get(&placeholder) {
            self.stats.lock().placeholders_served += 1;
            return Ok(cached);
        }

        let request = Request::from_url(Method::GET, placeholder.clone());
        match self.fetch.fetch(request).await {
            Ok(response) if response.is_success() => {
                store.put(&response);
                self.eviction.after_write(CacheNamespace::Static, &store);
                self.stats.lock().placeholders_served += 1;
                Ok(response)
            }
            _ => Err(OfflineError::Unreachable(original.clone())),
        }
    }

    fn offline_document(&self) -> Option<Response> {
        let url = self
            .config
            .app_origin
            .join(&self.config.offline_document)
            .ok()?;
        self.caches.open(CacheNamespace::Static).get(&url)
    }
}
