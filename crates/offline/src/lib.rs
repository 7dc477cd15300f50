pub mod error;
pub mod eviction;
pub mod queue;
pub mod router;
pub mod store;

use std::sync::Arc;

use aula_core::Fetch;

/// Re-export common types for easier usage
pub use error::OfflineError;
pub use eviction::{EvictionConfig, EvictionManager};
pub use queue::{
    DeferredWriteQueue, FileWriteStore, FlushReport, MemoryWriteStore, QueueStats, QueuedWrite,
    WriteStore, ANALYTICS_QUEUE, COURSE_PROGRESS_QUEUE,
};
pub use router::{CacheRouter, RouteClass, RouterConfig, RouterStats};
pub use store::{CacheNamespace, CacheSet, CacheStore, CachedResponse};

/// The worker-side context, wired once at worker start.
///
/// Owns the named caches, the strategy router, and the deferred write
/// queue; everything is injected so tests can assemble the context around
/// scripted transports and stores.
pub struct WorkerContext {
    pub caches: Arc<CacheSet>,
    pub router: Arc<CacheRouter>,
    pub writes: Arc<DeferredWriteQueue>,
}

impl WorkerContext {
    pub fn new(
        fetch: Arc<dyn Fetch>,
        write_store: Arc<dyn WriteStore>,
        build: &str,
        router_config: RouterConfig,
        eviction_config: EvictionConfig,
    ) -> Self {
        let caches = Arc::new(CacheSet::new(build));
        let eviction = Arc::new(EvictionManager::new(eviction_config));
        let router = Arc::new(CacheRouter::new(
            Arc::clone(&fetch),
            Arc::clone(&caches),
            eviction,
            router_config,
        ));
        let writes = Arc::new(DeferredWriteQueue::new(fetch, write_store));

        Self {
            caches,
            router,
            writes,
        }
    }
}
