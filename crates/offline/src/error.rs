use thiserror::Error;
use url::Url;

/// Failures of the worker-side cache and replay layer
#[derive(Error, Debug)]
pub enum OfflineError {
    /// The upstream fetch failed and no cached or placeholder fallback applied
    #[error("upstream unavailable: {0}")]
    Upstream(#[from] aula_core::FetchError),

    /// No source at all could satisfy the request
    #[error("no network, cache, or fallback source for {0}")]
    Unreachable(Url),

    /// The durable write store misbehaved
    #[error("write store error: {0}")]
    Store(String),

    /// IO errors from the durable store backing files
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization errors for queued writes
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}
