use thiserror::Error;
use url::Url;

/// Terminal failures of a media load
#[derive(Error, Debug)]
pub enum LoadError {
    /// Every candidate in the fallback chain failed
    #[error("all sources exhausted for {resource} after {attempts} attempts")]
    Exhausted { resource: Url, attempts: u32 },

    /// The load was abandoned before dispatch
    #[error("load cancelled for {0}")]
    Cancelled(Url),

    /// The resource reference could not be turned into a request
    #[error("invalid resource reference: {0}")]
    InvalidResource(#[from] aula_core::FetchError),
}

impl LoadError {
    /// Whether the caller may usefully re-invoke the load by hand.
    ///
    /// Exhausted loads carry a manual-retry affordance; cancelled loads
    /// come back on their own if the placeholder becomes visible again.
    pub fn is_retryable_manually(&self) -> bool {
        matches!(self, LoadError::Exhausted { .. })
    }
}
