use thiserror::Error;

/// FetchError represents all possible failures of a single resource fetch
#[derive(Error, Debug)]
pub enum FetchError {
    /// URL parsing errors
    #[error("URL parsing error: {0}")]
    UrlError(#[from] url::ParseError),

    /// Connection errors (refused, reset, DNS, offline)
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Timeout errors
    #[error("Request timed out after {0:?}")]
    TimeoutError(std::time::Duration),

    /// The remote answered with a non-success status
    #[error("Upstream returned status {0}")]
    StatusError(u16),

    /// Transport-level errors that are not clearly connection failures
    #[error("Transport error: {0}")]
    TransportError(String),

    /// IO errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl FetchError {
    /// Returns true if the error is likely temporary and the request could be retried
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::ConnectionError(_) | FetchError::TimeoutError(_) => true,
            FetchError::StatusError(status) => (500..=599).contains(status),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_transient_classification() {
        assert!(FetchError::TimeoutError(Duration::from_secs(5)).is_transient());
        assert!(FetchError::ConnectionError("refused".into()).is_transient());
        assert!(FetchError::StatusError(503).is_transient());
        assert!(!FetchError::StatusError(404).is_transient());
        assert!(!FetchError::UrlError(url::ParseError::EmptyHost).is_transient());
    }
}
