pub mod error;
pub mod fetch;
pub mod media;
pub mod request;
pub mod response;

/// Re-export common types for easier usage
pub use error::FetchError;
pub use fetch::{Fetch, HttpFetcher};
pub use media::{CourseCategory, FallbackChain, FallbackStage, MediaKind, QualityHint};
pub use request::{Method, Request};
pub use response::Response;
