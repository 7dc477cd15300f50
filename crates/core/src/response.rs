use std::collections::HashMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use url::Url;

use crate::error::FetchError;
use crate::request::Method;

/// An incoming resource response
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    status: u16,

    /// Response headers
    headers: HashMap<String, String>,

    /// Response body
    body: Bytes,

    /// Final URL after any redirects
    url: Url,

    /// Original request method
    request_method: Method,

    /// Whether the response was served from cache
    from_cache: bool,
}

impl Response {
    /// Creates a new Response object
    pub fn new(
        status: u16,
        headers: HashMap<String, String>,
        body: Bytes,
        url: Url,
        request_method: Method,
    ) -> Self {
        Self {
            status,
            headers,
            body,
            url,
            request_method,
            from_cache: false,
        }
    }

    /// Set whether the response was served from cache
    pub fn set_from_cache(&mut self, from_cache: bool) {
        self.from_cache = from_cache;
    }

    /// Get the HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Check if the response was successful (2xx status code)
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// Check if the response is a server error (5xx status code)
    pub fn is_server_error(&self) -> bool {
        (500..=599).contains(&self.status)
    }

    /// Get all response headers
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Get a specific header value, case-insensitive
    pub fn header(&self, name: &str) -> Option<&String> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v)
    }

    /// Get the response body as bytes
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Get the response body as a string
    pub fn body_text(&self) -> Result<String, FetchError> {
        String::from_utf8(self.body.to_vec()).map_err(|_| {
            FetchError::TransportError("response body is not valid UTF-8".to_string())
        })
    }

    /// Get the response body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, FetchError> {
        serde_json::from_slice(&self.body).map_err(FetchError::SerializationError)
    }

    /// Get the final URL (after any redirects)
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the original request method
    pub fn request_method(&self) -> Method {
        self.request_method
    }

    /// Check if the response was served from cache
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Get the content type of the response
    pub fn content_type(&self) -> Option<&String> {
        self.header("content-type")
    }

    /// Check if the response is an image
    pub fn is_image(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_lowercase().starts_with("image/"))
            .unwrap_or(false)
    }

    /// Check if the response is HTML
    pub fn is_html(&self) -> bool {
        self.content_type()
            .map(|ct| ct.to_lowercase().contains("text/html"))
            .unwrap_or(false)
    }

    /// The server's `date` header, used as the cache freshness clock.
    ///
    /// Falls back to `last-modified` when the origin omits `date`.
    pub fn freshness_date(&self) -> Option<DateTime<Utc>> {
        self.header("date")
            .or_else(|| self.header("last-modified"))
            .and_then(|raw| DateTime::parse_from_rfc2822(raw).ok())
            .map(|parsed| parsed.with_timezone(&Utc))
    }
}
