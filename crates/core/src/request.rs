use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::FetchError;
use crate::media::QualityHint;

/// HTTP methods the pipeline issues: media reads and idempotent writes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GET,
    POST,
    HEAD,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::GET => write!(f, "GET"),
            Method::POST => write!(f, "POST"),
            Method::HEAD => write!(f, "HEAD"),
        }
    }
}

/// An outgoing resource request
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    method: Method,

    /// Target URL
    url: Url,

    /// Request headers
    headers: HashMap<String, String>,

    /// Request body
    body: Option<Vec<u8>>,

    /// Per-request timeout
    timeout: Option<Duration>,
}

impl Request {
    /// Create a new request with the specified method and URL
    pub fn new(method: Method, url: &str) -> Result<Self, FetchError> {
        let url = Url::parse(url).map_err(FetchError::UrlError)?;

        Ok(Self {
            method,
            url,
            headers: HashMap::new(),
            body: None,
            timeout: None,
        })
    }

    /// Create a request from an already parsed URL
    pub fn from_url(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    /// Add a header to the request
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    /// Set the request body from a JSON-serializable type
    pub fn with_json_body<T: Serialize>(mut self, body: &T) -> Result<Self, FetchError> {
        let bytes = serde_json::to_vec(body).map_err(FetchError::SerializationError)?;
        self.body = Some(bytes);
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Apply a quality transform to the target URL.
    ///
    /// Only hosts serving derived variants understand the `quality`
    /// parameter; for every other URL this is a no-op.
    pub fn with_quality(mut self, hint: QualityHint) -> Self {
        self.url = hint.apply(&self.url);
        self
    }

    /// Get the request method
    pub fn method(&self) -> Method {
        self.method
    }

    /// Get the target URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Get the request headers
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

    /// Get the request body, if any
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the request timeout, if one was set
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Whether this request expects an HTML document in return
    pub fn is_navigation(&self) -> bool {
        self.method == Method::GET
            && self
                .header("accept")
                .map(|accept| accept.contains("text/html"))
                .unwrap_or(false)
    }
}
