use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::FetchError;
use crate::request::{Method, Request};
use crate::response::Response;

/// Default timeout applied when a request carries none of its own
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// The transport seam between the pipeline and the resource-fetch endpoint.
///
/// Both the page context and the worker context receive their transport by
/// constructor injection; tests supply scripted implementations.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError>;
}

/// Production transport backed by a pooled HTTP client
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::TransportError(e.to_string()))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, request: Request) -> Result<Response, FetchError> {
        let method = match request.method() {
            Method::GET => reqwest::Method::GET,
            Method::POST => reqwest::Method::POST,
            Method::HEAD => reqwest::Method::HEAD,
        };

        let timeout = request.timeout().unwrap_or(DEFAULT_TIMEOUT);
        let mut builder = self
            .client
            .request(method, request.url().clone())
            .timeout(timeout);

        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.to_vec());
        }

        let outcome = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::TimeoutError(timeout)
            } else if e.is_connect() {
                FetchError::ConnectionError(e.to_string())
            } else {
                FetchError::TransportError(e.to_string())
            }
        })?;

        let status = outcome.status().as_u16();
        let url = outcome.url().clone();
        let mut headers = HashMap::new();
        for (name, value) in outcome.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.to_string(), value.to_string());
            }
        }

        let body: Bytes = outcome
            .bytes()
            .await
            .map_err(|e| FetchError::TransportError(e.to_string()))?;

        Ok(Response::new(status, headers, body, url, request.method()))
    }
}
