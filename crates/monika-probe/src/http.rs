//! HTTP request executor.
//!
//! Performs exactly one timed call per [`Request`]. Transport failures
//! come back as [`ProbeError`]; there is no retry at this level.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Method;
use tracing::debug;

use monika_config::Request;

use crate::condition::ResponseContext;
use crate::error::{ProbeError, ProbeResult};

/// Outcome of one successful HTTP call.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResult {
    pub status: u16,
    /// Wall-clock latency in milliseconds, including the body read.
    pub response_time_ms: f64,
    pub body: String,
    /// Header map; repeated headers are joined with `", "`.
    pub headers: HashMap<String, String>,
    /// Body length in bytes.
    pub size: usize,
}

impl HttpResult {
    /// View this result as the `response` object of an alert condition.
    pub fn context(&self) -> ResponseContext<'_> {
        ResponseContext {
            status: self.status,
            time_ms: self.response_time_ms,
            body: &self.body,
            headers: &self.headers,
            size: self.size,
        }
    }
}

/// Executes one HTTP request with a caller-supplied timeout.
#[async_trait]
pub trait HttpExecutor: Send + Sync {
    async fn execute(&self, request: &Request, timeout: Duration) -> ProbeResult<HttpResult>;
}

/// [`HttpExecutor`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestExecutor {
    client: reqwest::Client,
}

impl ReqwestExecutor {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for ReqwestExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpExecutor for ReqwestExecutor {
    async fn execute(&self, request: &Request, timeout: Duration) -> ProbeResult<HttpResult> {
        let method = parse_method(&request.method)?;

        let start = Instant::now();
        let resp = self
            .client
            .request(method, &request.url)
            .timeout(timeout)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let headers = flatten_headers(resp.headers());
        let bytes = resp.bytes().await?;
        let response_time_ms = start.elapsed().as_secs_f64() * 1000.0;

        debug!(url = %request.url, status, bytes = bytes.len(), "http response received");

        Ok(HttpResult {
            status,
            response_time_ms,
            size: bytes.len(),
            body: String::from_utf8_lossy(&bytes).into_owned(),
            headers,
        })
    }
}

/// Upper-case and validate a configured method name.
pub fn parse_method(method: &str) -> ProbeResult<Method> {
    let upper = method.trim().to_ascii_uppercase();
    Method::from_bytes(upper.as_bytes()).map_err(|_| ProbeError::InvalidMethod(method.to_string()))
}

/// Collapse a header map to one string per name, joining repeats with `", "`.
pub fn flatten_headers(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    let mut flat: HashMap<String, String> = HashMap::with_capacity(headers.keys_len());
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes());
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert_with(|| value.into_owned());
    }
    flat
}
