//! Remote endpoint abstraction over a REST resource.
//!
//! The sync engine talks to the server exclusively through the
//! [`RemoteEndpoint`] trait: one HTTP-like `request` call carrying the
//! method, path, query parameters, conditional headers, and an optional
//! JSON body. [`HttpEndpoint`] is the reqwest-backed implementation.
//!
//! An endpoint returns `Ok(ApiResponse)` for every response the server
//! actually sent, including 304 and 412; interpreting the status is the
//! engine's job. Only transport failures become errors here.

use std::fmt;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header;
use serde_json::Value;

use restcache_core::{AppConfig, Error};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "restcache/0.1";

/// HTTP methods the sync protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Put => "PUT",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Put => reqwest::Method::PUT,
            Method::Post => reqwest::Method::POST,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Conditional headers attached to a request.
///
/// Reads use `If-None-Match`/`If-Modified-Since`; conditional updates use
/// `If-Match`.
#[derive(Debug, Clone, Default)]
pub struct Conditions {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
    pub if_match: Option<String>,
}

impl Conditions {
    /// No conditions: an unconditional request.
    pub fn none() -> Self {
        Self::default()
    }

    /// Conditions for revalidating a cached entry.
    pub fn revalidate(etag: Option<&str>, updated: Option<&str>) -> Self {
        Self {
            if_none_match: etag.map(str::to_string),
            if_modified_since: updated.map(str::to_string),
            if_match: None,
        }
    }

    /// Condition for an optimistic-concurrency update.
    pub fn if_match(etag: &str) -> Self {
        Self { if_match: Some(etag.to_string()), ..Self::default() }
    }
}

/// A single HTTP-like call to the remote resource.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path relative to the endpoint's base URL.
    pub path: String,
    /// Query parameters.
    pub params: Vec<(String, String)>,
    pub conditions: Conditions,
    /// JSON request body for PUT/POST.
    pub body: Option<Value>,
}

/// Response from the remote resource.
///
/// `body: None` signals "no change" for a conditional GET (304, or an
/// empty 2xx body).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub etag: Option<String>,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 304 Not Modified, the "unchanged" answer to a conditional GET.
    pub fn is_not_modified(&self) -> bool {
        self.status == 304
    }

    /// 412 Precondition Failed, an etag mismatch on a conditional update.
    pub fn is_precondition_failed(&self) -> bool {
        self.status == 412
    }
}

/// Abstraction over a REST resource supporting conditional requests.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    async fn request(&self, req: ApiRequest) -> Result<ApiResponse, Error>;
}

/// Configuration for the HTTP endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    /// Base URL of the remote service.
    pub base_url: String,
    /// User agent string (default: "restcache/0.1").
    pub user_agent: String,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl From<&AppConfig> for EndpointConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            user_agent: config.user_agent.clone(),
            timeout: config.timeout(),
        }
    }
}

/// HTTP implementation of [`RemoteEndpoint`] over reqwest.
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    http: reqwest::Client,
    config: EndpointConfig,
}

impl HttpEndpoint {
    /// Create a new endpoint with the given configuration.
    pub fn new(config: EndpointConfig) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .use_rustls_tls()
            .gzip(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::Remote { status: None, message: format!("failed to build HTTP client: {e}") })?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }

    fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl RemoteEndpoint for HttpEndpoint {
    async fn request(&self, req: ApiRequest) -> Result<ApiResponse, Error> {
        let start = Instant::now();
        let url = self.url_for(&req.path);

        tracing::debug!("sending {} {}", req.method, url);

        let mut request = self.http.request(req.method.into(), &url).query(&req.params);

        if let Some(etag) = &req.conditions.if_none_match {
            request = request.header(header::IF_NONE_MATCH, etag);
        }
        if let Some(since) = &req.conditions.if_modified_since {
            request = request.header(header::IF_MODIFIED_SINCE, since);
        }
        if let Some(etag) = &req.conditions.if_match {
            request = request.header(header::IF_MATCH, etag);
        }
        if let Some(body) = &req.body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout
            } else {
                Error::Remote { status: None, message: format!("network error: {e}") }
            }
        })?;

        let status = response.status().as_u16();
        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let body = if status == 304 {
            None
        } else {
            let bytes = response
                .bytes()
                .await
                .map_err(|e| Error::Remote { status: Some(status), message: format!("failed to read response: {e}") })?;
            if bytes.is_empty() {
                None
            } else {
                Some(serde_json::from_slice(&bytes).map_err(|e| Error::Remote {
                    status: Some(status),
                    message: format!("invalid JSON response: {e}"),
                })?)
            }
        };

        tracing::debug!(
            "received {} from {} {} in {:?}",
            status,
            req.method,
            url,
            start.elapsed()
        );

        Ok(ApiResponse { status, etag, body })
    }
}
