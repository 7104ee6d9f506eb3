//! Core data models for purge orchestration

use crate::normalizer;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// The non-standard `PURGE` verb understood by reverse-cache servers
pub fn purge_method() -> Method {
    Method::from_bytes(b"PURGE").expect("PURGE is a valid method token")
}

/// Identifies a purge backend
///
/// Names are matched case-insensitively. Anything that does not name a known
/// backend is carried through unchanged so that it can be rejected later by
/// the registry with a useful message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BackendId {
    /// Cloudflare HTTP API
    Cloudflare,
    /// Varnish (or any reverse cache accepting PURGE)
    Varnish,
    /// Unrecognized name, kept verbatim
    Unknown(String),
}

impl BackendId {
    /// Normalize a configured backend name
    pub fn normalize(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "cloudflare" | "api" | "api-backend" => BackendId::Cloudflare,
            "varnish" | "cache-server" | "cache-server-backend" => BackendId::Varnish,
            _ => BackendId::Unknown(name.to_string()),
        }
    }

    /// Canonical name of this backend
    pub fn as_str(&self) -> &str {
        match self {
            BackendId::Cloudflare => "cloudflare",
            BackendId::Varnish => "varnish",
            BackendId::Unknown(name) => name,
        }
    }

    /// Whether the backend enforces an upstream rate limit on purge calls
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BackendId::Cloudflare)
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for BackendId {
    fn from(name: String) -> Self {
        BackendId::normalize(&name)
    }
}

impl From<&str> for BackendId {
    fn from(name: &str) -> Self {
        BackendId::normalize(name)
    }
}

impl From<BackendId> for String {
    fn from(id: BackendId) -> Self {
        id.as_str().to_string()
    }
}

/// Descriptor of one outbound purge call
///
/// Built by a backend adapter, consumed by the executor.
#[derive(Debug, Clone)]
pub struct PurgeRequest {
    backend: BackendId,
    method: Method,
    url: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Duration,
    purged_urls: Vec<String>,
}

impl PurgeRequest {
    /// Create a request with no headers, no body and the default timeout
    pub fn new(backend: BackendId, method: Method, url: impl Into<String>) -> Self {
        PurgeRequest {
            backend,
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            timeout: DEFAULT_REQUEST_TIMEOUT,
            purged_urls: Vec::new(),
        }
    }

    /// Merge a set of headers into the request
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
        self
    }

    /// Set a single header, replacing any previous value
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Record the canonical URLs this request invalidates
    pub fn with_purged_urls(mut self, urls: Vec<String>) -> Self {
        self.purged_urls = urls;
        self
    }

    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn purged_urls(&self) -> &[String] {
        &self.purged_urls
    }
}

/// The unit of purge work
///
/// Deserializes from the inbound contract `{ "urls": [...], "backend"?: "..." }`,
/// normalizing the URL list on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "JobSpecContract")]
pub struct PurgeJobSpec {
    pub urls: Vec<String>,

    /// Restricts execution to a single backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendId>,

    /// Earliest time the job may run when deferred
    #[serde(skip)]
    pub release_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct JobSpecContract {
    urls: Vec<String>,
    #[serde(default)]
    backend: Option<BackendId>,
}

impl From<JobSpecContract> for PurgeJobSpec {
    fn from(contract: JobSpecContract) -> Self {
        PurgeJobSpec {
            backend: contract.backend,
            ..PurgeJobSpec::new(contract.urls)
        }
    }
}

impl PurgeJobSpec {
    /// Create a job spec over a normalized copy of `urls`
    pub fn new<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        PurgeJobSpec {
            urls: normalizer::normalize(urls),
            backend: None,
            release_at: None,
        }
    }

    /// Restrict the job to one backend
    pub fn for_backend(mut self, backend: BackendId) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn with_release_at(mut self, release_at: DateTime<Utc>) -> Self {
        self.release_at = Some(release_at);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// Result of executing a single `PurgeRequest`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub backend: BackendId,
    /// Target URL of the outbound request
    pub url: String,
    /// HTTP status, `None` when no response was received
    pub status: Option<u16>,
    /// Response body, or the transport error text
    pub body: String,
}

impl ExecutionOutcome {
    pub fn response(backend: BackendId, url: impl Into<String>, status: u16, body: impl Into<String>) -> Self {
        ExecutionOutcome {
            backend,
            url: url.into(),
            status: Some(status),
            body: body.into(),
        }
    }

    pub fn transport_failure(backend: BackendId, url: impl Into<String>, error: impl Into<String>) -> Self {
        ExecutionOutcome {
            backend,
            url: url.into(),
            status: None,
            body: error.into(),
        }
    }

    /// 2xx counts as success
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }

    pub fn is_transport_failure(&self) -> bool {
        self.status.is_none()
    }
}
