//! Cloudflare API purge backend
//!
//! Purges by URL through `POST /zones/{zone}/purge_cache`. The API accepts a
//! bounded number of files per call, so URLs are chunked.

use super::{PurgeBackend, USER_AGENT_VALUE};
use crate::config::PurgeConfig;
use crate::error::{PurgeError, Result};
use crate::models::{BackendId, PurgeRequest, DEFAULT_REQUEST_TIMEOUT};
use crate::normalizer;
use http::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Maximum number of files per purge call
pub const MAX_FILES_PER_REQUEST: usize = 30;

#[derive(Serialize)]
struct PurgeFilesBody<'a> {
    files: &'a [String],
}

/// Cloudflare purge backend
#[derive(Debug, Default)]
pub struct CloudflareBackend {
    /// Full purge_cache endpoint, set by `setup`
    endpoint: Option<String>,
    headers: HeaderMap,
    timeout: Option<Duration>,
}

impl CloudflareBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The purge endpoint, once set up
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
        HeaderValue::from_str(value).map_err(|e| {
            PurgeError::ConfigError(format!("Invalid value for {} header: {}", name, e))
        })
    }
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(PurgeError::ConfigError(format!(
            "cloudflare.{} must be set",
            key
        ))),
    }
}

impl PurgeBackend for CloudflareBackend {
    fn id(&self) -> BackendId {
        BackendId::Cloudflare
    }

    fn setup(&mut self, config: &PurgeConfig) -> Result<()> {
        let cf = &config.cloudflare;
        let zone_id = required(&cf.zone_id, "zone_id")?;
        let api_token = required(&cf.api_token, "api_token")?;

        let mut headers = HeaderMap::new();
        let mut auth = Self::header_value("Authorization", &format!("Bearer {}", api_token))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        if let Some(account_id) = cf.account_id.as_deref().filter(|a| !a.trim().is_empty()) {
            headers.insert(
                HeaderName::from_static("x-auth-key"),
                Self::header_value("X-Auth-Key", account_id.trim())?,
            );
        }

        let endpoint = format!(
            "{}/zones/{}/purge_cache",
            cf.api_base_url.trim_end_matches('/'),
            zone_id
        );
        debug!("Cloudflare purge endpoint: {}", endpoint);

        self.endpoint = Some(endpoint);
        self.headers = headers;
        self.timeout = Some(config.request_timeout());
        Ok(())
    }

    fn build_requests(&self, urls: &[String]) -> Vec<PurgeRequest> {
        let Some(endpoint) = &self.endpoint else {
            warn!("Cloudflare backend used before setup, skipping {} urls", urls.len());
            return Vec::new();
        };

        // The API only accepts https URLs
        let files = normalizer::normalize(urls.iter().map(|u| normalizer::https_url(u)));

        let mut requests = Vec::with_capacity(files.len().div_ceil(MAX_FILES_PER_REQUEST));
        for chunk in files.chunks(MAX_FILES_PER_REQUEST) {
            let body = match serde_json::to_vec(&PurgeFilesBody { files: chunk }) {
                Ok(body) => body,
                Err(e) => {
                    warn!("Failed to encode Cloudflare purge body: {}", e);
                    continue;
                }
            };

            requests.push(
                PurgeRequest::new(BackendId::Cloudflare, Method::POST, endpoint.clone())
                    .with_headers(&self.headers)
                    .with_body(body)
                    .with_timeout(self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT))
                    .with_purged_urls(chunk.to_vec()),
            );
        }

        requests
    }
}
