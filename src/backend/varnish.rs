//! Varnish purge backend
//!
//! Every configured cache server is purged independently: there is no
//! propagation between replicas, so each URL fans out to every server.

use super::{PurgeBackend, USER_AGENT_VALUE};
use crate::config::PurgeConfig;
use crate::error::{PurgeError, Result};
use crate::models::{purge_method, BackendId, PurgeRequest, DEFAULT_REQUEST_TIMEOUT};
use http::header::{HOST, USER_AGENT};
use http::HeaderValue;
use std::net::IpAddr;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// A configured cache server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheServer {
    /// Bare IP, addressed over plain http on the default port
    Ip(IpAddr),
    /// Full origin; its scheme, host and port replace the purged URL's
    Origin(Url),
}

impl CacheServer {
    /// Parse a configured server entry
    ///
    /// Returns `None` for entries that are neither an IP nor an origin with
    /// a host.
    pub fn parse(entry: &str) -> Option<Self> {
        let entry = entry.trim();
        if let Ok(ip) = entry.trim_matches(|c| c == '[' || c == ']').parse::<IpAddr>() {
            return Some(CacheServer::Ip(ip));
        }

        match Url::parse(entry) {
            Ok(origin) if origin.host_str().is_some() => Some(CacheServer::Origin(origin)),
            _ => None,
        }
    }

    /// Rewrite `url` so that it addresses this server
    fn target(&self, url: &Url) -> Option<Url> {
        let mut target = url.clone();
        match self {
            CacheServer::Ip(ip) => {
                target.set_scheme("http").ok()?;
                target.set_ip_host(*ip).ok()?;
                target.set_port(None).ok()?;
            }
            CacheServer::Origin(origin) => {
                target.set_scheme(origin.scheme()).ok()?;
                target.set_host(origin.host_str()).ok()?;
                target.set_port(origin.port()).ok()?;
            }
        }
        Some(target)
    }
}

/// Varnish purge backend
#[derive(Debug, Default)]
pub struct VarnishBackend {
    servers: Vec<CacheServer>,
    /// Canonical wiki host sent as `Host`
    host: Option<HeaderValue>,
    timeout: Option<Duration>,
}

impl VarnishBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Servers that survived parsing during setup
    pub fn servers(&self) -> &[CacheServer] {
        &self.servers
    }

    /// Host header for `url`, preferring the configured canonical host
    fn host_header(&self, url: &Url) -> Option<HeaderValue> {
        if let Some(host) = &self.host {
            return Some(host.clone());
        }
        let host = url.host_str()?;
        let host = match url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        HeaderValue::from_str(&host).ok()
    }
}

fn parse_purge_url(url: &str) -> Option<Url> {
    let parsed = if url.starts_with("//") {
        Url::parse(&format!("http:{}", url))
    } else {
        Url::parse(url)
    };
    parsed.ok().filter(|u| u.host_str().is_some())
}

impl PurgeBackend for VarnishBackend {
    fn id(&self) -> BackendId {
        BackendId::Varnish
    }

    fn setup(&mut self, config: &PurgeConfig) -> Result<()> {
        let varnish = &config.varnish;
        if varnish.servers.is_empty() {
            return Err(PurgeError::ConfigError(
                "varnish.servers must list at least one server".to_string(),
            ));
        }

        let mut servers = Vec::with_capacity(varnish.servers.len());
        for entry in &varnish.servers {
            match CacheServer::parse(entry) {
                Some(server) => servers.push(server),
                None => warn!("Skipping malformed varnish server entry '{}'", entry),
            }
        }

        let host = match varnish.host.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
            Some(host) => Some(HeaderValue::from_str(host).map_err(|e| {
                PurgeError::ConfigError(format!("Invalid varnish.host '{}': {}", host, e))
            })?),
            None => None,
        };

        self.servers = servers;
        self.host = host;
        self.timeout = Some(config.request_timeout());
        Ok(())
    }

    fn build_requests(&self, urls: &[String]) -> Vec<PurgeRequest> {
        let method = purge_method();
        let timeout = self.timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT);
        let mut requests = Vec::with_capacity(urls.len() * self.servers.len());

        for url in urls {
            let Some(parsed) = parse_purge_url(url) else {
                warn!("Skipping unparseable purge url '{}'", url);
                continue;
            };
            let host = self.host_header(&parsed);

            for server in &self.servers {
                let Some(target) = server.target(&parsed) else {
                    warn!("Cannot address {:?} for url '{}'", server, url);
                    continue;
                };

                let mut request = PurgeRequest::new(BackendId::Varnish, method.clone(), target.as_str())
                    .with_timeout(timeout)
                    .with_purged_urls(vec![url.clone()])
                    .with_header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));
                if let Some(host) = &host {
                    request = request.with_header(HOST, host.clone());
                }
                requests.push(request);
            }
        }

        requests
    }
}
