//! HTTP trigger endpoint
//!
//! A small hyper server for operators and external systems:
//!
//! - `POST /purge` with `{"urls": [...], "backend"?: "...", "include_static"?: bool}`
//! - `GET /metrics` in Prometheus text format
//! - `GET /health`
//!
//! Relative paths in a trigger are resolved against the configured `server`.
//! Failures are reported with a generic message; details go to the log.

use crate::dispatcher::PurgeDispatcher;
use crate::error::{PurgeError, Result};
use crate::models::{BackendId, PurgeJobSpec};
use crate::normalizer;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use prometheus::{Encoder, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

/// Largest request body the endpoint reads
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Body of `POST /purge`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRequest {
    #[serde(default)]
    pub urls: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendId>,

    /// Also purge the configured static paths
    #[serde(default)]
    pub include_static: bool,
}

/// Response to `POST /purge`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub success: bool,
    pub url_count: usize,
    pub queued: usize,
    pub message: String,
}

/// Trigger endpoint server
pub struct PurgeEndpoint {
    dispatcher: Arc<PurgeDispatcher>,
    /// `None` serves the default Prometheus registry
    registry: Option<Registry>,
    addr: SocketAddr,
}

impl PurgeEndpoint {
    pub fn new(dispatcher: Arc<PurgeDispatcher>, addr: SocketAddr) -> Self {
        Self {
            dispatcher,
            registry: None,
            addr,
        }
    }

    /// Serve metrics from a custom registry
    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Bind the configured address and serve until the process exits
    pub async fn start(self) -> Result<()> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve(listener).await
    }

    /// Serve connections from an already bound listener
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("Purge endpoint listening on http://{}", local_addr);

        let endpoint = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let endpoint = Arc::clone(&endpoint);

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let endpoint = Arc::clone(&endpoint);
                    async move { endpoint.handle(req).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {:?}", peer, err);
                }
            });
        }
    }

    async fn handle<B>(&self, req: Request<B>) -> std::result::Result<Response<Full<Bytes>>, Infallible>
    where
        B: Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let body = match Limited::new(req.into_body(), MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.is::<LengthLimitError>() => {
                warn!("Rejecting {} {}: body exceeds {} bytes", method, path, MAX_BODY_BYTES);
                return Ok(text_response(StatusCode::PAYLOAD_TOO_LARGE, "request body too large"));
            }
            Err(e) => {
                warn!("Failed to read request body for {} {}: {}", method, path, e);
                return Ok(text_response(StatusCode::BAD_REQUEST, "failed to read request body"));
            }
        };
        Ok(self.route(&method, &path, body).await)
    }

    /// Route a request that has been fully read
    pub async fn route(&self, method: &Method, path: &str, body: Bytes) -> Response<Full<Bytes>> {
        match (method, path) {
            (&Method::POST, "/purge") => self.trigger(&body).await,
            (_, "/purge") => text_response(StatusCode::METHOD_NOT_ALLOWED, "Only POST is allowed"),
            (&Method::GET, "/metrics") => self.metrics_response(),
            (&Method::GET, "/health") => health_response(),
            _ => text_response(StatusCode::NOT_FOUND, "404 Not Found"),
        }
    }

    async fn trigger(&self, body: &[u8]) -> Response<Full<Bytes>> {
        let request: TriggerRequest = match serde_json::from_slice(body) {
            Ok(request) => request,
            Err(e) => {
                let err = PurgeError::ParseError(format!("Invalid purge request body: {}", e));
                warn!("{}", err);
                return trigger_response(err.to_http_status(), false, 0, 0, "invalid request");
            }
        };

        let urls = match self.expand_urls(request.urls, request.include_static) {
            Ok(urls) => urls,
            Err(e) => {
                warn!("Rejected purge request: {}", e);
                return trigger_response(e.to_http_status(), false, 0, 0, &e.to_string());
            }
        };
        if urls.is_empty() {
            return trigger_response(StatusCode::BAD_REQUEST.as_u16(), false, 0, 0, "no urls");
        }

        let url_count = urls.len();
        let mut spec = PurgeJobSpec::new(urls);
        if let Some(backend) = request.backend {
            spec = spec.for_backend(backend);
        }
        info!("Purge triggered for {} urls", url_count);

        match self.dispatcher.dispatch(spec).await {
            Ok(report) if report.is_success() => {
                let message = if report.queued > 0 { "purge queued" } else { "purge completed" };
                trigger_response(200, true, url_count, report.queued, message)
            }
            Ok(report) => {
                warn!("Triggered purge failed: {:?}", report);
                trigger_response(502, false, url_count, report.queued, "purge failed")
            }
            Err(e) => {
                warn!("Triggered purge could not be dispatched: {}", e);
                trigger_response(e.to_http_status(), false, url_count, 0, "purge failed")
            }
        }
    }

    /// Absolutize relative paths and append static purges when requested
    fn expand_urls(&self, urls: Vec<String>, include_static: bool) -> Result<Vec<String>> {
        let config = self.dispatcher.job().config();
        let mut candidates = urls;
        if include_static {
            candidates.extend(config.static_purges.iter().cloned());
        }

        let candidates = normalizer::normalize(candidates);
        candidates
            .into_iter()
            .map(|url| {
                if url.starts_with("//") || url.contains("://") {
                    return Ok(url);
                }
                match &config.server {
                    Some(server) => Ok(normalizer::absolutize(server, &url)),
                    None => Err(PurgeError::InvalidRequest(format!(
                        "Relative url '{}' given but no server is configured",
                        url
                    ))),
                }
            })
            .collect()
    }

    fn metrics_response(&self) -> Response<Full<Bytes>> {
        let families = match &self.registry {
            Some(registry) => registry.gather(),
            None => prometheus::gather(),
        };

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&families, &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return text_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics");
        }

        let mut response = Response::new(Full::new(Bytes::from(buffer)));
        if let Ok(content_type) = HeaderValue::from_str(encoder.format_type()) {
            response.headers_mut().insert(CONTENT_TYPE, content_type);
        }
        response
    }
}

fn health_response() -> Response<Full<Bytes>> {
    body_response(
        StatusCode::OK,
        "application/json",
        Bytes::from_static(br#"{"status":"healthy"}"#),
    )
}

fn text_response(status: StatusCode, text: &'static str) -> Response<Full<Bytes>> {
    body_response(status, "text/plain", Bytes::from_static(text.as_bytes()))
}

fn trigger_response(
    status: u16,
    success: bool,
    url_count: usize,
    queued: usize,
    message: &str,
) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = TriggerResponse {
        success,
        url_count,
        queued,
        message: message.to_string(),
    };

    match serde_json::to_vec(&body) {
        Ok(json) => body_response(status, "application/json", Bytes::from(json)),
        Err(e) => {
            error!("Failed to serialize trigger response: {}", e);
            text_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn body_response(status: StatusCode, content_type: &'static str, body: Bytes) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}
