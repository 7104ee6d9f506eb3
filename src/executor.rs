//! Concurrent execution of purge requests

use crate::config::PurgeConfig;
use crate::error::{PurgeError, Result};
use crate::models::{ExecutionOutcome, PurgeRequest};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Sends a single purge request
///
/// Implementations never fail: errors are folded into the outcome.
#[async_trait]
pub trait PurgeTransport: Send + Sync {
    async fn send(&self, request: &PurgeRequest) -> ExecutionOutcome;
}

/// Transport backed by a pooled `reqwest::Client`
#[derive(Clone)]
pub struct HttpTransport {
    http_client: Client,
}

impl HttpTransport {
    /// Create a transport keeping up to `max_conns_per_host` idle connections per host
    pub fn new(max_conns_per_host: usize) -> Result<Self> {
        let http_client = Client::builder()
            .pool_max_idle_per_host(max_conns_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| PurgeError::ConfigError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(HttpTransport { http_client })
    }

    pub fn from_client(http_client: Client) -> Self {
        HttpTransport { http_client }
    }
}

#[async_trait]
impl PurgeTransport for HttpTransport {
    async fn send(&self, request: &PurgeRequest) -> ExecutionOutcome {
        let backend = request.backend().clone();
        let mut builder = self
            .http_client
            .request(request.method().clone(), request.url())
            .headers(request.headers().clone())
            .timeout(request.timeout());
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let message = if e.is_timeout() {
                    format!("timed out after {:?}", request.timeout())
                } else {
                    e.to_string()
                };
                let error = PurgeError::transport(request.url(), message);
                return ExecutionOutcome::transport_failure(backend, request.url(), error.to_string());
            }
        };

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|e| format!("Failed to read response body: {}", e));

        ExecutionOutcome::response(backend, request.url(), status, body)
    }
}

/// Executes purge requests concurrently with a bound on requests in flight
#[derive(Clone)]
pub struct PurgeExecutor {
    transport: Arc<dyn PurgeTransport>,
    max_concurrent: usize,
}

impl PurgeExecutor {
    /// Create an executor with an HTTP transport sized from `config`
    pub fn new(config: &PurgeConfig) -> Result<Self> {
        let transport = HttpTransport::new(config.max_conns_per_host)?;
        Ok(Self::with_transport(
            Arc::new(transport),
            config.max_concurrent_requests,
        ))
    }

    pub fn with_transport(transport: Arc<dyn PurgeTransport>, max_concurrent: usize) -> Self {
        PurgeExecutor {
            transport,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Execute all requests concurrently
    ///
    /// One outcome is returned per request, in request order. A failed or
    /// timed-out request does not affect its siblings. `Err` is returned only
    /// when the executor itself breaks down (a task panics or is cancelled);
    /// requests still in flight at that point are aborted.
    pub async fn execute(&self, requests: Vec<PurgeRequest>) -> Result<Vec<ExecutionOutcome>> {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Executing {} purge requests with concurrency {}",
            requests.len(),
            self.max_concurrent
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut tasks = Vec::with_capacity(requests.len());

        for request in requests {
            let sem = Arc::clone(&semaphore);
            let transport = Arc::clone(&self.transport);

            tasks.push(tokio::spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|e| PurgeError::ExecutorFailure(format!("Semaphore closed: {}", e)))?;

                Ok::<_, PurgeError>(transport.send(&request).await)
            }));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        let mut pending = tasks.into_iter();
        while let Some(task) = pending.next() {
            let joined = task
                .await
                .map_err(|e| PurgeError::ExecutorFailure(format!("Task join error: {}", e)))
                .and_then(|outcome| outcome);
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    // Sibling requests must not keep running once the batch has failed
                    let remaining: Vec<_> = pending.collect();
                    for task in &remaining {
                        task.abort();
                    }
                    warn!(
                        "Purge execution failed, aborted {} outstanding requests: {}",
                        remaining.len(),
                        e
                    );
                    return Err(e);
                }
            }
        }

        Ok(outcomes)
    }
}
