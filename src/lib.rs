//! Multipurge
//!
//! Invalidates cached copies of pages at several layers at once: a CDN purge
//! API (Cloudflare) and any number of reverse-cache servers that accept the
//! `PURGE` verb (Varnish).
//!
//! # Overview
//!
//! A purge starts from a list of URLs. The URLs are deduplicated, the enabled
//! backends are resolved in their configured order, and each backend turns
//! the URLs into outbound requests:
//!
//! - **Cloudflare**: one `POST /zones/{zone}/purge_cache` per batch of 30 URLs
//! - **Varnish**: one `PURGE` per URL and cache server, with the wiki's `Host`
//!
//! All requests are executed concurrently and the job reports a single
//! success flag. A failing backend never stops the others.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use multipurge::{PurgeConfig, PurgeJob, PurgeJobSpec};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PurgeConfig::from_file("multipurge.yaml")?;
//! let job = PurgeJob::new(Arc::new(config))?;
//!
//! let ok = job
//!     .run(&PurgeJobSpec::new(["https://wiki.example.org/wiki/Main_Page"]))
//!     .await?;
//! println!("purge succeeded: {}", ok);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`normalizer`]: URL deduplication and rewriting
//! - [`PurgeBackend`]: adapters producing [`PurgeRequest`]s
//! - [`BackendRegistry`]: resolves enabled backends and constructs them once
//! - [`PurgeExecutor`]: bounded concurrent execution over a pooled client
//! - [`PurgeJob`]: the orchestrator
//! - [`PurgeDispatcher`]: splits purges per backend, runs or queues them
//! - [`LocalJobQueue`]: deferred execution honouring release times
//! - [`PurgeEndpoint`]: HTTP trigger, metrics and health
//!
//! # Configuration
//!
//! ```yaml
//! enabled_services: [cloudflare, varnish]
//! service_order: [varnish, cloudflare]
//! cloudflare:
//!   zone_id: "023e105f4ecef8ad9ca31a8372d0c353"
//!   api_token: "secret"
//! varnish:
//!   servers: ["10.0.0.5", "http://varnish.internal:6081"]
//!   host: "wiki.example.org"
//! run_in_queue: false
//! ```
//!
//! See [`PurgeConfig`] for all options.

pub mod backend;
pub mod config;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod executor;
pub mod job;
pub mod models;
pub mod normalizer;
pub mod purge_metrics;
pub mod queue;
pub mod registry;
pub mod schedule;

// Re-export commonly used types
pub use backend::{CloudflareBackend, PurgeBackend, VarnishBackend};
pub use config::{ConfigChanges, PurgeConfig};
pub use dispatcher::{DispatchReport, PurgeDispatcher, UrlFilter};
pub use endpoint::PurgeEndpoint;
pub use error::{PurgeError, Result};
pub use executor::{HttpTransport, PurgeExecutor, PurgeTransport};
pub use job::{BackendFilter, PurgeJob};
pub use models::{BackendId, ExecutionOutcome, PurgeJobSpec, PurgeRequest};
pub use purge_metrics::PurgeMetrics;
pub use queue::{JobQueue, LocalJobQueue};
pub use registry::BackendRegistry;
