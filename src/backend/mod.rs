//! Purge backend adapters
//!
//! A backend turns a set of canonical URLs into the concrete HTTP calls that
//! invalidate them. Building requests is pure; execution happens in
//! [`crate::executor`].

pub mod cloudflare;
pub mod varnish;

use crate::config::PurgeConfig;
use crate::error::Result;
use crate::models::{BackendId, PurgeRequest};

pub use cloudflare::CloudflareBackend;
pub use varnish::VarnishBackend;

/// User-Agent sent with every outbound purge call
pub(crate) const USER_AGENT_VALUE: &str = concat!("multipurge/", env!("CARGO_PKG_VERSION"));

/// Capability shared by every purge backend
///
/// Instances are set up once and then shared read-only, possibly across
/// tasks, for every URL batch of a job.
pub trait PurgeBackend: Send + Sync {
    /// Identifier of this backend
    fn id(&self) -> BackendId;

    /// One-time initialization from the resolved configuration
    ///
    /// Fails with [`crate::PurgeError::ConfigError`] when required settings
    /// are missing or malformed.
    fn setup(&mut self, config: &PurgeConfig) -> Result<()>;

    /// Build the outbound requests for `urls`
    ///
    /// Returns no requests for an empty input.
    fn build_requests(&self, urls: &[String]) -> Vec<PurgeRequest>;
}
