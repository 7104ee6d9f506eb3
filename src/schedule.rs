//! Release scheduling for deferred purge jobs
//!
//! The Cloudflare API limits purge calls per minute. When jobs go through
//! the deferred queue, large Cloudflare jobs are pushed back so that bursts
//! stay under the limit. Everything else is eligible immediately.

use crate::models::{BackendId, PurgeJobSpec};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// URLs that may be released per rate-limit window
pub const URLS_PER_WINDOW: usize = 500;

/// Length of one rate-limit window
pub const WINDOW: Duration = Duration::from_secs(60);

/// Delay before a job restricted to `backend` may run
///
/// `floor(url_count / 500) * 60s` for rate-limited backends, zero otherwise
/// (including jobs not restricted to a single backend).
pub fn release_delay(backend: Option<&BackendId>, url_count: usize) -> Duration {
    match backend {
        Some(backend) if backend.is_rate_limited() => {
            WINDOW * (url_count / URLS_PER_WINDOW) as u32
        }
        _ => Duration::ZERO,
    }
}

/// Absolute release time relative to `now`
pub fn release_at(now: DateTime<Utc>, backend: Option<&BackendId>, url_count: usize) -> DateTime<Utc> {
    let delay = release_delay(backend, url_count);
    now + chrono::Duration::seconds(delay.as_secs() as i64)
}

/// Split a URL set into one job per backend
///
/// When `now` is given each job carries its release time.
pub fn split_per_backend(
    urls: &[String],
    order: &[BackendId],
    now: Option<DateTime<Utc>>,
) -> Vec<PurgeJobSpec> {
    order
        .iter()
        .map(|backend| {
            let spec = PurgeJobSpec::new(urls).for_backend(backend.clone());
            match now {
                Some(now) => {
                    let at = release_at(now, Some(backend), spec.urls.len());
                    spec.with_release_at(at)
                }
                None => spec,
            }
        })
        .collect()
}

/// Time left until `release_at`, zero if already due
pub fn time_until(release_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
    release_at
        .and_then(|at| (at - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}
