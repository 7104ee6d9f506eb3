//! Entry point for purge events
//!
//! The dispatcher turns a list of URLs into one job per backend. Jobs either
//! run immediately or, with `run_in_queue`, are pushed to a [`JobQueue`]
//! carrying a release time from the scheduling policy.

use crate::error::{PurgeError, Result};
use crate::job::PurgeJob;
use crate::models::PurgeJobSpec;
use crate::queue::JobQueue;
use crate::schedule;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Veto hook over the whole URL set
///
/// Returns the URLs to purge, or `None` to cancel the purge entirely.
pub type UrlFilter = Arc<dyn Fn(Vec<String>) -> Option<Vec<String>> + Send + Sync>;

/// What happened to a dispatched purge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Jobs handed to the deferred queue
    pub queued: usize,
    /// Jobs run inline that succeeded
    pub succeeded: usize,
    /// Jobs run inline that failed or could not execute
    pub failed: usize,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    pub fn total(&self) -> usize {
        self.queued + self.succeeded + self.failed
    }
}

/// Splits purges per backend and runs or queues them
pub struct PurgeDispatcher {
    job: Arc<PurgeJob>,
    queue: Option<Arc<dyn JobQueue>>,
    url_filter: Option<UrlFilter>,
}

impl PurgeDispatcher {
    pub fn new(job: Arc<PurgeJob>) -> Self {
        PurgeDispatcher {
            job,
            queue: None,
            url_filter: None,
        }
    }

    /// Queue used when `run_in_queue` is enabled
    pub fn with_queue(mut self, queue: Arc<dyn JobQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_url_filter(mut self, filter: UrlFilter) -> Self {
        self.url_filter = Some(filter);
        self
    }

    pub fn job(&self) -> &Arc<PurgeJob> {
        &self.job
    }

    /// Purge `urls` on every enabled backend
    pub async fn purge<I, S>(&self, urls: I) -> Result<DispatchReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.dispatch(PurgeJobSpec::new(urls)).await
    }

    /// Dispatch a job spec
    ///
    /// A spec restricted to one backend yields a single job; otherwise one job
    /// is created per backend in the resolved order. Queue push failures are
    /// returned as errors naming how many jobs were already queued. Inline job
    /// failures are only counted.
    pub async fn dispatch(&self, spec: PurgeJobSpec) -> Result<DispatchReport> {
        let mut report = DispatchReport::default();

        let urls = match &self.url_filter {
            Some(filter) => match filter(spec.urls) {
                Some(urls) => urls,
                None => {
                    debug!("Purge vetoed by url filter");
                    return Ok(report);
                }
            },
            None => spec.urls,
        };
        let spec = PurgeJobSpec {
            urls: crate::normalizer::normalize(urls),
            ..spec
        };
        if spec.is_empty() {
            return Ok(report);
        }

        let order = self.job.resolve(&spec);
        let queue = if self.job.config().run_in_queue {
            if self.queue.is_none() {
                warn!("run_in_queue is set but no queue is attached, running inline");
            }
            self.queue.as_ref()
        } else {
            None
        };

        let now = queue.map(|_| Utc::now());
        for job_spec in schedule::split_per_backend(&spec.urls, &order, now) {
            match queue {
                Some(queue) => {
                    let backend = job_spec.backend.clone();
                    if let Err(e) = queue.push(job_spec) {
                        warn!(
                            "Queueing job for {:?} failed after {} jobs were queued: {}",
                            backend, report.queued, e
                        );
                        return Err(PurgeError::QueueError(format!(
                            "{} ({} jobs already queued)",
                            e, report.queued
                        )));
                    }
                    report.queued += 1;
                }
                None => {
                    let backend = job_spec.backend.clone();
                    match self.job.run(&job_spec).await {
                        Ok(true) => {
                            info!("Job Status for {:?}: success", backend);
                            report.succeeded += 1;
                        }
                        Ok(false) => {
                            info!("Job Status for {:?}: error", backend);
                            report.failed += 1;
                        }
                        Err(e) => {
                            warn!("Job for {:?} could not run: {}", backend, e);
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        debug!("Dispatch finished: {:?}", report);
        Ok(report)
    }
}
