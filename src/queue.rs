//! Deferred execution of purge jobs
//!
//! [`JobQueue`] is the boundary the dispatcher pushes deferred work through.
//! [`LocalJobQueue`] is an in-process implementation that runs jobs on the
//! tokio runtime once their release time has passed.

use crate::error::{PurgeError, Result};
use crate::job::PurgeJob;
use crate::models::PurgeJobSpec;
use crate::schedule;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Accepts purge jobs for later execution
pub trait JobQueue: Send + Sync {
    fn push(&self, spec: PurgeJobSpec) -> Result<()>;
}

/// Counters for jobs run by a [`LocalJobQueue`]
#[derive(Debug, Default)]
pub struct QueueStats {
    succeeded: AtomicU64,
    failed: AtomicU64,
    pending: AtomicU64,
}

impl QueueStats {
    /// Jobs accepted but not finished yet, including ones waiting for release
    pub fn pending(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    fn finish(&self, success: bool) {
        self.pending.fetch_sub(1, Ordering::Relaxed);
        let counter = if success { &self.succeeded } else { &self.failed };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn succeeded(&self) -> u64 {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Jobs that reported failure or could not execute
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// In-process deferred queue
///
/// Each job waits for its own release time, so a delayed job never holds up
/// jobs pushed after it. Failed jobs are not retried.
pub struct LocalJobQueue {
    sender: mpsc::UnboundedSender<PurgeJobSpec>,
    worker: JoinHandle<()>,
    stats: Arc<QueueStats>,
}

impl LocalJobQueue {
    /// Start the queue worker on the current runtime
    pub fn start(job: Arc<PurgeJob>) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stats = Arc::new(QueueStats::default());
        let worker = tokio::spawn(run_worker(job, receiver, Arc::clone(&stats)));

        LocalJobQueue {
            sender,
            worker,
            stats,
        }
    }

    pub fn stats(&self) -> Arc<QueueStats> {
        Arc::clone(&self.stats)
    }

    /// Stop accepting jobs and wait for queued ones to finish
    pub async fn shutdown(self) -> Result<Arc<QueueStats>> {
        let LocalJobQueue {
            sender,
            worker,
            stats,
        } = self;
        drop(sender);

        worker
            .await
            .map_err(|e| PurgeError::QueueError(format!("Queue worker failed: {}", e)))?;
        Ok(stats)
    }
}

impl JobQueue for LocalJobQueue {
    fn push(&self, spec: PurgeJobSpec) -> Result<()> {
        debug!(
            "Queueing purge of {} urls for {:?} at {:?}",
            spec.urls.len(),
            spec.backend,
            spec.release_at
        );
        self.stats.pending.fetch_add(1, Ordering::Relaxed);
        self.sender.send(spec).map_err(|_| {
            self.stats.pending.fetch_sub(1, Ordering::Relaxed);
            PurgeError::QueueError("Queue worker is not running".to_string())
        })
    }
}

async fn run_worker(
    job: Arc<PurgeJob>,
    mut receiver: mpsc::UnboundedReceiver<PurgeJobSpec>,
    stats: Arc<QueueStats>,
) {
    let mut running = JoinSet::new();

    loop {
        tokio::select! {
            received = receiver.recv() => {
                let Some(spec) = received else { break };
                let job = Arc::clone(&job);
                let stats = Arc::clone(&stats);
                running.spawn(async move {
                    let wait = schedule::time_until(spec.release_at, Utc::now());
                    if !wait.is_zero() {
                        debug!("Delaying purge job by {:?}", wait);
                        tokio::time::sleep(wait).await;
                    }
                    run_one(&job, &spec, &stats).await;
                });
            }
            Some(finished) = running.join_next(), if !running.is_empty() => {
                if let Err(e) = finished {
                    warn!("Queued purge job task failed: {}", e);
                    stats.finish(false);
                }
            }
        }
    }

    while let Some(finished) = running.join_next().await {
        if let Err(e) = finished {
            warn!("Queued purge job task failed: {}", e);
            stats.finish(false);
        }
    }
    info!("Purge queue drained");
}

async fn run_one(job: &PurgeJob, spec: &PurgeJobSpec, stats: &QueueStats) {
    match job.run(spec).await {
        Ok(true) => stats.finish(true),
        Ok(false) => {
            warn!("Queued purge job for {:?} finished with failures", spec.backend);
            stats.finish(false);
        }
        Err(e) => {
            warn!("Queued purge job for {:?} could not run: {}", spec.backend, e);
            stats.finish(false);
        }
    }
}
