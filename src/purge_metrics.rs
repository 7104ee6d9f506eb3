//! Prometheus metrics for purge jobs

use prometheus::{
    register_counter_vec, register_histogram_vec, CounterVec, HistogramOpts, HistogramVec, Opts,
    Registry,
};
use std::sync::Arc;

const DURATION_BUCKETS: &[f64] = &[0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0];

/// Metrics for purge operations
#[derive(Clone)]
pub struct PurgeMetrics {
    /// Jobs by result (success/failure/error)
    pub purge_jobs_total: Arc<CounterVec>,

    /// Outbound purge requests built, by backend
    pub purge_requests_total: Arc<CounterVec>,

    /// Outbound purge requests by backend and result
    pub purge_requests_by_result: Arc<CounterVec>,

    /// Backends skipped by a filter or failing to set up
    pub purge_backends_skipped_total: Arc<CounterVec>,

    /// Duration of whole purge jobs
    pub purge_job_duration_seconds: Arc<HistogramVec>,
}

impl PurgeMetrics {
    /// Create metrics registered on the default registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let purge_jobs_total = register_counter_vec!(
            "multipurge_jobs_total",
            "Total number of purge jobs run",
            &["result"] // result: success, failure, error
        )?;

        let purge_requests_total = register_counter_vec!(
            "multipurge_requests_total",
            "Total number of purge requests issued",
            &["backend"]
        )?;

        let purge_requests_by_result = register_counter_vec!(
            "multipurge_requests_by_result",
            "Total number of purge requests by result",
            &["backend", "result"]
        )?;

        let purge_backends_skipped_total = register_counter_vec!(
            "multipurge_backends_skipped_total",
            "Total number of backends skipped during dispatch",
            &["backend", "reason"] // reason: filtered, unavailable
        )?;

        let purge_job_duration_seconds = register_histogram_vec!(
            "multipurge_job_duration_seconds",
            "Duration of purge jobs in seconds",
            &["result"],
            DURATION_BUCKETS.to_vec()
        )?;

        Ok(Self {
            purge_jobs_total: Arc::new(purge_jobs_total),
            purge_requests_total: Arc::new(purge_requests_total),
            purge_requests_by_result: Arc::new(purge_requests_by_result),
            purge_backends_skipped_total: Arc::new(purge_backends_skipped_total),
            purge_job_duration_seconds: Arc::new(purge_job_duration_seconds),
        })
    }

    /// Create metrics with custom registry
    pub fn with_registry(registry: &Registry) -> Result<Self, prometheus::Error> {
        let purge_jobs_total = CounterVec::new(
            Opts::new("multipurge_jobs_total", "Total number of purge jobs run"),
            &["result"],
        )?;
        registry.register(Box::new(purge_jobs_total.clone()))?;

        let purge_requests_total = CounterVec::new(
            Opts::new(
                "multipurge_requests_total",
                "Total number of purge requests issued",
            ),
            &["backend"],
        )?;
        registry.register(Box::new(purge_requests_total.clone()))?;

        let purge_requests_by_result = CounterVec::new(
            Opts::new(
                "multipurge_requests_by_result",
                "Total number of purge requests by result",
            ),
            &["backend", "result"],
        )?;
        registry.register(Box::new(purge_requests_by_result.clone()))?;

        let purge_backends_skipped_total = CounterVec::new(
            Opts::new(
                "multipurge_backends_skipped_total",
                "Total number of backends skipped during dispatch",
            ),
            &["backend", "reason"],
        )?;
        registry.register(Box::new(purge_backends_skipped_total.clone()))?;

        let purge_job_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "multipurge_job_duration_seconds",
                "Duration of purge jobs in seconds",
            )
            .buckets(DURATION_BUCKETS.to_vec()),
            &["result"],
        )?;
        registry.register(Box::new(purge_job_duration_seconds.clone()))?;

        Ok(Self {
            purge_jobs_total: Arc::new(purge_jobs_total),
            purge_requests_total: Arc::new(purge_requests_total),
            purge_requests_by_result: Arc::new(purge_requests_by_result),
            purge_backends_skipped_total: Arc::new(purge_backends_skipped_total),
            purge_job_duration_seconds: Arc::new(purge_job_duration_seconds),
        })
    }

    /// Record a finished job
    ///
    /// `result` is `"success"`, `"failure"` (some purge failed) or `"error"`
    /// (the executor broke down).
    pub fn record_job(&self, result: &str, duration_secs: f64) {
        self.purge_jobs_total.with_label_values(&[result]).inc();
        self.purge_job_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    /// Record requests built for a backend
    pub fn record_requests(&self, backend: &str, count: usize) {
        self.purge_requests_total
            .with_label_values(&[backend])
            .inc_by(count as f64);
    }

    /// Record the outcome of one request
    pub fn record_outcome(&self, backend: &str, success: bool) {
        let result = if success { "success" } else { "failure" };
        self.purge_requests_by_result
            .with_label_values(&[backend, result])
            .inc();
    }

    /// Record a backend that contributed no requests
    pub fn record_skipped(&self, backend: &str, reason: &str) {
        self.purge_backends_skipped_total
            .with_label_values(&[backend, reason])
            .inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_registry() {
        let registry = Registry::new();
        let metrics = PurgeMetrics::with_registry(&registry).unwrap();

        metrics.record_job("success", 0.2);
        metrics.record_requests("varnish", 4);
        metrics.record_outcome("varnish", true);
        metrics.record_outcome("varnish", false);
        metrics.record_skipped("cloudflare", "unavailable");

        assert_eq!(metrics.purge_jobs_total.with_label_values(&["success"]).get(), 1.0);
        assert_eq!(metrics.purge_requests_total.with_label_values(&["varnish"]).get(), 4.0);
        assert_eq!(
            metrics
                .purge_requests_by_result
                .with_label_values(&["varnish", "failure"])
                .get(),
            1.0
        );

        let families = registry.gather();
        assert!(families.iter().any(|f| f.get_name() == "multipurge_jobs_total"));
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = Registry::new();
        PurgeMetrics::with_registry(&registry).unwrap();
        assert!(PurgeMetrics::with_registry(&registry).is_err());
    }
}
