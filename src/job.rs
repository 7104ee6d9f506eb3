//! Purge job orchestration
//!
//! A job resolves the backends to purge, lets each backend build its
//! requests, executes everything concurrently and reduces the outcomes to a
//! single success flag.
//!
//! ```text
//! Created -> Resolving -> Dispatching -> Executing -> Reduced
//! ```
//!
//! Backend setup failures and failed requests are logged and folded into the
//! result. Only a breakdown of the executor is returned as an error.

use crate::config::{ConfigChanges, PurgeConfig};
use crate::error::Result;
use crate::executor::PurgeExecutor;
use crate::models::{BackendId, ExecutionOutcome, PurgeJobSpec, PurgeRequest};
use crate::normalizer;
use crate::purge_metrics::PurgeMetrics;
use crate::registry::BackendRegistry;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Pre-flight hook run once per backend before its requests are built
///
/// Returns the (possibly modified) URLs to purge, or `None` to skip the
/// backend. Skipping is not a failure.
pub type BackendFilter = Arc<dyn Fn(&BackendId, Vec<String>) -> Option<Vec<String>> + Send + Sync>;

/// Lifecycle of a single job invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Created,
    Resolving,
    Dispatching,
    Executing,
    Reduced,
}

/// Requests gathered during dispatch
#[derive(Debug, Default)]
pub struct PurgePlan {
    /// Backends in dispatch order
    pub order: Vec<BackendId>,
    /// Backends that contributed no requests
    pub skipped: Vec<BackendId>,
    pub requests: Vec<PurgeRequest>,
}

/// Configuration and executor swapped together on reload
#[derive(Clone)]
struct JobRuntime {
    config: Arc<PurgeConfig>,
    executor: PurgeExecutor,
}

/// The purge orchestrator
pub struct PurgeJob {
    runtime: RwLock<JobRuntime>,
    filter: Option<BackendFilter>,
    metrics: Option<Arc<PurgeMetrics>>,
}

impl PurgeJob {
    /// Create a job with an HTTP executor built from `config`
    pub fn new(config: Arc<PurgeConfig>) -> Result<Self> {
        let executor = PurgeExecutor::new(&config)?;
        Ok(Self::with_executor(config, executor))
    }

    pub fn with_executor(config: Arc<PurgeConfig>, executor: PurgeExecutor) -> Self {
        PurgeJob {
            runtime: RwLock::new(JobRuntime { config, executor }),
            filter: None,
            metrics: None,
        }
    }

    /// Install a per-backend pre-flight filter
    pub fn with_filter(mut self, filter: BackendFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Enable Prometheus metrics
    pub fn with_metrics(mut self, metrics: Arc<PurgeMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Configuration currently in effect
    pub fn config(&self) -> Arc<PurgeConfig> {
        Arc::clone(&self.snapshot().config)
    }

    fn snapshot(&self) -> JobRuntime {
        self.runtime
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a new configuration to subsequent runs
    ///
    /// Runs already in progress keep the configuration they started with.
    /// The HTTP executor is rebuilt only when client settings changed. An
    /// invalid configuration is rejected and the current one kept.
    pub fn reload(&self, new_config: &PurgeConfig) -> Result<ConfigChanges> {
        let mut runtime = self.runtime.write().unwrap_or_else(PoisonError::into_inner);

        let mut config = PurgeConfig::clone(&runtime.config);
        let changes = config.update_from(new_config)?;
        if !changes.has_changes() {
            return Ok(changes);
        }

        if changes.requires_client_rebuild() {
            runtime.executor = PurgeExecutor::new(&config)?;
        }
        runtime.config = Arc::new(config);
        info!("Purge configuration reloaded: {}", changes.summary().join(", "));
        Ok(changes)
    }

    /// Reload the configuration from a YAML file
    pub fn reload_from_file<P: AsRef<Path>>(&self, path: P) -> Result<ConfigChanges> {
        let new_config = PurgeConfig::from_file(path)?;
        self.reload(&new_config)
    }

    /// Backends the job will dispatch to
    pub fn resolve(&self, spec: &PurgeJobSpec) -> Vec<BackendId> {
        resolve_with(&self.config(), spec)
    }

    /// Resolve backends and build every request without performing I/O
    ///
    /// A fresh registry is used per call, so each backend is constructed at
    /// most once per invocation.
    pub fn plan(&self, spec: &PurgeJobSpec) -> PurgePlan {
        self.plan_with_state(&self.config(), spec, &mut JobState::Created)
    }

    fn plan_with_state(
        &self,
        config: &Arc<PurgeConfig>,
        spec: &PurgeJobSpec,
        state: &mut JobState,
    ) -> PurgePlan {
        advance(state, JobState::Resolving);

        let urls = normalizer::normalize(&spec.urls);
        let mut plan = PurgePlan {
            order: resolve_with(config, spec),
            ..PurgePlan::default()
        };
        if plan.order.is_empty() || urls.is_empty() {
            debug!("Nothing to purge: {} backends, {} urls", plan.order.len(), urls.len());
            return plan;
        }
        info!(
            "Purging {} urls via [{}]",
            urls.len(),
            plan.order.iter().map(BackendId::as_str).collect::<Vec<_>>().join(", ")
        );

        advance(state, JobState::Dispatching);
        let mut registry = BackendRegistry::new(Arc::clone(config));

        for backend in &plan.order {
            let urls = match &self.filter {
                Some(filter) => match filter(backend, urls.clone()) {
                    Some(filtered) => normalizer::normalize(filtered),
                    None => {
                        debug!("Backend {} skipped by filter", backend);
                        self.record_skipped(backend, "filtered");
                        plan.skipped.push(backend.clone());
                        continue;
                    }
                },
                None => urls.clone(),
            };

            if urls.is_empty() {
                plan.skipped.push(backend.clone());
                continue;
            }

            let requests = match registry.get(backend) {
                Ok(instance) => instance.build_requests(&urls),
                Err(e) => {
                    warn!("Could not instantiate purge backend {}: {}", backend, e);
                    self.record_skipped(backend, "unavailable");
                    plan.skipped.push(backend.clone());
                    continue;
                }
            };

            debug!("Backend {} built {} requests", backend, requests.len());
            if let Some(metrics) = &self.metrics {
                metrics.record_requests(backend.as_str(), requests.len());
            }
            plan.requests.extend(requests);
        }

        plan
    }

    /// Run the job
    ///
    /// Returns `Ok(true)` when every request succeeded (or nothing needed
    /// purging), `Ok(false)` when at least one failed, and `Err` only if the
    /// executor could not run.
    pub async fn run(&self, spec: &PurgeJobSpec) -> Result<bool> {
        let start_time = Instant::now();
        let runtime = self.snapshot();
        let mut state = JobState::Created;
        let plan = self.plan_with_state(&runtime.config, spec, &mut state);

        advance(&mut state, JobState::Executing);
        info!("Calling {} purge urls", plan.requests.len());

        let outcomes = match runtime.executor.execute(plan.requests).await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                warn!("Purge execution failed: {}", e);
                if let Some(metrics) = &self.metrics {
                    metrics.record_job("error", start_time.elapsed().as_secs_f64());
                }
                return Err(e);
            }
        };

        advance(&mut state, JobState::Reduced);
        if let Some(metrics) = &self.metrics {
            for outcome in &outcomes {
                metrics.record_outcome(outcome.backend.as_str(), outcome.is_success());
            }
        }

        let success = reduce(&outcomes);
        if let Some(metrics) = &self.metrics {
            let result = if success { "success" } else { "failure" };
            metrics.record_job(result, start_time.elapsed().as_secs_f64());
        }
        Ok(success)
    }

    fn record_skipped(&self, backend: &BackendId, reason: &str) {
        if let Some(metrics) = &self.metrics {
            metrics.record_skipped(backend.as_str(), reason);
        }
    }
}

fn resolve_with(config: &Arc<PurgeConfig>, spec: &PurgeJobSpec) -> Vec<BackendId> {
    match &spec.backend {
        Some(backend) => vec![backend.clone()],
        None => BackendRegistry::new(Arc::clone(config)).resolve(),
    }
}

fn advance(state: &mut JobState, next: JobState) {
    debug!("Purge job {:?} -> {:?}", state, next);
    *state = next;
}

/// Reduce outcomes to a single success flag
///
/// True iff every outcome is a 2xx response; an empty list is a success.
/// Failures are logged with the offending URL and body or error text.
pub fn reduce(outcomes: &[ExecutionOutcome]) -> bool {
    outcomes.iter().fold(true, |all_good, outcome| {
        if !outcome.is_success() {
            match outcome.status {
                Some(status) => warn!(
                    "Purge via {} failed for {} with status {}: {}",
                    outcome.backend, outcome.url, status, outcome.body
                ),
                None => warn!(
                    "Purge via {} failed for {}: {}",
                    outcome.backend, outcome.url, outcome.body
                ),
            }
        }
        all_good && outcome.is_success()
    })
}
