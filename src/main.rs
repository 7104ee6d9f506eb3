//! Multipurge server
//!
//! Loads configuration, sets up logging and either purges the URLs given on
//! the command line or serves the trigger endpoint. While serving, SIGHUP
//! reloads the configuration file.

use anyhow::Context;
use multipurge::{
    JobQueue, LocalJobQueue, PurgeConfig, PurgeDispatcher, PurgeEndpoint, PurgeJob, PurgeMetrics,
};
use std::env;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// # Usage
/// ```bash
/// # Serve the trigger endpoint with the default config (multipurge.yaml)
/// multipurge
///
/// # Purge URLs once and exit
/// multipurge /etc/multipurge.yaml https://wiki.example.org/wiki/Main_Page
/// ```
#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_line_number(true)
        .init();

    match run().await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    }
}

async fn run() -> anyhow::Result<bool> {
    let mut args = env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "multipurge.yaml".to_string());
    let urls: Vec<String> = args.collect();

    info!("Loading configuration from: {}", config_path);
    let config = PurgeConfig::from_file(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path))?;
    info!("Configuration loaded successfully");
    info!("  - Enabled services: {:?}", config.enabled_services);
    info!("  - Service order: {:?}", config.service_order);
    info!("  - Varnish servers: {}", config.varnish.servers.len());
    info!("  - Max concurrent requests: {}", config.max_concurrent_requests);
    info!("  - Run in queue: {}", config.run_in_queue);

    let config = Arc::new(config);
    let metrics = PurgeMetrics::new().context("failed to register metrics")?;
    let job = PurgeJob::new(Arc::clone(&config))
        .context("failed to create purge job")?
        .with_metrics(Arc::new(metrics));
    let job = Arc::new(job);

    if !urls.is_empty() {
        return purge_once(job, urls).await;
    }

    let Some(endpoint_config) = config.endpoint.as_ref().filter(|e| e.enabled) else {
        warn!("No URLs given and the trigger endpoint is disabled, nothing to do");
        return Ok(true);
    };
    let addr = endpoint_config.socket_addr()?;

    let mut dispatcher = PurgeDispatcher::new(Arc::clone(&job));
    let mut queue_stats = None;
    if config.run_in_queue {
        let queue = LocalJobQueue::start(Arc::clone(&job));
        queue_stats = Some(queue.stats());
        let queue: Arc<dyn JobQueue> = Arc::new(queue);
        dispatcher = dispatcher.with_queue(queue);
    }
    let endpoint = PurgeEndpoint::new(Arc::new(dispatcher), addr);
    let server = endpoint.start();
    tokio::pin!(server);

    let mut hangup = signal(SignalKind::hangup()).context("failed to listen for SIGHUP")?;
    loop {
        tokio::select! {
            result = &mut server => {
                result.context("trigger endpoint stopped")?;
                break;
            }
            _ = hangup.recv() => {
                info!("Reloading configuration from: {}", config_path);
                match job.reload_from_file(&config_path) {
                    Ok(changes) if !changes.has_changes() => info!("Configuration unchanged"),
                    Ok(changes) if changes.endpoint_changed => {
                        warn!("Endpoint settings changed, restart to apply them");
                    }
                    Ok(_) => {}
                    Err(e) => warn!("Configuration reload failed, keeping current settings: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    if let Some(stats) = queue_stats {
        let pending = stats.pending();
        if pending > 0 {
            warn!("Dropping {} queued purge jobs that have not run yet", pending);
        }
    }
    Ok(true)
}

async fn purge_once(job: Arc<PurgeJob>, urls: Vec<String>) -> anyhow::Result<bool> {
    if !job.config().run_in_queue {
        let report = PurgeDispatcher::new(job).purge(&urls).await?;
        info!(
            "Purge finished: {} succeeded, {} failed",
            report.succeeded, report.failed
        );
        return Ok(report.is_success());
    }

    let queue = Arc::new(LocalJobQueue::start(Arc::clone(&job)));
    let dispatcher = PurgeDispatcher::new(job).with_queue(queue.clone());
    let report = dispatcher.purge(&urls).await?;
    info!("Queued {} purge jobs, waiting for release", report.queued);

    drop(dispatcher);
    let queue = Arc::try_unwrap(queue)
        .map_err(|_| anyhow::anyhow!("purge queue is still shared"))?;
    let stats = queue.shutdown().await?;
    info!(
        "Purge finished: {} succeeded, {} failed",
        stats.succeeded(),
        stats.failed()
    );
    Ok(stats.failed() == 0)
}
