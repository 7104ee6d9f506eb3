//! Error classification and degradation behavior

use multipurge::config::PurgeConfig;
use multipurge::error::PurgeError;
use multipurge::job::PurgeJob;
use multipurge::models::{BackendId, PurgeJobSpec};
use multipurge::registry::BackendRegistry;
use std::sync::Arc;

#[test]
fn test_error_display_messages() {
    let err = PurgeError::UnknownBackend("fastly".to_string());
    assert_eq!(err.to_string(), "Purge backend \"fastly\" not recognized");

    let err = PurgeError::transport("http://10.0.0.1/a", "connection refused");
    assert!(err.to_string().contains("http://10.0.0.1/a"));
    assert!(err.to_string().contains("connection refused"));
}

#[test]
fn test_recoverable_errors() {
    assert!(PurgeError::ConfigError("x".to_string()).is_recoverable());
    assert!(PurgeError::UnknownBackend("x".to_string()).is_recoverable());
    assert!(PurgeError::transport("u", "x").is_recoverable());
    assert!(!PurgeError::ExecutorFailure("x".to_string()).is_recoverable());
    assert!(!PurgeError::QueueError("x".to_string()).is_recoverable());
}

#[test]
fn test_http_status_mapping() {
    assert_eq!(PurgeError::InvalidRequest("x".to_string()).to_http_status(), 400);
    assert_eq!(PurgeError::ParseError("x".to_string()).to_http_status(), 400);
    assert_eq!(PurgeError::transport("u", "x").to_http_status(), 502);
    assert_eq!(PurgeError::ExecutorFailure("x".to_string()).to_http_status(), 500);
    assert_eq!(PurgeError::QueueError("x".to_string()).to_http_status(), 503);
}

#[test]
fn test_io_error_conversion() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: PurgeError = io.into();
    assert!(matches!(err, PurgeError::IoError(_)));
}

#[test]
fn test_registry_errors() {
    let mut registry = BackendRegistry::new(Arc::new(PurgeConfig::default()));

    let err = registry.get(&BackendId::normalize("fastly")).err().unwrap();
    assert!(matches!(err, PurgeError::UnknownBackend(ref name) if name == "fastly"));

    // No credentials or servers configured
    let err = registry.get(&BackendId::Cloudflare).err().unwrap();
    assert!(matches!(err, PurgeError::ConfigError(_)));
    let err = registry.get(&BackendId::Varnish).err().unwrap();
    assert!(matches!(err, PurgeError::ConfigError(_)));
    assert_eq!(registry.constructed(), 0);
}

#[test]
fn test_job_degrades_when_every_backend_is_misconfigured() {
    let mut config = PurgeConfig::default();
    config.enabled_services = vec!["cloudflare".to_string(), "varnish".to_string()];
    let job = PurgeJob::new(Arc::new(config)).unwrap();

    let spec = PurgeJobSpec::new(["https://wiki.example.org/a"]);
    let plan = job.plan(&spec);
    assert_eq!(plan.skipped, vec![BackendId::Cloudflare, BackendId::Varnish]);
    assert!(plan.requests.is_empty());

    // Nothing was sent, so nothing failed
    assert!(tokio_test::block_on(job.run(&spec)).unwrap());
}
