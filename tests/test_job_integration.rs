//! End-to-end purge jobs against mock Cloudflare and Varnish servers

use multipurge::config::PurgeConfig;
use multipurge::executor::PurgeExecutor;
use multipurge::job::PurgeJob;
use multipurge::models::{BackendId, PurgeJobSpec};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = "https://wiki.example.org/wiki/Main_Page";

fn config(cloudflare: &MockServer, varnish: &[&MockServer]) -> PurgeConfig {
    let mut config = PurgeConfig::default();
    config.enabled_services = vec!["cloudflare".to_string(), "varnish".to_string()];
    config.service_order = vec!["varnish".to_string(), "cloudflare".to_string()];
    config.cloudflare.zone_id = Some("zone123".to_string());
    config.cloudflare.api_token = Some("secret-token".to_string());
    config.cloudflare.api_base_url = cloudflare.uri();
    config.varnish.servers = varnish.iter().map(|s| s.uri()).collect();
    config.varnish.host = Some("wiki.example.org".to_string());
    config.request_timeout_secs = 2;
    config
}

async fn mount_cloudflare(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/zones/zone123/purge_cache"))
        .and(bearer_token("secret-token"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(status).set_body_json(json!({"success": status == 200})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

async fn mount_varnish(server: &MockServer, status: u16, expected_calls: u64) {
    Mock::given(method("PURGE"))
        .and(path("/wiki/Main_Page"))
        .and(header("host", "wiki.example.org"))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_purge_all_backends_success() {
    let cloudflare = MockServer::start().await;
    let varnish = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/zones/zone123/purge_cache"))
        .and(body_json(json!({"files": [PAGE]})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&cloudflare)
        .await;
    mount_varnish(&varnish, 200, 1).await;

    let job = PurgeJob::new(Arc::new(config(&cloudflare, &[&varnish]))).unwrap();
    let spec = PurgeJobSpec::new([PAGE]);

    let plan = job.plan(&spec);
    assert_eq!(plan.order, vec![BackendId::Varnish, BackendId::Cloudflare]);
    assert_eq!(plan.requests.len(), 2);

    assert!(job.run(&spec).await.unwrap());
}

#[tokio::test]
async fn test_every_varnish_server_is_purged() {
    let cloudflare = MockServer::start().await;
    let varnish_a = MockServer::start().await;
    let varnish_b = MockServer::start().await;

    mount_cloudflare(&cloudflare, 200, 1).await;
    mount_varnish(&varnish_a, 200, 1).await;
    mount_varnish(&varnish_b, 204, 1).await;

    let job = PurgeJob::new(Arc::new(config(&cloudflare, &[&varnish_a, &varnish_b]))).unwrap();
    assert!(job.run(&PurgeJobSpec::new([PAGE, PAGE])).await.unwrap());
}

#[tokio::test]
async fn test_cloudflare_error_fails_job_but_varnish_still_purged() {
    let cloudflare = MockServer::start().await;
    let varnish = MockServer::start().await;

    mount_cloudflare(&cloudflare, 500, 1).await;
    mount_varnish(&varnish, 200, 1).await;

    let job = PurgeJob::new(Arc::new(config(&cloudflare, &[&varnish]))).unwrap();
    assert!(!job.run(&PurgeJobSpec::new([PAGE])).await.unwrap());
}

#[tokio::test]
async fn test_unreachable_server_is_a_failed_outcome() {
    let cloudflare = MockServer::start().await;
    let varnish = MockServer::start().await;
    mount_cloudflare(&cloudflare, 200, 1).await;
    mount_varnish(&varnish, 200, 1).await;

    let dead = std::net::TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap();
    let mut config = config(&cloudflare, &[&varnish]);
    config.varnish.servers.push(format!("http://{}", dead));

    let job = PurgeJob::new(Arc::new(config)).unwrap();
    assert!(!job.run(&PurgeJobSpec::new([PAGE])).await.unwrap());
}

async fn mount_slow_varnish(server: &MockServer, delay: Duration) {
    Mock::given(method("PURGE"))
        .and(path("/wiki/Main_Page"))
        .respond_with(ResponseTemplate::new(200).set_delay(delay))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_slow_server_times_out_without_blocking_siblings() {
    let cloudflare = MockServer::start().await;
    let varnish = MockServer::start().await;
    let slow = MockServer::start().await;
    mount_cloudflare(&cloudflare, 200, 1).await;
    mount_varnish(&varnish, 200, 1).await;
    mount_slow_varnish(&slow, Duration::from_secs(3)).await;

    let mut config = config(&cloudflare, &[&varnish, &slow]);
    config.request_timeout_secs = 1;

    let job = PurgeJob::new(Arc::new(config)).unwrap();
    assert!(!job.run(&PurgeJobSpec::new([PAGE])).await.unwrap());
}

#[tokio::test]
async fn test_timed_out_request_is_reported_as_transport_failure() {
    let cloudflare = MockServer::start().await;
    let slow = MockServer::start().await;
    mount_cloudflare(&cloudflare, 200, 1).await;
    mount_slow_varnish(&slow, Duration::from_secs(3)).await;

    let mut config = config(&cloudflare, &[&slow]);
    config.request_timeout_secs = 1;
    let executor = PurgeExecutor::new(&config).unwrap();
    let job = PurgeJob::new(Arc::new(config)).unwrap();

    let plan = job.plan(&PurgeJobSpec::new([PAGE]));
    let outcomes = executor.execute(plan.requests).await.unwrap();
    assert_eq!(outcomes.len(), 2);

    let varnish = outcomes.iter().find(|o| o.backend == BackendId::Varnish).unwrap();
    assert!(varnish.is_transport_failure());
    assert!(varnish.body.contains("timed out"));

    let cloudflare = outcomes.iter().find(|o| o.backend == BackendId::Cloudflare).unwrap();
    assert_eq!(cloudflare.status, Some(200));
}

#[tokio::test]
async fn test_single_backend_job_only_touches_that_backend() {
    let cloudflare = MockServer::start().await;
    let varnish = MockServer::start().await;

    mount_cloudflare(&cloudflare, 200, 0).await;
    mount_varnish(&varnish, 200, 1).await;

    let job = PurgeJob::new(Arc::new(config(&cloudflare, &[&varnish]))).unwrap();
    let spec = PurgeJobSpec::new([PAGE]).for_backend(BackendId::Varnish);
    assert!(job.run(&spec).await.unwrap());
}

#[tokio::test]
async fn test_cloudflare_batches_over_the_wire() {
    let cloudflare = MockServer::start().await;
    mount_cloudflare(&cloudflare, 200, 3).await;

    let mut config = PurgeConfig::default();
    config.enabled_services = vec!["cloudflare".to_string()];
    config.cloudflare.zone_id = Some("zone123".to_string());
    config.cloudflare.api_token = Some("secret-token".to_string());
    config.cloudflare.api_base_url = cloudflare.uri();

    let urls: Vec<String> = (0..61).map(|i| format!("http://wiki.example.org/{}", i)).collect();
    let job = PurgeJob::new(Arc::new(config)).unwrap();
    assert!(job.run(&PurgeJobSpec::new(&urls)).await.unwrap());
}

#[tokio::test]
async fn test_missing_credentials_skip_cloudflare() {
    let cloudflare = MockServer::start().await;
    let varnish = MockServer::start().await;

    mount_cloudflare(&cloudflare, 200, 0).await;
    mount_varnish(&varnish, 200, 1).await;

    let mut config = config(&cloudflare, &[&varnish]);
    config.cloudflare.api_token = None;

    let job = PurgeJob::new(Arc::new(config)).unwrap();
    assert!(job.run(&PurgeJobSpec::new([PAGE])).await.unwrap());
}
