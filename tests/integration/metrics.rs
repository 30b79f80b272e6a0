//! Integration tests for the metrics system

use aemet_harvester::metrics::{self, HarvestMetrics, HttpRequestMetrics};
use std::net::SocketAddr;
use std::time::Duration;

#[tokio::test]
async fn test_metrics_initialization_is_idempotent() {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

    assert!(metrics::init_metrics(addr).is_ok());
    assert!(metrics::init_metrics(addr).is_ok());
    assert!(metrics::is_initialized());
}

#[test]
fn test_recording_without_exporter_does_not_panic() {
    let request = HttpRequestMetrics::start("climatology", 1);
    request.record_rate_limited();
    request.record_complete(429);

    metrics::record_retry_backoff(Duration::from_millis(250), 1);

    let unit = HarvestMetrics::start("historical", "3195,3196");
    unit.record_success(42);
    HarvestMetrics::start("forecast", "01001").record_empty();
    HarvestMetrics::start("replay", "url").record_failure("HTTP 500");
}

#[test]
fn test_correlation_ids_are_unique() {
    let a = metrics::generate_correlation_id();
    let b = metrics::generate_correlation_id();
    assert_ne!(a, b);
    assert!(a.starts_with("req-"));
}
