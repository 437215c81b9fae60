//! Integration tests for the metrics system

use std::net::SocketAddr;
use std::time::Duration;

use portfolio_sync::metrics::{
    self, generate_correlation_id, HttpRequestMetrics, SyncMetrics,
};

#[tokio::test]
async fn test_metrics_initialization_is_idempotent() {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();

    assert!(metrics::init_metrics(addr).await.is_ok());
    assert!(metrics::init_metrics(addr).await.is_ok());
    assert!(metrics::is_initialized().await);
}

#[test]
fn test_recording_helpers_accept_every_outcome() {
    let request = HttpRequestMetrics::start("ORDERS", 1);
    assert!(request.correlation_id().starts_with("req-"));
    request.record_complete(200);

    HttpRequestMetrics::start("ORDERS", 2).record_complete(429);
    HttpRequestMetrics::start("ORDERS", 3).record_network_error();

    metrics::record_retry_backoff("ORDERS", Duration::from_secs(2), 1);
    metrics::record_rate_limit_wait("ORDERS", Duration::from_millis(250));
    metrics::update_in_window("ORDERS", 6);
    metrics::record_cache_lookup(true);

    let sync = SyncMetrics::start("ORDERS");
    sync.record_success(12);
    SyncMetrics::start("PIES").record_failure("client_request");
}

#[test]
fn test_correlation_ids_are_unique() {
    let ids: std::collections::HashSet<String> =
        (0..100).map(|_| generate_correlation_id()).collect();
    assert_eq!(ids.len(), 100);
}
