//! Integration tests for the API client against a scripted transport

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use portfolio_sync::api::{ApiError, ConfigError, TransportErrorKind};
use portfolio_sync::sync::ClientConfig;
use portfolio_sync::QueryParams;

use crate::support::{client, client_with_key, FakeTransport, Reply, TEST_KEY};

fn limit_50() -> QueryParams {
    let mut params = QueryParams::new();
    params.insert("limit".to_string(), "50".to_string());
    params
}

#[tokio::test(start_paused = true)]
async fn test_pages_are_concatenated_in_order() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({"items": [{"id": "a"}, {"id": "b"}], "nextPagePath": "/p2"})))
        .reply(Reply::json(json!({"items": [{"id": "c"}], "nextPagePath": null})))
        .shared();
    let client = client(Arc::clone(&transport));

    let items = client
        .fetch_all_pages("TRANSACTIONS", "/history/transactions", &limit_50())
        .await
        .unwrap();

    assert_eq!(items, vec![json!({"id": "a"}), json!({"id": "b"}), json!({"id": "c"})]);
    let calls = transport.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(
        calls[0].url,
        "https://demo.trading212.com/api/v0/history/transactions?limit=50"
    );
    assert_eq!(calls[1].url, "https://demo.trading212.com/api/v0/p2");
}

#[tokio::test(start_paused = true)]
async fn test_next_page_path_with_api_prefix() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({
            "items": [{"id": 1}],
            "nextPagePath": "/api/v0/equity/history/orders?limit=50&cursor=1712"
        })))
        .reply(Reply::json(json!({"items": [], "nextPagePath": null})))
        .shared();
    let client = client(Arc::clone(&transport));

    let items = client
        .fetch_all_pages("ORDERS", "/equity/history/orders", &limit_50())
        .await
        .unwrap();

    assert_eq!(items.len(), 1);
    assert_eq!(
        transport.calls()[1].url,
        "https://demo.trading212.com/api/v0/equity/history/orders?limit=50&cursor=1712"
    );
}

#[tokio::test(start_paused = true)]
async fn test_page_failure_discards_partial_results() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({"items": [{"id": "a"}, {"id": "b"}], "nextPagePath": "/p2"})))
        .reply(Reply::status(403))
        .shared();
    let client = client(Arc::clone(&transport));

    let result = client
        .fetch_all_pages("TRANSACTIONS", "/history/transactions", &limit_50())
        .await;

    match result {
        Err(ApiError::ClientRequest { status, attempts, .. }) => {
            assert_eq!(status, 403);
            assert_eq!(attempts, 1);
        }
        other => panic!("expected a client request error, got {other:?}"),
    }
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_404_is_not_retried() {
    let transport = FakeTransport::new().reply(Reply::status(404)).shared();
    let client = client(Arc::clone(&transport));

    let err = client
        .get("PIES", "/equity/pies/999", &QueryParams::new())
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::ClientRequest { status: 404, attempts: 1, .. }));
    assert_eq!(err.kind(), "client_request");
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_requests_carry_credential_and_accept_headers() {
    let transport = FakeTransport::new().reply(Reply::json(json!({"id": 7}))).shared();
    let client = client(Arc::clone(&transport));

    client
        .get("ACCOUNT_INFO", "/equity/account/info", &QueryParams::new())
        .await
        .unwrap();

    let call = &transport.calls()[0];
    assert_eq!(call.header("Authorization"), Some(TEST_KEY));
    assert_eq!(call.header("Accept"), Some("application/json"));
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_skips_transport_until_ttl_expires() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({"free": 10})))
        .reply(Reply::json(json!({"free": 20})))
        .shared();
    let client = client(Arc::clone(&transport));
    let params = QueryParams::new();

    let first = client.get("ACCOUNT_CASH", "/equity/account/cash", &params).await.unwrap();
    let second = client.get("ACCOUNT_CASH", "/equity/account/cash", &params).await.unwrap();
    assert_eq!(first, json!({"free": 10}));
    assert_eq!(second, first);
    assert_eq!(transport.call_count(), 1);

    tokio::time::advance(Duration::from_secs(6)).await;
    let third = client.get("ACCOUNT_CASH", "/equity/account/cash", &params).await.unwrap();
    assert_eq!(third, json!({"free": 20}));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_disabled_cache_always_fetches() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({"free": 10})))
        .reply(Reply::json(json!({"free": 20})))
        .shared();
    let client =
        client(Arc::clone(&transport)).with_config(ClientConfig::default().with_cache(false));

    client.get("ACCOUNT_CASH", "/equity/account/cash", &QueryParams::new()).await.unwrap();
    let second = client
        .get("ACCOUNT_CASH", "/equity/account/cash", &QueryParams::new())
        .await
        .unwrap();

    assert_eq!(second, json!({"free": 20}));
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_missing_credential_makes_no_request() {
    let transport = FakeTransport::new().reply(Reply::json(json!({}))).shared();
    let client = client_with_key(Arc::clone(&transport), "   ");

    let err = client
        .get("PIES", "/equity/pies", &QueryParams::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Configuration(ConfigError::MissingCredential(_))
    ));
    assert_eq!(err.kind(), "missing_credential");
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_endpoint_makes_no_request() {
    let transport = FakeTransport::new().shared();
    let client = client(Arc::clone(&transport));

    let err = client
        .get("WATCHLIST", "/equity/watchlist", &QueryParams::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Configuration(ConfigError::UnknownEndpoint(_))
    ));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_wait_above_ceiling_fails_fast() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({"id": 1})))
        .reply(Reply::json(json!({"id": 1})))
        .shared();
    let client = client(Arc::clone(&transport)).with_config(
        ClientConfig::default()
            .with_cache(false)
            .with_max_wait(Duration::from_secs(1)),
    );

    client.get("ACCOUNT_INFO", "/equity/account/info", &QueryParams::new()).await.unwrap();
    let started = Instant::now();
    let err = client
        .get("ACCOUNT_INFO", "/equity/account/info", &QueryParams::new())
        .await
        .unwrap_err();

    match err {
        ApiError::Configuration(ConfigError::WaitExceedsCeiling { wait, ceiling, .. }) => {
            assert_eq!(wait, Duration::from_secs(30));
            assert_eq!(ceiling, Duration::from_secs(1));
        }
        other => panic!("expected ceiling error, got {other:?}"),
    }
    assert_eq!(started.elapsed(), Duration::ZERO);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_seventh_rapid_call_waits_for_window() {
    let mut transport = FakeTransport::new();
    for _ in 0..7 {
        transport = transport.reply(Reply::json(json!({"items": [], "nextPagePath": null})));
    }
    let transport = transport.shared();
    let client = client(Arc::clone(&transport));

    let started = Instant::now();
    for _ in 0..6 {
        client.get("TRANSACTIONS", "/history/transactions", &limit_50()).await.unwrap();
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    client.get("TRANSACTIONS", "/history/transactions", &limit_50()).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(60));
    assert!(started.elapsed() <= Duration::from_millis(60_250));
    assert_eq!(transport.call_count(), 7);
}

#[tokio::test(start_paused = true)]
async fn test_persistent_429_gives_up_after_four_attempts() {
    let mut transport = FakeTransport::new();
    for _ in 0..5 {
        transport = transport.reply(Reply::Status(429, "Too Many Requests".to_string()));
    }
    let transport = transport.shared();
    let client = client(Arc::clone(&transport));

    let err = client
        .get("PORTFOLIO", "/equity/portfolio", &QueryParams::new())
        .await
        .unwrap_err();

    match &err {
        ApiError::RateLimitExceeded { attempts, body, .. } => {
            assert_eq!(*attempts, 4);
            assert_eq!(body, "Too Many Requests");
        }
        other => panic!("expected rate limit error, got {other:?}"),
    }
    assert_eq!(err.status(), Some(429));
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_server_error_retried_then_succeeds() {
    let transport = FakeTransport::new()
        .reply(Reply::status(503))
        .reply(Reply::json(json!({"items": [{"id": 1}], "nextPagePath": null})))
        .shared();
    let client = client(Arc::clone(&transport));

    let started = Instant::now();
    let items = client
        .fetch_all_pages("ORDERS", "/equity/history/orders", &limit_50())
        .await
        .unwrap();

    assert_eq!(items, vec![json!({"id": 1})]);
    assert_eq!(transport.call_count(), 2);
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test(start_paused = true)]
async fn test_transport_failures_exhaust_retries() {
    let mut transport = FakeTransport::new();
    for _ in 0..4 {
        transport = transport.reply(Reply::Fail(TransportErrorKind::Timeout));
    }
    let transport = transport.shared();
    let client = client(Arc::clone(&transport));

    let err = client
        .get("DIVIDENDS", "/history/dividends", &limit_50())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::TransientServer { status: None, attempts: 4, .. }
    ));
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_retry_delay_above_ceiling_fails_fast() {
    let transport = FakeTransport::new()
        .reply(Reply::Status(429, String::new()))
        .shared();
    let client = client(Arc::clone(&transport))
        .with_config(ClientConfig::default().with_max_wait(Duration::from_secs(10)));

    // INSTRUMENTS allows one request per 50s, so the 429 delay exceeds 10s
    let err = client
        .get("INSTRUMENTS", "/equity/metadata/instruments", &QueryParams::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ApiError::Configuration(ConfigError::WaitExceedsCeiling { .. })
    ));
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_invalid_json_body() {
    let transport = FakeTransport::new()
        .reply(Reply::Status(200, "<html>maintenance</html>".to_string()))
        .shared();
    let client = client(Arc::clone(&transport));

    let err = client
        .get("PIES", "/equity/pies", &QueryParams::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_next_page_path_is_a_loop() {
    let transport = FakeTransport::new()
        .reply(Reply::json(json!({"items": [1], "nextPagePath": "/p2"})))
        .reply(Reply::json(json!({"items": [2], "nextPagePath": "/p2"})))
        .shared();
    let client = client(Arc::clone(&transport));

    let err = client
        .fetch_all_pages("DIVIDENDS", "/history/dividends", &limit_50())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::PaginationLoop { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_unpaginated_shapes() {
    let transport = FakeTransport::new()
        .route("/equity/pies", Reply::json(json!([{"id": 1}, {"id": 2}])))
        .route("/equity/account/info", Reply::json(json!({"id": 5, "currencyCode": "GBP"})))
        .route("/equity/portfolio", Reply::Status(200, String::new()))
        .shared();
    let client = client(Arc::clone(&transport));
    let params = QueryParams::new();

    let pies = client.fetch_all_pages("PIES", "/equity/pies", &params).await.unwrap();
    assert_eq!(pies.len(), 2);

    let info = client
        .fetch_all_pages("ACCOUNT_INFO", "/equity/account/info", &params)
        .await
        .unwrap();
    assert_eq!(info, vec![json!({"id": 5, "currencyCode": "GBP"})]);

    let empty = client
        .fetch_all_pages("PORTFOLIO", "/equity/portfolio", &params)
        .await
        .unwrap();
    assert!(empty.is_empty());
}
