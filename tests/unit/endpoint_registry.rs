//! Unit tests for the endpoint registry

use std::io::Write;
use std::time::Duration;

use portfolio_sync::registry::{EndpointRegistry, RegistryError};
use portfolio_sync::{EndpointDescriptor, RateLimit};

#[test]
fn test_embedded_registry_has_documented_limits() {
    let registry = EndpointRegistry::load_embedded().unwrap();

    let expected = [
        ("ACCOUNT_CASH", RateLimit::new(1, 2_000)),
        ("ACCOUNT_INFO", RateLimit::new(1, 30_000)),
        ("PIES", RateLimit::new(1, 30_000)),
        ("PORTFOLIO", RateLimit::new(1, 5_000)),
        ("INSTRUMENTS", RateLimit::new(1, 50_000)),
        ("ORDERS", RateLimit::new(6, 60_000)),
        ("DIVIDENDS", RateLimit::new(6, 60_000)),
        ("TRANSACTIONS", RateLimit::new(6, 60_000)),
    ];
    for (key, limit) in expected {
        assert_eq!(registry.require(key).unwrap().rate_limit, limit, "{key}");
    }
    assert_eq!(registry.keys().len(), expected.len());
}

#[test]
fn test_paginated_endpoints_are_not_cached() {
    let registry = EndpointRegistry::load_embedded().unwrap();
    for descriptor in registry.descriptors() {
        if descriptor.paginated {
            assert_eq!(descriptor.cache_ttl(), None, "{}", descriptor.key);
            assert_eq!(
                descriptor.default_query.get("limit").map(String::as_str),
                Some("50")
            );
        }
    }
    assert_eq!(
        registry.get("account_cash").unwrap().cache_ttl(),
        Some(Duration::from_secs(5))
    );
}

#[test]
fn test_unknown_key() {
    let registry = EndpointRegistry::load_embedded().unwrap();
    assert!(registry.get("WATCHLIST").is_none());
    assert!(matches!(registry.require("WATCHLIST"), Err(RegistryError::NotFound(_))));
}

#[test]
fn test_duplicate_keys_rejected_case_insensitively() {
    let result = EndpointRegistry::from_descriptors(
        "1.0.0",
        vec![
            EndpointDescriptor::new("PIES", "/equity/pies", RateLimit::new(1, 30_000)),
            EndpointDescriptor::new("pies", "/equity/pies", RateLimit::new(1, 30_000)),
        ],
    );
    assert!(matches!(result, Err(RegistryError::DuplicateKey(_))));
}

#[test]
fn test_invalid_descriptor_rejected() {
    let json = r#"{
        "schema_version": "1.0.0",
        "endpoints": [
            {"key": "PIES", "path": "/equity/pies", "rate_limit": {"max_requests": 0, "window_ms": 30000}}
        ]
    }"#;
    assert!(matches!(
        EndpointRegistry::from_json(json),
        Err(RegistryError::InvalidEndpoint(_))
    ));
    assert!(matches!(
        EndpointRegistry::from_json("{"),
        Err(RegistryError::ParseError(_))
    ));
}

#[test]
fn test_registry_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "schema_version": "2.0.0",
            "endpoints": [
                {{"key": "WATCHLIST", "path": "/equity/watchlist", "rate_limit": {{"max_requests": 2, "window_ms": 10000}}, "cache_ttl_secs": 30}}
            ]
        }}"#
    )
    .unwrap();

    let registry = EndpointRegistry::from_file(file.path()).unwrap();
    assert_eq!(registry.schema_version(), "2.0.0");
    let watchlist = registry.require("watchlist").unwrap();
    assert!(!watchlist.paginated);
    assert!(watchlist.default_headers.is_empty());
    assert_eq!(watchlist.cache_ttl_secs, Some(30));

    assert!(matches!(
        EndpointRegistry::from_file(std::path::Path::new("/nonexistent/endpoints.json")),
        Err(RegistryError::IoError(_))
    ));
}
