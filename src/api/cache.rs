//! TTL response cache
//!
//! Entries are keyed by endpoint, path and canonical query string. Expired
//! entries are treated as absent and dropped when next looked up.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::trace;

use crate::clock::{SharedClock, TokioClock};
use crate::metrics;
use crate::QueryParams;

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at_ms: u64,
}

/// Build the cache key `"{endpoint}|{path}?k1=v1&k2=v2"`
///
/// Parameters come from a sorted map, so equal parameter sets give equal keys.
pub fn cache_key(endpoint_key: &str, path: &str, params: &QueryParams) -> String {
    let query = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    format!("{endpoint_key}|{path}?{query}")
}

/// In-memory response cache with per-entry expiry
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    clock: SharedClock,
}

impl ResponseCache {
    /// Create an empty cache on the given clock
    pub fn new(clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Look up a live entry
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if now < entry.expires_at_ms => {
                metrics::record_cache_lookup(true);
                Some(entry.value.clone())
            }
            Some(_) => {
                trace!(key, "Cache entry expired");
                entries.remove(key);
                metrics::record_cache_lookup(false);
                None
            }
            None => {
                metrics::record_cache_lookup(false);
                None
            }
        }
    }

    /// Store a value that expires after `ttl`
    pub fn put(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        let expires_at_ms = self.clock.now_ms().saturating_add(ttl_ms);
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at_ms,
            },
        );
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| now < entry.expires_at_ms);
        before - entries.len()
    }

    /// Number of stored entries (including not yet purged expired ones)
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(TokioClock::shared())
    }
}
