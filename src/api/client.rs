//! Rate-limited, caching, retrying API client
//!
//! Every logical GET goes through the same steps:
//! 1. resolve the endpoint descriptor and credential (no network on failure)
//! 2. answer from the response cache when the endpoint has a TTL
//! 3. wait for a rate-limit slot, send, and retry per [`RetryPolicy`]
//!
//! Pagination follows server-supplied next-page paths strictly in sequence.

use reqwest::Url;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::metrics::{self, HttpRequestMetrics};
use crate::registry::EndpointRegistry;
use crate::sync::config::ClientConfig;
use crate::sync::rate_limit::RateLimiter;
use crate::{EndpointDescriptor, QueryParams};

use super::cache::{cache_key, ResponseCache};
use super::credentials::CredentialProvider;
use super::pagination::Page;
use super::retry::{Outcome, RetryErrorType, RetryPolicy};
use super::transport::HttpTransport;
use super::{ApiError, ApiResult, ConfigError};

/// Authenticated client for the brokerage API
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<dyn CredentialProvider>,
    registry: Arc<EndpointRegistry>,
    rate_limiter: Arc<RateLimiter>,
    cache: Arc<ResponseCache>,
    retry_policy: RetryPolicy,
    config: ClientConfig,
}

impl ApiClient {
    /// Create a client with a fresh rate limiter and cache for `registry`
    ///
    /// # Arguments
    /// * `transport` - Performs the raw HTTP GETs
    /// * `credentials` - Supplies the API key and base URL per request
    /// * `registry` - Endpoint descriptors (rate limits, cache TTLs)
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<dyn CredentialProvider>,
        registry: Arc<EndpointRegistry>,
    ) -> Self {
        let rate_limiter = RateLimiter::shared_for(&registry);
        Self {
            transport,
            credentials,
            registry,
            rate_limiter,
            cache: Arc::new(ResponseCache::default()),
            retry_policy: RetryPolicy::default(),
            config: ClientConfig::default(),
        }
    }

    /// Share a rate limiter (e.g. with another client on the same account)
    pub fn with_rate_limiter(mut self, rate_limiter: Arc<RateLimiter>) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    /// Share a response cache
    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replace the retry policy; its attempt cap becomes the client's
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.config.max_attempts = retry_policy.max_attempts();
        self.retry_policy = retry_policy;
        self
    }

    /// Replace the client settings
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        let policy = std::mem::take(&mut self.retry_policy);
        self.retry_policy = policy.with_max_attempts(config.max_attempts);
        self.config = config;
        self
    }

    /// Client settings
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Endpoint registry
    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Shared rate limiter
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Shared response cache
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Perform one logical GET against the endpoint `key`
    ///
    /// # Arguments
    /// * `key` - Endpoint key (rate limit and cache bucket)
    /// * `path` - Path relative to the base URL, or a server-supplied next-page path
    /// * `params` - Query parameters
    ///
    /// # Errors
    /// Configuration errors are raised before any network call. HTTP failures
    /// surface as [`ApiError`] once retries are exhausted or not applicable.
    pub async fn get(&self, key: &str, path: &str, params: &QueryParams) -> ApiResult<Value> {
        let descriptor = self
            .registry
            .get(key)
            .ok_or_else(|| ConfigError::UnknownEndpoint(key.to_string()))?;
        let credential = self.credentials.credential()?;
        let base_url = self.credentials.base_url()?;
        let url = build_url(&base_url, path, params)?;

        let cache_slot = match descriptor.cache_ttl() {
            Some(ttl) if self.config.cache_enabled => {
                Some((cache_key(&descriptor.key, path, params), ttl))
            }
            _ => None,
        };

        if let Some((slot, _)) = &cache_slot {
            if let Some(value) = self.cache.get(slot) {
                debug!(endpoint = %descriptor.key, path, "Serving response from cache");
                return Ok(value);
            }
        }

        let value = self.request_with_retry(descriptor, &url, &credential).await?;

        if let Some((slot, ttl)) = cache_slot {
            self.cache.put(slot, value.clone(), ttl);
        }
        Ok(value)
    }

    /// Fetch every page of a paginated resource
    ///
    /// Any page failure discards the items collected so far.
    pub async fn fetch_all_pages(
        &self,
        key: &str,
        path: &str,
        params: &QueryParams,
    ) -> ApiResult<Vec<Value>> {
        self.fetch_all_pages_with(key, path, params, |_, _| {}).await
    }

    /// Fetch every page, calling `on_page(page_number, items_so_far)` after each
    pub async fn fetch_all_pages_with<F>(
        &self,
        key: &str,
        path: &str,
        params: &QueryParams,
        mut on_page: F,
    ) -> ApiResult<Vec<Value>>
    where
        F: FnMut(usize, usize) + Send,
    {
        let no_params = QueryParams::new();
        let mut items = Vec::new();
        let mut visited = HashSet::new();
        let mut next_path: Option<String> = None;
        let mut page_number = 0usize;

        loop {
            if page_number >= self.config.max_pages {
                return Err(ApiError::PaginationLimit {
                    endpoint: key.to_string(),
                    max_pages: self.config.max_pages,
                });
            }

            let value = match &next_path {
                None => self.get(key, path, params).await?,
                Some(next) => self.get(key, next, &no_params).await?,
            };
            page_number += 1;

            let page = Page::from_value(value);
            debug!(
                endpoint = key,
                page = page_number,
                items = page.items.len(),
                has_next = page.has_next(),
                "Fetched page"
            );
            items.extend(page.items);
            on_page(page_number, items.len());

            match page.next_page_path {
                None => break,
                Some(next) => {
                    if !visited.insert(next.clone()) {
                        return Err(ApiError::PaginationLoop {
                            endpoint: key.to_string(),
                            path: next,
                        });
                    }
                    next_path = Some(next);
                }
            }
        }

        info!(endpoint = key, pages = page_number, items = items.len(), "Pagination complete");
        Ok(items)
    }

    async fn request_with_retry(
        &self,
        descriptor: &EndpointDescriptor,
        url: &Url,
        credential: &str,
    ) -> ApiResult<Value> {
        let endpoint = descriptor.key.as_str();
        let headers = [
            ("Authorization", credential.to_string()),
            ("Accept", "application/json".to_string()),
        ];
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.wait_for_slot(endpoint).await?;

            let request_metrics = HttpRequestMetrics::start(endpoint, attempt);
            let (outcome, detail) = match self.transport.get(url.as_str(), &headers).await {
                Ok(response) if response.is_success() => {
                    request_metrics.record_complete(response.status);
                    if attempt > 1 {
                        info!(endpoint, attempt, "Request succeeded after retry");
                    }
                    return parse_body(endpoint, &response.body);
                }
                Ok(response) => {
                    request_metrics.record_complete(response.status);
                    (Outcome::Status(response.status), response.body)
                }
                Err(err) => {
                    request_metrics.record_network_error();
                    (Outcome::Transport(err.kind), err.message)
                }
            };

            let decision =
                self.retry_policy
                    .should_retry(outcome, attempt, Some(&descriptor.rate_limit));
            if !decision.retry {
                return Err(final_error(endpoint, outcome, detail, attempt));
            }
            if decision.delay > self.config.max_wait {
                return Err(ConfigError::WaitExceedsCeiling {
                    endpoint: endpoint.to_string(),
                    wait: decision.delay,
                    ceiling: self.config.max_wait,
                }
                .into());
            }

            warn!(
                endpoint,
                attempt,
                max_attempts = self.retry_policy.max_attempts(),
                delay_ms = decision.delay.as_millis() as u64,
                "Retrying after {}",
                RetryErrorType::from_outcome(outcome).description()
            );
            metrics::record_retry_backoff(endpoint, decision.delay, attempt);
            tokio::time::sleep(decision.delay).await;
        }
    }

    /// Sleep until the limiter grants a slot for `endpoint`
    async fn wait_for_slot(&self, endpoint: &str) -> ApiResult<()> {
        loop {
            let decision = self.rate_limiter.can_proceed(endpoint);
            if decision.allowed {
                metrics::update_in_window(endpoint, self.rate_limiter.in_flight(endpoint));
                return Ok(());
            }

            if decision.wait > self.config.max_wait {
                return Err(ConfigError::WaitExceedsCeiling {
                    endpoint: endpoint.to_string(),
                    wait: decision.wait,
                    ceiling: self.config.max_wait,
                }
                .into());
            }

            let sleep_for = decision.wait + self.config.wait_buffer;
            debug!(
                endpoint,
                wait_ms = sleep_for.as_millis() as u64,
                "Waiting for rate limit slot"
            );
            metrics::record_rate_limit_wait(endpoint, sleep_for);
            tokio::time::sleep(sleep_for).await;
        }
    }
}

/// Parse a 2xx body; an empty body is `null`
fn parse_body(endpoint: &str, body: &str) -> ApiResult<Value> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ApiError::InvalidResponse {
        endpoint: endpoint.to_string(),
        message: e.to_string(),
    })
}

/// Map the last failed attempt to the error surfaced to callers
fn final_error(endpoint: &str, outcome: Outcome, detail: String, attempts: u32) -> ApiError {
    let endpoint = endpoint.to_string();
    match outcome {
        Outcome::Status(429) => ApiError::RateLimitExceeded {
            endpoint,
            attempts,
            body: detail,
        },
        Outcome::Status(status) if (500..600).contains(&status) => ApiError::TransientServer {
            endpoint,
            attempts,
            status: Some(status),
            reason: detail,
        },
        Outcome::Status(status) => ApiError::ClientRequest {
            endpoint,
            status,
            body: detail,
            attempts,
        },
        Outcome::Transport(_) => ApiError::TransientServer {
            endpoint,
            attempts,
            status: None,
            reason: detail,
        },
    }
}

/// Join `path` onto the versioned `base_url` and append `params`
///
/// Paths that already carry the base URL's path prefix (as next-page paths
/// do) are joined to the origin, and absolute URLs are used unchanged.
pub fn build_url(base_url: &str, path: &str, params: &QueryParams) -> Result<Url, ConfigError> {
    let joined = if path.starts_with("http://") || path.starts_with("https://") {
        path.to_string()
    } else {
        let base = Url::parse(base_url)
            .map_err(|e| ConfigError::InvalidUrl(format!("{base_url}: {e}")))?;
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        let prefix = base.path().trim_end_matches('/');
        let carries_prefix = !prefix.is_empty()
            && (path == prefix
                || path.starts_with(&format!("{prefix}/"))
                || path.starts_with(&format!("{prefix}?")));

        if carries_prefix {
            format!("{}{}", base.origin().ascii_serialization(), path)
        } else {
            format!("{}{}", base_url.trim_end_matches('/'), path)
        }
    };

    let mut url =
        Url::parse(&joined).map_err(|e| ConfigError::InvalidUrl(format!("{joined}: {e}")))?;
    if !params.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            pairs.append_pair(name, value);
        }
    }
    Ok(url)
}
