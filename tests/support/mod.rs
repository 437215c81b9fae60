//! Shared test fixtures: a scripted HTTP transport and client builders
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use portfolio_sync::api::{
    ApiClient, Environment, FixedJitter, HttpResponse, HttpTransport, RetryPolicy,
    StaticCredentials, TransportError, TransportErrorKind,
};
use portfolio_sync::EndpointRegistry;

pub const TEST_KEY: &str = "test-api-key";

/// One scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Fail(TransportErrorKind),
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Reply::Status(200, value.to_string())
    }

    pub fn status(status: u16) -> Self {
        Reply::Status(status, format!("{{\"code\":\"HTTP_{status}\"}}"))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedCall {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }
}

struct Route {
    fragment: String,
    replies: VecDeque<Reply>,
}

/// Transport answering from per-route reply queues
///
/// A request takes the next reply of the first route whose fragment is
/// contained in the URL and still has replies. Unscripted requests get a 404.
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for any URL
    pub fn reply(self, reply: Reply) -> Self {
        self.route("", reply)
    }

    /// Queue a reply for URLs containing `fragment`
    pub fn route(self, fragment: &str, reply: Reply) -> Self {
        {
            let mut routes = self.routes.lock().unwrap();
            match routes.iter_mut().find(|r| r.fragment == fragment) {
                Some(route) => route.replies.push_back(reply),
                None => routes.push(Route {
                    fragment: fragment.to_string(),
                    replies: VecDeque::from([reply]),
                }),
            }
        }
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(&'static str, String)],
    ) -> Result<HttpResponse, TransportError> {
        self.calls.lock().unwrap().push(RecordedCall {
            url: url.to_string(),
            headers: headers
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
        });

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            routes
                .iter_mut()
                .find(|r| url.contains(&r.fragment) && !r.replies.is_empty())
                .and_then(|r| r.replies.pop_front())
        };

        match reply {
            Some(Reply::Status(status, body)) => Ok(HttpResponse::new(status, body)),
            Some(Reply::Fail(kind)) => Err(TransportError::new(kind, "scripted transport failure")),
            None => Ok(HttpResponse::new(404, format!("unscripted request: {url}"))),
        }
    }
}

pub fn registry() -> Arc<EndpointRegistry> {
    Arc::new(EndpointRegistry::load_embedded().unwrap())
}

/// Demo-environment client with zero jitter
pub fn client(transport: Arc<FakeTransport>) -> ApiClient {
    client_with_key(transport, TEST_KEY)
}

pub fn client_with_key(transport: Arc<FakeTransport>, key: &str) -> ApiClient {
    ApiClient::new(
        transport,
        Arc::new(StaticCredentials::new(key, Environment::Demo)),
        registry(),
    )
    .with_retry_policy(no_jitter_policy())
}

pub fn no_jitter_policy() -> RetryPolicy {
    RetryPolicy::new().with_jitter(FixedJitter(0))
}

