//! Common test utilities for delivery integration tests.
//!
//! Provides wiremock responders, a wired-up pipeline fixture with fast
//! retry timings, and polling helpers for asynchronous assertions.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wiremock::{Request, Respond, ResponseTemplate};

use brandops_webhooks::{
    Dispatcher, DispatcherConfig, EndpointRegistry, EventService, EventType, InMemoryStorage,
    RegistryConfig, Storage, TenantId, WebhookEndpoint,
};

pub const TENANT_A: &str = "tenant_a";
pub const TENANT_B: &str = "tenant_b";
pub const SECRET: &str = "whsec_test_secret_12345";

// ---------------------------------------------------------------------------
// Pipeline fixture
// ---------------------------------------------------------------------------

/// A fully wired delivery pipeline backed by in-memory storage.
pub struct TestPipeline {
    pub storage: Arc<dyn Storage>,
    pub dispatcher: Arc<Dispatcher>,
    pub registry: EndpointRegistry,
    pub events: EventService,
}

/// Dispatcher config with millisecond-scale retries so tests run fast.
pub fn fast_config() -> DispatcherConfig {
    DispatcherConfig {
        worker_count: 4,
        retry_base_ms: 25,
        retry_max_ms: 200,
        ..Default::default()
    }
}

/// Registry config that accepts wiremock's loopback HTTP URLs.
pub fn permissive_registry() -> RegistryConfig {
    RegistryConfig::default()
        .with_allow_http(true)
        .with_allow_private_hosts(true)
}

pub fn pipeline() -> TestPipeline {
    pipeline_with(fast_config())
}

pub fn pipeline_with(config: DispatcherConfig) -> TestPipeline {
    let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
    let dispatcher = Arc::new(Dispatcher::new(config, storage.clone()));
    let registry = EndpointRegistry::new(storage.clone(), permissive_registry());
    let events = EventService::new(storage.clone(), dispatcher.clone());
    TestPipeline {
        storage,
        dispatcher,
        registry,
        events,
    }
}

impl TestPipeline {
    /// Register an endpoint subscribed to the given event types.
    pub async fn endpoint(&self, tenant: &str, url: &str, types: Vec<EventType>) -> WebhookEndpoint {
        self.registry
            .create_endpoint(TenantId(tenant.into()), url, SECRET, types)
            .await
            .expect("endpoint creation failed")
    }
}

/// Poll `condition` until it holds or `timeout` elapses. Returns whether the
/// condition was met.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

// ---------------------------------------------------------------------------
// CapturedRequest - for inspecting webhook requests
// ---------------------------------------------------------------------------

/// A captured HTTP request with body and headers.
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub body: Vec<u8>,
    pub headers: HashMap<String, String>,
}

impl CapturedRequest {
    /// Parse the body as JSON.
    pub fn body_json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }

    /// Get a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        let name_lower = name.to_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_lowercase() == name_lower)
            .map(|(_, v)| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// CaptureResponder - captures requests and returns a fixed status
// ---------------------------------------------------------------------------

/// A wiremock responder that captures incoming requests.
#[derive(Clone)]
pub struct CaptureResponder {
    requests: Arc<Mutex<Vec<CapturedRequest>>>,
    response_code: u16,
}

impl CaptureResponder {
    /// Create a capture responder that returns 200 OK.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(Mutex::new(Vec::new())),
            response_code: 200,
        }
    }

    /// Get all captured requests.
    pub fn requests(&self) -> Vec<CapturedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Get the number of captured requests.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Default for CaptureResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CaptureResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let captured = CapturedRequest {
            body: request.body.clone(),
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect(),
        };
        self.requests.lock().unwrap().push(captured);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// CountingResponder - counts requests
// ---------------------------------------------------------------------------

/// A wiremock responder that counts incoming requests.
#[derive(Clone)]
pub struct CountingResponder {
    count: Arc<AtomicU32>,
    response_code: u16,
}

impl CountingResponder {
    /// Create a counting responder that returns 200 OK.
    pub fn new() -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: 200,
        }
    }

    /// Create a counting responder that returns a custom status code.
    pub fn with_status(status: u16) -> Self {
        Self {
            count: Arc::new(AtomicU32::new(0)),
            response_code: status,
        }
    }

    /// Get the current request count.
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }
}

impl Default for CountingResponder {
    fn default() -> Self {
        Self::new()
    }
}

impl Respond for CountingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.count.fetch_add(1, Ordering::SeqCst);
        ResponseTemplate::new(self.response_code)
    }
}

// ---------------------------------------------------------------------------
// FailingResponder - fails N times then succeeds
// ---------------------------------------------------------------------------

/// A wiremock responder that fails a specified number of times before
/// succeeding.
#[derive(Clone)]
pub struct FailingResponder {
    attempt_count: Arc<AtomicU32>,
    failures_before_success: u32,
    failure_code: u16,
}

impl FailingResponder {
    /// Create a responder that fails `n` times with 500, then returns 200.
    pub fn fail_times(n: u32) -> Self {
        Self {
            attempt_count: Arc::new(AtomicU32::new(0)),
            failures_before_success: n,
            failure_code: 500,
        }
    }

    /// Get the current attempt count.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count.load(Ordering::SeqCst)
    }
}

impl Respond for FailingResponder {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.attempt_count.fetch_add(1, Ordering::SeqCst);
        if n < self.failures_before_success {
            ResponseTemplate::new(self.failure_code)
        } else {
            ResponseTemplate::new(200)
        }
    }
}
