//! Tenant-scoped webhook delivery engine.
//!
//! This crate fans internal domain events out to externally registered
//! HTTP endpoints with **signed, at-least-once, retrying** delivery.
//!
//! ## Guarantees
//! - At-least-once delivery per (event, endpoint) trajectory
//! - HMAC-SHA256 payload signatures over the exact wire bytes
//! - Exponential backoff with a ceiling, then dead-lettering
//! - An append-only audit record for every delivery attempt
//! - Per-trajectory isolation: a slow endpoint never blocks the rest
//!
//! ## Non-Guarantees
//! - Exactly-once delivery (idempotency is the receiver's job)
//! - Ordering across events or across endpoints
//! - Durability across restarts when backed by [`InMemoryStorage`]
//!   (plug a persistent [`Storage`] in for that)
//!
//! Management surfaces (endpoint CRUD, event listing, replay, test
//! webhooks) are exposed as constructed service objects; HTTP routing and
//! authorization live with the caller.

mod dispatcher;
mod emitter;
mod error;
mod events;
mod registry;
mod retry;
mod signing;
mod storage;
mod transport;
mod types;
mod worker;

pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use emitter::Emitter;
pub use error::{DeliveryOutcome, FailureReason, WebhookError};
pub use events::{EventService, DEFAULT_EVENT_LIMIT, MAX_EVENT_LIMIT};
pub use registry::{EndpointRegistry, RegistryConfig, DEFAULT_MAX_ENDPOINTS};
pub use retry::RetryPolicy;
pub use signing::{
    is_timestamp_fresh, parse_signature_headers, sign_payload, verify_signature,
    verify_webhook_request, ParsedSignature, VerificationError,
};
pub use storage::{InMemoryStorage, Storage};
pub use transport::{
    AttemptReport, Transport, EVENT_TYPE_HEADER, REQUEST_TIMEOUT, SIGNATURE_HEADER,
    TIMESTAMP_HEADER, USER_AGENT,
};
pub use types::{
    DeliveryId, DeliveryStatus, EndpointId, EventFilter, EventId, EventStatus, EventType,
    ProjectId, TenantId, TestWebhookResult, UpdateEndpoint, WebhookDelivery, WebhookEndpoint,
    WebhookEnvelope, WebhookEvent,
};
