use crate::types::{EndpointId, EventId};

/// Errors surfaced synchronously by the management surface
/// (registry CRUD, event listing, replay, test webhooks).
///
/// Delivery and transport failures never appear here: they are represented
/// as event/delivery state and handled inside the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// Malformed input rejected before anything is persisted.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Operation referenced an unknown endpoint id.
    #[error("endpoint not found: {0}")]
    EndpointNotFound(EndpointId),

    /// Operation referenced an unknown event id.
    #[error("event not found: {0}")]
    EventNotFound(EventId),

    /// Tenant has reached its endpoint cap.
    #[error("endpoint limit ({limit}) reached for tenant")]
    EndpointLimitExceeded { limit: usize },

    /// Replay requested for an event that is not dead-lettered.
    #[error("event {0} is not dead-lettered")]
    NotReplayable(EventId),

    /// The dispatcher has been shut down.
    #[error("dispatcher is shut down")]
    Shutdown,
}

/// Final outcome of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The endpoint acknowledged with a 2xx status.
    Delivered { status: u16 },
    /// The attempt failed; every failure is retriable until the budget runs out.
    Failed(FailureReason),
}

/// Reasons why an HTTP delivery attempt failed.
///
/// Classification is deliberately binary: non-2xx statuses and transport
/// errors are all retriable. 4xx responses are retried like 5xx even though
/// they are unlikely to ever succeed; distinguishing them is a known
/// limitation of the current policy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("endpoint returned HTTP {0}")]
    RejectedStatus(u16),

    /// The endpoint record disappeared between scheduling and the attempt.
    #[error("endpoint record no longer exists")]
    EndpointMissing,
}
