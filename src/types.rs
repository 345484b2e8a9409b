use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a webhook endpoint.
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of endpoint ids with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId(pub String);

impl EndpointId {
    /// Allocate a fresh endpoint id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for EndpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a webhook event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Allocate a fresh event id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a delivery attempt record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub String);

impl DeliveryId {
    /// Allocate a fresh delivery id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a tenant (organization).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a project within a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Domain event kinds eligible for webhook fan-out.
///
/// The wire representation is the dotted string form, e.g. `work_item.created`.
/// `TestPing` is synthetic and only produced by the test-webhook utility; it
/// never enters the event store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "project.created")]
    ProjectCreated,
    #[serde(rename = "project.updated")]
    ProjectUpdated,
    #[serde(rename = "work_item.created")]
    WorkItemCreated,
    #[serde(rename = "work_item.updated")]
    WorkItemUpdated,
    #[serde(rename = "work_item.completed")]
    WorkItemCompleted,
    #[serde(rename = "approval.requested")]
    ApprovalRequested,
    #[serde(rename = "approval.decided")]
    ApprovalDecided,
    #[serde(rename = "insights.updated")]
    InsightsUpdated,
    #[serde(rename = "message.created")]
    MessageCreated,
    #[serde(rename = "export.completed")]
    ExportCompleted,
    #[serde(rename = "test.ping")]
    TestPing,
}

impl EventType {
    /// The dotted wire form of this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProjectCreated => "project.created",
            Self::ProjectUpdated => "project.updated",
            Self::WorkItemCreated => "work_item.created",
            Self::WorkItemUpdated => "work_item.updated",
            Self::WorkItemCompleted => "work_item.completed",
            Self::ApprovalRequested => "approval.requested",
            Self::ApprovalDecided => "approval.decided",
            Self::InsightsUpdated => "insights.updated",
            Self::MessageCreated => "message.created",
            Self::ExportCompleted => "export.completed",
            Self::TestPing => "test.ping",
        }
    }

    /// Parse a dotted event type string; returns None for unknown types.
    pub fn parse(s: &str) -> Option<Self> {
        Self::all().iter().copied().find(|et| et.as_str() == s)
    }

    /// All event types a subscription may cover.
    pub fn all() -> &'static [EventType] {
        &[
            Self::ProjectCreated,
            Self::ProjectUpdated,
            Self::WorkItemCreated,
            Self::WorkItemUpdated,
            Self::WorkItemCompleted,
            Self::ApprovalRequested,
            Self::ApprovalDecided,
            Self::InsightsUpdated,
            Self::MessageCreated,
            Self::ExportCompleted,
            Self::TestPing,
        ]
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination for webhook delivery.
///
/// An endpoint describes *where* deliveries for a tenant go and which event
/// types it subscribes to. Endpoints are managed through the
/// [`EndpointRegistry`](crate::EndpointRegistry).
#[derive(Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    /// Logical identifier for the endpoint.
    pub id: EndpointId,

    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Target URL for webhook delivery.
    pub url: String,

    /// Shared secret used for HMAC signing. Never logged.
    pub secret: String,

    /// Event types this endpoint subscribes to. Non-empty.
    pub event_types: Vec<EventType>,

    /// Inactive endpoints are excluded from fan-out entirely.
    pub active: bool,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp.
    pub updated_at: DateTime<Utc>,

    /// Number of successful deliveries to this endpoint.
    pub success_count: u64,

    /// Number of failed delivery attempts to this endpoint.
    pub failure_count: u64,

    /// Timestamp of the most recent successful delivery.
    pub last_delivery_at: Option<DateTime<Utc>>,
}

impl WebhookEndpoint {
    /// Create a new active endpoint with zeroed counters.
    pub fn new(
        tenant_id: TenantId,
        url: impl Into<String>,
        secret: impl Into<String>,
        event_types: Vec<EventType>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: EndpointId::generate(),
            tenant_id,
            url: url.into(),
            secret: secret.into(),
            event_types,
            active: true,
            created_at: now,
            updated_at: now,
            success_count: 0,
            failure_count: 0,
            last_delivery_at: None,
        }
    }

    /// Whether this endpoint should receive an event of the given type.
    pub fn accepts(&self, event_type: EventType) -> bool {
        self.active && self.event_types.contains(&event_type)
    }
}

// Manual Debug so the secret cannot leak through log formatting.
impl std::fmt::Debug for WebhookEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookEndpoint")
            .field("id", &self.id)
            .field("tenant_id", &self.tenant_id)
            .field("url", &self.url)
            .field("secret", &"<redacted>")
            .field("event_types", &self.event_types)
            .field("active", &self.active)
            .field("success_count", &self.success_count)
            .field("failure_count", &self.failure_count)
            .finish_non_exhaustive()
    }
}

/// Partial update applied to an endpoint. Only supplied fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateEndpoint {
    pub url: Option<String>,
    pub secret: Option<String>,
    pub event_types: Option<Vec<EventType>>,
    pub active: Option<bool>,
}

/// Delivery lifecycle status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// Awaiting an attempt (initial, or between retries).
    Pending,
    /// Terminal: a delivery attempt succeeded.
    Delivered,
    /// Terminal: the trajectory was abandoned without exhausting retries
    /// (e.g. the endpoint was deactivated mid-flight).
    Failed,
    /// Terminal: the retry budget is exhausted. Manual replay only.
    DeadLetter,
}

impl EventStatus {
    /// Terminal statuses are never left automatically.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// A recorded domain event, eligible for fan-out to subscribed endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Logical identifier for the event.
    pub id: EventId,

    /// Domain event kind.
    pub event_type: EventType,

    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Associated project, when the event concerns one.
    pub project_id: Option<ProjectId>,

    /// Creation timestamp. Immutable.
    pub created_at: DateTime<Utc>,

    /// Arbitrary JSON payload describing the event.
    pub data: serde_json::Value,

    /// Retries consumed so far. Never exceeds `max_retries`.
    pub retry_count: u32,

    /// Retry budget, fixed at creation.
    pub max_retries: u32,

    /// Current delivery status.
    pub status: EventStatus,

    /// Timestamp of the most recent delivery attempt.
    pub last_attempt_at: Option<DateTime<Utc>>,

    /// When the next retry is due, while one is scheduled.
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Error message from the most recent failed attempt.
    pub last_error: Option<String>,
}

impl WebhookEvent {
    /// Create a pending event with a zeroed retry counter.
    pub fn new(
        event_type: EventType,
        tenant_id: TenantId,
        project_id: Option<ProjectId>,
        data: serde_json::Value,
        max_retries: u32,
    ) -> Self {
        Self {
            id: EventId::generate(),
            event_type,
            tenant_id,
            project_id,
            created_at: Utc::now(),
            data,
            retry_count: 0,
            max_retries,
            status: EventStatus::Pending,
            last_attempt_at: None,
            next_retry_at: None,
            last_error: None,
        }
    }
}

/// Outcome of a single delivery attempt record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

/// One concrete POST to one endpoint for one event.
///
/// Records are append-only: created at attempt start and flipped to their
/// terminal state when the attempt resolves, never touched afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: DeliveryId,
    pub event_id: EventId,
    pub endpoint_id: EndpointId,
    pub status: DeliveryStatus,
    /// 1-based attempt number within the (event, endpoint) trajectory.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    /// HTTP status, present when the endpoint responded at all.
    pub response_code: Option<u16>,
    /// Response body, truncated for storage. Diagnostics only.
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Canonical wire envelope POSTed to endpoints.
///
/// Field order is fixed by this struct; the signature is computed over the
/// exact serialized bytes, which are also the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEnvelope {
    pub id: EventId,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "organizationId")]
    pub organization_id: TenantId,
    #[serde(rename = "projectId", skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    pub data: serde_json::Value,
}

impl WebhookEnvelope {
    /// Build the envelope for an event.
    pub fn for_event(event: &WebhookEvent) -> Self {
        Self {
            id: event.id.clone(),
            event_type: event.event_type,
            timestamp: event.created_at,
            organization_id: event.tenant_id.clone(),
            project_id: event.project_id.clone(),
            data: event.data.clone(),
        }
    }
}

/// Conjunctive filters for event listing.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub event_type: Option<EventType>,
    pub project_id: Option<ProjectId>,
    pub status: Option<EventStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Result of an ad-hoc test delivery, returned directly to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestWebhookResult {
    pub success: bool,
    pub message: String,
}
