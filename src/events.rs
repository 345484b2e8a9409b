//! Event store service: records domain events and triggers fan-out.
//!
//! Creating an event is the synchronous trigger for its first delivery
//! attempt, not merely a write; the record is persisted pending and handed
//! straight to the dispatcher.

use std::sync::Arc;

use crate::dispatcher::Dispatcher;
use crate::error::WebhookError;
use crate::storage::Storage;
use crate::types::{
    EventFilter, EventId, EventStatus, EventType, ProjectId, TenantId, WebhookEvent,
};

/// Result-size cap applied when the caller does not pass one.
pub const DEFAULT_EVENT_LIMIT: usize = 50;
/// Upper bound on any event listing.
pub const MAX_EVENT_LIMIT: usize = 100;

/// Service exposing event creation, inspection, and replay.
#[derive(Clone)]
pub struct EventService {
    storage: Arc<dyn Storage>,
    dispatcher: Arc<Dispatcher>,
}

impl EventService {
    pub fn new(storage: Arc<dyn Storage>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { storage, dispatcher }
    }

    /// Record a pending event and immediately fan it out.
    pub async fn create_event(
        &self,
        event_type: EventType,
        tenant_id: TenantId,
        project_id: Option<ProjectId>,
        data: serde_json::Value,
    ) -> Result<WebhookEvent, WebhookError> {
        let event = WebhookEvent::new(
            event_type,
            tenant_id,
            project_id,
            data,
            self.dispatcher.default_max_retries(),
        );
        self.storage.upsert_event(&event).await;
        self.dispatcher.dispatch(&event).await?;
        Ok(event)
    }

    /// List a tenant's events, newest first, with conjunctive filters.
    /// `limit` defaults to [`DEFAULT_EVENT_LIMIT`] and is capped at
    /// [`MAX_EVENT_LIMIT`].
    pub async fn get_events(
        &self,
        tenant_id: &TenantId,
        filter: &EventFilter,
        limit: Option<usize>,
    ) -> Vec<WebhookEvent> {
        let limit = limit.unwrap_or(DEFAULT_EVENT_LIMIT).clamp(1, MAX_EVENT_LIMIT);
        self.storage.query_events(tenant_id, filter, limit).await
    }

    /// Fetch a single event.
    pub async fn get_event(&self, id: &EventId) -> Result<WebhookEvent, WebhookError> {
        self.storage
            .get_event(id)
            .await
            .ok_or_else(|| WebhookError::EventNotFound(id.clone()))
    }

    /// Manually resurrect a dead-lettered event.
    ///
    /// The retry budget is reset and the event re-enters the pipeline as if
    /// freshly created. Only dead-lettered events are replayable; this is an
    /// explicit operator action, never automatic.
    pub async fn replay_event(&self, id: &EventId) -> Result<WebhookEvent, WebhookError> {
        let mut event = self
            .storage
            .get_event(id)
            .await
            .ok_or_else(|| WebhookError::EventNotFound(id.clone()))?;

        if event.status != EventStatus::DeadLetter {
            return Err(WebhookError::NotReplayable(id.clone()));
        }

        event.status = EventStatus::Pending;
        event.retry_count = 0;
        event.next_retry_at = None;
        event.last_error = None;
        self.storage.upsert_event(&event).await;

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.id,
            tenant_id = %event.tenant_id,
            "Replaying dead-lettered event"
        );

        self.dispatcher.dispatch(&event).await?;
        Ok(event)
    }
}
