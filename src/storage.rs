use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::types::{
    DeliveryId, EndpointId, EventFilter, EventId, TenantId, WebhookDelivery, WebhookEndpoint,
    WebhookEvent,
};

/// Persistence seam for endpoints, events, and delivery attempts.
///
/// Modeled as a generic document store: records are upserted whole and
/// addressed by id within a tenant partition. The delivery pipeline holds an
/// `Arc<dyn Storage>`, so any backing store can be plugged in without
/// touching dispatch or retry logic.
#[async_trait]
pub trait Storage: Send + Sync {
    // --- endpoints -------------------------------------------------------

    async fn upsert_endpoint(&self, endpoint: &WebhookEndpoint);
    async fn get_endpoint(&self, id: &EndpointId) -> Option<WebhookEndpoint>;
    async fn list_endpoints(&self, tenant_id: &TenantId) -> Vec<WebhookEndpoint>;
    /// Returns false if the endpoint did not exist.
    async fn delete_endpoint(&self, id: &EndpointId) -> bool;
    /// Bump the success counter and stamp the last delivery time.
    async fn record_endpoint_success(&self, id: &EndpointId, at: DateTime<Utc>);
    /// Bump the failure counter.
    async fn record_endpoint_failure(&self, id: &EndpointId);

    // --- events ----------------------------------------------------------

    async fn upsert_event(&self, event: &WebhookEvent);
    async fn get_event(&self, id: &EventId) -> Option<WebhookEvent>;
    /// Conjunctive filters, newest first, capped at `limit`.
    async fn query_events(
        &self,
        tenant_id: &TenantId,
        filter: &EventFilter,
        limit: usize,
    ) -> Vec<WebhookEvent>;

    // --- delivery attempts -----------------------------------------------

    async fn insert_delivery(&self, delivery: &WebhookDelivery);
    async fn list_deliveries_for_event(&self, event_id: &EventId) -> Vec<WebhookDelivery>;
}

/// In-memory storage for embedded deployments and tests.
#[derive(Default)]
pub struct InMemoryStorage {
    endpoints: Mutex<HashMap<EndpointId, WebhookEndpoint>>,
    events: Mutex<HashMap<EventId, WebhookEvent>>,
    deliveries: Mutex<HashMap<DeliveryId, WebhookDelivery>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn upsert_endpoint(&self, endpoint: &WebhookEndpoint) {
        self.endpoints
            .lock()
            .await
            .insert(endpoint.id.clone(), endpoint.clone());
    }

    async fn get_endpoint(&self, id: &EndpointId) -> Option<WebhookEndpoint> {
        self.endpoints.lock().await.get(id).cloned()
    }

    async fn list_endpoints(&self, tenant_id: &TenantId) -> Vec<WebhookEndpoint> {
        let mut endpoints: Vec<_> = self
            .endpoints
            .lock()
            .await
            .values()
            .filter(|e| &e.tenant_id == tenant_id)
            .cloned()
            .collect();
        endpoints.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        endpoints
    }

    async fn delete_endpoint(&self, id: &EndpointId) -> bool {
        self.endpoints.lock().await.remove(id).is_some()
    }

    async fn record_endpoint_success(&self, id: &EndpointId, at: DateTime<Utc>) {
        let mut guard = self.endpoints.lock().await;
        if let Some(endpoint) = guard.get_mut(id) {
            endpoint.success_count += 1;
            endpoint.last_delivery_at = Some(at);
        }
    }

    async fn record_endpoint_failure(&self, id: &EndpointId) {
        let mut guard = self.endpoints.lock().await;
        if let Some(endpoint) = guard.get_mut(id) {
            endpoint.failure_count += 1;
        }
    }

    async fn upsert_event(&self, event: &WebhookEvent) {
        self.events
            .lock()
            .await
            .insert(event.id.clone(), event.clone());
    }

    async fn get_event(&self, id: &EventId) -> Option<WebhookEvent> {
        self.events.lock().await.get(id).cloned()
    }

    async fn query_events(
        &self,
        tenant_id: &TenantId,
        filter: &EventFilter,
        limit: usize,
    ) -> Vec<WebhookEvent> {
        let mut events: Vec<_> = self
            .events
            .lock()
            .await
            .values()
            .filter(|e| &e.tenant_id == tenant_id)
            .filter(|e| filter.event_type.is_none_or(|t| e.event_type == t))
            .filter(|e| {
                filter
                    .project_id
                    .as_ref()
                    .is_none_or(|p| e.project_id.as_ref() == Some(p))
            })
            .filter(|e| filter.status.is_none_or(|s| e.status == s))
            .filter(|e| filter.since.is_none_or(|since| e.created_at >= since))
            .filter(|e| filter.until.is_none_or(|until| e.created_at <= until))
            .cloned()
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        events.truncate(limit);
        events
    }

    async fn insert_delivery(&self, delivery: &WebhookDelivery) {
        self.deliveries
            .lock()
            .await
            .insert(delivery.id.clone(), delivery.clone());
    }

    async fn list_deliveries_for_event(&self, event_id: &EventId) -> Vec<WebhookDelivery> {
        let mut deliveries: Vec<_> = self
            .deliveries
            .lock()
            .await
            .values()
            .filter(|d| &d.event_id == event_id)
            .cloned()
            .collect();
        deliveries.sort_by_key(|d| d.attempt);
        deliveries
    }
}
