//! HTTP transport: executes one signed delivery attempt and records it.
//!
//! The transport owns the append-only delivery log and the endpoint
//! counters; event status and retry bookkeeping belong to the scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;

use crate::error::{DeliveryOutcome, FailureReason};
use crate::signing::sign_payload;
use crate::storage::Storage;
use crate::types::{
    DeliveryId, DeliveryStatus, EventId, EventType, TestWebhookResult, WebhookDelivery,
    WebhookEndpoint, WebhookEnvelope, WebhookEvent,
};

/// Header carrying the `sha256=<hex>` payload signature.
pub const SIGNATURE_HEADER: &str = "X-Webhook-Signature";
/// Header carrying the dotted event type.
pub const EVENT_TYPE_HEADER: &str = "X-Webhook-Event";
/// Header carrying the ISO-8601 attempt timestamp.
pub const TIMESTAMP_HEADER: &str = "X-Webhook-Timestamp";

/// Identifies this engine to receivers.
pub const USER_AGENT: &str = "brandops-webhooks/1.0";

/// Hard ceiling for a single delivery attempt.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response bodies are truncated to this many characters before storage.
const RESPONSE_BODY_LIMIT: usize = 4096;

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::counter!(name).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Result of one transport attempt, reported back to the scheduler.
#[derive(Debug, Clone)]
pub struct AttemptReport {
    pub outcome: DeliveryOutcome,
    pub duration_ms: u64,
}

/// Performs signed HTTP POSTs with a bounded timeout.
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    storage: Arc<dyn Storage>,
    timeout: Duration,
}

impl Transport {
    pub fn new(storage: Arc<dyn Storage>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            storage,
            timeout,
        }
    }

    /// Execute one delivery attempt and persist its audit record.
    ///
    /// The `WebhookDelivery` record is written for every attempt, delivered
    /// or failed, before the report is returned.
    pub async fn attempt_delivery(
        &self,
        event: &WebhookEvent,
        endpoint: &WebhookEndpoint,
        attempt: u32,
    ) -> AttemptReport {
        let envelope = WebhookEnvelope::for_event(event);
        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => body,
            Err(e) => {
                // Nothing was sent; still leaves an audit record.
                let report = AttemptReport {
                    outcome: DeliveryOutcome::Failed(FailureReason::Network(format!(
                        "failed to serialize envelope: {e}"
                    ))),
                    duration_ms: 0,
                };
                self.record_attempt(&event.id, endpoint, attempt, &report, None, None)
                    .await;
                return report;
            }
        };

        let (report, response_code, response_body) =
            self.post_signed(&endpoint.url, &endpoint.secret, event.event_type, body).await;

        self.record_attempt(
            &event.id,
            endpoint,
            attempt,
            &report,
            response_code,
            response_body,
        )
        .await;

        report
    }

    /// Sign and POST a synthetic `test.ping` envelope, outside the
    /// event/retry pipeline. Nothing is persisted; the result goes straight
    /// back to the caller.
    pub async fn send_test_webhook(&self, endpoint: &WebhookEndpoint) -> TestWebhookResult {
        let envelope = WebhookEnvelope {
            id: EventId::generate(),
            event_type: EventType::TestPing,
            timestamp: Utc::now(),
            organization_id: endpoint.tenant_id.clone(),
            project_id: None,
            data: serde_json::json!({ "message": "test webhook delivery" }),
        };
        let body = match serde_json::to_vec(&envelope) {
            Ok(body) => body,
            Err(e) => {
                return TestWebhookResult {
                    success: false,
                    message: format!("failed to serialize envelope: {e}"),
                }
            }
        };

        let (report, ..) = self
            .post_signed(&endpoint.url, &endpoint.secret, EventType::TestPing, body)
            .await;

        match report.outcome {
            DeliveryOutcome::Delivered { status } => TestWebhookResult {
                success: true,
                message: format!("delivered with HTTP {status} in {}ms", report.duration_ms),
            },
            DeliveryOutcome::Failed(reason) => TestWebhookResult {
                success: false,
                message: reason.to_string(),
            },
        }
    }

    /// POST the exact `body` bytes, signed, and classify the outcome.
    async fn post_signed(
        &self,
        url: &str,
        secret: &str,
        event_type: EventType,
        body: Vec<u8>,
    ) -> (AttemptReport, Option<u16>, Option<String>) {
        let signature = sign_payload(&body, secret);
        let timestamp = Utc::now().to_rfc3339();

        let start = Instant::now();
        let result = self
            .client
            .post(url)
            .timeout(self.timeout)
            .header("Content-Type", "application/json")
            .header("User-Agent", USER_AGENT)
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_TYPE_HEADER, event_type.as_str())
            .header(TIMESTAMP_HEADER, timestamp)
            .body(body)
            .send()
            .await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                let text = response.text().await.unwrap_or_default();
                let truncated = if text.is_empty() {
                    None
                } else {
                    Some(text.chars().take(RESPONSE_BODY_LIMIT).collect::<String>())
                };

                if (200..300).contains(&status) {
                    metric_inc("webhook.delivery.success");
                    (
                        AttemptReport {
                            outcome: DeliveryOutcome::Delivered { status },
                            duration_ms,
                        },
                        Some(status),
                        truncated,
                    )
                } else {
                    metric_inc("webhook.delivery.failure");
                    (
                        AttemptReport {
                            outcome: DeliveryOutcome::Failed(FailureReason::RejectedStatus(status)),
                            duration_ms,
                        },
                        Some(status),
                        truncated,
                    )
                }
            }
            Err(e) => {
                metric_inc("webhook.delivery.failure");
                let reason = if e.is_timeout() {
                    FailureReason::Timeout
                } else {
                    FailureReason::Network(e.to_string())
                };
                (
                    AttemptReport {
                        outcome: DeliveryOutcome::Failed(reason),
                        duration_ms,
                    },
                    None,
                    None,
                )
            }
        }
    }

    /// Append the audit record and maintain endpoint counters.
    async fn record_attempt(
        &self,
        event_id: &EventId,
        endpoint: &WebhookEndpoint,
        attempt: u32,
        report: &AttemptReport,
        response_code: Option<u16>,
        response_body: Option<String>,
    ) {
        let now = Utc::now();
        let (status, error) = match &report.outcome {
            DeliveryOutcome::Delivered { .. } => (DeliveryStatus::Delivered, None),
            DeliveryOutcome::Failed(reason) => (DeliveryStatus::Failed, Some(reason.to_string())),
        };

        let delivery = WebhookDelivery {
            id: DeliveryId::generate(),
            event_id: event_id.clone(),
            endpoint_id: endpoint.id.clone(),
            status,
            attempt,
            created_at: now,
            response_code,
            response_body,
            error: error.clone(),
            duration_ms: report.duration_ms,
        };
        self.storage.insert_delivery(&delivery).await;

        match status {
            DeliveryStatus::Delivered => {
                self.storage.record_endpoint_success(&endpoint.id, now).await;
                tracing::info!(
                    target: "webhook_delivery",
                    event_id = %event_id,
                    endpoint_id = %endpoint.id,
                    tenant_id = %endpoint.tenant_id,
                    attempt,
                    response_code = response_code.unwrap_or_default(),
                    duration_ms = report.duration_ms,
                    "Webhook delivery succeeded"
                );
            }
            _ => {
                self.storage.record_endpoint_failure(&endpoint.id).await;
                tracing::warn!(
                    target: "webhook_delivery",
                    event_id = %event_id,
                    endpoint_id = %endpoint.id,
                    tenant_id = %endpoint.tenant_id,
                    attempt,
                    response_code = response_code.unwrap_or_default(),
                    error = error.as_deref().unwrap_or(""),
                    "Webhook delivery failed"
                );
            }
        }
    }
}
