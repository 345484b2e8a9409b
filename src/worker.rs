use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};

use crate::storage::Storage;
use crate::transport::{AttemptReport, Transport};
use crate::types::{
    DeliveryId, DeliveryStatus, EndpointId, EventId, WebhookDelivery,
};

/// A unit of work consumed by workers: one delivery attempt for one
/// (event, endpoint) trajectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryTask {
    pub event_id: EventId,
    pub endpoint_id: EndpointId,
    /// 1-based attempt number.
    pub attempt: u32,
}

/// What became of a task, reported back to the scheduler.
#[derive(Debug, Clone)]
pub enum WorkOutcome {
    /// The transport ran an attempt (delivered or failed).
    Attempted(AttemptReport),
    /// No attempt was made; the trajectory ends here.
    Abandoned { reason: String },
}

/// Report sent from workers to the scheduler after each task.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub task: DeliveryTask,
    pub outcome: WorkOutcome,
}

/// Shared context for all workers.
pub struct WorkerContext {
    pub storage: Arc<dyn Storage>,
    pub transport: Transport,
    /// Reports from workers to the scheduler.
    pub report_tx: mpsc::Sender<DeliveryReport>,
}

/// Main worker loop.
///
/// Each worker pulls tasks from the shared queue, loads the current event
/// and endpoint records, runs the transport, and reports the outcome. The
/// timer-driven wait between retries lives in the scheduler, so workers are
/// never parked on backoff.
pub async fn worker_loop(rx: Arc<Mutex<mpsc::Receiver<DeliveryTask>>>, ctx: Arc<WorkerContext>) {
    loop {
        let task = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };

        let Some(task) = task else { break };

        if let Some(report) = process_task(task, &ctx).await {
            let _ = ctx.report_tx.send(report).await;
        }
    }
}

/// Run a single delivery task. Returns None when there is nothing to report
/// (the event record disappeared).
async fn process_task(task: DeliveryTask, ctx: &WorkerContext) -> Option<DeliveryReport> {
    let Some(event) = ctx.storage.get_event(&task.event_id).await else {
        tracing::warn!(
            target: "webhook_delivery",
            event_id = %task.event_id,
            endpoint_id = %task.endpoint_id,
            "Skipping delivery task: event record not found"
        );
        return None;
    };

    let endpoint = match ctx.storage.get_endpoint(&task.endpoint_id).await {
        Some(endpoint) => endpoint,
        None => {
            // The endpoint was deleted mid-trajectory. Fail fast with a
            // lookup error and let the ordinary retry/dead-letter path run.
            let delivery = WebhookDelivery {
                id: DeliveryId::generate(),
                event_id: task.event_id.clone(),
                endpoint_id: task.endpoint_id.clone(),
                status: DeliveryStatus::Failed,
                attempt: task.attempt,
                created_at: Utc::now(),
                response_code: None,
                response_body: None,
                error: Some(crate::error::FailureReason::EndpointMissing.to_string()),
                duration_ms: 0,
            };
            ctx.storage.insert_delivery(&delivery).await;

            return Some(DeliveryReport {
                task,
                outcome: WorkOutcome::Attempted(AttemptReport {
                    outcome: crate::error::DeliveryOutcome::Failed(
                        crate::error::FailureReason::EndpointMissing,
                    ),
                    duration_ms: 0,
                }),
            });
        }
    };

    if !endpoint.active {
        // Deactivated endpoints never receive an attempt; the trajectory is
        // abandoned rather than retried against a muted destination.
        tracing::info!(
            target: "webhook_delivery",
            event_id = %task.event_id,
            endpoint_id = %task.endpoint_id,
            "Abandoning delivery: endpoint is inactive"
        );
        return Some(DeliveryReport {
            task,
            outcome: WorkOutcome::Abandoned {
                reason: "endpoint deactivated".into(),
            },
        });
    }

    let report = ctx
        .transport
        .attempt_delivery(&event, &endpoint, task.attempt)
        .await;

    Some(DeliveryReport {
        task,
        outcome: WorkOutcome::Attempted(report),
    })
}
