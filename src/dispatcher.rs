use std::collections::BinaryHeap;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use crate::error::{DeliveryOutcome, WebhookError};
use crate::retry::{RetryPolicy, TimedRetry};
use crate::storage::Storage;
use crate::transport::{Transport, REQUEST_TIMEOUT};
use crate::types::{EndpointId, EventStatus, TestWebhookResult, WebhookEvent};
use crate::worker::{worker_loop, DeliveryReport, DeliveryTask, WorkOutcome, WorkerContext};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::counter!(name).increment(1);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

/// Tunables for the delivery pipeline.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Number of worker tasks pulling from the delivery queue.
    pub worker_count: usize,
    /// Capacity of the delivery queue.
    pub queue_size: usize,
    /// Retry budget stamped onto newly created events.
    pub default_max_retries: u32,
    /// First-retry delay in milliseconds.
    pub retry_base_ms: u64,
    /// Retry delay ceiling in milliseconds.
    pub retry_max_ms: u64,
    /// Random jitter added to each scheduled retry.
    pub retry_jitter_ms: u64,
    /// Hard timeout for a single delivery attempt.
    pub request_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            worker_count,
            queue_size: 1_000,
            default_max_retries: 3,
            retry_base_ms: 1_000,
            retry_max_ms: 300_000,
            retry_jitter_ms: 0,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

impl DispatcherConfig {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_ms: self.retry_base_ms,
            max_ms: self.retry_max_ms,
            jitter_ms: self.retry_jitter_ms,
        }
    }
}

/// Fans events out to subscribed endpoints and drives each (event, endpoint)
/// trajectory through attempts, retries, and dead-lettering.
///
/// Delivery attempts run on a pool of worker tasks fed by a bounded queue;
/// workers report every outcome to a scheduler task that owns the event
/// status bookkeeping and a delay heap of pending retries. Within one
/// trajectory attempts are strictly sequential; across trajectories there is
/// no ordering at all, so one slow endpoint cannot stall the rest.
pub struct Dispatcher {
    config: DispatcherConfig,
    storage: Arc<dyn Storage>,
    transport: Transport,
    task_tx: RwLock<Option<mpsc::Sender<DeliveryTask>>>,
    notify: Arc<Notify>,
    is_running: Arc<AtomicBool>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    scheduler_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker pool and scheduler against the given storage.
    pub fn new(config: DispatcherConfig, storage: Arc<dyn Storage>) -> Self {
        let (task_tx, task_rx) = mpsc::channel(config.queue_size.max(1));
        let (report_tx, report_rx) = mpsc::channel(config.queue_size.max(1));
        let shared_task_rx = Arc::new(Mutex::new(task_rx));

        let transport = Transport::new(storage.clone(), config.request_timeout);
        let ctx = Arc::new(WorkerContext {
            storage: storage.clone(),
            transport: transport.clone(),
            report_tx,
        });

        let mut worker_handles = Vec::with_capacity(config.worker_count.max(1));
        for _ in 0..config.worker_count.max(1) {
            worker_handles.push(tokio::spawn(worker_loop(
                shared_task_rx.clone(),
                ctx.clone(),
            )));
        }

        let notify = Arc::new(Notify::new());
        let is_running = Arc::new(AtomicBool::new(true));

        let scheduler_handle = tokio::spawn(scheduler_loop(
            report_rx,
            Some(task_tx.clone()),
            storage.clone(),
            config.retry_policy(),
            notify.clone(),
            is_running.clone(),
        ));

        Self {
            config,
            storage,
            transport,
            task_tx: RwLock::new(Some(task_tx)),
            notify,
            is_running,
            worker_handles: Mutex::new(worker_handles),
            scheduler_handle: Mutex::new(Some(scheduler_handle)),
        }
    }

    /// Retry budget stamped onto events created through this pipeline.
    pub fn default_max_retries(&self) -> u32 {
        self.config.default_max_retries
    }

    /// Fan an event out to every active endpoint in its tenant subscribed to
    /// its type. Each matching endpoint gets an independent trajectory.
    pub async fn dispatch(&self, event: &WebhookEvent) -> Result<(), WebhookError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(WebhookError::Shutdown);
        }
        let task_tx = {
            let guard = self.task_tx.read().await;
            guard.clone().ok_or(WebhookError::Shutdown)?
        };

        let endpoints = self.storage.list_endpoints(&event.tenant_id).await;
        let matching: Vec<_> = endpoints
            .into_iter()
            .filter(|endpoint| endpoint.accepts(event.event_type))
            .collect();

        if matching.is_empty() {
            tracing::debug!(
                target: "webhook_delivery",
                event_id = %event.id,
                event_type = %event.event_type,
                tenant_id = %event.tenant_id,
                "No active endpoints subscribe to event type"
            );
            return Ok(());
        }

        tracing::info!(
            target: "webhook_delivery",
            event_id = %event.id,
            event_type = %event.event_type,
            tenant_id = %event.tenant_id,
            endpoint_count = matching.len(),
            "Dispatching event to subscribed endpoints"
        );

        for endpoint in matching {
            let task = DeliveryTask {
                event_id: event.id.clone(),
                endpoint_id: endpoint.id,
                attempt: 1,
            };
            task_tx
                .send(task)
                .await
                .map_err(|_| WebhookError::Shutdown)?;
            metric_inc("webhook.dispatch.enqueued");
        }

        Ok(())
    }

    /// Sign and POST a synthetic `test.ping` to one endpoint, outside the
    /// event/retry pipeline. Persists nothing, schedules nothing.
    pub async fn send_test_webhook(
        &self,
        endpoint_id: &EndpointId,
    ) -> Result<TestWebhookResult, WebhookError> {
        let endpoint = self
            .storage
            .get_endpoint(endpoint_id)
            .await
            .ok_or_else(|| WebhookError::EndpointNotFound(endpoint_id.clone()))?;

        Ok(self.transport.send_test_webhook(&endpoint).await)
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Stop accepting dispatches, drain workers, and join all tasks.
    /// Retries still waiting in the delay heap are dropped.
    pub async fn shutdown(&self) {
        self.is_running.store(false, Ordering::SeqCst);
        self.task_tx.write().await.take();
        self.notify.notify_waiters();

        if let Some(handle) = self.scheduler_handle.lock().await.take() {
            let _ = handle.await;
        }
        for handle in self.worker_handles.lock().await.drain(..) {
            let _ = handle.await;
        }
    }
}

/// Scheduler task: applies delivery reports to event records and releases
/// due retries back onto the task queue.
///
/// This is the only writer of event status and retry bookkeeping, which
/// keeps concurrent trajectories from racing on the same record.
async fn scheduler_loop(
    mut report_rx: mpsc::Receiver<DeliveryReport>,
    mut task_tx: Option<mpsc::Sender<DeliveryTask>>,
    storage: Arc<dyn Storage>,
    policy: RetryPolicy,
    notify: Arc<Notify>,
    is_running: Arc<AtomicBool>,
) {
    let mut delay_heap: BinaryHeap<TimedRetry> = BinaryHeap::new();

    loop {
        if !is_running.load(Ordering::SeqCst) {
            // Stop feeding workers so the queue can drain and close.
            task_tx.take();
        }

        // Release due retries.
        let now = Instant::now();
        while delay_heap.peek().is_some_and(|t| t.ready_at <= now) {
            let retry = delay_heap.pop().expect("peeked entry");
            requeue_retry(retry.task, &storage, task_tx.as_ref()).await;
        }

        let next_due = delay_heap.peek().map(|t| t.ready_at);
        let sleep_target = next_due.unwrap_or_else(|| Instant::now() + Duration::from_secs(60));

        tokio::select! {
            maybe_report = report_rx.recv() => {
                match maybe_report {
                    Some(report) => {
                        handle_report(report, &storage, &policy, &mut delay_heap).await;
                    }
                    // All workers are gone; nothing further can arrive.
                    None => break,
                }
            }
            _ = sleep_until(sleep_target), if next_due.is_some() => {}
            _ = notify.notified() => {}
        }
    }
}

/// Re-enter a due retry into the delivery queue.
///
/// The event's current status is re-checked first so a trajectory that
/// reached a terminal state while the timer ran is not resurrected.
async fn requeue_retry(
    task: DeliveryTask,
    storage: &Arc<dyn Storage>,
    task_tx: Option<&mpsc::Sender<DeliveryTask>>,
) {
    let Some(event) = storage.get_event(&task.event_id).await else {
        return;
    };
    if event.status != EventStatus::Pending {
        tracing::debug!(
            target: "webhook_delivery",
            event_id = %task.event_id,
            endpoint_id = %task.endpoint_id,
            status = ?event.status,
            "Dropping scheduled retry: event is no longer pending"
        );
        return;
    }

    let Some(tx) = task_tx else { return };
    // A send error means shutdown raced the timer; the retry is dropped.
    let _ = tx.send(task).await;
}

/// Apply one delivery report to the event record: terminal success, a
/// scheduled retry, dead-lettering, or abandonment.
async fn handle_report(
    report: DeliveryReport,
    storage: &Arc<dyn Storage>,
    policy: &RetryPolicy,
    delay_heap: &mut BinaryHeap<TimedRetry>,
) {
    let Some(mut event) = storage.get_event(&report.task.event_id).await else {
        return;
    };
    let now = Utc::now();

    match report.outcome {
        WorkOutcome::Abandoned { reason } => {
            if event.status.is_terminal() {
                return;
            }
            event.status = EventStatus::Failed;
            event.last_error = Some(reason);
            event.next_retry_at = None;
            storage.upsert_event(&event).await;
        }
        WorkOutcome::Attempted(attempt) => {
            event.last_attempt_at = Some(now);

            match attempt.outcome {
                DeliveryOutcome::Delivered { .. } => {
                    // Dead-letter is never regressed, even by a late success
                    // from another trajectory.
                    if event.status == EventStatus::DeadLetter {
                        return;
                    }
                    event.status = EventStatus::Delivered;
                    event.next_retry_at = None;
                    event.last_error = None;
                    storage.upsert_event(&event).await;
                    metric_inc("webhook.delivery.delivered");
                }
                DeliveryOutcome::Failed(reason) => {
                    if event.status.is_terminal() {
                        return;
                    }

                    if event.retry_count >= event.max_retries {
                        event.status = EventStatus::DeadLetter;
                        event.last_error = Some(reason.to_string());
                        event.next_retry_at = None;
                        storage.upsert_event(&event).await;

                        tracing::warn!(
                            target: "webhook_delivery",
                            event_id = %event.id,
                            endpoint_id = %report.task.endpoint_id,
                            tenant_id = %event.tenant_id,
                            attempts = report.task.attempt,
                            error = %reason,
                            "Webhook event dead-lettered"
                        );
                        metric_inc("webhook.delivery.dead_letter");
                    } else {
                        event.retry_count += 1;
                        let delay = policy.backoff_delay(event.retry_count);
                        event.status = EventStatus::Pending;
                        event.last_error = Some(reason.to_string());
                        event.next_retry_at =
                            Some(now + chrono::Duration::milliseconds(delay.as_millis() as i64));
                        storage.upsert_event(&event).await;

                        let ready_at = Instant::now() + delay + policy.jitter();
                        delay_heap.push(TimedRetry {
                            ready_at,
                            task: DeliveryTask {
                                attempt: report.task.attempt + 1,
                                ..report.task
                            },
                        });
                        metric_inc("webhook.delivery.retry_scheduled");
                    }
                }
            }
        }
    }
}
