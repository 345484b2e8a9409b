//! Retry policy: exponential backoff with a ceiling, plus the timed entries
//! the scheduler keeps in its delay heap.

use std::cmp::Ordering as CmpOrdering;
use std::time::Duration;

use tokio::time::Instant;

use crate::worker::DeliveryTask;

/// Backoff parameters for scheduled retries.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// First-retry delay in milliseconds.
    pub base_ms: u64,
    /// Delay ceiling in milliseconds.
    pub max_ms: u64,
    /// Random jitter added on top of the computed delay. Zero keeps the
    /// backoff sequence exact.
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 300_000,
            jitter_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Deterministic delay before the retry numbered `retry_count` (1-based):
    /// `min(base * 2^(retry_count - 1), max)`.
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let base = self.base_ms.max(1);
        let max = self.max_ms.max(base);
        let pow = 2u64.saturating_pow(retry_count.saturating_sub(1));
        Duration::from_millis(base.saturating_mul(pow).min(max))
    }

    /// Random jitter component, `0..=jitter_ms`.
    pub fn jitter(&self) -> Duration {
        if self.jitter_ms == 0 {
            return Duration::from_millis(0);
        }
        Duration::from_millis(fastrand::u64(0..=self.jitter_ms))
    }
}

/// A retry waiting for its due time in the scheduler's heap.
#[derive(Debug)]
pub struct TimedRetry {
    pub ready_at: Instant,
    pub task: DeliveryTask,
}

impl Eq for TimedRetry {}

impl PartialEq for TimedRetry {
    fn eq(&self, other: &Self) -> bool {
        self.ready_at.eq(&other.ready_at)
    }
}

impl Ord for TimedRetry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse for min-heap behavior
        other.ready_at.cmp(&self.ready_at)
    }
}

impl PartialOrd for TimedRetry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EndpointId, EventId};
    use std::collections::BinaryHeap;

    #[test]
    fn backoff_doubles_from_base() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(4_000));
        assert_eq!(policy.backoff_delay(4), Duration::from_millis(8_000));
    }

    #[test]
    fn backoff_strictly_increases_until_cap() {
        let policy = RetryPolicy::default();
        let mut previous = Duration::ZERO;
        let mut capped = false;
        for retry_count in 1..=12 {
            let delay = policy.backoff_delay(retry_count);
            if capped {
                assert_eq!(delay, Duration::from_millis(policy.max_ms));
            } else {
                assert!(delay > previous);
            }
            capped = delay == Duration::from_millis(policy.max_ms);
            previous = delay;
        }
        assert!(capped, "cap must be reached within the probed range");
    }

    #[test]
    fn backoff_caps_at_five_minutes() {
        let policy = RetryPolicy::default();
        // 1000ms * 2^9 = 512s, past the 300s ceiling.
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(300_000));
        assert_eq!(policy.backoff_delay(32), Duration::from_millis(300_000));
    }

    #[test]
    fn zero_jitter_is_exact() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.jitter(), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy {
            jitter_ms: 25,
            ..Default::default()
        };
        for _ in 0..100 {
            assert!(policy.jitter() <= Duration::from_millis(25));
        }
    }

    #[test]
    fn heap_pops_earliest_first() {
        let now = Instant::now();
        let task = |n: u32| DeliveryTask {
            event_id: EventId(format!("evt_{n}")),
            endpoint_id: EndpointId("ep_1".into()),
            attempt: n,
        };

        let mut heap = BinaryHeap::new();
        heap.push(TimedRetry {
            ready_at: now + Duration::from_secs(30),
            task: task(1),
        });
        heap.push(TimedRetry {
            ready_at: now + Duration::from_secs(5),
            task: task(2),
        });
        heap.push(TimedRetry {
            ready_at: now + Duration::from_secs(15),
            task: task(3),
        });

        assert_eq!(heap.pop().unwrap().task.event_id.0, "evt_2");
        assert_eq!(heap.pop().unwrap().task.event_id.0, "evt_3");
        assert_eq!(heap.pop().unwrap().task.event_id.0, "evt_1");
    }
}
