//! # Pool events emitted by the keep-alive loop and worker supervisors.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Worker events**: spawn, exit, failed launch, respawn backoff, retirement
//! - **Task events**: a routine error stored as a task result
//! - **Pool events**: resize, close requested, closed
//!
//! plus the subscriber-health events published by the
//! [`SubscriberSet`](crate::SubscriberSet) itself.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use workvisor::{Event, EventKind, WorkerId};
//!
//! let ev = Event::new(EventKind::WorkerExited)
//!     .with_worker(WorkerId(4))
//!     .with_reason("poisoned");
//!
//! assert_eq!(ev.kind, EventKind::WorkerExited);
//! assert_eq!(ev.worker, Some(WorkerId(4)));
//! assert_eq!(ev.reason.as_deref(), Some("poisoned"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crate::tasks::{TaskId, WorkerId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of pool events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `reason` (`subscriber=<name> info=<panic>`)
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `reason` (`subscriber=<name> reason=<full|closed>`)
    SubscriberOverflow,

    // === Worker events ===
    /// A worker was launched and its supervisor started.
    ///
    /// Sets: `worker`, `size` (live workers after the spawn)
    WorkerSpawned,

    /// A worker supervisor exited (sentinel, routine error, or pool shutdown).
    ///
    /// Sets: `worker`, `reason` (`poisoned` | `failed` | `cancelled`)
    WorkerExited,

    /// Launching a worker failed (spawn error, handshake, `on_start`).
    ///
    /// Sets: `worker`, `reason`
    WorkerSpawnFailed,

    /// The keep-alive loop delays the next launch after failures.
    ///
    /// Sets: `delay_ms`, `attempt` (consecutive failures)
    RespawnBackoff,

    /// A poison sentinel was queued to retire one surplus worker.
    ///
    /// Sets: `size` (target size at that moment)
    WorkerRetiring,

    // === Task events ===
    /// A routine failed; the error was stored as the task's result.
    ///
    /// Sets: `worker`, `task`, `reason`
    TaskFailed,

    // === Pool events ===
    /// Target worker count changed.
    ///
    /// Sets: `size` (new target)
    PoolResized,

    /// `close()` was called; target size is now zero.
    PoolClosing,

    /// Every worker exited and the queue was emptied.
    PoolClosed,
}

/// Pool event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Worker concerned, if applicable.
    pub worker: Option<WorkerId>,
    /// Task concerned, if applicable.
    pub task: Option<TaskId>,
    /// Human-readable reason (errors, exit cause, overflow details).
    pub reason: Option<Arc<str>>,
    /// Respawn delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Consecutive failed launches.
    pub attempt: Option<u32>,
    /// Worker count (live or target, per kind).
    pub size: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            worker: None,
            task: None,
            reason: None,
            delay_ms: None,
            attempt: None,
            size: None,
        }
    }

    /// Attaches a worker id.
    #[inline]
    pub fn with_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    /// Attaches a task id.
    #[inline]
    pub fn with_task(mut self, task: TaskId) -> Self {
        self.task = Some(task);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    /// Attaches a consecutive-failure count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a worker count.
    #[inline]
    pub fn with_size(mut self, n: usize) -> Self {
        self.size = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: &str) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_reason(format!("subscriber={subscriber} info={info}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_numbers_increase() {
        let a = Event::new(EventKind::PoolResized);
        let b = Event::new(EventKind::PoolResized);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn delay_is_clamped_to_u32_millis() {
        let ev = Event::new(EventKind::RespawnBackoff).with_delay(Duration::from_secs(u64::MAX / 4));
        assert_eq!(ev.delay_ms, Some(u32::MAX));
    }
}
