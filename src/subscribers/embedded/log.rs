//! # LogWriter: pool events through `tracing`
//!
//! A subscriber that turns every [`Event`] into one `tracing` record, at a
//! level matching its severity. Install any `tracing` subscriber to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  workvisor: worker spawned worker=worker-1 live=1
//! WARN  workvisor: task failed worker=worker-1 task=task-0c1f.. reason="task failed: bad frame"
//! INFO  workvisor: worker exited worker=worker-1 reason=failed
//! WARN  workvisor: respawn backoff delay_ms=100 failures=1
//! INFO  workvisor: pool closed
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Debug, Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let worker = e.worker.map(|w| w.to_string());
        let task = e.task.map(|t| t.to_string());
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::WorkerSpawned => {
                tracing::info!(target: "workvisor", worker = ?worker, live = ?e.size, "worker spawned");
            }
            EventKind::WorkerExited => {
                tracing::info!(target: "workvisor", worker = ?worker, reason, "worker exited");
            }
            EventKind::WorkerRetiring => {
                tracing::debug!(target: "workvisor", target_size = ?e.size, "retiring surplus worker");
            }
            EventKind::WorkerSpawnFailed => {
                tracing::error!(target: "workvisor", worker = ?worker, reason, "worker launch failed");
            }
            EventKind::RespawnBackoff => {
                tracing::warn!(target: "workvisor", delay_ms = ?e.delay_ms, failures = ?e.attempt, "respawn backoff");
            }
            EventKind::TaskFailed => {
                tracing::warn!(target: "workvisor", worker = ?worker, task = ?task, reason, "task failed");
            }
            EventKind::PoolResized => {
                tracing::info!(target: "workvisor", size = ?e.size, "pool resized");
            }
            EventKind::PoolClosing => {
                tracing::info!(target: "workvisor", "pool closing");
            }
            EventKind::PoolClosed => {
                tracing::info!(target: "workvisor", "pool closed");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "workvisor", reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::error!(target: "workvisor", reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log-writer"
    }
}
