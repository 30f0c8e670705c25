//! # Worker supervisor: the loop around one worker.
//!
//! ```text
//! AWAIT_TASK ──► pop()
//!    │            ├─ cancelled ──────────────────────────► EXIT(cancelled)
//!    │            ├─ Poison ─────────────────────────────► EXIT(poisoned)
//!    │            └─ Task ──► RUN ──► worker.process(task)
//!    │                                  ├─ Ok(Some(out)) ─► STORE ─► task_done ─┐
//!    │                                  ├─ Ok(None) ──────────────► task_done ─┤
//!    │                                  └─ Err(e) ──► STORE(e) ─► task_done ──► EXIT(failed)
//!    └──────────────────────────────────────────────────────────────────────────┘
//!
//! EXIT ──► worker.shutdown() ──► drop AliveGuard (keep-alive wakes) ──► WorkerExited
//! ```
//!
//! ## Rules
//! - A task is marked done only after its result is stored, so `join()`
//!   returning means every result is retrievable.
//! - A routine error never escapes: it becomes the in-flight task's result,
//!   and the supervisor exits cleanly so the keep-alive loop replaces it.
//! - Cancellation is observed only while waiting for a task; a running task
//!   always completes.

use std::sync::Arc;

use crate::core::pool::Shared;
use crate::core::queue::Message;
use crate::core::workers::AliveGuard;
use crate::events::{Event, EventKind};
use crate::executor::Worker;
use crate::tasks::WorkerId;

/// Why a supervisor loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExitReason {
    /// Consumed a poison sentinel.
    Poisoned,
    /// The routine failed a task.
    Failed,
    /// The pool was cancelled.
    Cancelled,
}

impl ExitReason {
    pub(crate) fn as_label(&self) -> &'static str {
        match self {
            ExitReason::Poisoned => "poisoned",
            ExitReason::Failed => "failed",
            ExitReason::Cancelled => "cancelled",
        }
    }
}

pub(crate) struct WorkerSupervisor<P: Send + 'static, O: Send + 'static> {
    id: WorkerId,
    worker: Box<dyn Worker<P, O>>,
    shared: Arc<Shared<P, O>>,
    alive: AliveGuard,
}

impl<P, O> WorkerSupervisor<P, O>
where
    P: Send + 'static,
    O: Send + 'static,
{
    pub(crate) fn new(
        id: WorkerId,
        worker: Box<dyn Worker<P, O>>,
        shared: Arc<Shared<P, O>>,
        alive: AliveGuard,
    ) -> Self {
        Self {
            id,
            worker,
            shared,
            alive,
        }
    }

    /// Runs the loop until a sentinel, a routine failure or cancellation.
    pub(crate) async fn run(self) -> ExitReason {
        let Self {
            id,
            mut worker,
            shared,
            alive,
        } = self;

        let reason = loop {
            let task = match shared.queue.pop(&shared.token).await {
                None => break ExitReason::Cancelled,
                Some(Message::Poison) => break ExitReason::Poisoned,
                Some(Message::Task(task)) => task,
            };

            let task_id = task.id();
            match worker.process(task).await {
                Ok(Some(out)) => {
                    shared.store.insert(task_id, Ok(out));
                    shared.queue.task_done();
                }
                Ok(None) => shared.queue.task_done(),
                Err(e) => {
                    shared.bus.publish(
                        Event::new(EventKind::TaskFailed)
                            .with_worker(id)
                            .with_task(task_id)
                            .with_reason(e.to_string()),
                    );
                    shared.store.insert(task_id, Err(e));
                    shared.queue.task_done();
                    break ExitReason::Failed;
                }
            }
        };

        worker.shutdown().await;
        drop(alive);
        shared.bus.publish(
            Event::new(EventKind::WorkerExited)
                .with_worker(id)
                .with_reason(reason.as_label())
                .with_size(shared.workers.live()),
        );
        reason
    }
}
