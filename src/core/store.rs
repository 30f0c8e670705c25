//! # Result store.
//!
//! Keyed by [`TaskId`], written once per task by whichever supervisor ran it,
//! read (and removed) by callers of `get`.
//!
//! ```text
//! supervisor ──► insert(id, result) ─┬─► HashMap<TaskId, Result<O, TaskError>>
//!                                    └─► version += 1   (under the same lock)
//!                                              │
//! get(handle, wait) ◄── changed() | poll tick ─┘
//! ```
//!
//! ## Rules
//! - The version bump happens while the map lock is held, so a waiter that
//!   checked the map and then awaits `changed()` cannot miss the insert.
//! - Waiters re-check on every notification and on every `poll` tick.
//! - A timeout is reported as [`Fetch::TimedOut`], never as "pending" or as an error.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::TaskError;
use crate::tasks::TaskId;

/// How long a result lookup may wait.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Wait {
    /// Look once and return.
    #[default]
    NonBlocking,
    /// Wait until the result is stored.
    Forever,
    /// Wait at most this long.
    Timeout(Duration),
}

impl Wait {
    fn deadline(self) -> Option<Instant> {
        match self {
            Wait::NonBlocking => Some(Instant::now()),
            Wait::Forever => None,
            Wait::Timeout(d) => Some(Instant::now() + d),
        }
    }
}

/// Outcome of a result lookup.
///
/// Four distinguishable cases: nothing yet, a value, the task's error,
/// or a blocking wait that ran out of time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetch<O> {
    /// Not computed yet (non-blocking lookup).
    Pending,
    /// The routine's output.
    Ready(O),
    /// The error captured for this task.
    Failed(TaskError),
    /// A blocking lookup hit its timeout.
    TimedOut,
}

impl<O> Fetch<O> {
    /// Returns `true` for [`Fetch::Ready`].
    pub fn is_ready(&self) -> bool {
        matches!(self, Fetch::Ready(_))
    }

    /// Returns the output, if any.
    pub fn ready(self) -> Option<O> {
        match self {
            Fetch::Ready(out) => Some(out),
            _ => None,
        }
    }

    /// Returns the stored outcome, or `None` when nothing was stored yet.
    pub fn into_result(self) -> Option<Result<O, TaskError>> {
        match self {
            Fetch::Ready(out) => Some(Ok(out)),
            Fetch::Failed(e) => Some(Err(e)),
            Fetch::Pending | Fetch::TimedOut => None,
        }
    }
}

impl<O> From<Result<O, TaskError>> for Fetch<O> {
    fn from(result: Result<O, TaskError>) -> Self {
        match result {
            Ok(out) => Fetch::Ready(out),
            Err(e) => Fetch::Failed(e),
        }
    }
}

pub(crate) struct ResultStore<O> {
    results: Mutex<HashMap<TaskId, Result<O, TaskError>>>,
    version: watch::Sender<u64>,
}

impl<O> ResultStore<O> {
    pub(crate) fn new() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            version: watch::Sender::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TaskId, Result<O, TaskError>>> {
        self.results.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a result and wakes every waiter.
    pub(crate) fn insert(&self, id: TaskId, result: Result<O, TaskError>) {
        let mut results = self.lock();
        results.insert(id, result);
        self.version.send_modify(|v| *v = v.wrapping_add(1));
    }

    /// Removes and returns a stored result.
    pub(crate) fn take(&self, id: TaskId) -> Option<Result<O, TaskError>> {
        self.lock().remove(&id)
    }

    /// Returns a copy of a stored result, leaving it in place.
    pub(crate) fn peek(&self, id: TaskId) -> Option<Result<O, TaskError>>
    where
        O: Clone,
    {
        self.lock().get(&id).cloned()
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drops every stored result, returning how many there were.
    pub(crate) fn clear(&self) -> usize {
        let mut results = self.lock();
        let n = results.len();
        results.clear();
        n
    }

    /// Waits for `id` according to `wait`, removing the result when found.
    pub(crate) async fn wait(&self, id: TaskId, wait: Wait, poll: Duration) -> Fetch<O> {
        match wait {
            Wait::NonBlocking => self.take(id).map_or(Fetch::Pending, Fetch::from),
            _ => self.wait_until(id, wait.deadline(), poll).await,
        }
    }

    /// Waits for several ids in input order, sharing one deadline.
    pub(crate) async fn wait_many(&self, ids: &[TaskId], wait: Wait, poll: Duration) -> Vec<Fetch<O>> {
        let mut out = Vec::with_capacity(ids.len());
        match wait {
            Wait::NonBlocking => {
                for id in ids {
                    out.push(self.take(*id).map_or(Fetch::Pending, Fetch::from));
                }
            }
            _ => {
                let deadline = wait.deadline();
                for id in ids {
                    out.push(self.wait_until(*id, deadline, poll).await);
                }
            }
        }
        out
    }

    async fn wait_until(&self, id: TaskId, deadline: Option<Instant>, poll: Duration) -> Fetch<O> {
        let mut version = self.version.subscribe();
        loop {
            version.borrow_and_update();
            if let Some(result) = self.take(id) {
                return result.into();
            }

            let nap = match deadline {
                None => poll,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Fetch::TimedOut;
                    }
                    poll.min(deadline - now)
                }
            };
            tokio::select! {
                _ = version.changed() => {}
                _ = tokio::time::sleep(nap) => {}
            }
        }
    }
}
