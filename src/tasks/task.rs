//! # Task identity and submission receipts.
//!
//! A [`Task`] is immutable once built: a payload, a random [`TaskId`] and the
//! instant it was created. The id is never derived from the payload, so two
//! submissions of structurally identical work get two independent result slots.

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identity of a task; the key of the result store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0.simple())
    }
}

/// Identity of one spawned worker, unique within its pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A unit of work: payload plus identity.
///
/// ## Example
/// ```rust
/// use workvisor::Task;
///
/// let a = Task::new("render frame 1");
/// let b = Task::new("render frame 1");
/// assert_ne!(a.id(), b.id());
/// ```
#[derive(Debug)]
pub struct Task<P> {
    id: TaskId,
    payload: P,
    created_at: Instant,
}

impl<P> Task<P> {
    /// Wraps a payload with a fresh identity.
    pub fn new(payload: P) -> Self {
        Self {
            id: TaskId::new(),
            payload,
            created_at: Instant::now(),
        }
    }

    /// Returns the task identity.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns the payload.
    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Consumes the task, returning its payload.
    pub fn into_payload(self) -> P {
        self.payload
    }

    /// Returns when the task was created.
    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Returns the receipt a caller uses to fetch this task's result.
    pub fn handle(&self) -> TaskHandle {
        TaskHandle {
            id: self.id,
            created_at: self.created_at,
        }
    }
}

/// Receipt returned by submission; fetch the result with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: TaskId,
    created_at: Instant,
}

impl TaskHandle {
    /// Returns the task identity.
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Returns how long ago the task was created.
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_payloads_get_distinct_ids() {
        let tasks: Vec<Task<u32>> = (0..64).map(|_| Task::new(7)).collect();
        let mut ids: Vec<TaskId> = tasks.iter().map(Task::id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn handle_points_at_its_task() {
        let task = Task::new(vec![1, 2, 3]);
        let handle = task.handle();
        assert_eq!(handle.id(), task.id());
        assert_eq!(task.into_payload(), vec![1, 2, 3]);
    }

    #[test]
    fn display_is_compact() {
        assert_eq!(WorkerId(3).to_string(), "worker-3");
        assert!(TaskId::new().to_string().starts_with("task-"));
    }
}
