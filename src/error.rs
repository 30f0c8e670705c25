//! Error types used by the worker pool, its tasks and the scheduler.
//!
//! This module defines three enums:
//!
//! - [`PoolError`]: errors raised by the pool itself (misconfiguration, use after close).
//! - [`TaskError`]: errors stored as the result of an individual task.
//! - [`SchedulerError`]: errors surfaced by the periodic task scheduler.
//!
//! All of them provide `as_label` for logs/metrics. [`TaskError`] is serializable
//! because process-backed workers send it back across the process boundary.

use std::any::Any;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tasks::WorkerId;

/// Boxed error returned by periodic task callables.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced by the worker pool.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The pool was closed; it accepts no new tasks and cannot be resized.
    #[error("worker pool is closed")]
    Closed,

    /// The pool configuration was rejected at construction.
    #[error("invalid pool configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with the configuration.
        reason: String,
    },

    /// The pool was built outside of a tokio runtime.
    #[error("worker pool must be built inside a tokio runtime")]
    NoRuntime,

    /// A worker could not be launched (spawn failure, failed handshake or `on_start`).
    #[error("failed to launch {worker}: {reason}")]
    Spawn {
        /// Worker that failed to launch.
        worker: WorkerId,
        /// Underlying failure message.
        reason: String,
    },
}

impl PoolError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use workvisor::PoolError;
    ///
    /// assert_eq!(PoolError::Closed.as_label(), "pool_closed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            PoolError::Closed => "pool_closed",
            PoolError::InvalidConfig { .. } => "pool_invalid_config",
            PoolError::NoRuntime => "pool_no_runtime",
            PoolError::Spawn { .. } => "pool_spawn_failed",
        }
    }
}

/// # Errors stored as the result of a task.
///
/// A routine failure is captured and stored for the task that was in flight;
/// it is only surfaced when the caller fetches that task's result.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskError {
    /// The routine returned an error for this task.
    #[error("task failed: {error}")]
    Failed {
        /// The underlying error message.
        error: String,
    },

    /// The routine panicked while processing this task.
    #[error("routine panicked: {info}")]
    Panicked {
        /// Panic payload, if it was a string.
        info: String,
    },

    /// The worker went away mid-task (process exited, stdout closed).
    #[error("worker lost: {reason}")]
    WorkerLost {
        /// Why the worker is considered lost.
        reason: String,
    },

    /// Payload or result could not cross the process boundary.
    #[error("protocol error: {error}")]
    Protocol {
        /// Encoding/decoding failure message.
        error: String,
    },
}

impl TaskError {
    /// Shorthand for [`TaskError::Failed`].
    ///
    /// # Example
    /// ```
    /// use workvisor::TaskError;
    ///
    /// let err = TaskError::failed("model not loaded");
    /// assert_eq!(err.as_label(), "task_failed");
    /// assert_eq!(err.to_string(), "task failed: model not loaded");
    /// ```
    pub fn failed(error: impl std::fmt::Display) -> Self {
        TaskError::Failed {
            error: error.to_string(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed { .. } => "task_failed",
            TaskError::Panicked { .. } => "task_panicked",
            TaskError::WorkerLost { .. } => "task_worker_lost",
            TaskError::Protocol { .. } => "task_protocol",
        }
    }

    /// Builds a [`TaskError::Panicked`] from a caught panic payload.
    pub(crate) fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let info = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        TaskError::Panicked { info }
    }
}

/// # Errors surfaced by the periodic task scheduler.
///
/// A callable's error is not recovered: it propagates to whoever drives the
/// scheduler, and the failing tick is not rescheduled.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SchedulerError {
    /// A periodic task's callable returned an error.
    #[error("periodic task {name} failed: {source}")]
    Task {
        /// Task name (or its key when unnamed).
        name: String,
        /// Error returned by the callable.
        #[source]
        source: BoxError,
    },

    /// A frequency that is not a positive finite number of Hz.
    #[error("invalid frequency {frequency} Hz (must be positive and finite)")]
    InvalidFrequency {
        /// The rejected value.
        frequency: f64,
    },

    /// The background driver thread panicked.
    #[error("scheduler driver thread panicked: {info}")]
    DriverPanicked {
        /// Panic payload, if it was a string.
        info: String,
    },
}

impl SchedulerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SchedulerError::Task { .. } => "scheduler_task_failed",
            SchedulerError::InvalidFrequency { .. } => "scheduler_invalid_frequency",
            SchedulerError::DriverPanicked { .. } => "scheduler_driver_panicked",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payloads_are_readable() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(
            TaskError::from_panic(boxed.as_ref()),
            TaskError::Panicked { info: "boom".into() }
        );

        let boxed: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(
            TaskError::from_panic(boxed.as_ref()),
            TaskError::Panicked { info: "owned boom".into() }
        );

        let boxed: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(
            TaskError::from_panic(boxed.as_ref()),
            TaskError::Panicked { info: "unknown panic".into() }
        );
    }

    #[test]
    fn task_error_survives_the_wire() {
        let err = TaskError::WorkerLost { reason: "exit status: 3".into() };
        let json = serde_json::to_string(&err).unwrap();
        let back: TaskError = serde_json::from_str(&json).unwrap();
        assert_eq!(back, err);
    }
}
