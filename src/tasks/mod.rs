//! # Task abstractions.
//!
//! This module provides the pool's unit-of-work types:
//! - [`Task`] - a payload wrapped with a unique identity and creation time
//! - [`TaskId`] / [`TaskHandle`] - result-store key and the caller's receipt
//! - [`WorkerId`] - identity of one spawned worker
//! - [`Routine`] - the long-lived, stateful processing routine a worker runs
//! - [`Call`] / [`Invoke`] - callable payloads and the routine that invokes them

mod routine;
mod task;

pub use routine::{Call, Invoke, Routine};
pub use task::{Task, TaskHandle, TaskId, WorkerId};
