//! Pool events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: the keep-alive loop, worker supervisors, `WorkerPool`
//!   (resize/close) and `SubscriberSet` workers (overflow/panic).
//! - **Consumer**: the pool's listener task, which fans events out to the
//!   subscribers given to [`PoolBuilder`](crate::PoolBuilder).

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
