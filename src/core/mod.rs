//! Pool core: queue, result store, supervision and self-healing.
//!
//! The public API from this module is [`WorkerPool`], built by
//! [`PoolBuilder`] from a [`PoolConfig`], plus the [`Fetch`] / [`Wait`]
//! types of its result lookups.
//!
//! Internal modules:
//! - [`queue`]: MPMC task channel with poison sentinels and done-accounting;
//! - [`store`]: result map with lost-wakeup-free blocking waits;
//! - [`workers`]: live worker count and the death signal;
//! - [`supervisor`]: the loop around one worker;
//! - [`keepalive`]: holds the live count at target, with respawn backoff.

mod builder;
mod config;
mod keepalive;
mod pool;
mod queue;
mod store;
mod supervisor;
mod workers;

pub use builder::PoolBuilder;
pub use config::PoolConfig;
pub use pool::WorkerPool;
pub use store::{Fetch, Wait};
