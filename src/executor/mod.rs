//! # Worker backends.
//!
//! A pool does not know how its workers run. It asks an [`Executor`] to
//! launch a [`Worker`], then feeds that worker one task at a time from its
//! supervisor loop:
//!
//! ```text
//! keep-alive ──► Executor::launch(id) ──► Box<dyn Worker>
//!                                              │
//! supervisor loop: pop ──► Worker::process(task) ──► store result
//!                                              │
//!                  exit ──► Worker::shutdown()
//! ```
//!
//! Two backends ship with the crate:
//! - [`ThreadExecutor`]: the routine runs in-process on tokio's blocking pool;
//! - [`ProcessExecutor`]: each worker is a child process speaking JSON lines
//!   (see [`serve`] for the child side).
//!
//! Both present the same contract, so the pool API is identical whichever
//! [`ConcurrencyKind`] is in use.

mod process;
mod serve;
mod thread;
mod wire;

use std::fmt;

use async_trait::async_trait;

use crate::core::PoolConfig;
use crate::error::{PoolError, TaskError};
use crate::tasks::{Task, WorkerId};

pub use process::ProcessExecutor;
pub use serve::serve;
pub use thread::ThreadExecutor;
pub use wire::{Handshake, Reply, Request};

/// How a pool's workers execute.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConcurrencyKind {
    /// In-process, on OS threads.
    Thread,
    /// One child process per worker.
    Process,
}

impl ConcurrencyKind {
    /// Returns a short stable label for logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConcurrencyKind::Thread => "thread",
            ConcurrencyKind::Process => "process",
        }
    }
}

impl fmt::Display for ConcurrencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_label())
    }
}

/// Launches workers for a pool.
///
/// ### Rules
/// - `launch` returns only once the worker is ready for its first task
///   (routine constructed, `on_start` done, handshake received).
/// - A failed launch is reported as [`PoolError::Spawn`]; the keep-alive
///   loop retries it after the respawn backoff.
#[async_trait]
pub trait Executor<P, O>: Send + Sync + 'static
where
    P: Send + 'static,
    O: Send + 'static,
{
    /// The backend kind, fixed for the executor's lifetime.
    fn kind(&self) -> ConcurrencyKind;

    /// Starts one worker.
    async fn launch(&self, id: WorkerId, cfg: &PoolConfig) -> Result<Box<dyn Worker<P, O>>, PoolError>;
}

/// One live worker, owned by exactly one supervisor loop.
#[async_trait]
pub trait Worker<P, O>: Send + 'static
where
    P: Send + 'static,
    O: Send + 'static,
{
    /// Processes one task to completion.
    ///
    /// `Err` is stored as the task's result and ends this worker.
    async fn process(&mut self, task: Task<P>) -> Result<Option<O>, TaskError>;

    /// Releases the worker's resources. Called once, after the last task.
    async fn shutdown(&mut self);
}
