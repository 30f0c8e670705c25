//! # workvisor
//!
//! **Workvisor** runs stateful routines on a self-healing pool of workers
//! and paces periodic callables on drift-free virtual clocks.
//!
//! Two independent building blocks:
//! - [`WorkerPool`]: a fixed-size pool of thread or process workers fed by a
//!   shared queue. Results land in a store keyed by task; a keep-alive loop
//!   replaces workers that die or fail.
//! - [`Scheduler`]: fires [`PeriodicTask`]s at their own frequencies in
//!   free-running, synchronous or precise mode, with optional frameskip.
//!
//! ## Architecture
//! ### Worker pool
//! ```text
//!   submit(payload) ──► TaskQueue ◄──────── Poison (one per retired worker)
//!                         │
//!        ┌────────────────┼────────────────┐
//!        ▼                ▼                ▼
//!  ┌────────────┐   ┌────────────┐   ┌────────────┐
//!  │ Supervisor │   │ Supervisor │   │ Supervisor │   pop ─► Worker::process
//!  │  worker-1  │   │  worker-2  │   │  worker-N  │   store ─► task_done
//!  └─────┬──────┘   └─────┬──────┘   └─────┬──────┘
//!        │ Ok / Err       │                │ exit on Err, Poison, cancel
//!        ▼                ▼                ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                 ResultStore (TaskId ─► Ok(O) | Err(TaskError))    │
//! └──────────────────────────────┬────────────────────────────────────┘
//!                                ▼
//!                  get(handle, Wait::Forever | Timeout | NonBlocking)
//!
//!  keep-alive loop:  live < target ─► Executor::launch (RespawnPolicy backoff)
//!                    live > target ─► push Poison
//!                    wakes on worker death, set_size, heal_interval, close
//! ```
//!
//! ### Events
//! ```text
//! Supervisors / keep-alive ──► Bus (broadcast) ──► listener ──► SubscriberSet
//!                                                              ├─► sub1.on_event()
//!                                                              └─► subN.on_event()
//! ```
//!
//! ### Scheduler
//! ```text
//! loop {
//!   ├─► pick the task with the earliest next_call_at (one-shot wins ties)
//!   ├─► sleep until due (Synchronous: OS sleep, Precise: sleep + spin tail)
//!   ├─► call(Tick{ dt, elapsed, time, frame })
//!   └─► advance its grid: anchor + k × period (frameskip jumps missed k)
//! }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Pool**          | Submit tasks, fetch results, resize, join and close.         | [`WorkerPool`], [`PoolBuilder`], [`Wait`]   |
//! | **Backends**      | Run routines on blocking threads or child processes.         | [`ThreadExecutor`], [`ProcessExecutor`]     |
//! | **Routines**      | Per-worker state set up once, reused for every task.         | [`Routine`], [`Invoke`]                     |
//! | **Subscriber API**| Hook into pool lifecycle events (logging, metrics).          | [`Subscribe`], [`Event`]                    |
//! | **Policies**      | Respawn backoff for workers that fail to launch.             | [`RespawnPolicy`]                           |
//! | **Scheduling**    | Periodic and one-shot callables on virtual clocks.           | [`Scheduler`], [`PeriodicTask`], [`Clock`]  |
//! | **Errors**        | Typed errors for the pool, tasks and the scheduler.          | [`PoolError`], [`TaskError`], [`SchedulerError`] |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`] and logs scheduler driver failures through `tracing`.
//!
//! ## Example
//! ```rust
//! use workvisor::{TaskError, Wait, WorkerPool};
//!
//! #[tokio::main(flavor = "multi_thread", worker_threads = 2)]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool: WorkerPool<u64, u64> = WorkerPool::threads(2, || {
//!         |n: u64| -> Result<Option<u64>, TaskError> { Ok(Some(n * n)) }
//!     })?;
//!
//!     let handles = pool.submit_many(1..=4)?;
//!     let squares: Vec<u64> = pool
//!         .get_many(&handles, Wait::Forever)
//!         .await
//!         .into_iter()
//!         .filter_map(|f| f.ready())
//!         .collect();
//!     assert_eq!(squares, vec![1, 4, 9, 16]);
//!
//!     pool.close().await;
//!     Ok(())
//! }
//! ```
mod core;
mod error;
mod events;
mod executor;
mod policies;
mod schedule;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use core::{Fetch, PoolBuilder, PoolConfig, Wait, WorkerPool};
pub use error::{BoxError, PoolError, SchedulerError, TaskError};
pub use events::{Bus, Event, EventKind};
pub use executor::{
    serve, ConcurrencyKind, Executor, Handshake, ProcessExecutor, Reply, Request, ThreadExecutor,
    Worker,
};
pub use policies::{Jitter, RespawnPolicy};
pub use schedule::{
    ahead_margin, precise_sleep, Callable, Clock, Fired, ManualClock, MonotonicClock,
    PeriodicTask, Scheduler, SchedulerThread, TaskKey, Tick, TimingMode, MAX_AHEAD, MIN_AHEAD,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use tasks::{Call, Invoke, Routine, Task, TaskHandle, TaskId, WorkerId};

// Optional: expose a built-in subscriber that logs pool events via `tracing`.
// Enabled by default; opt out with `default-features = false`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
