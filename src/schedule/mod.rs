//! Periodic task scheduling.
//!
//! ## Contents
//! - [`PeriodicTask`], [`TimingMode`], [`Tick`]: a callable on its own virtual clock
//! - [`Scheduler`], [`TaskKey`], [`Fired`]: fires the earliest-due task, sleeping as its mode requires
//! - [`SchedulerThread`]: drives a scheduler on a background thread
//! - [`Clock`], [`MonotonicClock`], [`ManualClock`]: time sources
//! - [`precise_sleep`]: OS sleep plus a short spin tail
//!
//! The scheduler is synchronous: it paces one thread, and its
//! callables run on that thread.

mod clock;
mod scheduler;
mod sleep;
mod task;
mod thread;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use scheduler::{Fired, Scheduler, TaskKey};
pub use sleep::{ahead_margin, precise_sleep, MAX_AHEAD, MIN_AHEAD};
pub use task::{Callable, PeriodicTask, Tick, TimingMode};
pub use thread::SchedulerThread;
