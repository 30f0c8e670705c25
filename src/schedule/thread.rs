//! # Background driver for a scheduler.
//!
//! ```text
//! spawn(scheduler) ──► OS thread: loop {
//!                         nothing due soon      ──► sleep ≤ STOP_POLL
//!                         due within STOP_POLL  ──► scheduler.next()
//!                           └─ Err ──► return Err (thread ends)
//!                         cancelled?            ──► return Ok(scheduler)
//!                      }
//! stop() ──► cancel ──► join ──► Ok(scheduler) | Err(task error) | Err(DriverPanicked)
//! ```
//!
//! Long waits are cut into `STOP_POLL` slices so `stop()` is honored within
//! one slice even when the next task is minutes away. The token is checked
//! after each pass, so work already due at `spawn` fires even when `stop()`
//! follows immediately.

use std::io;
use std::thread::{self, JoinHandle};

use tokio_util::sync::CancellationToken;

use super::scheduler::Scheduler;
use crate::error::{SchedulerError, TaskError};

/// Longest uninterruptible sleep of the driver thread, in seconds.
const STOP_POLL: f64 = 0.05;

/// Handle to a scheduler running on its own thread.
pub struct SchedulerThread<R = ()> {
    token: CancellationToken,
    handle: JoinHandle<Result<Scheduler<R>, SchedulerError>>,
}

impl<R: Send + 'static> Scheduler<R> {
    /// Moves the scheduler onto a named background thread and drives it
    /// until [`SchedulerThread::stop`] or a callable error.
    pub fn spawn(self) -> io::Result<SchedulerThread<R>> {
        let token = CancellationToken::new();
        let handle = thread::Builder::new()
            .name("workvisor-scheduler".into())
            .spawn({
                let token = token.clone();
                move || drive(self, &token)
            })?;
        Ok(SchedulerThread { token, handle })
    }
}

fn drive<R>(mut sched: Scheduler<R>, token: &CancellationToken) -> Result<Scheduler<R>, SchedulerError> {
    loop {
        match sched.time_until_next() {
            Some(wait) if wait <= STOP_POLL => {
                if let Err(e) = sched.next() {
                    #[cfg(feature = "logging")]
                    tracing::warn!(target: "workvisor", error = %e, "scheduler driver stopped");
                    return Err(e);
                }
            }
            Some(wait) => sched.clock().sleep((wait - STOP_POLL).min(STOP_POLL), false),
            None => sched.clock().sleep(STOP_POLL, false),
        }
        if token.is_cancelled() {
            return Ok(sched);
        }
    }
}

impl<R> SchedulerThread<R> {
    /// Returns `true` once the driver thread has ended (stopped or failed).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the driver and returns the scheduler, or the error that ended it.
    pub fn stop(self) -> Result<Scheduler<R>, SchedulerError> {
        self.token.cancel();
        match self.handle.join() {
            Ok(result) => result,
            Err(panic) => Err(SchedulerError::DriverPanicked {
                info: match TaskError::from_panic(panic.as_ref()) {
                    TaskError::Panicked { info } => info,
                    other => other.to_string(),
                },
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::task::PeriodicTask;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    #[test]
    fn runs_until_stopped_and_hands_the_scheduler_back() {
        let ticks = Arc::new(AtomicU64::new(0));
        let mut sched = Scheduler::new();
        let key = sched
            .add(PeriodicTask::new({
                let ticks = Arc::clone(&ticks);
                move |_| {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .with_frequency(200.0))
            .unwrap();

        let running = sched.spawn().unwrap();
        thread::sleep(Duration::from_millis(100));
        let sched = running.stop().unwrap();

        assert!(ticks.load(Ordering::SeqCst) >= 5);
        assert_eq!(sched.get(key).unwrap().frames(), ticks.load(Ordering::SeqCst));
    }

    #[test]
    fn callable_error_ends_the_thread() {
        let mut sched: Scheduler<()> = Scheduler::new();
        sched.once(|_| Err("bad frame".into()));

        let running = sched.spawn().unwrap();
        while !running.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        let err = running.stop().unwrap_err();
        assert_eq!(err.as_label(), "scheduler_task_failed");
    }

    #[test]
    fn stop_is_prompt_when_the_next_task_is_far_away() {
        let mut sched: Scheduler<()> = Scheduler::new();
        let key = sched
            .add(PeriodicTask::new(|_| Ok(())).with_frequency(0.2))
            .unwrap();

        let running = sched.spawn().unwrap();
        thread::sleep(Duration::from_millis(100));
        let started = Instant::now();
        let sched = running.stop().unwrap();

        assert!(
            started.elapsed() < Duration::from_secs_f64(STOP_POLL * 4.0),
            "stop took {:?}",
            started.elapsed()
        );
        assert_eq!(sched.get(key).unwrap().frames(), 1);
    }

    #[test]
    fn work_due_at_spawn_fires_before_stop() {
        let fired = Arc::new(AtomicU64::new(0));
        let mut sched: Scheduler<()> = Scheduler::new();
        sched.once({
            let fired = Arc::clone(&fired);
            move |_| {
                fired.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        let sched = sched.spawn().unwrap().stop().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(sched.is_empty());
    }

    #[test]
    fn panicking_callable_is_reported() {
        let mut sched: Scheduler<()> = Scheduler::new();
        sched.once(|_| panic!("driver exploded"));

        let err = sched.spawn().unwrap().stop().unwrap_err();
        match err {
            SchedulerError::DriverPanicked { info } => assert_eq!(info, "driver exploded"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
