//! # Scheduler: fires periodic tasks in due order.
//!
//! ```text
//! next():
//!   pick enabled task with min next_call_at   (one-shot wins ties)
//!     ├─ sleeping mode: clock.sleep(next_call_at - now, precise)
//!     ├─ fire(now) ──► Err ──► SchedulerError::Task (nothing advanced)
//!     └─ one-shot fired ──► compact: retain live tasks in one pass
//! ```
//!
//! The scheduler is a synchronous driving loop owned by one thread. A
//! callable's error is returned to whoever called `next()`; it is not an
//! isolation boundary. Work that must not take the loop down belongs in a
//! [`WorkerPool`](crate::WorkerPool).
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use workvisor::{Clock, ManualClock, PeriodicTask, Scheduler};
//!
//! let clock = Arc::new(ManualClock::new());
//! let mut sched: Scheduler<u64> = Scheduler::with_clock(clock.clone());
//! sched.add(PeriodicTask::new(|tick| Ok(tick.frame)).with_frequency(10.0)).unwrap();
//!
//! for _ in 0..3 {
//!     sched.next().unwrap();
//! }
//! // Sleeping on a manual clock advances it: frames at 0.0, 0.1, 0.2.
//! assert!((clock.now() - 0.2).abs() < 1e-9);
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::clock::{Clock, MonotonicClock};
use super::task::{PeriodicTask, Tick, TimingMode};
use crate::error::{BoxError, SchedulerError};

/// Identity of a task inside one scheduler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskKey(u64);

impl fmt::Display for TaskKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "periodic-{}", self.0)
    }
}

/// One completed invocation.
#[derive(Debug)]
pub struct Fired<R> {
    /// Task that fired.
    pub key: TaskKey,
    /// What the callable was given.
    pub tick: Tick,
    /// Return value, moved out only when a one-shot task was retired by this
    /// firing; otherwise it stays readable through [`PeriodicTask::output`].
    pub output: Option<R>,
}

struct Entry<R> {
    key: TaskKey,
    task: PeriodicTask<R>,
}

impl<R> Entry<R> {
    fn retired(&self) -> bool {
        self.task.is_one_shot() && !self.task.is_enabled()
    }
}

/// Collection of periodic tasks driven by repeated calls to [`Scheduler::next`].
pub struct Scheduler<R = ()> {
    tasks: Vec<Entry<R>>,
    clock: Arc<dyn Clock>,
    next_key: u64,
}

impl<R> Scheduler<R> {
    /// Scheduler on real monotonic time.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// Scheduler reading and sleeping on `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks: Vec::new(),
            clock,
            next_key: 0,
        }
    }

    /// The scheduler's time source.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Adds a task, first due now.
    ///
    /// Fails with [`SchedulerError::InvalidFrequency`] for a non-positive or
    /// non-finite frequency.
    pub fn add(&mut self, mut task: PeriodicTask<R>) -> Result<TaskKey, SchedulerError> {
        task.validate()?;
        task.arm(self.clock.now());
        let key = TaskKey(self.next_key);
        self.next_key += 1;
        self.tasks.push(Entry { key, task });
        Ok(key)
    }

    /// Adds a one-shot task calling `f` as soon as the scheduler is driven.
    pub fn once<F>(&mut self, f: F) -> TaskKey
    where
        F: FnMut(&Tick) -> Result<R, BoxError> + Send + 'static,
    {
        let mut task = PeriodicTask::new(f).once();
        task.arm(self.clock.now());
        let key = TaskKey(self.next_key);
        self.next_key += 1;
        self.tasks.push(Entry { key, task });
        key
    }

    /// Removes a task, returning it.
    pub fn remove(&mut self, key: TaskKey) -> Option<PeriodicTask<R>> {
        let idx = self.tasks.iter().position(|e| e.key == key)?;
        Some(self.tasks.remove(idx).task)
    }

    /// Removes every task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, key: TaskKey) -> Option<&PeriodicTask<R>> {
        self.tasks.iter().find(|e| e.key == key).map(|e| &e.task)
    }

    pub fn get_mut(&mut self, key: TaskKey) -> Option<&mut PeriodicTask<R>> {
        self.tasks
            .iter_mut()
            .find(|e| e.key == key)
            .map(|e| &mut e.task)
    }

    /// Changes a task's timing mode; returns `false` for an unknown key.
    ///
    /// Moving between free-running and a sleeping mode re-arms the task on
    /// the new timebase (first due now, frame count kept). Switching between
    /// sleeping modes keeps the grid.
    pub fn set_mode(&mut self, key: TaskKey, mode: TimingMode) -> bool {
        let now = self.clock.now();
        let Some(task) = self.get_mut(key) else {
            return false;
        };
        let rebase = task.mode().sleeps() != mode.sleeps();
        task.set_mode(mode);
        if rebase {
            task.arm(now);
        }
        true
    }

    /// Key of the first task with this name.
    pub fn find(&self, name: &str) -> Option<TaskKey> {
        self.tasks
            .iter()
            .find(|e| e.task.name() == Some(name))
            .map(|e| e.key)
    }

    /// Keys of every task, in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = TaskKey> + '_ {
        self.tasks.iter().map(|e| e.key)
    }

    /// The task that fires next and its due instant.
    pub fn next_due(&self) -> Option<(TaskKey, f64)> {
        self.next_index()
            .map(|i| (self.tasks[i].key, self.tasks[i].task.next_call_at()))
    }

    /// Seconds until the next task is due (zero when overdue or free-running).
    pub fn time_until_next(&self) -> Option<f64> {
        let task = &self.tasks[self.next_index()?].task;
        if !task.mode().sleeps() {
            return Some(0.0);
        }
        Some((task.next_call_at() - self.clock.now()).max(0.0))
    }

    /// Waits until the next task is due and fires it.
    ///
    /// Returns `Ok(None)` when no task is enabled.
    pub fn next(&mut self) -> Result<Option<Fired<R>>, SchedulerError> {
        let Some(idx) = self.next_index() else {
            return Ok(None);
        };
        let task = &self.tasks[idx].task;
        if task.mode().sleeps() {
            let wait = task.next_call_at() - self.clock.now();
            self.clock.sleep(wait, task.mode() == TimingMode::Precise);
        }
        self.fire_at(idx).map(Some)
    }

    /// Fires the next task only if it is already due; never sleeps.
    pub fn try_next(&mut self) -> Result<Option<Fired<R>>, SchedulerError> {
        let Some(idx) = self.next_index() else {
            return Ok(None);
        };
        let task = &self.tasks[idx].task;
        if task.mode().sleeps() && task.next_call_at() > self.clock.now() {
            return Ok(None);
        }
        self.fire_at(idx).map(Some)
    }

    /// Fires every enabled one-shot task now, then compacts.
    ///
    /// Useful for deferred calls that must run on the driving thread.
    /// Stops at the first error; tasks fired before it are still retired.
    pub fn flush_once(&mut self) -> Result<usize, SchedulerError> {
        let now = self.clock.now();
        let mut fired = 0;
        let mut failure = None;
        for entry in self.tasks.iter_mut() {
            if !(entry.task.is_one_shot() && entry.task.is_enabled()) {
                continue;
            }
            if let Err(source) = entry.task.fire(now) {
                failure = Some(SchedulerError::Task {
                    name: entry.task.label(),
                    source,
                });
                break;
            }
            fired += 1;
        }
        self.compact();
        match failure {
            Some(e) => Err(e),
            None => Ok(fired),
        }
    }

    fn fire_at(&mut self, idx: usize) -> Result<Fired<R>, SchedulerError> {
        let now = self.clock.now();
        let entry = &mut self.tasks[idx];
        let key = entry.key;
        let tick = entry.task.fire(now).map_err(|source| SchedulerError::Task {
            name: entry.task.label(),
            source,
        })?;

        let output = if entry.retired() {
            let output = entry.task.take_output();
            self.compact();
            output
        } else {
            None
        };
        Ok(Fired { key, tick, output })
    }

    fn next_index(&self) -> Option<usize> {
        self.tasks
            .iter()
            .enumerate()
            .filter(|(_, e)| e.task.is_enabled())
            .min_by(|(_, a), (_, b)| {
                a.task
                    .next_call_at()
                    .total_cmp(&b.task.next_call_at())
                    .then_with(|| match (a.task.is_one_shot(), b.task.is_one_shot()) {
                        (true, false) => Ordering::Less,
                        (false, true) => Ordering::Greater,
                        _ => Ordering::Equal,
                    })
            })
            .map(|(i, _)| i)
    }

    /// Drops retired one-shot tasks in a single pass.
    fn compact(&mut self) {
        self.tasks.retain(|e| !e.retired());
    }
}

impl<R> Default for Scheduler<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for Scheduler<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks.len())
            .field("next_due", &self.next_due())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::clock::ManualClock;
    use std::sync::Mutex;

    fn manual() -> (Arc<ManualClock>, Scheduler<&'static str>) {
        let clock = Arc::new(ManualClock::new());
        let sched = Scheduler::with_clock(clock.clone() as Arc<dyn Clock>);
        (clock, sched)
    }

    #[test]
    fn fires_in_due_order_across_frequencies() {
        let (_clock, mut sched) = manual();
        sched.add(PeriodicTask::new(|_| Ok("slow")).with_frequency(2.0)).unwrap();
        sched.add(PeriodicTask::new(|_| Ok("fast")).with_frequency(4.0)).unwrap();

        let mut order = Vec::new();
        for _ in 0..6 {
            let fired = sched.next().unwrap().unwrap();
            order.push((fired.tick.time, sched.get(fired.key).unwrap().output().copied().unwrap()));
        }
        // Equal instants go to the earliest-added task.
        assert_eq!(
            order,
            vec![(0.0, "slow"), (0.0, "fast"), (0.25, "fast"), (0.5, "slow"), (0.5, "fast"), (0.75, "fast")]
        );
    }

    #[test]
    fn one_shot_fires_exactly_once_and_wins_ties() {
        let (clock, mut sched) = manual();
        let periodic = sched.add(PeriodicTask::new(|_| Ok("tick")).with_frequency(10.0)).unwrap();
        let shot = sched.once(|_| Ok("boom"));
        assert_eq!(sched.len(), 2);

        let first = sched.next().unwrap().unwrap();
        assert_eq!(first.key, shot);
        assert_eq!(first.output, Some("boom"));
        assert!(sched.get(shot).is_none());

        clock.advance(1.0);
        for _ in 0..2 {
            assert_eq!(sched.next().unwrap().unwrap().key, periodic);
        }
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn try_next_does_not_sleep() {
        let (clock, mut sched) = manual();
        sched.add(PeriodicTask::new(|_| Ok("x")).with_frequency(1.0)).unwrap();

        assert!(sched.try_next().unwrap().is_some());
        assert!(sched.try_next().unwrap().is_none());
        assert_eq!(clock.now(), 0.0);

        clock.advance(1.0);
        assert!(sched.try_next().unwrap().is_some());
        assert_eq!(sched.time_until_next(), Some(1.0));
    }

    #[test]
    fn error_propagates_and_task_stays_due() {
        let (_clock, mut sched) = manual();
        let key = sched
            .add(PeriodicTask::new(|_| Err("disk full".into())).named("writer"))
            .unwrap();

        let err = sched.next().unwrap_err();
        assert_eq!(err.as_label(), "scheduler_task_failed");
        assert_eq!(err.to_string(), "periodic task writer failed: disk full");
        assert_eq!(sched.next_due(), Some((key, 0.0)));
    }

    #[test]
    fn flush_once_runs_deferred_calls_and_compacts() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (_clock, mut sched) = manual();
        sched.add(PeriodicTask::new(|_| Ok("periodic"))).unwrap();
        for name in ["a", "b", "c"] {
            let calls = Arc::clone(&calls);
            sched.once(move |_| {
                calls.lock().unwrap().push(name);
                Ok(name)
            });
        }

        assert_eq!(sched.flush_once().unwrap(), 3);
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn find_remove_and_disable() {
        let (_clock, mut sched) = manual();
        let a = sched.add(PeriodicTask::new(|_| Ok("a")).named("audio")).unwrap();
        let v = sched.add(PeriodicTask::new(|_| Ok("v")).named("video")).unwrap();
        assert_eq!(sched.find("video"), Some(v));
        assert_eq!(sched.find("nope"), None);

        sched.get_mut(a).unwrap().set_enabled(false);
        assert_eq!(sched.next_due().map(|(k, _)| k), Some(v));

        assert_eq!(sched.remove(v).unwrap().name(), Some("video"));
        assert!(sched.next().unwrap().is_none());
        sched.clear();
        assert!(sched.is_empty());
    }

    #[test]
    fn mode_change_across_timebases_rearms() {
        let (clock, mut sched) = manual();
        clock.advance(10.0);
        let key = sched
            .add(PeriodicTask::new(|_| Ok("t")).with_frequency(10.0))
            .unwrap();
        sched.next().unwrap();
        assert!((sched.get(key).unwrap().next_call_at() - 10.1).abs() < 1e-9);

        // Sleeping to sleeping keeps the grid.
        assert!(sched.set_mode(key, TimingMode::Precise));
        assert!((sched.get(key).unwrap().next_call_at() - 10.1).abs() < 1e-9);

        assert!(sched.set_mode(key, TimingMode::FreeRunning));
        let task = sched.get(key).unwrap();
        assert_eq!(task.started_at(), 0.0);
        assert_eq!(task.next_call_at(), 0.0);
        assert_eq!(task.frames(), 1);

        assert!(sched.set_mode(key, TimingMode::Synchronous));
        let task = sched.get(key).unwrap();
        assert!((task.started_at() - clock.now()).abs() < 1e-9);
        assert!((task.next_call_at() - clock.now()).abs() < 1e-9);

        sched.remove(key);
        assert!(!sched.set_mode(key, TimingMode::FreeRunning));
    }

    #[test]
    fn invalid_frequency_is_rejected() {
        let (_clock, mut sched) = manual();
        let err = sched
            .add(PeriodicTask::new(|_| Ok("x")).with_frequency(0.0))
            .unwrap_err();
        assert_eq!(err.as_label(), "scheduler_invalid_frequency");
    }
}
