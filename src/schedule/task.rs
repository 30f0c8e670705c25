//! # Periodic task: one callable on its own virtual clock.
//!
//! Each task keeps its due instants on a grid anchored where it was armed:
//!
//! ```text
//! next_call_at = anchor + k × period          (k only ever grows)
//!
//! anchor ─┬────────┬────────┬────────┬────────┬──► virtual time
//!         k=0      k=1      k=2      k=3      k=4
//!                      ▲ fired late here → k jumps to 3, never to 2.5
//! ```
//!
//! After a firing at `now`, `k` advances to the first grid point strictly
//! after `now`: a stalled task skips the missed slots instead of bursting
//! through them, and due times never drift by fractions of a period.
//!
//! ## Timing modes
//! - [`TimingMode::FreeRunning`]: no sleeping; the firing instant *is* the due
//!   instant, so frame `n` sees `time = n × period` exactly (offline rendering).
//! - [`TimingMode::Synchronous`]: the scheduler sleeps until due.
//! - [`TimingMode::Precise`]: sleeps, then spins the last stretch.

use std::fmt;

use crate::error::{BoxError, SchedulerError};

/// Callable of a periodic task.
pub type Callable<R> = Box<dyn FnMut(&Tick) -> Result<R, BoxError> + Send + 'static>;

/// How a periodic task relates to real time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TimingMode {
    /// Virtual time only; fires as fast as it is driven.
    FreeRunning,
    /// Real-time pacing with OS sleep.
    #[default]
    Synchronous,
    /// Real-time pacing with OS sleep plus a spin tail.
    Precise,
}

impl TimingMode {
    /// Returns `true` when the scheduler should sleep until due.
    pub fn sleeps(self) -> bool {
        !matches!(self, TimingMode::FreeRunning)
    }
}

/// What a callable is told about the invocation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tick {
    /// Seconds since the previous invocation (clamped to one period with frameskip).
    pub dt: f64,
    /// Seconds since the task was armed.
    pub elapsed: f64,
    /// Virtual time of this invocation.
    pub time: f64,
    /// Zero-based invocation count.
    pub frame: u64,
}

/// A callable invoked at a target frequency.
///
/// ## Example
/// ```rust
/// use workvisor::{PeriodicTask, TimingMode};
///
/// let task = PeriodicTask::new(|tick| Ok(tick.frame * 2))
///     .named("render")
///     .with_frequency(30.0)
///     .with_mode(TimingMode::FreeRunning);
///
/// assert_eq!(task.period(), 1.0 / 30.0);
/// assert!(task.frameskip());
/// ```
pub struct PeriodicTask<R = ()> {
    name: Option<String>,
    callable: Callable<R>,
    output: Option<R>,
    enabled: bool,
    one_shot: bool,
    frequency: f64,
    mode: TimingMode,
    frameskip: bool,

    started_at: f64,
    last_call_at: f64,
    anchor: f64,
    periods: u64,
    frames: u64,
}

impl<R> PeriodicTask<R> {
    /// Default target frequency, in Hz.
    pub const DEFAULT_FREQUENCY: f64 = 60.0;

    /// Task calling `f` at 60 Hz, synchronous, with frameskip.
    pub fn new<F>(f: F) -> Self
    where
        F: FnMut(&Tick) -> Result<R, BoxError> + Send + 'static,
    {
        Self {
            name: None,
            callable: Box::new(f),
            output: None,
            enabled: true,
            one_shot: false,
            frequency: Self::DEFAULT_FREQUENCY,
            mode: TimingMode::default(),
            frameskip: true,
            started_at: 0.0,
            last_call_at: 0.0,
            anchor: 0.0,
            periods: 0,
            frames: 0,
        }
    }

    /// Sets a name, used by `Scheduler::find` and in errors.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the target frequency in Hz.
    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.frequency = hz;
        self
    }

    /// Sets the period in seconds (the inverse of the frequency).
    pub fn with_period(self, secs: f64) -> Self {
        self.with_frequency(1.0 / secs)
    }

    /// Sets the timing mode.
    pub fn with_mode(mut self, mode: TimingMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enables or disables `dt` clamping to one period.
    pub fn with_frameskip(mut self, frameskip: bool) -> Self {
        self.frameskip = frameskip;
        self
    }

    /// Makes this a one-shot task: disabled after its next firing, then removed.
    pub fn once(mut self) -> Self {
        self.one_shot = true;
        self
    }

    /// Starts the task disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    pub fn period(&self) -> f64 {
        1.0 / self.frequency
    }

    pub fn mode(&self) -> TimingMode {
        self.mode
    }

    pub fn frameskip(&self) -> bool {
        self.frameskip
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_one_shot(&self) -> bool {
        self.one_shot
    }

    /// Value returned by the last successful invocation.
    pub fn output(&self) -> Option<&R> {
        self.output.as_ref()
    }

    /// Takes the value returned by the last successful invocation.
    pub fn take_output(&mut self) -> Option<R> {
        self.output.take()
    }

    /// Number of successful invocations.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn started_at(&self) -> f64 {
        self.started_at
    }

    pub fn last_call_at(&self) -> f64 {
        self.last_call_at
    }

    /// Virtual instant of the next invocation.
    pub fn next_call_at(&self) -> f64 {
        self.anchor + self.period() * self.periods as f64
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Switching between sleeping and free-running moves the task to a
    /// different timebase; [`Scheduler::set_mode`](super::Scheduler::set_mode)
    /// re-arms it when that happens.
    pub(crate) fn set_mode(&mut self, mode: TimingMode) {
        self.mode = mode;
    }

    pub fn set_frameskip(&mut self, frameskip: bool) {
        self.frameskip = frameskip;
    }

    /// Changes the frequency, keeping the already-due instant.
    ///
    /// The grid is re-anchored at the current `next_call_at`, so the change
    /// takes effect from the next firing on.
    pub fn set_frequency(&mut self, hz: f64) -> Result<(), SchedulerError> {
        check_frequency(hz)?;
        self.anchor = self.next_call_at();
        self.periods = 0;
        self.frequency = hz;
        Ok(())
    }

    /// Changes the period in seconds; see [`PeriodicTask::set_frequency`].
    pub fn set_period(&mut self, secs: f64) -> Result<(), SchedulerError> {
        self.set_frequency(1.0 / secs)
    }

    pub(crate) fn validate(&self) -> Result<(), SchedulerError> {
        check_frequency(self.frequency)
    }

    /// Puts the task on its grid: first due instant is `now`.
    ///
    /// Free-running tasks are pinned to epoch `0.0` regardless of `now`.
    pub(crate) fn arm(&mut self, now: f64) {
        let start = if self.mode.sleeps() { now } else { 0.0 };
        self.started_at = start;
        self.last_call_at = start - self.period();
        self.anchor = start;
        self.periods = 0;
    }

    /// Invokes the callable for a firing observed at `now`.
    ///
    /// On error nothing advances: the same instant is due again.
    pub(crate) fn fire(&mut self, now: f64) -> Result<Tick, BoxError> {
        let now = if self.mode.sleeps() {
            now
        } else {
            self.next_call_at()
        };
        let period = self.period();

        let mut dt = now - self.last_call_at;
        if self.frameskip {
            dt = dt.min(period);
        }
        let tick = Tick {
            dt,
            elapsed: now - self.started_at,
            time: now,
            frame: self.frames,
        };

        let out = (self.callable)(&tick)?;
        self.output = Some(out);
        self.last_call_at = now;
        self.frames += 1;
        self.advance_past(now.max(self.next_call_at()));
        if self.one_shot {
            self.enabled = false;
        }
        Ok(tick)
    }

    fn advance_past(&mut self, now: f64) {
        if self.next_call_at() > now {
            return;
        }
        let period = self.period();
        let behind = ((now - self.anchor) / period).floor();
        if behind.is_finite() && behind >= 0.0 {
            self.periods = self.periods.max(behind as u64);
        }
        while self.next_call_at() <= now {
            self.periods += 1;
        }
    }

    /// Label for errors: the name, or `unnamed`.
    pub(crate) fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| "unnamed".to_string())
    }
}

fn check_frequency(hz: f64) -> Result<(), SchedulerError> {
    if hz.is_finite() && hz > 0.0 {
        Ok(())
    } else {
        Err(SchedulerError::InvalidFrequency { frequency: hz })
    }
}

impl<R> fmt::Debug for PeriodicTask<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicTask")
            .field("name", &self.name)
            .field("frequency", &self.frequency)
            .field("mode", &self.mode)
            .field("frameskip", &self.frameskip)
            .field("enabled", &self.enabled)
            .field("one_shot", &self.one_shot)
            .field("next_call_at", &self.next_call_at())
            .field("frames", &self.frames)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counter() -> PeriodicTask<u64> {
        PeriodicTask::new(|tick: &Tick| Ok(tick.frame))
    }

    #[test]
    fn free_running_frames_land_on_exact_multiples() {
        let mut task = counter().with_frequency(24.0).with_mode(TimingMode::FreeRunning);
        task.arm(123.4);
        let period = task.period();

        for n in 0..100_u64 {
            let tick = task.fire(9_999.0).unwrap();
            assert_eq!(tick.time, period * n as f64);
            assert_eq!(tick.frame, n);
            assert_eq!(task.output(), Some(&n));
        }
        assert_eq!(task.next_call_at(), period * 100.0);
    }

    #[test]
    fn frameskip_clamps_dt_after_a_stall() {
        let mut task = counter().with_frequency(10.0);
        task.arm(0.0);
        task.fire(0.0).unwrap();

        // Ten periods late.
        let tick = task.fire(1.0).unwrap();
        assert_eq!(tick.dt, 0.1);
        assert!(task.next_call_at() > 1.0);

        let mut raw = counter().with_frequency(10.0).with_frameskip(false);
        raw.arm(0.0);
        raw.fire(0.0).unwrap();
        assert_eq!(raw.fire(1.0).unwrap().dt, 1.0);
    }

    #[test]
    fn late_firing_skips_to_next_whole_period() {
        let mut task = counter().with_frequency(4.0);
        task.arm(10.0);
        task.fire(10.0).unwrap();
        assert_eq!(task.next_call_at(), 10.25);

        task.fire(10.6).unwrap();
        assert_eq!(task.next_call_at(), 10.75);

        // Exactly on a grid point: strictly after.
        task.fire(10.75).unwrap();
        assert_eq!(task.next_call_at(), 11.0);
    }

    #[test]
    fn error_leaves_schedule_untouched() {
        let mut fail = true;
        let mut task = PeriodicTask::new(move |_: &Tick| {
            if fail {
                fail = false;
                Err::<(), BoxError>("flaky".into())
            } else {
                Ok(())
            }
        });
        task.arm(0.0);

        assert!(task.fire(0.0).is_err());
        assert_eq!((task.frames(), task.next_call_at()), (0, 0.0));
        task.fire(0.0).unwrap();
        assert_eq!(task.frames(), 1);
    }

    #[test]
    fn frequency_change_reanchors_at_next_due() {
        let mut task = counter().with_frequency(10.0);
        task.arm(0.0);
        task.fire(0.0).unwrap();
        assert_eq!(task.next_call_at(), 0.1);

        task.set_frequency(2.0).unwrap();
        assert_eq!(task.next_call_at(), 0.1);
        task.fire(0.1).unwrap();
        assert_eq!(task.next_call_at(), 0.6);

        assert!(task.set_period(0.0).is_err());
        assert!(task.set_frequency(f64::NAN).is_err());
        assert_eq!(task.frequency(), 2.0);
    }

    #[test]
    fn one_shot_disables_itself() {
        let mut task = counter().once();
        task.arm(5.0);
        task.fire(5.0).unwrap();
        assert!(!task.is_enabled());
    }
}
