//! # Time sources for the scheduler.
//!
//! Timestamps are `f64` seconds since the clock's own epoch, matching the
//! virtual-clock arithmetic of periodic tasks (`anchor + k × period`).
//!
//! - [`MonotonicClock`]: real time; sleeps really sleep (optionally precisely).
//! - [`ManualClock`]: time moves only when told to; a sleep advances it by
//!   exactly the requested amount. Drives synchronous-mode schedules
//!   deterministically in tests and simulations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::sleep::precise_sleep;

/// A time source the scheduler can read and sleep on.
pub trait Clock: Send + Sync + 'static {
    /// Seconds since this clock's epoch.
    fn now(&self) -> f64;

    /// Blocks for `secs` seconds (no-op for non-positive values).
    fn sleep(&self, secs: f64, precise: bool);
}

/// Wall-clock-independent real time.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// Clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn sleep(&self, secs: f64, precise: bool) {
        if !(secs > 0.0) || !secs.is_finite() {
            return;
        }
        let d = Duration::from_secs_f64(secs);
        if precise {
            precise_sleep(d);
        } else {
            std::thread::sleep(d);
        }
    }
}

/// Clock advanced explicitly.
///
/// ## Example
/// ```rust
/// use workvisor::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// clock.advance(0.5);
/// clock.sleep(0.25, true);
/// assert_eq!(clock.now(), 0.75);
/// ```
#[derive(Debug, Default)]
pub struct ManualClock {
    bits: AtomicU64,
}

impl ManualClock {
    /// Clock reading `0.0`.
    pub fn new() -> Self {
        Self::starting_at(0.0)
    }

    /// Clock reading `secs`.
    pub fn starting_at(secs: f64) -> Self {
        Self {
            bits: AtomicU64::new(secs.to_bits()),
        }
    }

    /// Moves time forward by `secs` (ignored when not positive).
    pub fn advance(&self, secs: f64) {
        if secs > 0.0 {
            let _ = self
                .bits
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                    Some((f64::from_bits(bits) + secs).to_bits())
                });
        }
    }

    /// Sets the current time; time may not move backwards.
    pub fn set(&self, secs: f64) {
        let _ = self
            .bits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |bits| {
                Some(f64::from_bits(bits).max(secs).to_bits())
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }

    fn sleep(&self, secs: f64, _precise: bool) {
        self.advance(secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_only_moves_forward() {
        let clock = ManualClock::starting_at(2.0);
        clock.advance(-1.0);
        clock.set(1.0);
        assert_eq!(clock.now(), 2.0);
        clock.sleep(0.5, false);
        clock.set(3.0);
        assert_eq!(clock.now(), 3.0);
    }

    #[test]
    fn monotonic_clock_sleeps_at_least_requested() {
        let clock = MonotonicClock::new();
        let before = clock.now();
        clock.sleep(0.002, true);
        clock.sleep(-1.0, false);
        clock.sleep(f64::NAN, false);
        assert!(clock.now() - before >= 0.002);
    }
}
