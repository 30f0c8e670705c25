//! # Precise sleep.
//!
//! OS sleeps overshoot, typically 0.05–2 ms on Linux/macOS and up to a full
//! timer tick (~15 ms) on Windows. [`precise_sleep`] sleeps for all but a
//! small *ahead margin*, then spins on the monotonic clock for the rest:
//!
//! ```text
//! |◄──────────── thread::sleep(d - ahead) ────────────►|◄─ spin ─►|
//! start                                                        start + d
//! ```
//!
//! The margin adapts: every coarse sleep measures how late the OS woke the
//! thread and moves the margin a small step toward four times that lateness,
//! clamped to [`MIN_AHEAD`, `MAX_AHEAD`]. The spin therefore burns at most a
//! few milliseconds of one core per call; that CPU cost is what buys
//! sub-millisecond wake-up accuracy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Smallest margin the adaptation may settle on.
pub const MIN_AHEAD: Duration = Duration::from_micros(50);

/// Largest margin, and so the longest spin of one call.
pub const MAX_AHEAD: Duration = Duration::from_millis(4);

#[cfg(windows)]
const DEFAULT_AHEAD_NS: u64 = 2_000_000;
#[cfg(not(windows))]
const DEFAULT_AHEAD_NS: u64 = 500_000;

/// Step of the moving average toward the newest measurement.
const LEARN_RATE: f64 = 0.05;

/// Margin kept relative to the observed lateness.
const LATENESS_FACTOR: f64 = 4.0;

static AHEAD_NS: AtomicU64 = AtomicU64::new(DEFAULT_AHEAD_NS);

/// Sleeps for `duration` with sub-millisecond accuracy. Never returns early.
pub fn precise_sleep(duration: Duration) {
    let start = Instant::now();
    let ahead = ahead_margin();

    if duration > ahead {
        let coarse = duration - ahead;
        thread::sleep(coarse);
        learn(start.elapsed().saturating_sub(coarse));
    }
    while start.elapsed() < duration {
        std::hint::spin_loop();
    }
}

/// Current ahead margin.
pub fn ahead_margin() -> Duration {
    Duration::from_nanos(AHEAD_NS.load(Ordering::Relaxed))
}

fn learn(late: Duration) {
    let current = AHEAD_NS.load(Ordering::Relaxed) as f64;
    let wanted = (late.as_nanos() as f64 * LATENESS_FACTOR)
        .clamp(MIN_AHEAD.as_nanos() as f64, MAX_AHEAD.as_nanos() as f64);
    let next = current + (wanted - current) * LEARN_RATE;
    // Racing updates from several threads only lose one sample.
    AHEAD_NS.store(next.round() as u64, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn margin_stays_within_bounds() {
        for _ in 0..200 {
            learn(Duration::from_secs(1));
        }
        assert!(ahead_margin() <= MAX_AHEAD);

        for _ in 0..400 {
            learn(Duration::ZERO);
        }
        assert!(ahead_margin() >= MIN_AHEAD);
        assert!(ahead_margin() < MAX_AHEAD);
    }

    #[test]
    fn never_wakes_early() {
        for micros in [0, 50, 700, 3_000] {
            let d = Duration::from_micros(micros);
            let start = Instant::now();
            precise_sleep(d);
            assert!(start.elapsed() >= d);
        }
    }
}
