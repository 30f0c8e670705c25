//! # Respawn backoff.
//!
//! A worker that dies mid-task is replaced immediately. A worker that cannot
//! even be launched (missing binary, failing `on_start`, broken handshake)
//! would make the keep-alive loop spin, so consecutive launch failures are
//! spaced out by [`RespawnPolicy::delay`]:
//!
//! ```text
//! delay(n) = jitter( min(first × factor^n, max) )
//! ```
//!
//! The failure counter resets on the first successful launch.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use workvisor::{Jitter, RespawnPolicy};
//!
//! let policy = RespawnPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_secs(1),
//!     factor: 3.0,
//!     jitter: Jitter::None,
//! };
//!
//! assert_eq!(policy.delay(0), Duration::from_millis(50));
//! assert_eq!(policy.delay(2), Duration::from_millis(450));
//! assert_eq!(policy.delay(9), Duration::from_secs(1));
//! ```

use std::time::Duration;

use rand::Rng;

/// Randomization applied to a respawn delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Jitter {
    /// Exact delay.
    None,
    /// `delay/2 + random[0, delay/2]`: keeps pools restarted together from relaunching in lockstep.
    #[default]
    Equal,
}

impl Jitter {
    fn apply(self, delay: Duration) -> Duration {
        match self {
            Jitter::None => delay,
            Jitter::Equal => {
                let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
                let half = ms / 2;
                if half == 0 {
                    return delay;
                }
                Duration::from_millis(half + rand::rng().random_range(0..=half))
            }
        }
    }
}

/// Delay policy for relaunching workers after failed launches.
#[derive(Clone, Copy, Debug)]
pub struct RespawnPolicy {
    /// Delay after the first failure.
    pub first: Duration,
    /// Upper bound for any delay.
    pub max: Duration,
    /// Growth factor per consecutive failure (`>= 1.0` recommended).
    pub factor: f64,
    /// Randomization strategy.
    pub jitter: Jitter,
}

impl Default for RespawnPolicy {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(5),
            factor: 2.0,
            jitter: Jitter::Equal,
        }
    }
}

impl RespawnPolicy {
    /// Delay to wait after `failures` consecutive failed launches (0-indexed).
    pub fn delay(&self, failures: u32) -> Duration {
        let exp = failures.min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !secs.is_finite() || secs < 0.0 || secs > self.max.as_secs_f64() {
            self.max
        } else {
            Duration::from_secs_f64(secs)
        };
        self.jitter.apply(base)
    }
}
