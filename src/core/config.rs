//! # Pool configuration.
//!
//! [`PoolConfig`] centralizes the knobs of one [`WorkerPool`](crate::WorkerPool).
//! It is validated once by [`PoolBuilder::build`](crate::PoolBuilder::build);
//! a rejected config is a construction-time [`PoolError::InvalidConfig`].
//!
//! ## Sentinel values
//! - `size = 0` → the pool starts with no workers (grow it with `set_size`)
//! - `stop_timeout = 0s` → process workers are killed right away on exit

use std::time::Duration;

use crate::error::PoolError;
use crate::policies::RespawnPolicy;

/// Configuration for a worker pool.
///
/// ## Field semantics
/// - `size`: initial target worker count
/// - `poll`: re-check interval of blocking `get` (in addition to store notifications)
/// - `heal_interval`: keep-alive wake-up period when nothing signals it
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `handshake_timeout`: how long a process worker may take to report ready
/// - `stop_timeout`: grace for a process worker to exit after its stdin closes
/// - `respawn`: delays between failed launches
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Initial number of workers to keep alive.
    pub size: usize,
    /// Polling fallback for blocking result retrieval.
    pub poll: Duration,
    /// Maximum time between two keep-alive passes.
    pub heal_interval: Duration,
    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,
    /// Deadline for a process worker's ready handshake.
    pub handshake_timeout: Duration,
    /// Grace period for a process worker to exit before it is killed.
    pub stop_timeout: Duration,
    /// Backoff between consecutive failed launches.
    pub respawn: RespawnPolicy,
}

impl PoolConfig {
    /// Config with the given initial size and defaults elsewhere.
    pub fn with_size(size: usize) -> Self {
        Self {
            size,
            ..Self::default()
        }
    }

    /// Checks the config for values the pool cannot run with.
    pub fn validate(&self) -> Result<(), PoolError> {
        let invalid = |reason: &str| {
            Err(PoolError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.poll.is_zero() {
            return invalid("poll interval must be greater than zero");
        }
        if self.heal_interval.is_zero() {
            return invalid("heal interval must be greater than zero");
        }
        if self.handshake_timeout.is_zero() {
            return invalid("handshake timeout must be greater than zero");
        }
        if !(self.respawn.factor.is_finite() && self.respawn.factor > 0.0) {
            return invalid("respawn factor must be a positive finite number");
        }
        Ok(())
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

impl Default for PoolConfig {
    /// - `size = 1`
    /// - `poll = 10ms`
    /// - `heal_interval = 500ms`
    /// - `bus_capacity = 1024`
    /// - `handshake_timeout = 10s`
    /// - `stop_timeout = 2s`
    /// - `respawn = RespawnPolicy::default()`
    fn default() -> Self {
        Self {
            size: 1,
            poll: Duration::from_millis(10),
            heal_interval: Duration::from_millis(500),
            bus_capacity: 1024,
            handshake_timeout: Duration::from_secs(10),
            stop_timeout: Duration::from_secs(2),
            respawn: RespawnPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert!(PoolConfig::default().validate().is_ok());
        assert_eq!(PoolConfig::with_size(4).size, 4);
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let cfg = PoolConfig {
            poll: Duration::ZERO,
            ..PoolConfig::default()
        };
        assert_eq!(cfg.validate().unwrap_err().as_label(), "pool_invalid_config");

        let cfg = PoolConfig {
            heal_interval: Duration::ZERO,
            ..PoolConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
