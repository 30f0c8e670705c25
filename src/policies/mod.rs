//! Respawn policy for the keep-alive loop.
//!
//! - [`RespawnPolicy`] how long to wait before relaunching after failed launches
//! - [`Jitter`] randomization applied to that delay
//!
//! ## Defaults
//! - `first=100ms`, `factor=2.0`, `max=5s`, `jitter=Equal`.

mod respawn;

pub use respawn::{Jitter, RespawnPolicy};
