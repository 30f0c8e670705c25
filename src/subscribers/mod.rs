//! # Event subscribers for pool observability.
//!
//! ```text
//! keep-alive / supervisors ── publish(Event) ──► Bus ──► pool listener
//!                                                           │
//!                                                    SubscriberSet::emit
//!                                               ┌───────────┼───────────┐
//!                                               ▼           ▼           ▼
//!                                           LogWriter    Metrics     Custom
//! ```
//!
//! - [`Subscribe`]: the trait to implement.
//! - [`SubscriberSet`]: per-subscriber queues and workers, panic isolation.
//! - `LogWriter` (feature `logging`): `tracing` output for every event.

mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
mod embedded;

pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
