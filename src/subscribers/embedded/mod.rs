//! # Built-in subscribers
//!
//! - [`LogWriter`]: writes pool events through `tracing`.

mod log;

pub use log::LogWriter;
