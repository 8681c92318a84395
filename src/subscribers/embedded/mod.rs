//! # Built-in subscribers
//!
//! - [`LogWriter`]: renders events as tracing records (feature `logging`).
//! - [`StateTracker`]: last known state per service.

#[cfg(feature = "logging")]
mod log;
mod state;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use state::StateTracker;
