//! # Event subscribers.
//!
//! Observers of service transitions, fed from the [`Bus`](crate::events::Bus)
//! through a [`SubscriberSet`].
//!
//! ```text
//! Registry ── publish ──► Bus ──► subscriber_listener ──► SubscriberSet::emit
//!                                                           ├─► [queue] ─► LogWriter
//!                                                           ├─► [queue] ─► StateTracker
//!                                                           └─► [queue] ─► custom
//! ```
//!
//! ## Contents
//! - [`Subscribe`] the observer contract
//! - [`SubscriberSet`] per-subscriber queues and workers
//! - [`LogWriter`] (feature `logging`), [`StateTracker`] built-ins

mod embedded;
mod subscribe;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use embedded::StateTracker;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
