//! Service events: lifecycle states, transition records and the broadcast bus.
//!
//! ## Contents
//! - [`ServiceState`], [`Event`] lifecycle classification and transition payload
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publisher**: the registry, on behalf of each service machine (one
//!   `transition` call per state change, under the registry lock).
//! - **Consumers**: `Supervisor::subscriber_listener()` (fans out to
//!   `SubscriberSet`), `Supervisor::subscribe()` callers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, ServiceState};
