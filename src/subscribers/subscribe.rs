//! # Subscriber contract
//!
//! [`Subscribe`] is the extension point for observers of service transitions:
//! status exporters, health aggregation, audit logs. Each subscriber gets its own
//! bounded queue and worker inside a [`SubscriberSet`](crate::subscribers::SubscriberSet),
//! so a slow subscriber never delays the supervisor or another subscriber.
//!
//! ## Contract
//! - `on_event` may await I/O; it runs on the subscriber's own worker.
//! - A full queue drops the event for this subscriber only (logged).
//! - A panic inside `on_event` is caught and logged; the worker keeps going.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use nodevisor::{Event, ServiceState, Subscribe};
//!
//! struct FailureCounter(std::sync::atomic::AtomicUsize);
//!
//! #[async_trait]
//! impl Subscribe for FailureCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.entered(ServiceState::Failed) {
//!             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "failure-counter"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Observer of service transitions.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event.
    async fn on_event(&self, event: &Event);

    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue (clamped to at least 1).
    fn queue_capacity(&self) -> usize {
        1024
    }
}
