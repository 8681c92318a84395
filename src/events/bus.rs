//! # Event bus for broadcasting service transitions.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`]. Every service
//! machine publishes its transitions here; any number of observers subscribe
//! independently.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                 Receivers (many, independent):
//!   machine "cri"     ──┐
//!   machine "kubelet" ──┼──► Bus ──┬──► subscriber_listener ──► SubscriberSet
//!   machine "timed"   ──┘          ├──► Supervisor::subscribe() (status APIs)
//!                                  └──► ...
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never waits for receivers.
//! - **No head-of-line blocking**: each receiver has its own cursor into the ring;
//!   a slow receiver only lags itself (`RecvError::Lagged(n)`).
//! - **No persistence**: receivers only see events sent after they subscribed.
//!   Recent per-service history is kept on the registry record instead.
//! - The scheduler does not depend on the bus; dependency bookkeeping happens
//!   under the registry lock, so lagging here never affects startup ordering.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for service events.
///
/// Cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a new bus with the given ring capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
