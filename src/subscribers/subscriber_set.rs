//! # Non-blocking fan-out to subscribers.
//!
//! [`SubscriberSet`] gives every subscriber a bounded queue and a dedicated
//! worker task; `emit` only ever does `try_send`.
//!
//! ## Architecture
//! ```text
//! emit(event)
//!     ├──► [queue 1] ──► worker 1 ──► sub1.on_event()
//!     ├──► [queue 2] ──► worker 2 ──► sub2.on_event()   (panic → caught, logged)
//!     └──► [queue N] ──► worker N ──► subN.on_event()
//! ```
//!
//! ## Rules
//! - Per-subscriber FIFO; no ordering across subscribers.
//! - A full or closed queue drops the event for that subscriber only and logs a
//!   warning. Nothing is republished on the bus.
//! - Panics are isolated with `catch_unwind`; the worker survives.

use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use super::Subscribe;
use crate::events::Event;

struct Channel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out over a fixed list of subscribers.
pub struct SubscriberSet {
    channels: Vec<Channel>,
    workers: Vec<JoinHandle<()>>,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber. Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut channels = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            workers.push(tokio::spawn(worker(sub, rx)));
            channels.push(Channel { name, sender: tx });
        }
        Self { channels, workers }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Queues `event` for every subscriber without waiting.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    pub fn emit_arc(&self, event: Arc<Event>) {
        for channel in &self.channels {
            match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(subscriber = channel.name, seq = event.seq, "subscriber queue full, event dropped");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    warn!(subscriber = channel.name, seq = event.seq, "subscriber worker gone, event dropped");
                }
            }
        }
    }

    /// Closes every queue and waits for the workers to drain.
    pub async fn shutdown(self) {
        drop(self.channels);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

async fn worker(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>) {
    while let Some(ev) = rx.recv().await {
        let fut = sub.on_event(ev.as_ref());
        if let Err(panic) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
            let info = if let Some(msg) = panic.downcast_ref::<&'static str>() {
                (*msg).to_string()
            } else if let Some(msg) = panic.downcast_ref::<String>() {
                msg.clone()
            } else {
                "unknown panic".to_string()
            };
            warn!(subscriber = sub.name(), seq = ev.seq, panic = %info, "subscriber panicked");
        }
    }
}
