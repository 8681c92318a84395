//! # StateTracker: last known state per service, from the event stream
//!
//! Keeps `service → (seq, state)` up to date by listening to transitions. Useful
//! for status endpoints that should not touch the supervisor directly.
//!
//! ## Behavior
//! - An event older (lower `seq`) than the one already recorded is ignored, so a
//!   delivery reordering can never roll a service back.
//! - [`StateTracker::up`] lists services currently `Running`, `Healthy` or `Unhealthy`.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::events::{Event, ServiceState};
use crate::subscribers::Subscribe;

pub struct StateTracker {
    inner: RwLock<HashMap<String, (u64, ServiceState)>>,
    capacity: usize,
}

impl StateTracker {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
            capacity: 2048,
        }
    }

    /// Sets the queue capacity for this subscriber.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    pub fn state(&self, id: &str) -> Option<ServiceState> {
        self.inner.read().get(id).map(|(_, s)| *s)
    }

    /// Sorted `(id, state)` pairs.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(String, ServiceState)> {
        let mut v: Vec<_> = self
            .inner
            .read()
            .iter()
            .map(|(id, (_, s))| (id.clone(), *s))
            .collect();
        v.sort_unstable();
        v
    }

    /// Sorted ids of services with a live instance.
    #[must_use]
    pub fn up(&self) -> Vec<String> {
        self.snapshot()
            .into_iter()
            .filter(|(_, s)| s.is_up())
            .map(|(id, _)| id)
            .collect()
    }

    fn apply(&self, ev: &Event) {
        let mut map = self.inner.write();
        match map.get_mut(ev.service.as_ref()) {
            Some((seq, _)) if *seq > ev.seq => {
                debug!(service = %ev.service, seq = ev.seq, "stale event ignored");
            }
            Some(entry) => *entry = (ev.seq, ev.to),
            None => {
                map.insert(ev.service.to_string(), (ev.seq, ev.to));
            }
        }
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for StateTracker {
    async fn on_event(&self, ev: &Event) {
        self.apply(ev);
    }

    fn name(&self) -> &'static str {
        "StateTracker"
    }

    fn queue_capacity(&self) -> usize {
        self.capacity
    }
}
