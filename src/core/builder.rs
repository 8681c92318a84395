use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::config::SupervisorConfig;
use super::registry::Registry;
use super::supervisor::Supervisor;
use crate::conditions::NodeState;
use crate::events::Bus;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for a [`Supervisor`] with optional subscribers and a shared node-state store.
pub struct SupervisorBuilder {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    node: Option<NodeState>,
}

impl SupervisorBuilder {
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            node: None,
        }
    }

    /// Sets event subscribers. Each gets its own bounded queue and worker.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Uses an existing node-state store (shared with whatever publishes the facts).
    pub fn with_node_state(mut self, node: NodeState) -> Self {
        self.node = Some(node);
        self
    }

    /// Wires the bus, registry and subscriber workers.
    ///
    /// Must be called inside a tokio runtime (subscriber workers are spawned here).
    pub fn build(self) -> Arc<Supervisor> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let registry = Registry::new(bus.clone(), self.cfg.event_history_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers));

        let sup = Arc::new(Supervisor::new_internal(
            self.cfg,
            bus,
            registry,
            self.node.unwrap_or_default(),
            subs,
            CancellationToken::new(),
        ));
        sup.subscriber_listener();
        sup
    }
}
