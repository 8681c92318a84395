//! # Supervisor: registration, scheduling, control and shutdown.
//!
//! The [`Supervisor`] owns the [`Registry`], the event [`Bus`], the
//! [`SubscriberSet`] and the node-state store. It spawns one [`ServiceMachine`]
//! per service and tears them down in dependency order.
//!
//! ## Architecture
//! ```text
//! register(service) ──► Registry (graph check, record = Waiting)
//!                          └─ already started? ──► spawn machine now
//!
//! start() ──► for id in topological order:
//!                 child token ◄── runtime token
//!                 tokio::spawn(ServiceMachine::run(child))   (machines gate themselves)
//!
//! Registry ── publish ──► Bus ──► subscriber_listener ──► SubscriberSet ──► subscribers
//!                            └──► subscribe() callers
//!
//! shutdown_in_order(order?) ──► close registry
//!     for id in order (default: reverse dependency order):
//!         cancel(id) ──► await its machine for up to `grace` ── expired? ──► abort, force Failed
//!     cancel runtime token
//! ```
//!
//! ## Rules
//! - Per-service errors never escape the machine; only registration and control
//!   calls return errors.
//! - Registration after `start()` spawns the machine immediately; it is gated on
//!   the current states of its dependencies.
//! - Shutdown and operator restarts are serialized.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::{BoxError, FnRunner, RestartPolicy, ServiceFn, Supervisor, SupervisorConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(SupervisorConfig::default()).build();
//!
//!     sup.register(
//!         ServiceFn::builder("cri")
//!             .with_runner(FnRunner::arc("cri", |ctx: CancellationToken| async move {
//!                 ctx.cancelled().await;
//!                 Ok::<_, BoxError>(())
//!             }))
//!             .build(),
//!     )?;
//!     sup.register(
//!         ServiceFn::builder("kubelet")
//!             .with_deps(["cri"])
//!             .with_runner(FnRunner::arc("kubelet", |ctx: CancellationToken| async move {
//!                 ctx.cancelled().await;
//!                 Ok::<_, BoxError>(())
//!             }))
//!             .with_restart(RestartPolicy::Forever)
//!             .build(),
//!     )?;
//!
//!     sup.start();
//!     tokio::time::sleep(Duration::from_millis(50)).await;
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::builder::SupervisorBuilder;
use super::config::SupervisorConfig;
use super::machine::ServiceMachine;
use super::registry::{Registry, ServiceSnapshot, TaskHandle};
use super::shutdown;
use crate::conditions::{ConditionRef, NodeState, ServiceCondition, ServiceFilter};
use crate::error::{ControlError, RegistrationError, ShutdownError};
use crate::events::{Bus, Event, ServiceState};
use crate::services::ServiceRef;
use crate::subscribers::SubscriberSet;

/// Node-local service supervisor.
pub struct Supervisor {
    cfg: Arc<SupervisorConfig>,
    bus: Bus,
    registry: Arc<Registry>,
    node: NodeState,
    subs: Arc<SubscriberSet>,
    runtime_token: CancellationToken,
    /// `true` once `start()` ran; held while spawning so a concurrent
    /// registration is spawned exactly once.
    started: Mutex<bool>,
    /// Serializes shutdown and operator restarts.
    control: tokio::sync::Mutex<()>,
}

impl Supervisor {
    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        registry: Arc<Registry>,
        node: NodeState,
        subs: Arc<SubscriberSet>,
        runtime_token: CancellationToken,
    ) -> Self {
        Self {
            cfg: Arc::new(cfg),
            bus,
            registry,
            node,
            subs,
            runtime_token,
            started: Mutex::new(false),
            control: tokio::sync::Mutex::new(()),
        }
    }

    /// Creates a supervisor without subscribers. Must be called inside a tokio runtime.
    pub fn new(cfg: SupervisorConfig) -> Arc<Self> {
        SupervisorBuilder::new(cfg).build()
    }

    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Node facts consulted by service conditions.
    pub fn node_state(&self) -> &NodeState {
        &self.node
    }

    /// Registers a service. Atomic: on error nothing changes.
    pub fn register(&self, service: ServiceRef) -> Result<(), RegistrationError> {
        let id = service.id().to_string();
        let started = self.started.lock();
        self.registry.register(service)?;
        info!(service = %id, "service registered");
        if *started {
            self.warn_missing_dependencies(&id);
            self.spawn(&id);
        }
        Ok(())
    }

    /// Starts driving every registered service. Later calls are ignored.
    pub fn start(&self) {
        let mut started = self.started.lock();
        if *started {
            warn!("supervisor already started");
            return;
        }
        *started = true;

        let order = self.registry.start_order();
        info!(services = order.len(), "starting services");
        for id in order {
            self.warn_missing_dependencies(&id);
            self.spawn(&id);
        }
    }

    fn warn_missing_dependencies(&self, id: &str) {
        let missing = self.registry.missing_dependencies(id);
        if !missing.is_empty() {
            warn!(service = %id, ?missing, "dependencies not registered; service stays waiting");
        }
    }

    fn spawn(&self, id: &str) {
        let Some(service) = self.registry.service(id) else {
            return;
        };
        let cancel = self.runtime_token.child_token();
        let machine = ServiceMachine::new(
            service,
            self.registry.clone(),
            self.node.clone(),
            self.cfg.clone(),
        );
        let join = tokio::spawn(machine.run(cancel.clone()));
        self.registry.set_task(id, TaskHandle { join, cancel });
    }

    /// Stops every service in reverse dependency order.
    pub async fn shutdown(&self) -> Result<(), ShutdownError> {
        self.shutdown_in_order(None).await
    }

    /// Stops every service, in `order` if given (unlisted services are stopped
    /// afterwards in reverse dependency order).
    ///
    /// Each service gets its own stop window of [`SupervisorConfig::grace`],
    /// starting when its turn comes. A service still running when its window
    /// expires has its machine aborted (which kills its process) and is marked
    /// `Failed`; the remaining services are still stopped gracefully.
    pub async fn shutdown_in_order(&self, order: Option<Vec<String>>) -> Result<(), ShutdownError> {
        let _control = self.control.lock().await;
        self.registry.close();

        let default_order = self.registry.shutdown_order();
        let order = match order {
            None => default_order,
            Some(mut custom) => {
                custom.retain(|id| self.registry.contains(id));
                for id in default_order {
                    if !custom.contains(&id) {
                        custom.push(id);
                    }
                }
                custom
            }
        };

        let grace = self.cfg.grace;
        info!(?grace, ?order, "shutdown requested");

        let mut stuck = Vec::new();
        for id in &order {
            let Some(task) = self.registry.take_task(id) else {
                continue;
            };
            if !self.stop_task(id, task, grace).await {
                stuck.push(id.clone());
            }
        }
        // Handles of late spawns that raced the close.
        for (id, task) in self.registry.take_all_tasks() {
            if !self.stop_task(&id, task, grace).await {
                stuck.push(id);
            }
        }
        self.runtime_token.cancel();

        if stuck.is_empty() {
            info!("all services stopped within grace");
            Ok(())
        } else {
            error!(?stuck, ?grace, "services exceeded their stop window");
            Err(ShutdownError::Timeout { grace, stuck })
        }
    }

    /// Cancels one machine and waits for it for up to `grace`. Returns `false`
    /// if it had to be aborted.
    async fn stop_task(&self, id: &str, mut task: TaskHandle, grace: Duration) -> bool {
        task.cancel.cancel();
        if time::timeout(grace, &mut task.join).await.is_ok() {
            return true;
        }
        task.join.abort();
        let terminal = self.registry.state(id).is_some_and(ServiceState::is_terminal);
        if !terminal {
            self.registry.transition(
                id,
                ServiceState::Failed,
                Some("service did not stop within its grace period; terminated".into()),
            );
        }
        warn!(service = %id, "service aborted");
        false
    }

    /// Stops one service; it ends in `Finished` (or `Failed`) and is not relaunched.
    pub async fn stop_service(&self, id: &str) -> Result<(), ControlError> {
        if !self.registry.contains(id) {
            return Err(ControlError::UnknownService { id: id.to_string() });
        }
        let Some(task) = self.registry.take_task(id) else {
            return Ok(());
        };
        info!(service = %id, "stop requested");
        let grace = self.cfg.grace;
        if self.stop_task(id, task, grace).await {
            Ok(())
        } else {
            Err(ControlError::StopTimeout {
                id: id.to_string(),
                grace,
            })
        }
    }

    /// Full operator restart: stops the current run, resets the restart counter
    /// and health, and drives the same record again from `Waiting`.
    pub async fn restart_service(&self, id: &str) -> Result<(), ControlError> {
        let _control = self.control.lock().await;
        if self.registry.is_closed() {
            return Err(ControlError::Closed);
        }
        self.stop_service(id).await?;

        self.registry.reset_for_restart(id);
        self.registry.transition(id, ServiceState::Waiting, None);
        info!(service = %id, "service restarted by operator");

        let started = self.started.lock();
        if *started {
            self.spawn(id);
        }
        Ok(())
    }

    /// Per-service state, sorted by id.
    pub fn snapshot(&self) -> Vec<ServiceSnapshot> {
        self.registry.snapshot()
    }

    pub fn state(&self, id: &str) -> Option<ServiceState> {
        self.registry.state(id)
    }

    /// Recent transitions of one service, oldest first.
    pub fn events(&self, id: &str) -> Option<Vec<Event>> {
        self.registry.history(id)
    }

    /// Receiver for all subsequent transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Condition satisfied once every service in `ids` matches `filter`.
    pub fn condition<I, S>(&self, ids: I, filter: ServiceFilter) -> ConditionRef
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(ServiceCondition::new(
            ids.into_iter().map(Into::into).collect(),
            filter,
            Arc::downgrade(&self.registry),
            self.registry.changes(),
        ))
    }

    /// Starts, waits for SIGINT/SIGTERM/SIGQUIT, then shuts down in default order.
    pub async fn run_until_signal(&self) -> Result<(), ShutdownError> {
        self.start();
        match shutdown::wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "termination signal received"),
            Err(e) => error!(error = %e, "cannot install signal handlers; shutting down"),
        }
        self.shutdown().await
    }

    /// Forwards bus events to the subscriber set until the bus closes.
    pub(crate) fn subscriber_listener(&self) {
        if self.subs.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        let set = Arc::clone(&self.subs);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => set.emit(&ev),
                    Err(RecvError::Lagged(n)) => warn!(skipped = n, "subscriber listener lagged"),
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}
