//! # Service registry: records, dependency bookkeeping and event emission.
//!
//! The registry is the single structure shared by every service task. It owns
//! the dependency graph, one [`ServiceRecord`] per registered service, and the
//! handles of the tasks driving them.
//!
//! ## Architecture
//! ```text
//! Supervisor::register ──► Registry::register ── check graph ── insert record (Waiting)
//!
//! ServiceMachine ──► Registry::transition(id, to, error)
//!                      ├─ record.state = to, counters, history
//!                      ├─ first Running of this run?
//!                      │     └─ for each dependent: pending.remove(id)
//!                      │           └─ pending empty → fire its gate (oneshot)
//!                      ├─ Bus::publish(Event)
//!                      └─ changes += 1 (watch, wakes service conditions)
//! ```
//!
//! ## Rules
//! - One `parking_lot::Mutex` guards everything; it is never held across `.await`.
//! - Events are created and published under the lock, so `seq` order matches
//!   state order for every service and dependency releases are ordered after
//!   the `Running` event that caused them.
//! - A task only ever transitions its own record.
//! - Registration is atomic: validation happens before any mutation.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::graph::DependencyGraph;
use crate::conditions::ServiceFilter;
use crate::error::RegistrationError;
use crate::events::{Bus, Event, ServiceState};
use crate::health::{HealthReport, HealthStatus};
use crate::services::ServiceRef;

/// Handle to the task driving one service.
pub(crate) struct TaskHandle {
    pub(crate) join: JoinHandle<()>,
    pub(crate) cancel: CancellationToken,
}

/// Point-in-time view of one service.
#[derive(Clone, Debug)]
pub struct ServiceSnapshot {
    pub id: String,
    pub state: ServiceState,
    pub health: HealthStatus,
    /// Consecutive failed probes of the current instance.
    pub health_failures: u32,
    /// Relaunches since registration or the last operator restart.
    pub restarts: u32,
    pub last_error: Option<String>,
    /// Dependencies not yet observed running (empty once released).
    pub waiting_on: Vec<String>,
    /// Recent transitions, oldest first.
    pub events: Vec<Event>,
}

struct ServiceRecord {
    service: ServiceRef,
    state: ServiceState,
    health: HealthStatus,
    health_failures: u32,
    restarts: u32,
    last_error: Option<Arc<str>>,
    history: VecDeque<Event>,
    reached_running: bool,
    pending: BTreeSet<String>,
    gate: Option<oneshot::Sender<()>>,
    task: Option<TaskHandle>,
}

impl ServiceRecord {
    fn new(service: ServiceRef) -> Self {
        Self {
            service,
            state: ServiceState::Waiting,
            health: HealthStatus::Unknown,
            health_failures: 0,
            restarts: 0,
            last_error: None,
            history: VecDeque::new(),
            reached_running: false,
            pending: BTreeSet::new(),
            gate: None,
            task: None,
        }
    }
}

#[derive(Default)]
struct Inner {
    graph: DependencyGraph,
    records: BTreeMap<String, ServiceRecord>,
    closed: bool,
}

pub(crate) struct Registry {
    inner: Mutex<Inner>,
    bus: Bus,
    changes: watch::Sender<u64>,
    history_cap: usize,
}

impl Registry {
    pub(crate) fn new(bus: Bus, history_cap: usize) -> Arc<Self> {
        let (changes, _rx) = watch::channel(0);
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            bus,
            changes,
            history_cap: history_cap.max(1),
        })
    }

    /// Adds a service in `Waiting`. Leaves the registry untouched on error.
    pub(crate) fn register(&self, service: ServiceRef) -> Result<(), RegistrationError> {
        let id = service.id().to_string();
        let deps = service.depends_on();
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(RegistrationError::Closed);
            }
            inner.graph.check_insert(&id, &deps)?;
            inner.graph.insert(&id, &deps);
            inner.records.insert(id, ServiceRecord::new(service));
        }
        self.notify();
        Ok(())
    }

    /// Stops accepting registrations.
    pub(crate) fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.inner.lock().records.contains_key(id)
    }

    pub(crate) fn service(&self, id: &str) -> Option<ServiceRef> {
        self.inner.lock().records.get(id).map(|r| r.service.clone())
    }

    pub(crate) fn state(&self, id: &str) -> Option<ServiceState> {
        self.inner.lock().records.get(id).map(|r| r.state)
    }

    /// Registered ids in dependency order.
    pub(crate) fn start_order(&self) -> Vec<String> {
        self.inner.lock().graph.topological_order()
    }

    /// Registered ids with dependents before their dependencies.
    pub(crate) fn shutdown_order(&self) -> Vec<String> {
        let mut order = self.start_order();
        order.reverse();
        order
    }

    /// Dependencies of `id` that are not registered.
    pub(crate) fn missing_dependencies(&self, id: &str) -> Vec<String> {
        let inner = self.inner.lock();
        inner
            .graph
            .dependencies(id)
            .iter()
            .filter(|d| !inner.records.contains_key(d.as_str()))
            .cloned()
            .collect()
    }

    /// Arms the start gate of `id`.
    ///
    /// Returns `None` if every dependency has already been observed running,
    /// otherwise a receiver that fires once the last one is.
    pub(crate) fn arm_gate(&self, id: &str) -> Option<oneshot::Receiver<()>> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let pending: BTreeSet<String> = inner
            .graph
            .dependencies(id)
            .iter()
            .filter(|d| !inner.records.get(d.as_str()).is_some_and(|r| r.reached_running))
            .cloned()
            .collect();

        let record = inner.records.get_mut(id)?;
        if pending.is_empty() {
            record.pending.clear();
            record.gate = None;
            return None;
        }
        let (tx, rx) = oneshot::channel();
        record.pending = pending;
        record.gate = Some(tx);
        Some(rx)
    }

    /// Moves `id` to `to` and publishes the event. Returns `None` for unknown
    /// services and no-op transitions.
    pub(crate) fn transition(
        &self,
        id: &str,
        to: ServiceState,
        error: Option<String>,
    ) -> Option<Event> {
        let ev = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let record = inner.records.get_mut(id)?;
            let from = record.state;
            if from == to && error.is_none() {
                return None;
            }

            record.state = to;
            let mut ev = Event::transition(id, from, to).with_restarts(record.restarts);
            if let Some(err) = error {
                let err: Arc<str> = err.into();
                record.last_error = Some(err.clone());
                ev = ev.with_error(err);
            }
            if to == ServiceState::Starting {
                record.health = HealthStatus::Unknown;
                record.health_failures = 0;
            }
            let first_run = to == ServiceState::Running && !record.reached_running;
            if first_run {
                record.reached_running = true;
            }
            if record.history.len() >= self.history_cap {
                record.history.pop_front();
            }
            record.history.push_back(ev.clone());

            self.bus.publish(ev.clone());
            if first_run {
                Self::release_dependents(inner, id);
            }
            ev
        };
        self.notify();
        Some(ev)
    }

    fn release_dependents(inner: &mut Inner, id: &str) {
        let dependents: Vec<String> = inner.graph.dependents(id).cloned().collect();
        for dependent in dependents {
            let Some(record) = inner.records.get_mut(&dependent) else {
                continue;
            };
            if !record.pending.remove(id) || !record.pending.is_empty() {
                continue;
            }
            if let Some(gate) = record.gate.take() {
                let _ = gate.send(());
            }
        }
    }

    pub(crate) fn set_health(&self, id: &str, report: &HealthReport) {
        if let Some(record) = self.inner.lock().records.get_mut(id) {
            record.health = report.status;
            record.health_failures = report.failures;
        }
        self.notify();
    }

    /// Increments the relaunch counter and returns the new value.
    pub(crate) fn bump_restarts(&self, id: &str) -> u32 {
        let mut inner = self.inner.lock();
        match inner.records.get_mut(id) {
            Some(record) => {
                record.restarts = record.restarts.saturating_add(1);
                record.restarts
            }
            None => 0,
        }
    }

    /// Records an error without changing state (e.g. a retried launch failure).
    pub(crate) fn set_error(&self, id: &str, error: String) {
        if let Some(record) = self.inner.lock().records.get_mut(id) {
            record.last_error = Some(error.into());
        }
    }

    /// Prepares a record for an operator-requested full restart: counters reset,
    /// dependents must observe it running again. The caller transitions it to
    /// `Waiting` and spawns a fresh task.
    pub(crate) fn reset_for_restart(&self, id: &str) {
        if let Some(record) = self.inner.lock().records.get_mut(id) {
            record.restarts = 0;
            record.health = HealthStatus::Unknown;
            record.health_failures = 0;
            record.last_error = None;
            record.reached_running = false;
            record.pending.clear();
            record.gate = None;
        }
    }

    pub(crate) fn set_task(&self, id: &str, handle: TaskHandle) {
        if let Some(record) = self.inner.lock().records.get_mut(id) {
            if let Some(old) = record.task.replace(handle) {
                warn!(service = %id, "replacing a live task handle");
                old.cancel.cancel();
            }
        }
    }

    pub(crate) fn take_task(&self, id: &str) -> Option<TaskHandle> {
        self.inner.lock().records.get_mut(id)?.task.take()
    }

    /// Takes every remaining task handle.
    pub(crate) fn take_all_tasks(&self) -> Vec<(String, TaskHandle)> {
        let mut inner = self.inner.lock();
        inner
            .records
            .iter_mut()
            .filter_map(|(id, r)| r.task.take().map(|t| (id.clone(), t)))
            .collect()
    }

    pub(crate) fn snapshot(&self) -> Vec<ServiceSnapshot> {
        let inner = self.inner.lock();
        inner
            .records
            .iter()
            .map(|(id, r)| ServiceSnapshot {
                id: id.clone(),
                state: r.state,
                health: r.health,
                health_failures: r.health_failures,
                restarts: r.restarts,
                last_error: r.last_error.as_deref().map(str::to_string),
                waiting_on: r.pending.iter().cloned().collect(),
                events: r.history.iter().cloned().collect(),
            })
            .collect()
    }

    pub(crate) fn history(&self, id: &str) -> Option<Vec<Event>> {
        let inner = self.inner.lock();
        inner
            .records
            .get(id)
            .map(|r| r.history.iter().cloned().collect())
    }

    /// `true` if every id is registered and matches `filter`.
    pub(crate) fn all_match(&self, ids: &[String], filter: ServiceFilter) -> bool {
        let inner = self.inner.lock();
        ids.iter().all(|id| {
            inner
                .records
                .get(id)
                .is_some_and(|r| filter.matches(r.state))
        })
    }

    /// Receiver bumped after every registry change.
    pub(crate) fn changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify(&self) {
        self.changes.send_modify(|n| *n = n.wrapping_add(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BoxError;
    use crate::runner::FnRunner;
    use crate::services::ServiceFn;

    fn svc(id: &'static str, deps: &[&str]) -> ServiceRef {
        ServiceFn::builder(id)
            .with_deps(deps.iter().copied())
            .with_runner(FnRunner::arc(id, |_ctx: CancellationToken| async {
                Ok::<_, BoxError>(())
            }))
            .build()
    }

    #[test]
    fn gate_fires_after_last_dependency_runs() {
        let reg = Registry::new(Bus::new(64), 8);
        reg.register(svc("a", &[])).unwrap();
        reg.register(svc("b", &[])).unwrap();
        reg.register(svc("c", &["a", "b"])).unwrap();

        assert!(reg.arm_gate("a").is_none());
        let mut gate = reg.arm_gate("c").expect("c waits on a and b");

        reg.transition("a", ServiceState::Running, None);
        assert!(gate.try_recv().is_err());

        reg.transition("b", ServiceState::Running, None);
        assert!(gate.try_recv().is_ok());
    }

    #[test]
    fn second_running_does_not_release_twice() {
        let reg = Registry::new(Bus::new(64), 8);
        reg.register(svc("a", &[])).unwrap();
        reg.register(svc("b", &[])).unwrap();
        reg.register(svc("c", &["a", "b"])).unwrap();
        let mut gate = reg.arm_gate("c").unwrap();

        reg.transition("a", ServiceState::Running, None);
        reg.transition("a", ServiceState::Starting, None);
        reg.transition("a", ServiceState::Running, None);
        assert!(gate.try_recv().is_err());
        assert_eq!(reg.snapshot()[2].waiting_on, vec!["b".to_string()]);
    }

    #[test]
    fn failed_registration_leaves_no_trace() {
        let reg = Registry::new(Bus::new(64), 8);
        reg.register(svc("a", &["b"])).unwrap();
        let ids = |reg: &Registry| -> Vec<String> {
            reg.snapshot().into_iter().map(|s| s.id).collect()
        };
        let before = ids(&reg);

        let err = reg.register(svc("b", &["a"])).unwrap_err();
        assert_eq!(err.as_label(), "registration_cycle");
        assert_eq!(ids(&reg), before);
        assert!(!reg.contains("b"));
        assert_eq!(reg.start_order(), vec!["a".to_string()]);
    }

    #[test]
    fn history_is_bounded_and_errors_are_kept() {
        let reg = Registry::new(Bus::new(64), 2);
        reg.register(svc("a", &[])).unwrap();
        reg.transition("a", ServiceState::Preparing, None);
        reg.transition("a", ServiceState::Starting, None);
        reg.transition("a", ServiceState::Failed, Some("launch failed: boom".into()));

        let history = reg.history("a").unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].to, ServiceState::Failed);
        assert_eq!(
            reg.snapshot()[0].last_error.as_deref(),
            Some("launch failed: boom")
        );
    }

    #[test]
    fn closed_registry_rejects() {
        let reg = Registry::new(Bus::new(64), 8);
        reg.close();
        assert_eq!(
            reg.register(svc("a", &[])),
            Err(RegistrationError::Closed)
        );
    }
}
