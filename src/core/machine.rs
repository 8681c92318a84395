//! # ServiceMachine: the control loop driving one service.
//!
//! One machine runs per registered service, as its own tokio task. It owns the
//! service's [`Restarter`] and health checker and reports every state change
//! through [`Registry::transition`], which publishes it before the machine moves
//! on to the next phase.
//!
//! ## Lifecycle
//! ```text
//! Waiting ──gate──► Preparing ── pre() ── condition.wait() ── runner()
//!                                                               │
//!          ┌────────────────────────────────────────────────────┘
//!          ▼
//!   ┌─► Starting ── launch() ──► Running ──► Healthy / Unhealthy (probe)
//!   │                  │                          │
//!   │        launch failure                  exit │ cancel
//!   │        (retry / give up)                    ▼
//!   └──────── Relaunch { delay } ◄──── Restarter::on_exit ──► Stop ──► Stopping ──► post() ──► Finished / Failed
//! ```
//!
//! ## Rules
//! - The machine only transitions its own record.
//! - Cancellation before preparation finishes ends in `Finished` without
//!   `Stopping`; cancellation later goes through `Stopping`.
//! - `post()` runs once per run, before the terminal event, and only once
//!   `pre()` has started. Its errors are logged and never change the outcome.
//! - A service without a probe is `Healthy` as soon as it runs.
//! - The health checker is bound to one instance through a child token and is
//!   cancelled before the next launch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::config::SupervisorConfig;
use super::registry::Registry;
use super::restart::{Decision, LaunchDecision, Restarter};
use crate::conditions::NodeState;
use crate::error::ServiceError;
use crate::events::ServiceState;
use crate::health::{HealthChecker, HealthReport, HealthStatus};
use crate::runner::Exit;
use crate::services::ServiceRef;

/// How one instance ended.
enum Outcome {
    Cancelled,
    Exited(Exit, Duration),
}

pub(crate) struct ServiceMachine {
    id: String,
    service: ServiceRef,
    registry: Arc<Registry>,
    node: NodeState,
    cfg: Arc<SupervisorConfig>,
}

impl ServiceMachine {
    pub(crate) fn new(
        service: ServiceRef,
        registry: Arc<Registry>,
        node: NodeState,
        cfg: Arc<SupervisorConfig>,
    ) -> Self {
        Self {
            id: service.id().to_string(),
            service,
            registry,
            node,
            cfg,
        }
    }

    /// Drives the service until it reaches a terminal state.
    pub(crate) async fn run(self, token: CancellationToken) {
        if let Some(gate) = self.registry.arm_gate(&self.id) {
            debug!(service = %self.id, "waiting for dependencies");
            let released = tokio::select! {
                biased;
                _ = token.cancelled() => false,
                res = gate => res.is_ok(),
            };
            if !released {
                self.emit(ServiceState::Finished, None);
                return;
            }
        }

        self.emit(ServiceState::Preparing, None);
        let prepared = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            res = self.service.pre(token.child_token()) => Some(res),
        };
        match prepared {
            None => return self.finish(ServiceState::Finished, None).await,
            Some(Err(e)) => {
                let err = ServiceError::Preparation {
                    reason: e.to_string(),
                };
                warn!(service = %self.id, error = %e, "preparation failed");
                return self.finish(ServiceState::Failed, Some(err)).await;
            }
            Some(Ok(())) => {}
        }

        if let Some(cond) = self.service.condition(&self.node) {
            info!(service = %self.id, condition = %cond, "waiting for condition");
            match cond.wait(token.child_token()).await {
                Ok(()) => debug!(service = %self.id, "condition satisfied"),
                Err(e) if e.is_cancelled() => {
                    return self.finish(ServiceState::Finished, None).await;
                }
                Err(e) => {
                    warn!(service = %self.id, error = %e, "condition failed");
                    let err = ServiceError::Condition {
                        reason: e.to_string(),
                    };
                    return self.finish(ServiceState::Failed, Some(err)).await;
                }
            }
        }

        let runner = match self.service.runner() {
            Ok(runner) => runner,
            Err(e) => {
                let err = ServiceError::Launch {
                    reason: e.to_string(),
                };
                return self.finish(ServiceState::Failed, Some(err)).await;
            }
        };
        let restarter = Restarter::new(
            self.id.clone(),
            runner,
            self.service.restart_policy(),
            &self.cfg,
        );
        self.supervise(restarter, token).await;
    }

    /// Launch / watch / relaunch loop.
    async fn supervise(&self, mut restarter: Restarter, token: CancellationToken) {
        let probe = self.service.health_probe();
        let settings = self.service.health_settings(self.cfg.health);
        let mut relaunch_reason: Option<String> = None;

        loop {
            self.emit_with(ServiceState::Starting, relaunch_reason.take());
            let launched = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                res = restarter.launch() => Some(res),
            };
            let pid = match launched {
                None => return self.stop(&mut restarter).await,
                Some(Ok(pid)) => pid,
                Some(Err(e)) => {
                    let err = ServiceError::Launch {
                        reason: e.to_string(),
                    };
                    match restarter.on_launch_failure() {
                        LaunchDecision::GiveUp => {
                            warn!(service = %self.id, error = %e, "launch failed, giving up");
                            return self.finish(ServiceState::Failed, Some(err)).await;
                        }
                        LaunchDecision::Retry { delay } => {
                            warn!(service = %self.id, error = %e, ?delay, "launch failed, retrying");
                            self.registry.set_error(&self.id, err.to_string());
                            self.registry.bump_restarts(&self.id);
                            if !sleep_or_cancel(delay, &token).await {
                                return self.stop(&mut restarter).await;
                            }
                            continue;
                        }
                    }
                }
            };

            self.emit(ServiceState::Running, None);
            info!(service = %self.id, pid = ?pid, policy = restarter.policy().as_str(), "service running");

            let instance = token.child_token();
            let mut reports = match &probe {
                Some(probe) => {
                    let checker = HealthChecker::new(self.id.clone(), probe.clone(), settings);
                    let (_handle, rx) = checker.spawn(instance.clone());
                    Some(rx)
                }
                None => {
                    self.on_health(HealthReport {
                        status: HealthStatus::Healthy,
                        failures: 0,
                        error: None,
                    });
                    None
                }
            };

            let outcome = loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break Outcome::Cancelled,
                    (exit, ran_for) = restarter.wait() => break Outcome::Exited(exit, ran_for),
                    report = next_report(&mut reports) => self.on_health(report),
                }
            };
            instance.cancel();

            let (exit, ran_for) = match outcome {
                Outcome::Cancelled => return self.stop(&mut restarter).await,
                Outcome::Exited(exit, ran_for) => (exit, ran_for),
            };

            match restarter.on_exit(&exit, ran_for) {
                Decision::Relaunch { delay } => {
                    let restarts = self.registry.bump_restarts(&self.id);
                    info!(service = %self.id, %exit, ?ran_for, ?delay, restarts, "relaunching");
                    if !exit.is_success() {
                        relaunch_reason = Some(
                            ServiceError::Exited {
                                exit: exit.to_string(),
                            }
                            .to_string(),
                        );
                    }
                    if !sleep_or_cancel(delay, &token).await {
                        return self.stop(&mut restarter).await;
                    }
                }
                Decision::Stop { success: true } => {
                    info!(service = %self.id, %exit, "service exited");
                    self.emit(ServiceState::Stopping, None);
                    return self.finish(ServiceState::Finished, None).await;
                }
                Decision::Stop { success: false } => {
                    warn!(service = %self.id, %exit, "service exited, not relaunching");
                    let err = ServiceError::Exited {
                        exit: exit.to_string(),
                    };
                    self.emit(ServiceState::Stopping, Some(err.clone()));
                    return self.finish(ServiceState::Failed, Some(err)).await;
                }
            }
        }
    }

    /// Stopping path for a requested stop: terminate the live instance, clean up.
    async fn stop(&self, restarter: &mut Restarter) {
        self.emit(ServiceState::Stopping, None);
        match restarter.stop(self.cfg.stop_grace).await {
            None => {}
            Some(Ok(exit)) => debug!(service = %self.id, %exit, "instance stopped"),
            Some(Err(e)) => {
                warn!(service = %self.id, error = %e, "stop failed");
                let err = ServiceError::Stop {
                    reason: e.to_string(),
                };
                return self.finish(ServiceState::Failed, Some(err)).await;
            }
        }
        self.finish(ServiceState::Finished, None).await;
    }

    /// Runs the cleanup hook, then publishes the terminal state.
    async fn finish(&self, state: ServiceState, error: Option<ServiceError>) {
        if let Err(e) = self.service.post(state).await {
            warn!(service = %self.id, error = %e, "cleanup hook failed");
        }
        self.emit(state, error);
        info!(service = %self.id, state = %state, "service done");
    }

    fn on_health(&self, report: HealthReport) {
        self.registry.set_health(&self.id, &report);
        let current = self.registry.state(&self.id);
        match report.status {
            HealthStatus::Unknown => {}
            HealthStatus::Healthy => {
                if current != Some(ServiceState::Healthy) {
                    self.emit(ServiceState::Healthy, None);
                }
            }
            HealthStatus::Unhealthy => {
                if current != Some(ServiceState::Unhealthy) {
                    let reason = report.error.unwrap_or_default();
                    warn!(service = %self.id, failures = report.failures, error = %reason, "service unhealthy");
                    self.emit(ServiceState::Unhealthy, Some(ServiceError::HealthProbe { reason }));
                }
            }
        }
    }

    fn emit(&self, to: ServiceState, error: Option<ServiceError>) {
        self.emit_with(to, error.map(|e| e.to_string()));
    }

    fn emit_with(&self, to: ServiceState, error: Option<String>) {
        if let Some(ev) = self.registry.transition(&self.id, to, error) {
            debug!(service = %self.id, from = %ev.from, to = %ev.to, seq = ev.seq, "transition");
        }
    }
}

/// Next health report of the current instance; pending once the checker is gone.
async fn next_report(rx: &mut Option<mpsc::Receiver<HealthReport>>) -> HealthReport {
    if let Some(inner) = rx {
        if let Some(report) = inner.recv().await {
            return report;
        }
    }
    *rx = None;
    std::future::pending().await
}

/// Sleeps for `delay`. Returns `false` if cancelled first.
async fn sleep_or_cancel(delay: Duration, token: &CancellationToken) -> bool {
    if delay.is_zero() {
        return !token.is_cancelled();
    }
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::error::BoxError;
    use crate::events::Bus;
    use crate::health::{HealthSettings, ProbeFn};
    use crate::policies::RestartPolicy;
    use crate::runner::FnRunner;
    use crate::services::ServiceFn;

    fn harness(service: ServiceRef) -> (Arc<Registry>, ServiceMachine) {
        let registry = Registry::new(Bus::new(256), 256);
        registry.register(service.clone()).unwrap();
        let machine = ServiceMachine::new(
            service,
            registry.clone(),
            NodeState::new(),
            Arc::new(SupervisorConfig::default()),
        );
        (registry, machine)
    }

    fn states(registry: &Registry, id: &str) -> Vec<ServiceState> {
        registry
            .history(id)
            .unwrap_or_default()
            .iter()
            .map(|e| e.to)
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn once_clean_exit_finishes() {
        let svc = ServiceFn::builder("job")
            .with_runner(FnRunner::arc("job", |_ctx: CancellationToken| async {
                Ok::<_, BoxError>(())
            }))
            .with_restart(RestartPolicy::Once)
            .build();
        let (registry, machine) = harness(svc);
        machine.run(CancellationToken::new()).await;

        use ServiceState::*;
        assert_eq!(
            states(&registry, "job"),
            vec![Preparing, Starting, Running, Healthy, Stopping, Finished]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn preparation_failure_is_terminal() {
        let post_state = Arc::new(parking_lot::Mutex::new(None));
        let svc = ServiceFn::builder("cri")
            .with_pre(|_ctx: CancellationToken| async { Err::<(), BoxError>("disk full".into()) })
            .with_post({
                let post_state = post_state.clone();
                move |state: ServiceState| {
                    *post_state.lock() = Some(state);
                    async { Ok::<_, BoxError>(()) }
                }
            })
            .with_runner(FnRunner::arc("cri", |_ctx: CancellationToken| async {
                Ok::<_, BoxError>(())
            }))
            .build();
        let (registry, machine) = harness(svc);
        machine.run(CancellationToken::new()).await;

        let history = registry.history("cri").unwrap();
        assert_eq!(
            history.iter().map(|e| e.to).collect::<Vec<_>>(),
            vec![ServiceState::Preparing, ServiceState::Failed]
        );
        assert_eq!(
            history[1].error.as_deref(),
            Some("preparation failed: disk full")
        );
        assert_eq!(*post_state.lock(), Some(ServiceState::Failed));
    }

    #[tokio::test(start_paused = true)]
    async fn forever_relaunches_and_cancel_stops_once() {
        let runs = Arc::new(AtomicU32::new(0));
        let svc = ServiceFn::builder("flappy")
            .with_runner(FnRunner::arc("flappy", {
                let runs = runs.clone();
                move |ctx: CancellationToken| {
                    let n = runs.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n < 3 {
                            return Err::<(), BoxError>("crashed".into());
                        }
                        ctx.cancelled().await;
                        Ok(())
                    }
                }
            }))
            .build();
        let (registry, machine) = harness(svc);
        let token = CancellationToken::new();
        let task = tokio::spawn(machine.run(token.clone()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 4);
        assert_eq!(registry.snapshot()[0].restarts, 3);

        token.cancel();
        task.await.unwrap();

        let tail: Vec<_> = states(&registry, "flappy").into_iter().rev().take(2).collect();
        assert_eq!(tail, vec![ServiceState::Finished, ServiceState::Stopping]);
        let stops = states(&registry, "flappy")
            .into_iter()
            .filter(|s| *s == ServiceState::Stopping)
            .count();
        assert_eq!(stops, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn probe_drives_health_states() {
        let healthy = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let svc = ServiceFn::builder("apid")
            .with_runner(FnRunner::arc("apid", |ctx: CancellationToken| async move {
                ctx.cancelled().await;
                Ok::<_, BoxError>(())
            }))
            .with_health_probe(ProbeFn::arc({
                let healthy = healthy.clone();
                move |_ctx: CancellationToken| {
                    let ok = healthy.load(Ordering::SeqCst);
                    async move {
                        if ok { Ok(()) } else { Err::<(), BoxError>("refused".into()) }
                    }
                }
            }))
            .with_health_settings(
                HealthSettings::default()
                    .with_initial_delay(Duration::ZERO)
                    .with_interval(Duration::from_secs(1))
                    .with_failure_threshold(2),
            )
            .build();
        let (registry, machine) = harness(svc);
        let token = CancellationToken::new();
        let task = tokio::spawn(machine.run(token.clone()));

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(registry.state("apid"), Some(ServiceState::Healthy));

        healthy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(registry.state("apid"), Some(ServiceState::Unhealthy));
        assert_eq!(
            registry.snapshot()[0].last_error.as_deref(),
            Some("health probe failed: refused")
        );

        healthy.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(registry.state("apid"), Some(ServiceState::Healthy));
        assert_eq!(registry.snapshot()[0].health_failures, 0);

        token.cancel();
        task.await.unwrap();
        assert_eq!(registry.state("apid"), Some(ServiceState::Finished));
    }
}
