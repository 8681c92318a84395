//! # Restart engine: one instance at a time, relaunch decisions, backoff.
//!
//! [`Restarter`] wraps one service's [`Runner`](crate::Runner) together with its
//! [`RestartPolicy`]. The service machine asks it to launch, waits on it for the
//! exit, and asks it what to do next.
//!
//! ```text
//! launch() ──► current = Some(instance)        (AlreadyRunning if occupied)
//! wait()   ──► (exit, ran_for); current = None
//! on_exit(exit, ran_for)
//!   ├─ policy says stop              → Decision::Stop { success }
//!   ├─ ran_for <  rapid_exit_window  → Decision::Relaunch { delay = backoff.next(n) }, n += 1
//!   └─ ran_for >= rapid_exit_window  → Decision::Relaunch { delay = 0 },              n  = 0
//! on_launch_failure()
//!   ├─ Once, or limit reached        → LaunchDecision::GiveUp
//!   └─ otherwise                     → LaunchDecision::Retry { delay = backoff.next(k - 1) }
//! ```
//!
//! ## Rules
//! - At most one live instance. A replacement can only be launched after the
//!   previous instance's exit was observed (`wait`) or it was stopped (`stop`).
//! - `wait()` is cancel-safe: dropping it keeps the instance in place.
//! - Backoff only applies to rapid-exit loops and launch failures; a long-lived
//!   instance that exits is relaunched immediately.

use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

use super::config::SupervisorConfig;
use crate::error::RunnerError;
use crate::policies::{BackoffPolicy, RestartPolicy};
use crate::runner::{Exit, Process, RunnerRef};

/// What to do after an instance exited.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Decision {
    Relaunch { delay: Duration },
    Stop { success: bool },
}

/// What to do after a launch attempt failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LaunchDecision {
    Retry { delay: Duration },
    GiveUp,
}

struct Instance {
    process: Box<dyn Process>,
    started: Instant,
}

pub(crate) struct Restarter {
    id: String,
    runner: RunnerRef,
    policy: RestartPolicy,
    backoff: BackoffPolicy,
    rapid_exit_window: Duration,
    launch_failure_limit: Option<u32>,
    current: Option<Instance>,
    rapid_exits: u32,
    launch_failures: u32,
}

impl Restarter {
    pub(crate) fn new(
        id: impl Into<String>,
        runner: RunnerRef,
        policy: RestartPolicy,
        cfg: &SupervisorConfig,
    ) -> Self {
        Self {
            id: id.into(),
            runner,
            policy,
            backoff: cfg.backoff,
            rapid_exit_window: cfg.rapid_exit_window,
            launch_failure_limit: cfg.launch_failure_limit,
            current: None,
            rapid_exits: 0,
            launch_failures: 0,
        }
    }

    pub(crate) fn policy(&self) -> RestartPolicy {
        self.policy
    }

    #[cfg(test)]
    fn is_live(&self) -> bool {
        self.current.is_some()
    }

    /// Launches a new instance. Fails with `AlreadyRunning` while one is live.
    pub(crate) async fn launch(&mut self) -> Result<Option<u32>, RunnerError> {
        if self.current.is_some() {
            return Err(RunnerError::AlreadyRunning {
                id: self.id.clone(),
            });
        }
        let process = self.runner.start().await?;
        let pid = process.pid();
        self.launch_failures = 0;
        self.current = Some(Instance {
            process,
            started: Instant::now(),
        });
        Ok(pid)
    }

    /// Waits for the live instance to exit. Pending forever when none is live.
    pub(crate) async fn wait(&mut self) -> (Exit, Duration) {
        let Some(instance) = self.current.as_mut() else {
            return std::future::pending().await;
        };
        let exit = instance.process.wait().await;
        let ran_for = instance.started.elapsed();
        self.current = None;
        (exit, ran_for)
    }

    /// Stops the live instance, if any.
    pub(crate) async fn stop(&mut self, grace: Duration) -> Option<Result<Exit, RunnerError>> {
        let mut instance = self.current.take()?;
        Some(instance.process.stop(grace).await)
    }

    pub(crate) fn on_exit(&mut self, exit: &Exit, ran_for: Duration) -> Decision {
        if !self.policy.should_restart(exit) {
            return Decision::Stop {
                success: exit.is_success(),
            };
        }
        if ran_for < self.rapid_exit_window {
            let delay = self.backoff.next(self.rapid_exits);
            self.rapid_exits = self.rapid_exits.saturating_add(1);
            debug!(service = %self.id, rapid_exits = self.rapid_exits, ?delay, "rapid exit");
            Decision::Relaunch { delay }
        } else {
            self.rapid_exits = 0;
            Decision::Relaunch {
                delay: Duration::ZERO,
            }
        }
    }

    pub(crate) fn on_launch_failure(&mut self) -> LaunchDecision {
        self.launch_failures = self.launch_failures.saturating_add(1);
        if !self.policy.retries_launch() {
            return LaunchDecision::GiveUp;
        }
        if let Some(limit) = self.launch_failure_limit {
            if self.launch_failures >= limit.max(1) {
                return LaunchDecision::GiveUp;
            }
        }
        LaunchDecision::Retry {
            delay: self.backoff.next(self.launch_failures - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::error::BoxError;
    use crate::policies::JitterPolicy;
    use crate::runner::{FnRunner, Runner};

    fn cfg(limit: Option<u32>) -> SupervisorConfig {
        SupervisorConfig {
            backoff: BackoffPolicy {
                first: Duration::from_secs(1),
                max: Duration::from_secs(8),
                factor: 2.0,
                jitter: JitterPolicy::None,
            },
            rapid_exit_window: Duration::from_secs(5),
            launch_failure_limit: limit,
            ..SupervisorConfig::default()
        }
    }

    fn idle_runner() -> RunnerRef {
        FnRunner::arc("svc", |ctx: CancellationToken| async move {
            ctx.cancelled().await;
            Ok::<_, BoxError>(())
        })
    }

    struct Broken(AtomicU32);

    #[async_trait]
    impl Runner for Broken {
        fn id(&self) -> &str {
            "broken"
        }
        async fn start(&self) -> Result<Box<dyn Process>, RunnerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(RunnerError::Spawn {
                id: "broken".into(),
                reason: "no such file".into(),
            })
        }
    }

    #[tokio::test]
    async fn second_launch_is_refused_while_live() {
        let mut r = Restarter::new("svc", idle_runner(), RestartPolicy::Forever, &cfg(None));
        r.launch().await.unwrap();
        let err = r.launch().await.unwrap_err();
        assert_eq!(err.as_label(), "runner_already_running");

        let exit = r.stop(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(exit, Exit::Code(0));
        assert!(!r.is_live());
        assert!(r.launch().await.is_ok());
    }

    #[tokio::test]
    async fn rapid_exits_back_off_and_long_runs_reset() {
        let mut r = Restarter::new("svc", idle_runner(), RestartPolicy::Forever, &cfg(None));
        let crash = Exit::Code(1);
        let short = Duration::from_millis(10);

        let delays: Vec<_> = (0..5).map(|_| r.on_exit(&crash, short)).collect();
        assert_eq!(
            delays,
            [1, 2, 4, 8, 8]
                .map(|s| Decision::Relaunch {
                    delay: Duration::from_secs(s)
                })
                .to_vec()
        );

        assert_eq!(
            r.on_exit(&Exit::Code(0), Duration::from_secs(60)),
            Decision::Relaunch {
                delay: Duration::ZERO
            }
        );
        assert_eq!(
            r.on_exit(&crash, short),
            Decision::Relaunch {
                delay: Duration::from_secs(1)
            }
        );
    }

    #[tokio::test]
    async fn policies_decide_stop() {
        let mut once = Restarter::new("svc", idle_runner(), RestartPolicy::Once, &cfg(None));
        assert_eq!(
            once.on_exit(&Exit::Code(0), Duration::ZERO),
            Decision::Stop { success: true }
        );
        assert_eq!(
            once.on_exit(&Exit::Signal(9), Duration::ZERO),
            Decision::Stop { success: false }
        );

        let mut until = Restarter::new("svc", idle_runner(), RestartPolicy::UntilSuccess, &cfg(None));
        assert!(matches!(
            until.on_exit(&Exit::Code(3), Duration::ZERO),
            Decision::Relaunch { .. }
        ));
        assert_eq!(
            until.on_exit(&Exit::Code(0), Duration::ZERO),
            Decision::Stop { success: true }
        );
    }

    #[tokio::test]
    async fn launch_failures_retry_until_the_limit() {
        let broken = Arc::new(Broken(AtomicU32::new(0)));
        let mut r = Restarter::new("broken", broken.clone(), RestartPolicy::Forever, &cfg(Some(3)));

        assert!(r.launch().await.is_err());
        assert_eq!(
            r.on_launch_failure(),
            LaunchDecision::Retry {
                delay: Duration::from_secs(1)
            }
        );
        assert!(r.launch().await.is_err());
        assert_eq!(
            r.on_launch_failure(),
            LaunchDecision::Retry {
                delay: Duration::from_secs(2)
            }
        );
        assert!(r.launch().await.is_err());
        assert_eq!(r.on_launch_failure(), LaunchDecision::GiveUp);
        assert_eq!(broken.0.load(Ordering::SeqCst), 3);
        assert!(!r.is_live());
    }

    #[test]
    fn once_never_retries_a_launch() {
        let mut r = Restarter::new("svc", idle_runner(), RestartPolicy::Once, &cfg(None));
        assert_eq!(r.on_launch_failure(), LaunchDecision::GiveUp);
    }
}
