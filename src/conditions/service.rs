//! # Conditions over other services' states.
//!
//! [`ServiceCondition`] is satisfied once every named service is registered and
//! matches a [`ServiceFilter`]. Callers obtain one from
//! [`Supervisor::condition`](crate::Supervisor::condition); it is the building
//! block for "wait until the container runtime is healthy" style gates outside
//! the dependency graph.
//!
//! The condition re-checks the registry after every registry change, so
//! satisfaction is observed as soon as the triggering transition is published.

use std::fmt;
use std::sync::Weak;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::condition::Condition;
use crate::core::Registry;
use crate::error::ConditionError;
use crate::events::ServiceState;

/// Which states count as a match.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServiceFilter {
    /// `Running`, `Healthy` or `Unhealthy`.
    Up,
    /// `Healthy` only.
    Healthy,
    /// `Finished` only.
    Finished,
}

impl ServiceFilter {
    pub fn matches(self, state: ServiceState) -> bool {
        match self {
            ServiceFilter::Up => state.is_up(),
            ServiceFilter::Healthy => state == ServiceState::Healthy,
            ServiceFilter::Finished => state == ServiceState::Finished,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ServiceFilter::Up => "up",
            ServiceFilter::Healthy => "healthy",
            ServiceFilter::Finished => "finished",
        }
    }
}

/// Leaf condition over the supervisor's registry.
pub struct ServiceCondition {
    ids: Vec<String>,
    filter: ServiceFilter,
    registry: Weak<Registry>,
    changes: watch::Receiver<u64>,
}

impl ServiceCondition {
    pub(crate) fn new(
        ids: Vec<String>,
        filter: ServiceFilter,
        registry: Weak<Registry>,
        changes: watch::Receiver<u64>,
    ) -> Self {
        Self {
            ids,
            filter,
            registry,
            changes,
        }
    }

    fn gone(&self) -> ConditionError {
        ConditionError::Failed {
            condition: self.to_string(),
            reason: "supervisor is gone".into(),
        }
    }
}

#[async_trait]
impl Condition for ServiceCondition {
    async fn wait(&self, ctx: CancellationToken) -> Result<(), ConditionError> {
        let mut changes = self.changes.clone();
        loop {
            // Mark the current version seen before checking; a change racing the
            // check then wakes `changed()` below.
            changes.borrow_and_update();
            let Some(registry) = self.registry.upgrade() else {
                return Err(self.gone());
            };
            if registry.all_match(&self.ids, self.filter) {
                return Ok(());
            }
            drop(registry);

            tokio::select! {
                biased;
                _ = ctx.cancelled() => return Err(ConditionError::Cancelled),
                res = changes.changed() => {
                    if res.is_err() {
                        return Err(self.gone());
                    }
                }
            }
        }
    }
}

impl fmt::Display for ServiceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "service(s) [{}] to be {}",
            self.ids.join(", "),
            self.filter.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::error::BoxError;
    use crate::events::Bus;
    use crate::runner::FnRunner;
    use crate::services::ServiceFn;

    fn registry_with(ids: &[&'static str]) -> Arc<Registry> {
        let reg = Registry::new(Bus::new(16), 8);
        for id in ids {
            let svc = ServiceFn::builder(*id)
                .with_runner(FnRunner::arc(*id, |_ctx: CancellationToken| async {
                    Ok::<_, BoxError>(())
                }))
                .build();
            reg.register(svc).unwrap();
        }
        reg
    }

    fn condition(reg: &Arc<Registry>, ids: &[&str], filter: ServiceFilter) -> ServiceCondition {
        ServiceCondition::new(
            ids.iter().map(|s| s.to_string()).collect(),
            filter,
            Arc::downgrade(reg),
            reg.changes(),
        )
    }

    #[test]
    fn filters() {
        assert!(ServiceFilter::Up.matches(ServiceState::Unhealthy));
        assert!(!ServiceFilter::Up.matches(ServiceState::Stopping));
        assert!(ServiceFilter::Healthy.matches(ServiceState::Healthy));
        assert!(!ServiceFilter::Finished.matches(ServiceState::Failed));
    }

    #[tokio::test]
    async fn satisfied_after_every_service_matches() {
        let reg = registry_with(&["cri", "etcd"]);
        let cond = condition(&reg, &["cri", "etcd"], ServiceFilter::Healthy);
        assert_eq!(cond.to_string(), "service(s) [cri, etcd] to be healthy");

        let waiter = tokio::spawn(async move { cond.wait(CancellationToken::new()).await });

        reg.transition("cri", ServiceState::Healthy, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        reg.transition("etcd", ServiceState::Healthy, None);
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn unknown_service_waits_until_cancelled() {
        let reg = registry_with(&[]);
        let cond = condition(&reg, &["ghost"], ServiceFilter::Up);
        let token = CancellationToken::new();

        let waiter = tokio::spawn({
            let token = token.clone();
            async move { cond.wait(token).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        assert_eq!(waiter.await.unwrap(), Err(ConditionError::Cancelled));
    }

    #[tokio::test]
    async fn dropped_registry_fails_the_wait() {
        let reg = registry_with(&["cri"]);
        let cond = condition(&reg, &["cri"], ServiceFilter::Up);
        drop(reg);

        let err = cond.wait(CancellationToken::new()).await.unwrap_err();
        assert_eq!(err.as_label(), "condition_failed");
    }
}
