//! # Closure-backed services (`ServiceFn`)
//!
//! [`ServiceFn`] assembles a [`Service`] from closures, for services that do not
//! warrant their own type and for tests.
//!
//! ## Example
//! ```rust
//! use nodevisor::{BoxError, Fact, FnRunner, NodeState, RestartPolicy, ServiceFn, ServiceRef};
//! use tokio_util::sync::CancellationToken;
//!
//! let kubelet: ServiceRef = ServiceFn::builder("kubelet")
//!     .with_deps(["cri"])
//!     .with_condition(|node: &NodeState| Some(node.condition([Fact::NodenameReady])))
//!     .with_pre(|_ctx: CancellationToken| async { Ok::<_, BoxError>(()) })
//!     .with_runner(FnRunner::arc("kubelet", |ctx: CancellationToken| async move {
//!         ctx.cancelled().await;
//!         Ok::<_, BoxError>(())
//!     }))
//!     .with_restart(RestartPolicy::Forever)
//!     .build();
//!
//! assert_eq!(kubelet.id(), "kubelet");
//! assert_eq!(kubelet.depends_on(), vec!["cri".to_string()]);
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use super::service::{Service, ServiceRef};
use crate::conditions::{ConditionRef, NodeState};
use crate::error::BoxError;
use crate::events::ServiceState;
use crate::health::{HealthSettings, ProbeRef};
use crate::policies::RestartPolicy;
use crate::runner::RunnerRef;

type ConditionFn = Arc<dyn Fn(&NodeState) -> Option<ConditionRef> + Send + Sync>;
type PreFn = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type PostFn = Arc<dyn Fn(ServiceState) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type RunnerFactory = Arc<dyn Fn() -> Result<RunnerRef, BoxError> + Send + Sync>;

/// Service assembled from closures. Build with [`ServiceFn::builder`].
#[derive(Clone)]
pub struct ServiceFn {
    id: String,
    deps: Vec<String>,
    condition: Option<ConditionFn>,
    pre: Option<PreFn>,
    post: Option<PostFn>,
    runner: Option<RunnerFactory>,
    restart: RestartPolicy,
    probe: Option<ProbeRef>,
    health: Option<HealthSettings>,
}

impl ServiceFn {
    pub fn builder(id: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder {
            inner: ServiceFn {
                id: id.into(),
                deps: Vec::new(),
                condition: None,
                pre: None,
                post: None,
                runner: None,
                restart: RestartPolicy::default(),
                probe: None,
                health: None,
            },
        }
    }
}

/// Fluent builder for [`ServiceFn`].
#[derive(Clone)]
pub struct ServiceBuilder {
    inner: ServiceFn,
}

impl ServiceBuilder {
    pub fn with_deps<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.deps.extend(deps.into_iter().map(Into::into));
        self
    }

    pub fn with_condition<F>(mut self, f: F) -> Self
    where
        F: Fn(&NodeState) -> Option<ConditionRef> + Send + Sync + 'static,
    {
        self.inner.condition = Some(Arc::new(f));
        self
    }

    pub fn with_pre<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let pre: PreFn = Arc::new(move |ctx: CancellationToken| f(ctx).boxed());
        self.inner.pre = Some(pre);
        self
    }

    pub fn with_post<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(ServiceState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let post: PostFn = Arc::new(move |state: ServiceState| f(state).boxed());
        self.inner.post = Some(post);
        self
    }

    /// Uses the same runner for every start.
    pub fn with_runner(mut self, runner: RunnerRef) -> Self {
        let factory: RunnerFactory =
            Arc::new(move || -> Result<RunnerRef, BoxError> { Ok(runner.clone()) });
        self.inner.runner = Some(factory);
        self
    }

    /// Builds a fresh runner for every start.
    pub fn with_runner_factory<F>(mut self, f: F) -> Self
    where
        F: Fn() -> Result<RunnerRef, BoxError> + Send + Sync + 'static,
    {
        self.inner.runner = Some(Arc::new(f));
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.inner.restart = restart;
        self
    }

    pub fn with_health_probe(mut self, probe: ProbeRef) -> Self {
        self.inner.probe = Some(probe);
        self
    }

    /// Overrides the supervisor-wide health settings entirely.
    pub fn with_health_settings(mut self, settings: HealthSettings) -> Self {
        self.inner.health = Some(settings);
        self
    }

    pub fn build(self) -> ServiceRef {
        Arc::new(self.inner)
    }
}

#[async_trait]
impl Service for ServiceFn {
    fn id(&self) -> &str {
        &self.id
    }

    fn depends_on(&self) -> Vec<String> {
        self.deps.clone()
    }

    fn condition(&self, node: &NodeState) -> Option<ConditionRef> {
        self.condition.as_ref().and_then(|f| f(node))
    }

    async fn pre(&self, ctx: CancellationToken) -> Result<(), BoxError> {
        match &self.pre {
            Some(f) => f(ctx).await,
            None => Ok(()),
        }
    }

    async fn post(&self, state: ServiceState) -> Result<(), BoxError> {
        match &self.post {
            Some(f) => f(state).await,
            None => Ok(()),
        }
    }

    fn runner(&self) -> Result<RunnerRef, BoxError> {
        match &self.runner {
            Some(f) => f(),
            None => Err(format!("service {:?} has no runner", self.id).into()),
        }
    }

    fn restart_policy(&self) -> RestartPolicy {
        self.restart
    }

    fn health_probe(&self) -> Option<ProbeRef> {
        self.probe.clone()
    }

    fn health_settings(&self, defaults: HealthSettings) -> HealthSettings {
        self.health.unwrap_or(defaults)
    }
}
