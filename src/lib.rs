//! # nodevisor
//!
//! **Nodevisor** is the node-local service supervisor of an operating-system
//! agent. It brings up the privileged system services of a cluster node
//! (container runtime, kubelet, time sync, network setup) in dependency order,
//! gates each one on readiness conditions over observed node state, probes it
//! for health and relaunches it according to its restart policy.
//!
//! ## Architecture
//! ```text
//!  Service   Service   Service                 NodeState (facts published
//!  (cri)     (kubelet) (timed)                 by network / time / hostname
//!     │         │         │                    controllers)
//!     ▼         ▼         ▼                          │
//! ┌──────────────────────────────────────────────┐   │
//! │ Supervisor                                   │   │
//! │  - Registry (graph, records, dependency      │   │
//! │    release under one lock)                   │   │
//! │  - Bus (broadcast)                           │   │
//! │  - SubscriberSet (per-subscriber queues)     │   │
//! └───┬──────────────┬──────────────┬────────────┘   │
//!     ▼              ▼              ▼                │
//!  ServiceMachine ServiceMachine ServiceMachine ◄────┘ (conditions)
//!   │ gate → pre → condition → runner
//!   │ Restarter: launch / wait / relaunch with backoff
//!   │ HealthChecker: probe loop per instance
//!   ▼
//!  Registry::transition ──► Bus ──┬──► subscriber_listener ──► SubscriberSet ──► subscribers
//!                                 └──► Supervisor::subscribe()
//! ```
//!
//! ### Lifecycle
//! ```text
//! Waiting ─► Preparing ─► Starting ─► Running ─► {Healthy, Unhealthy} ─► Stopping ─► {Finished, Failed}
//!                            ▲                          │
//!                            └──── relaunch on exit ────┘
//! ```
//!
//! ## Features
//! | Area              | Description                                             | Key types / traits                              |
//! |-------------------|---------------------------------------------------------|-------------------------------------------------|
//! | **Services**      | Plug-in contract and a closure-backed builder.          | [`Service`], [`ServiceFn`]                      |
//! | **Scheduling**    | Dependency graph, ordered start and shutdown.           | [`Supervisor`]                                  |
//! | **Conditions**    | Composable readiness gates with cancellation.           | [`Condition`], [`WaitForAll`], [`WaitForAny`]   |
//! | **Health**        | Periodic probes with timeout and failure threshold.     | [`Probe`], [`HealthSettings`]                   |
//! | **Runners**       | Host processes and in-process tasks.                    | [`Runner`], [`ProcessRunner`], [`FnRunner`]     |
//! | **Policies**      | Restart policy and rapid-exit backoff.                  | [`RestartPolicy`], [`BackoffPolicy`]            |
//! | **Events**        | Ordered transitions, fan-out to subscribers.            | [`Event`], [`Subscribe`]                        |
//! | **Arguments**     | Flag maps with reserved-key validation.                 | [`Args`], [`merge_args`]                        |
//!
//! ## Optional features
//! - `logging`: exports [`LogWriter`], rendering events as `tracing` records.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::{
//!     BoxError, Condition, Fact, FnRunner, NodeState, ServiceFilter, ServiceFn, Supervisor,
//!     SupervisorConfig,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let node = NodeState::new();
//!     let sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_node_state(node.clone())
//!         .build();
//!
//!     sup.register(
//!         ServiceFn::builder("timed")
//!             .with_condition(|node: &NodeState| Some(node.condition([Fact::AddressReady])))
//!             .with_runner(FnRunner::arc("timed", |ctx: CancellationToken| async move {
//!                 ctx.cancelled().await;
//!                 Ok::<_, BoxError>(())
//!             }))
//!             .build(),
//!     )?;
//!     sup.start();
//!
//!     node.set(Fact::AddressReady);
//!     let up = sup.condition(["timed"], ServiceFilter::Healthy);
//!     tokio::time::timeout(Duration::from_secs(5), up.wait(CancellationToken::new())).await??;
//!
//!     sup.shutdown().await?;
//!     Ok(())
//! }
//! ```

mod args;
mod conditions;
mod core;
mod error;
mod events;
mod health;
mod policies;
mod runner;
mod services;
mod subscribers;

// ---- Public re-exports ----

pub use args::{Args, DenylistError, merge_args};
pub use conditions::{
    Condition, ConditionRef, FILE_POLL_INTERVAL, Fact, FactCondition, FileExists, NodeState,
    ServiceCondition, ServiceFilter, WaitForAll, WaitForAny, wait_for_all, wait_for_any,
};
pub use self::core::{ServiceSnapshot, Supervisor, SupervisorBuilder, SupervisorConfig};
pub use error::{
    BoxError, ConditionError, ControlError, RegistrationError, RunnerError, ServiceError,
    ShutdownError,
};
pub use events::{Bus, Event, ServiceState};
pub use health::{
    HealthChecker, HealthReport, HealthSettings, HealthState, HealthStatus, Probe, ProbeFn,
    ProbeRef,
};
pub use policies::{BackoffPolicy, JitterPolicy, RestartPolicy};
pub use runner::{
    Exit, FnRunner, LaunchSpec, Mount, Namespaces, Process, ProcessRunner, Runner, RunnerRef,
};
pub use services::{Service, ServiceBuilder, ServiceFn, ServiceRef};
pub use subscribers::{StateTracker, Subscribe, SubscriberSet};

// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
