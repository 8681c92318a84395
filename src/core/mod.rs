//! Runtime core: scheduling, per-service control loops and shutdown.
//!
//! The public API from this module is [`Supervisor`] (built via
//! [`SupervisorBuilder`]), its [`SupervisorConfig`] and the [`ServiceSnapshot`]
//! inspection type.
//!
//! Internal modules:
//! - [`graph`]: dependency graph, cycle detection, topological order;
//! - [`registry`]: records, incremental dependency release, event emission;
//! - [`machine`]: one service's lifecycle loop;
//! - [`restart`]: single-instance launcher with relaunch and backoff decisions;
//! - [`shutdown`]: OS termination signals;
//! - [`supervisor`]: registration, start, control and ordered shutdown.

mod builder;
mod config;
mod graph;
mod machine;
mod registry;
mod restart;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use config::SupervisorConfig;
pub use registry::ServiceSnapshot;
pub use supervisor::Supervisor;

pub(crate) use registry::Registry;
