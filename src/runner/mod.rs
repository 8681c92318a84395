//! # Execution backends.
//!
//! A [`Runner`] knows how to launch one service's process (or container); each
//! launch yields a [`Process`] handle through which the supervisor observes exit
//! and requests termination.
//!
//! ```text
//! Service::runner() ──► RunnerRef ──start()──► Box<dyn Process>
//!                                                ├─ wait()        → Exit (cancel-safe, cached)
//!                                                └─ stop(grace)   → SIGTERM, grace, SIGKILL
//! ```
//!
//! ## Backends
//! - [`ProcessRunner`] host processes from a [`LaunchSpec`], each in its own process group.
//! - [`FnRunner`] an async closure run as a tokio task (embedded services, tests).
//!
//! Container backends are external collaborators implementing [`Runner`].

mod exit;
mod func;
mod process;
mod spec;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::RunnerError;

pub use exit::Exit;
pub use func::FnRunner;
pub use process::ProcessRunner;
pub use spec::{LaunchSpec, Mount, Namespaces};

/// Launches instances of one service.
#[async_trait]
pub trait Runner: Send + Sync + 'static {
    /// Identifier of the service this runner launches.
    fn id(&self) -> &str;

    /// Launches a new instance. Returns once the instance is live.
    async fn start(&self) -> Result<Box<dyn Process>, RunnerError>;
}

/// Shared handle to a runner.
pub type RunnerRef = Arc<dyn Runner>;

/// Handle to one live (or exited) instance.
#[async_trait]
pub trait Process: Send + 'static {
    /// OS process id, if the backend has one.
    fn pid(&self) -> Option<u32> {
        None
    }

    /// Waits for the instance to exit.
    ///
    /// Must be cancel-safe; once the exit is known it is returned again on every call.
    async fn wait(&mut self) -> Exit;

    /// Asks the instance to terminate, forcing it after `grace`.
    ///
    /// Returns the exit the instance ended with. Stopping an instance that
    /// already exited returns its exit.
    async fn stop(&mut self, grace: Duration) -> Result<Exit, RunnerError>;
}
