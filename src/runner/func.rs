//! # Function-backed runner (`FnRunner`)
//!
//! [`FnRunner`] wraps a closure `F: Fn(CancellationToken) -> Fut` and runs a fresh
//! future as a tokio task per launch. It backs services embedded in the agent
//! itself and the fakes used in tests.
//!
//! - `Ok(())` maps to [`Exit::Code(0)`](Exit::Code), `Err(e)` to [`Exit::Error`].
//! - `stop(grace)` cancels the token, waits up to `grace`, then aborts the task.
//!
//! ## Example
//! ```rust
//! use nodevisor::{BoxError, FnRunner, RunnerRef};
//! use tokio_util::sync::CancellationToken;
//!
//! let r: RunnerRef = FnRunner::arc("apid", |ctx: CancellationToken| async move {
//!     ctx.cancelled().await;
//!     Ok::<_, BoxError>(())
//! });
//! assert_eq!(r.id(), "apid");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use super::{Exit, Process, Runner};
use crate::error::{BoxError, RunnerError};

/// Closure-backed runner.
#[derive(Debug)]
pub struct FnRunner<F> {
    id: Cow<'static, str>,
    f: F,
}

impl<F> FnRunner<F> {
    pub fn new(id: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self { id: id.into(), f }
    }

    /// Creates the runner and returns it as a shared handle.
    pub fn arc(id: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(id, f))
    }
}

#[async_trait]
impl<F, Fut> Runner for FnRunner<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    fn id(&self) -> &str {
        &self.id
    }

    async fn start(&self) -> Result<Box<dyn Process>, RunnerError> {
        let token = CancellationToken::new();
        let handle = tokio::spawn((self.f)(token.clone()));
        Ok(Box::new(TaskProcess {
            token,
            handle,
            exit: None,
        }))
    }
}

struct TaskProcess {
    token: CancellationToken,
    handle: JoinHandle<Result<(), BoxError>>,
    exit: Option<Exit>,
}

fn to_exit(res: Result<Result<(), BoxError>, JoinError>) -> Exit {
    match res {
        Ok(Ok(())) => Exit::Code(0),
        Ok(Err(e)) => Exit::Error(e.to_string()),
        Err(e) if e.is_panic() => Exit::Error("task panicked".into()),
        Err(_) => Exit::Error("task aborted".into()),
    }
}

#[async_trait]
impl Process for TaskProcess {
    async fn wait(&mut self) -> Exit {
        if let Some(exit) = &self.exit {
            return exit.clone();
        }
        let exit = to_exit((&mut self.handle).await);
        self.exit = Some(exit.clone());
        exit
    }

    async fn stop(&mut self, grace: Duration) -> Result<Exit, RunnerError> {
        self.token.cancel();
        if let Ok(exit) = tokio::time::timeout(grace, self.wait()).await {
            return Ok(exit);
        }
        self.handle.abort();
        Ok(self.wait().await)
    }
}

impl Drop for TaskProcess {
    fn drop(&mut self) {
        self.token.cancel();
        self.handle.abort();
    }
}
