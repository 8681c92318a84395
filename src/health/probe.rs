//! # Health probes.
//!
//! A [`Probe`] is asked, periodically, whether a live service is serving. The
//! common case is a closure wrapped in [`ProbeFn`]:
//!
//! ```rust
//! use nodevisor::{BoxError, ProbeFn, ProbeRef};
//! use tokio_util::sync::CancellationToken;
//!
//! let probe: ProbeRef = ProbeFn::arc(|_ctx: CancellationToken| async {
//!     // dial the runtime socket...
//!     Ok::<_, BoxError>(())
//! });
//! # let _ = probe;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

/// A single health check.
///
/// The token is cancelled when the service stops or the probe times out;
/// implementations should return promptly once it fires.
#[async_trait]
pub trait Probe: Send + Sync + 'static {
    async fn check(&self, ctx: CancellationToken) -> Result<(), BoxError>;
}

/// Shared handle to a probe.
pub type ProbeRef = Arc<dyn Probe>;

/// Closure-backed probe. Each call creates a fresh future.
pub struct ProbeFn<F> {
    f: F,
}

impl<F> ProbeFn<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Probe for ProbeFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn check(&self, ctx: CancellationToken) -> Result<(), BoxError> {
        (self.f)(ctx).await
    }
}
