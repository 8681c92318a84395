//! # Readiness conditions and their composition.
//!
//! A [`Condition`] is a predicate over externally observed facts that a caller
//! can block on until it holds or until the caller's token is cancelled.
//!
//! ```text
//! WaitForAll[ address-ready, time-synced ]  ── Ok once both leaves return Ok
//! WaitForAny[ file /a, file /b ]            ── Ok once either leaf returns Ok
//!
//! parent token ──► child token ──► every leaf
//!                     └─ cancelled when the composite returns (drop guard)
//! ```
//!
//! ## Rules
//! - `Ok(())` means satisfied. [`ConditionError::Cancelled`] means the caller gave
//!   up first. [`ConditionError::Failed`] means the fact can no longer be observed.
//! - Waiting never parks a thread: leaves await channels or cancellable sleeps.
//! - A composite cancels the leaves it no longer needs as soon as it returns.
//! - `WaitForAll` fails as soon as any leaf fails; `WaitForAny` fails only once
//!   every leaf has failed.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{select_ok, try_join_all};
use tokio_util::sync::CancellationToken;

use crate::error::ConditionError;

/// Blocking readiness predicate.
///
/// `Display` should describe what the condition waits for; it is used in logs
/// and in [`ConditionError::Failed`].
#[async_trait]
pub trait Condition: fmt::Display + Send + Sync + 'static {
    /// Waits until the condition holds or `ctx` is cancelled.
    async fn wait(&self, ctx: CancellationToken) -> Result<(), ConditionError>;
}

/// Shared handle to a condition.
pub type ConditionRef = Arc<dyn Condition>;

/// Satisfied when every child is satisfied. An empty set is satisfied immediately.
pub struct WaitForAll {
    conditions: Vec<ConditionRef>,
}

impl WaitForAll {
    pub fn new(conditions: impl IntoIterator<Item = ConditionRef>) -> Self {
        Self {
            conditions: conditions.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Condition for WaitForAll {
    async fn wait(&self, ctx: CancellationToken) -> Result<(), ConditionError> {
        if ctx.is_cancelled() {
            return Err(ConditionError::Cancelled);
        }
        let child = ctx.child_token();
        let _guard = child.clone().drop_guard();

        let waits = self.conditions.iter().map(|c| c.wait(child.clone()));
        match try_join_all(waits).await {
            Ok(_) => Ok(()),
            Err(_) if ctx.is_cancelled() => Err(ConditionError::Cancelled),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for WaitForAll {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_list(f, "all of", &self.conditions)
    }
}

/// Satisfied when the first child is satisfied. An empty set never is.
pub struct WaitForAny {
    conditions: Vec<ConditionRef>,
}

impl WaitForAny {
    pub fn new(conditions: impl IntoIterator<Item = ConditionRef>) -> Self {
        Self {
            conditions: conditions.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Condition for WaitForAny {
    async fn wait(&self, ctx: CancellationToken) -> Result<(), ConditionError> {
        if ctx.is_cancelled() {
            return Err(ConditionError::Cancelled);
        }
        if self.conditions.is_empty() {
            ctx.cancelled().await;
            return Err(ConditionError::Cancelled);
        }
        let child = ctx.child_token();
        let _guard = child.clone().drop_guard();

        let waits = self.conditions.iter().map(|c| c.wait(child.clone()));
        match select_ok(waits).await {
            Ok(_) => Ok(()),
            Err(_) if ctx.is_cancelled() => Err(ConditionError::Cancelled),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Display for WaitForAny {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_list(f, "any of", &self.conditions)
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, head: &str, items: &[ConditionRef]) -> fmt::Result {
    write!(f, "{head} [")?;
    for (i, c) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{c}")?;
    }
    f.write_str("]")
}

/// Shorthand for `Arc::new(WaitForAll::new(conditions))`.
pub fn wait_for_all(conditions: impl IntoIterator<Item = ConditionRef>) -> ConditionRef {
    Arc::new(WaitForAll::new(conditions))
}

/// Shorthand for `Arc::new(WaitForAny::new(conditions))`.
pub fn wait_for_any(conditions: impl IntoIterator<Item = ConditionRef>) -> ConditionRef {
    Arc::new(WaitForAny::new(conditions))
}
