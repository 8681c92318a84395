//! Readiness conditions.
//!
//! ## Contents
//! - [`Condition`], [`ConditionRef`] the blocking predicate contract
//! - [`WaitForAll`], [`WaitForAny`] composition (plus [`wait_for_all`] / [`wait_for_any`] helpers)
//! - [`NodeState`], [`Fact`], [`FactCondition`] leaves over published node facts
//! - [`FileExists`] leaf polling the filesystem
//! - [`ServiceCondition`], [`ServiceFilter`] leaves over other services' states
//!
//! ## Latency
//! - fact and service leaves: woken by the publishing write (watch channels)
//! - [`FileExists`]: one poll interval, [`FILE_POLL_INTERVAL`] by default
//! - cancellation: observed at the next scheduler turn by every leaf

mod condition;
mod file;
mod node;
mod service;

pub use condition::{Condition, ConditionRef, WaitForAll, WaitForAny, wait_for_all, wait_for_any};
pub use file::{FILE_POLL_INTERVAL, FileExists};
pub use node::{Fact, FactCondition, NodeState};
pub use service::{ServiceCondition, ServiceFilter};
