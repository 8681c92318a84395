//! Health checking of live service instances.
//!
//! ## Contents
//! - [`HealthSettings`] initial delay, interval, timeout, failure threshold
//! - [`Probe`], [`ProbeFn`], [`ProbeRef`] the check itself
//! - [`HealthChecker`] periodic loop reporting [`HealthReport`]s over a channel
//! - [`HealthState`], [`HealthStatus`] pure threshold bookkeeping

mod checker;
mod probe;
mod settings;

pub use checker::{HealthChecker, HealthReport, HealthState, HealthStatus};
pub use probe::{Probe, ProbeFn, ProbeRef};
pub use settings::HealthSettings;
