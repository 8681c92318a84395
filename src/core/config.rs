//! # Supervisor configuration.
//!
//! [`SupervisorConfig`] holds the supervisor-wide constants. Loading it from
//! files or flags is the embedding agent's business; this is a plain struct with
//! defaults.
//!
//! ## Sentinel values
//! - `launch_failure_limit = None` → launch failures are retried forever (policy permitting)
//! - `bus_capacity = 0` and `event_history = 0` are clamped to 1

use std::time::Duration;

use crate::health::HealthSettings;
use crate::policies::BackoffPolicy;

/// Supervisor-wide configuration.
///
/// ## Field semantics
/// - `grace`: stop window of each service during shutdown, before it is aborted
/// - `stop_grace`: SIGTERM to SIGKILL window for one process
/// - `bus_capacity`: event ring size; lagging receivers skip older events
/// - `event_history`: recent events kept per service for inspection
/// - `health`: probe timing defaults, overridable per service
/// - `backoff`: delay curve for rapid-exit loops and launch failures
/// - `rapid_exit_window`: a run shorter than this is a rapid exit
/// - `launch_failure_limit`: consecutive launch failures before giving up
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    pub grace: Duration,
    pub stop_grace: Duration,
    pub bus_capacity: usize,
    pub event_history: usize,
    pub health: HealthSettings,
    pub backoff: BackoffPolicy,
    pub rapid_exit_window: Duration,
    pub launch_failure_limit: Option<u32>,
}

impl SupervisorConfig {
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    #[inline]
    pub fn event_history_clamped(&self) -> usize {
        self.event_history.max(1)
    }
}

impl Default for SupervisorConfig {
    /// - `grace = 30s`, `stop_grace = 10s`
    /// - `bus_capacity = 1024`, `event_history = 64`
    /// - `health = HealthSettings::default()` (1s / 1s / 500ms / 1)
    /// - `backoff = BackoffPolicy::default()` (100ms doubling up to 30s)
    /// - `rapid_exit_window = 5s`, `launch_failure_limit = Some(5)`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            stop_grace: Duration::from_secs(10),
            bus_capacity: 1024,
            event_history: 64,
            health: HealthSettings::default(),
            backoff: BackoffPolicy::default(),
            rapid_exit_window: Duration::from_secs(5),
            launch_failure_limit: Some(5),
        }
    }
}
