//! # Service lifecycle states and transition events.
//!
//! [`ServiceState`] is the per-service lifecycle:
//! ```text
//! Waiting ─► Preparing ─► Starting ─► Running ─► {Healthy, Unhealthy} ─► Stopping ─► {Finished, Failed}
//!                                        ▲                                  │
//!                                        └──────── relaunch (Starting) ◄────┘
//! ```
//!
//! Every transition is recorded as an immutable [`Event`]
//! `{service, from, to, at, error?}`.
//!
//! ## Ordering guarantees
//! Each event carries a process-wide sequence number (`seq`). Events are created
//! and published under the registry lock, so `seq` reflects emission order: events
//! of one service are totally ordered and `seq` can be used to reconstruct the
//! observed interleaving across services.
//!
//! ## Example
//! ```rust
//! use nodevisor::{Event, ServiceState};
//!
//! let ev = Event::transition("kubelet", ServiceState::Starting, ServiceState::Running)
//!     .with_restarts(2);
//!
//! assert_eq!(ev.service.as_ref(), "kubelet");
//! assert_eq!(ev.to, ServiceState::Running);
//! assert!(ev.error.is_none());
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Lifecycle state of a supervised service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ServiceState {
    /// Registered; blocked until every dependency has been observed running.
    Waiting,
    /// Preparation hook and readiness condition are in progress.
    Preparing,
    /// Runner is being launched (also re-entered on every relaunch).
    Starting,
    /// Process is live; health not yet known.
    Running,
    /// Process is live and its probe passes.
    Healthy,
    /// Process is live but its probe keeps failing.
    Unhealthy,
    /// Process is being stopped and cleaned up.
    Stopping,
    /// Terminal: stopped cleanly.
    Finished,
    /// Terminal: unrecoverable error.
    Failed,
}

impl ServiceState {
    /// Returns a stable upper-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceState::Waiting => "WAITING",
            ServiceState::Preparing => "PREPARING",
            ServiceState::Starting => "STARTING",
            ServiceState::Running => "RUNNING",
            ServiceState::Healthy => "HEALTHY",
            ServiceState::Unhealthy => "UNHEALTHY",
            ServiceState::Stopping => "STOPPING",
            ServiceState::Finished => "FINISHED",
            ServiceState::Failed => "FAILED",
        }
    }

    /// `true` while a process instance is live (`Running` or better).
    pub fn is_up(self) -> bool {
        matches!(
            self,
            ServiceState::Running | ServiceState::Healthy | ServiceState::Unhealthy
        )
    }

    /// `true` for `Finished` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ServiceState::Finished | ServiceState::Failed)
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state transition of one service.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - `restarts`: relaunch counter of the service at emission time
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Service identifier.
    pub service: Arc<str>,
    /// State before the transition.
    pub from: ServiceState,
    /// State after the transition.
    pub to: ServiceState,
    /// Error that caused the transition, if any.
    pub error: Option<Arc<str>>,
    /// Relaunch counter at emission time.
    pub restarts: u32,
}

impl Event {
    /// Creates a transition event with current timestamp and next sequence number.
    pub fn transition(service: impl Into<Arc<str>>, from: ServiceState, to: ServiceState) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            service: service.into(),
            from,
            to,
            error: None,
            restarts: 0,
        }
    }

    /// Attaches an error message.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches the relaunch counter.
    #[inline]
    pub fn with_restarts(mut self, restarts: u32) -> Self {
        self.restarts = restarts;
        self
    }

    /// `true` if this event moved the service into `state`.
    #[inline]
    pub fn entered(&self, state: ServiceState) -> bool {
        self.to == state
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} -> {}", self.service, self.from, self.to)?;
        if let Some(err) = &self.error {
            write!(f, " ({err})")?;
        }
        Ok(())
    }
}
