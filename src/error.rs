//! Error types used by the nodevisor runtime, its services and backends.
//!
//! The taxonomy follows the supervisor boundaries:
//!
//! - [`RegistrationError`] synchronous, returned from [`Supervisor::register`](crate::Supervisor::register).
//! - [`ServiceError`] per-service failures, captured by the service machine and
//!   attached to [`Event`](crate::Event)s; they never escape the owning task.
//! - [`RunnerError`] raised by execution backends ([`Runner`](crate::Runner), [`Process`](crate::Process)).
//! - [`ConditionError`] outcome of a condition wait that was not satisfied.
//! - [`ShutdownError`] and [`ControlError`] returned to callers of the control API.
//!
//! All enums provide `as_label()` (stable snake_case) for logs.

use std::time::Duration;
use thiserror::Error;

/// Boxed error returned by user-supplied hooks, probes and function runners.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Errors produced while registering a service.
///
/// Registration is atomic: when any of these is returned the registry is left
/// exactly as it was before the call.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// A service with the same identifier is already registered.
    #[error("service {id:?} is already registered")]
    Duplicate {
        /// The duplicated identifier.
        id: String,
    },

    /// Adding the service would close a dependency cycle.
    #[error("dependency cycle detected: {}", chain.join(" -> "))]
    Cycle {
        /// Offending identifier chain; first and last element are the same service.
        chain: Vec<String>,
    },

    /// Service identifier is empty.
    #[error("service identifier must not be empty")]
    EmptyId,

    /// The supervisor is shutting down and accepts no new services.
    #[error("supervisor is shutting down")]
    Closed,
}

impl RegistrationError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use nodevisor::RegistrationError;
    ///
    /// let err = RegistrationError::Duplicate { id: "cri".into() };
    /// assert_eq!(err.as_label(), "registration_duplicate");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RegistrationError::Duplicate { .. } => "registration_duplicate",
            RegistrationError::Cycle { .. } => "registration_cycle",
            RegistrationError::EmptyId => "registration_empty_id",
            RegistrationError::Closed => "registration_closed",
        }
    }
}

/// # Errors produced while driving one service.
///
/// Carried as text on the emitted event; none of these crash the supervisor.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Preparation hook failed; the service is failed for this run.
    #[error("preparation failed: {reason}")]
    Preparation {
        /// The underlying error message.
        reason: String,
    },

    /// A condition leaf failed (as opposed to waiting indefinitely).
    #[error("condition failed: {reason}")]
    Condition {
        /// The underlying error message.
        reason: String,
    },

    /// Runner could not be created or failed to launch the process.
    #[error("launch failed: {reason}")]
    Launch {
        /// The underlying error message.
        reason: String,
    },

    /// The process exited and the restart policy decided not to relaunch.
    #[error("process exited: {exit}")]
    Exited {
        /// Human-readable exit description.
        exit: String,
    },

    /// A health probe failed or timed out.
    #[error("health probe failed: {reason}")]
    HealthProbe {
        /// The underlying error message.
        reason: String,
    },

    /// Stopping the process returned an error.
    #[error("stop failed: {reason}")]
    Stop {
        /// The underlying error message.
        reason: String,
    },
}

impl ServiceError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ServiceError::Preparation { .. } => "service_preparation",
            ServiceError::Condition { .. } => "service_condition",
            ServiceError::Launch { .. } => "service_launch",
            ServiceError::Exited { .. } => "service_exited",
            ServiceError::HealthProbe { .. } => "service_health_probe",
            ServiceError::Stop { .. } => "service_stop",
        }
    }
}

/// # Errors produced by execution backends.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RunnerError {
    /// The process could not be spawned.
    #[error("failed to spawn {id:?}: {reason}")]
    Spawn {
        /// Service identifier.
        id: String,
        /// The underlying error message.
        reason: String,
    },

    /// The launch parameters require capabilities this backend does not have.
    #[error("backend cannot launch {id:?}: {reason}")]
    Unsupported {
        /// Service identifier.
        id: String,
        /// What is missing.
        reason: String,
    },

    /// A second instance was requested while one is still live.
    #[error("an instance of {id:?} is already running")]
    AlreadyRunning {
        /// Service identifier.
        id: String,
    },

    /// Stopping the process failed.
    #[error("failed to stop {id:?}: {reason}")]
    Stop {
        /// Service identifier.
        id: String,
        /// The underlying error message.
        reason: String,
    },
}

impl RunnerError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RunnerError::Spawn { .. } => "runner_spawn",
            RunnerError::Unsupported { .. } => "runner_unsupported",
            RunnerError::AlreadyRunning { .. } => "runner_already_running",
            RunnerError::Stop { .. } => "runner_stop",
        }
    }
}

/// # Outcome of a condition wait that did not end in satisfaction.
///
/// `Ok(())` from [`Condition::wait`](crate::Condition::wait) means satisfied;
/// `Cancelled` is reported when the caller's token fires first.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConditionError {
    /// The wait was cancelled before the condition was satisfied.
    #[error("condition wait cancelled")]
    Cancelled,

    /// The condition can no longer be evaluated.
    #[error("{condition}: {reason}")]
    Failed {
        /// Description of the failing condition.
        condition: String,
        /// The underlying error message.
        reason: String,
    },
}

impl ConditionError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConditionError::Cancelled => "condition_cancelled",
            ConditionError::Failed { .. } => "condition_failed",
        }
    }

    /// Returns `true` for [`ConditionError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ConditionError::Cancelled)
    }
}

/// # Errors produced by supervisor shutdown.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    /// Some services did not reach a terminal state within their stop window and were
    /// forcibly terminated.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}; forcing termination")]
    Timeout {
        /// The per-service stop window.
        grace: Duration,
        /// Services that did not stop in time.
        stuck: Vec<String>,
    },
}

impl ShutdownError {
    /// Returns a short stable label (snake_case) for use in logs.
    ///
    /// # Example
    /// ```
    /// use nodevisor::ShutdownError;
    /// use std::time::Duration;
    ///
    /// let err = ShutdownError::Timeout { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "shutdown_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ShutdownError::Timeout { .. } => "shutdown_timeout",
        }
    }
}

/// # Errors returned by operator control calls (stop / restart a single service).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControlError {
    /// No service with this identifier is registered.
    #[error("unknown service {id:?}")]
    UnknownService {
        /// The requested identifier.
        id: String,
    },

    /// The service did not stop within the grace period and was terminated.
    #[error("service {id:?} did not stop within {grace:?}")]
    StopTimeout {
        /// Service identifier.
        id: String,
        /// The grace period that elapsed.
        grace: Duration,
    },

    /// The supervisor is shutting down.
    #[error("supervisor is shutting down")]
    Closed,
}

impl ControlError {
    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            ControlError::UnknownService { .. } => "control_unknown_service",
            ControlError::StopTimeout { .. } => "control_stop_timeout",
            ControlError::Closed => "control_closed",
        }
    }
}
