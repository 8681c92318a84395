//! # Restart policies for supervised processes.
//!
//! [`RestartPolicy`] decides whether a process is relaunched after it exits.
//!
//! ```text
//! exit ──► RestartPolicy::Forever      → relaunch (any exit code)
//!      ├─► RestartPolicy::Once         → never relaunch; terminal after the first exit
//!      └─► RestartPolicy::UntilSuccess → relaunch on non-zero/error exit, stop on clean exit
//! ```
//!
//! The decision about *when* to relaunch (rapid-exit backoff, launch-failure
//! tolerance) lives in the restart engine, not here.

use crate::runner::Exit;

/// Policy controlling whether a process is relaunched after it exits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Always relaunch, regardless of exit code (default for long-lived services).
    Forever,
    /// Run once; the first exit is terminal.
    Once,
    /// Relaunch only after a failed exit; a clean exit is terminal.
    UntilSuccess,
}

impl Default for RestartPolicy {
    /// Returns [`RestartPolicy::Forever`].
    fn default() -> Self {
        RestartPolicy::Forever
    }
}

impl RestartPolicy {
    /// Returns `true` if a process that ended with `exit` should be relaunched.
    pub fn should_restart(self, exit: &Exit) -> bool {
        match self {
            RestartPolicy::Forever => true,
            RestartPolicy::Once => false,
            RestartPolicy::UntilSuccess => !exit.is_success(),
        }
    }

    /// Returns `true` if a failed launch may be retried under this policy.
    pub fn retries_launch(self) -> bool {
        !matches!(self, RestartPolicy::Once)
    }

    /// Returns a stable lower-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            RestartPolicy::Forever => "forever",
            RestartPolicy::Once => "once",
            RestartPolicy::UntilSuccess => "until_success",
        }
    }
}
