//! Relaunch policies.
//!
//! ## Contents
//! - [`RestartPolicy`] whether to relaunch after an exit (forever / once / until-success)
//! - [`BackoffPolicy`] how long to wait when a service exits rapidly in a loop
//! - [`JitterPolicy`]  randomization so crash-looping services do not relaunch in step
//!
//! ## Quick wiring
//! ```text
//! Service::restart_policy() ─┐
//! SupervisorConfig::backoff ─┴─► core::restart::Restarter
//!                                  - policy.should_restart(exit) → relaunch or stop
//!                                  - ran_for < rapid_exit_window → backoff.next(n)
//! ```

mod backoff;
mod jitter;
mod restart;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use restart::RestartPolicy;
