//! # Backoff policy for relaunch delays.
//!
//! [`BackoffPolicy`] is only consulted when a service is stuck in a loop:
//! consecutive rapid exits (runs shorter than the configured window) or
//! consecutive launch failures. A process that ran for a while is relaunched
//! immediately.
//!
//! The delay for the `n`-th consecutive rapid exit (0-indexed) is
//! `first × factor^n`, clamped to `max`, then jittered. The base is derived from
//! `n` alone, so jitter never feeds back into later delays.
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use nodevisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(250),
//!     max: Duration::from_secs(5),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(250));
//! assert_eq!(backoff.next(2), Duration::from_secs(1));
//! assert_eq!(backoff.next(10), Duration::from_secs(5));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Relaunch backoff policy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first rapid exit.
    pub first: Duration,
    /// Maximum delay cap.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy to spread relaunches of many services.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 100ms`, `factor = 2.0`, `max = 30s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(30),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// A policy that never delays.
    pub fn none() -> Self {
        Self {
            first: Duration::ZERO,
            max: Duration::ZERO,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Computes the delay for the given consecutive-failure number (0-indexed).
    pub fn next(&self, attempt: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = attempt.min(i32::MAX as u32) as i32;
        let unclamped = self.first.as_secs_f64() * self.factor.powi(exp);

        let base = if !unclamped.is_finite() || unclamped < 0.0 || unclamped > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped)
        };

        match self.jitter {
            JitterPolicy::Decorrelated => {
                self.jitter
                    .apply_decorrelated(self.first.min(self.max), base, self.max)
            }
            _ => self.jitter.apply(base),
        }
    }
}
