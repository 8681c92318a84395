//! # Jitter for relaunch delays.
//!
//! A node boots many services at once; when a shared dependency (say, the
//! container runtime socket) disappears, every dependent crash-loops in step.
//! [`JitterPolicy`] randomizes the backoff delay so relaunches spread out.

use rand::Rng;
use std::time::Duration;

/// Randomization applied on top of a backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay / 2` plus uniform in `[0, delay / 2]`.
    Equal,
    /// Uniform in `[first, min(prev * 3, max)]`; see [`JitterPolicy::apply_decorrelated`].
    Decorrelated,
}

impl JitterPolicy {
    /// Applies jitter to `delay`. `Decorrelated` needs more context and returns `delay` unchanged here.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => Duration::from_millis(rand::rng().random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                let extra = if half == 0 {
                    0
                } else {
                    rand::rng().random_range(0..=half)
                };
                Duration::from_millis(half + extra)
            }
        }
    }

    /// Decorrelated jitter around `prev`, bounded below by `first` and above by `max`.
    pub fn apply_decorrelated(&self, first: Duration, prev: Duration, max: Duration) -> Duration {
        if !matches!(self, JitterPolicy::Decorrelated) {
            return self.apply(prev);
        }
        let lo = first.as_millis() as u64;
        let hi = (prev.as_millis() as u64)
            .saturating_mul(3)
            .min(max.as_millis() as u64)
            .max(lo);
        if lo >= hi {
            return first;
        }
        Duration::from_millis(rand::rng().random_range(lo..=hi))
    }
}
