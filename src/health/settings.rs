use std::time::Duration;

/// Health-check timing and threshold.
///
/// Supervisor-wide defaults live in [`SupervisorConfig::health`](crate::SupervisorConfig);
/// a service overrides them through [`Service::health_settings`](crate::Service::health_settings).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HealthSettings {
    /// Delay between the process becoming live and the first probe.
    pub initial_delay: Duration,
    /// Period between probe starts.
    pub interval: Duration,
    /// Upper bound on a single probe; exceeding it counts as a failure.
    pub timeout: Duration,
    /// Consecutive failures required to become unhealthy (clamped to at least 1).
    pub failure_threshold: u32,
}

impl Default for HealthSettings {
    /// `initial_delay = 1s`, `interval = 1s`, `timeout = 500ms`, `failure_threshold = 1`.
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            interval: Duration::from_secs(1),
            timeout: Duration::from_millis(500),
            failure_threshold: 1,
        }
    }
}

impl HealthSettings {
    #[inline]
    pub fn with_initial_delay(mut self, d: Duration) -> Self {
        self.initial_delay = d;
        self
    }

    #[inline]
    pub fn with_interval(mut self, d: Duration) -> Self {
        self.interval = d;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = d;
        self
    }

    #[inline]
    pub fn with_failure_threshold(mut self, n: u32) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Interval with a 1ms floor so a zero interval cannot spin.
    pub(crate) fn effective_interval(&self) -> Duration {
        self.interval.max(Duration::from_millis(1))
    }

    pub(crate) fn effective_threshold(&self) -> u32 {
        self.failure_threshold.max(1)
    }
}
