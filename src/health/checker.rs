//! # Periodic health checking of one process instance.
//!
//! [`HealthChecker`] is spawned by the service machine right after a process
//! instance reaches `Running` and is cancelled when that instance ends. A fresh
//! checker (fresh counters) is attached to every relaunched instance.
//!
//! ```text
//! sleep(initial_delay)
//! loop every interval (missed ticks delayed, never bursted):
//!   timeout(probe.check()) ─► HealthState::record ─► changed? ─► mpsc ─► machine
//! ```
//!
//! ## Rules
//! - A probe that exceeds `timeout` counts as a failure; its future is dropped.
//! - `failure_threshold` consecutive failures flip the status to `Unhealthy`.
//! - A single success resets the counter and flips the status to `Healthy`.
//! - Only changes of `(status, failures)` are reported.
//! - Every sleep and every probe observes the cancellation token.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::probe::ProbeRef;
use super::settings::HealthSettings;

/// Last observed health of a service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum HealthStatus {
    /// No probe result yet for the current instance.
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Unknown => "unknown",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// Change notification produced by the checker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Consecutive failures, zero after a success.
    pub failures: u32,
    /// Error of the last failed probe.
    pub error: Option<String>,
}

/// Pure health bookkeeping for one instance.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HealthState {
    status: HealthStatus,
    failures: u32,
}

impl HealthState {
    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Folds one probe result in. Returns a report if status or counter changed.
    pub fn record(&mut self, result: Result<(), String>, threshold: u32) -> Option<HealthReport> {
        let threshold = threshold.max(1);
        let before = self.clone();
        let error = match result {
            Ok(()) => {
                self.failures = 0;
                self.status = HealthStatus::Healthy;
                None
            }
            Err(e) => {
                self.failures = self.failures.saturating_add(1);
                if self.failures >= threshold {
                    self.status = HealthStatus::Unhealthy;
                }
                Some(e)
            }
        };
        if *self == before {
            return None;
        }
        Some(HealthReport {
            status: self.status,
            failures: self.failures,
            error,
        })
    }
}

/// Probe loop for one process instance.
pub struct HealthChecker {
    service: String,
    probe: ProbeRef,
    settings: HealthSettings,
}

impl HealthChecker {
    pub fn new(service: impl Into<String>, probe: ProbeRef, settings: HealthSettings) -> Self {
        Self {
            service: service.into(),
            probe,
            settings,
        }
    }

    /// Starts the loop on the runtime. The returned receiver closes when the loop ends.
    pub fn spawn(self, token: CancellationToken) -> (JoinHandle<()>, mpsc::Receiver<HealthReport>) {
        let (tx, rx) = mpsc::channel(16);
        let handle = tokio::spawn(self.run(token, tx));
        (handle, rx)
    }

    async fn run(self, token: CancellationToken, tx: mpsc::Sender<HealthReport>) {
        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = time::sleep(self.settings.initial_delay) => {}
        }

        let mut ticker = time::interval(self.settings.effective_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let threshold = self.settings.effective_threshold();
        let mut state = HealthState::default();

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = ticker.tick() => {}
            }

            let result = tokio::select! {
                biased;
                _ = token.cancelled() => return,
                r = self.probe_once(&token) => r,
            };

            if let Some(report) = state.record(result, threshold) {
                debug!(
                    service = %self.service,
                    status = report.status.as_str(),
                    failures = report.failures,
                    "health changed"
                );
                if tx.send(report).await.is_err() {
                    return;
                }
            }
        }
    }

    async fn probe_once(&self, token: &CancellationToken) -> Result<(), String> {
        let ctx = token.child_token();
        let _guard = ctx.clone().drop_guard();
        match time::timeout(self.settings.timeout, self.probe.check(ctx)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(describe_timeout(self.settings.timeout)),
        }
    }
}

/// Error text recorded for a probe that exceeded its timeout.
pub(crate) fn describe_timeout(d: Duration) -> String {
    format!("probe timed out after {d:?}")
}
