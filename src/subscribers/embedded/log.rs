//! # LogWriter: events as tracing records
//!
//! Renders every [`Event`] as one `tracing` record under the target
//! `nodevisor::events`. Failures log at `error`, unhealthy transitions and
//! relaunches with an error at `warn`, everything else at `info`.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO nodevisor::events: transition service=cri from=STARTING to=RUNNING restarts=0 seq=12
//! WARN nodevisor::events: transition service=apid from=HEALTHY to=UNHEALTHY restarts=0 seq=31 error=health probe failed: connection refused
//! ERROR nodevisor::events: transition service=kubelet from=PREPARING to=FAILED restarts=0 seq=7 error=preparation failed: no kubeconfig
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, ServiceState};
use crate::subscribers::Subscribe;

/// Tracing-backed event writer.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_ref();
        let (from, to) = (e.from.as_str(), e.to.as_str());
        match (e.to, e.error.as_deref()) {
            (ServiceState::Failed, err) => error!(
                target: "nodevisor::events",
                service, from, to, restarts = e.restarts, seq = e.seq, error = err.unwrap_or("-"), "transition"
            ),
            (_, Some(err)) => warn!(
                target: "nodevisor::events",
                service, from, to, restarts = e.restarts, seq = e.seq, error = err, "transition"
            ),
            (_, None) => info!(
                target: "nodevisor::events",
                service, from, to, restarts = e.restarts, seq = e.seq, "transition"
            ),
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
