#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use nodevisor::{
    BoxError, Event, FnRunner, RunnerRef, ServiceRef, ServiceFn, ServiceState, Supervisor,
    SupervisorConfig,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Runner whose instances run until stopped.
pub fn idle_runner(id: &'static str) -> RunnerRef {
    FnRunner::arc(id, |ctx: CancellationToken| async move {
        ctx.cancelled().await;
        Ok::<_, BoxError>(())
    })
}

/// Long-running service with the given dependencies and no probe.
pub fn idle(id: &'static str, deps: &[&'static str]) -> ServiceRef {
    ServiceFn::builder(id)
        .with_deps(deps.iter().copied())
        .with_runner(idle_runner(id))
        .build()
}

/// Supervisor with test-friendly timings.
pub fn supervisor() -> Arc<Supervisor> {
    Supervisor::new(config())
}

pub fn config() -> SupervisorConfig {
    SupervisorConfig {
        grace: Duration::from_secs(5),
        stop_grace: Duration::from_secs(1),
        ..SupervisorConfig::default()
    }
}

/// Receives events until `done` returns true for the collected list, or panics after `limit`.
pub async fn collect_until<F>(
    rx: &mut broadcast::Receiver<Event>,
    limit: Duration,
    mut done: F,
) -> Vec<Event>
where
    F: FnMut(&[Event]) -> bool,
{
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + limit;
    while !done(&events) {
        match tokio::time::timeout_at(deadline, rx.recv()).await {
            Ok(Ok(ev)) => events.push(ev),
            Ok(Err(e)) => panic!("event stream broken: {e}"),
            Err(_) => panic!("timed out; collected so far: {}", render(&events)),
        }
    }
    events
}

/// Index of the first event moving `service` into `state`.
pub fn position(events: &[Event], service: &str, state: ServiceState) -> Option<usize> {
    events
        .iter()
        .position(|e| e.service.as_ref() == service && e.to == state)
}

pub fn has(events: &[Event], service: &str, state: ServiceState) -> bool {
    position(events, service, state).is_some()
}

/// States `service` moved through, in order.
pub fn path(events: &[Event], service: &str) -> Vec<ServiceState> {
    events
        .iter()
        .filter(|e| e.service.as_ref() == service)
        .map(|e| e.to)
        .collect()
}

pub fn render(events: &[Event]) -> String {
    events
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
