mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use nodevisor::{
    BoxError, ControlError, FnRunner, RestartPolicy, ServiceFilter, ServiceFn, ServiceState::*,
    ShutdownError, Supervisor, SupervisorConfig,
};
use tokio_util::sync::CancellationToken;

use common::*;

const LIMIT: Duration = Duration::from_secs(5);

fn finished_order(events: &[nodevisor::Event]) -> Vec<String> {
    events
        .iter()
        .filter(|e| e.to == Finished)
        .map(|e| e.service.to_string())
        .collect()
}

#[tokio::test]
async fn shutdown_stops_a_healthy_service_exactly_once() {
    let sup = supervisor();
    sup.register(
        ServiceFn::builder("apid")
            .with_runner(idle_runner("apid"))
            .with_restart(RestartPolicy::Forever)
            .build(),
    )
    .unwrap();
    let mut rx = sup.subscribe();
    sup.start();
    collect_until(&mut rx, LIMIT, |ev| has(ev, "apid", Healthy)).await;

    sup.shutdown().await.unwrap();

    let events = sup.events("apid").unwrap();
    let tail: Vec<_> = events.iter().rev().take(2).rev().map(|e| e.to).collect();
    assert_eq!(tail, vec![Stopping, Finished]);
    assert_eq!(events.iter().filter(|e| e.to == Stopping).count(), 1);
    assert_eq!(events.iter().filter(|e| e.to == Starting).count(), 1);
    assert_eq!(sup.snapshot()[0].restarts, 0);
}

#[tokio::test]
async fn shutdown_runs_in_reverse_dependency_order() {
    let sup = supervisor();
    sup.register(idle("a", &[])).unwrap();
    sup.register(idle("b", &["a"])).unwrap();
    sup.register(idle("c", &["b"])).unwrap();
    let mut rx = sup.subscribe();
    sup.start();
    collect_until(&mut rx, LIMIT, |ev| has(ev, "c", Healthy)).await;

    sup.shutdown().await.unwrap();
    let events = collect_until(&mut rx, LIMIT, |ev| has(ev, "a", Finished)).await;
    assert_eq!(finished_order(&events), vec!["c", "b", "a"]);
}

#[tokio::test]
async fn shutdown_honours_a_caller_order_first() {
    let sup = supervisor();
    sup.register(idle("a", &[])).unwrap();
    sup.register(idle("b", &["a"])).unwrap();
    sup.register(idle("c", &["b"])).unwrap();
    let mut rx = sup.subscribe();
    sup.start();
    collect_until(&mut rx, LIMIT, |ev| has(ev, "c", Healthy)).await;

    sup.shutdown_in_order(Some(vec!["a".into(), "ghost".into()]))
        .await
        .unwrap();
    let events = collect_until(&mut rx, LIMIT, |ev| {
        ["a", "b", "c"].iter().all(|id| has(ev, id, Finished))
    })
    .await;
    assert_eq!(finished_order(&events), vec!["a", "c", "b"]);
}

#[tokio::test(start_paused = true)]
async fn stuck_service_is_terminated_after_its_stop_window() {
    let sup = Supervisor::new(SupervisorConfig {
        grace: Duration::from_millis(100),
        stop_grace: Duration::from_secs(10),
        ..SupervisorConfig::default()
    });
    sup.register(
        ServiceFn::builder("stubborn")
            .with_runner(FnRunner::arc("stubborn", |_ctx: CancellationToken| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, BoxError>(())
            }))
            .build(),
    )
    .unwrap();
    sup.register(idle("polite", &["stubborn"])).unwrap();
    let mut rx = sup.subscribe();
    sup.start();
    collect_until(&mut rx, LIMIT, |ev| has(ev, "polite", Healthy)).await;

    let err = sup.shutdown().await.unwrap_err();
    assert_eq!(
        err,
        ShutdownError::Timeout {
            grace: Duration::from_millis(100),
            stuck: vec!["stubborn".into()],
        }
    );
    assert_eq!(sup.state("polite"), Some(Finished));
    assert_eq!(sup.state("stubborn"), Some(Failed));

    let last = sup.events("stubborn").unwrap().pop().unwrap();
    assert_eq!(
        last.error.as_deref(),
        Some("service did not stop within its grace period; terminated")
    );
}

#[tokio::test(start_paused = true)]
async fn services_after_a_stuck_one_still_stop_gracefully() {
    let sup = Supervisor::new(SupervisorConfig {
        grace: Duration::from_secs(1),
        stop_grace: Duration::from_secs(5),
        ..SupervisorConfig::default()
    });
    let cleaned_up = Arc::new(Mutex::new(None));
    sup.register(
        ServiceFn::builder("etcd")
            .with_runner(idle_runner("etcd"))
            .with_post({
                let cleaned_up = cleaned_up.clone();
                move |state| {
                    *cleaned_up.lock() = Some(state);
                    async { Ok::<_, BoxError>(()) }
                }
            })
            .build(),
    )
    .unwrap();
    // Depends on etcd, so it is stopped first.
    sup.register(
        ServiceFn::builder("wedged")
            .with_deps(["etcd"])
            .with_runner(FnRunner::arc("wedged", |_ctx: CancellationToken| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, BoxError>(())
            }))
            .build(),
    )
    .unwrap();
    let mut rx = sup.subscribe();
    sup.start();
    collect_until(&mut rx, LIMIT, |ev| has(ev, "wedged", Healthy)).await;

    let err = sup.shutdown().await.unwrap_err();
    assert_eq!(
        err,
        ShutdownError::Timeout {
            grace: Duration::from_secs(1),
            stuck: vec!["wedged".into()],
        }
    );
    assert_eq!(sup.state("wedged"), Some(Failed));

    let etcd = sup.events("etcd").unwrap();
    let tail: Vec<_> = etcd.iter().rev().take(2).rev().map(|e| e.to).collect();
    assert_eq!(tail, vec![Stopping, Finished]);
    assert_eq!(sup.state("etcd"), Some(Finished));
    assert_eq!(*cleaned_up.lock(), Some(Finished));
}

#[tokio::test]
async fn stop_service_ends_the_service_without_relaunch() {
    let sup = supervisor();
    sup.register(
        ServiceFn::builder("udevd")
            .with_runner(idle_runner("udevd"))
            .with_restart(RestartPolicy::Forever)
            .build(),
    )
    .unwrap();
    let mut rx = sup.subscribe();
    sup.start();
    collect_until(&mut rx, LIMIT, |ev| has(ev, "udevd", Healthy)).await;

    assert_eq!(
        sup.stop_service("nope").await,
        Err(ControlError::UnknownService { id: "nope".into() })
    );

    sup.stop_service("udevd").await.unwrap();
    assert_eq!(sup.state("udevd"), Some(Finished));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sup.state("udevd"), Some(Finished));
    assert_eq!(sup.snapshot()[0].restarts, 0);

    // Nothing left to stop.
    sup.stop_service("udevd").await.unwrap();
    sup.shutdown().await.unwrap();
}

#[tokio::test]
async fn restart_service_resets_counters_and_runs_again() {
    let launches = Arc::new(AtomicU32::new(0));
    let sup = Supervisor::new(SupervisorConfig {
        backoff: nodevisor::BackoffPolicy::none(),
        ..config()
    });
    sup.register(
        ServiceFn::builder("cri")
            .with_runner(FnRunner::arc("cri", {
                let launches = launches.clone();
                move |ctx: CancellationToken| {
                    let n = launches.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            return Err::<(), BoxError>("socket in use".into());
                        }
                        ctx.cancelled().await;
                        Ok(())
                    }
                }
            }))
            .with_restart(RestartPolicy::Forever)
            .build(),
    )
    .unwrap();
    let mut rx = sup.subscribe();
    sup.start();

    collect_until(&mut rx, LIMIT, |ev| {
        ev.iter().any(|e| e.service.as_ref() == "cri" && e.to == Healthy && e.restarts == 1)
    })
    .await;
    assert_eq!(sup.snapshot()[0].restarts, 1);

    sup.restart_service("cri").await.unwrap();
    let events = collect_until(&mut rx, LIMIT, |ev| has(ev, "cri", Healthy)).await;
    assert_eq!(
        path(&events, "cri"),
        vec![Stopping, Finished, Waiting, Preparing, Starting, Running, Healthy]
    );

    let snap = &sup.snapshot()[0];
    assert_eq!(snap.restarts, 0);
    assert_eq!(snap.last_error, None);
    assert_eq!(launches.load(Ordering::SeqCst), 3);

    sup.shutdown().await.unwrap();
    assert_eq!(sup.restart_service("cri").await, Err(ControlError::Closed));
}

#[tokio::test]
async fn service_conditions_observe_live_and_terminal_states() {
    let sup = supervisor();
    sup.register(idle("cri", &[])).unwrap();
    sup.register(
        ServiceFn::builder("install")
            .with_deps(["cri"])
            .with_runner(FnRunner::arc("install", |_ctx: CancellationToken| async {
                Ok::<_, BoxError>(())
            }))
            .with_restart(RestartPolicy::Once)
            .build(),
    )
    .unwrap();

    let up = sup.condition(["cri"], ServiceFilter::Up);
    let done = sup.condition(["install"], ServiceFilter::Finished);
    assert_eq!(done.to_string(), "service(s) [install] to be finished");
    sup.start();

    tokio::time::timeout(LIMIT, up.wait(CancellationToken::new()))
        .await
        .expect("cri comes up")
        .unwrap();
    tokio::time::timeout(LIMIT, done.wait(CancellationToken::new()))
        .await
        .expect("install finishes")
        .unwrap();
    assert_eq!(sup.state("install"), Some(Finished));

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let never = sup.condition(["cri"], ServiceFilter::Finished);
    assert!(never.wait(cancelled).await.unwrap_err().is_cancelled());

    sup.shutdown().await.unwrap();
}
