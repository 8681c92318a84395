mod common;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodevisor::{
    BoxError, Condition, ConditionError, ConditionRef, Fact, NodeState, RegistrationError,
    ServiceFn, ServiceState::*,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use common::*;

const LIMIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn dependents_start_only_after_dependencies_run() {
    let sup = supervisor();
    let mut rx = sup.subscribe();

    // Registered dependents-first: dependencies may be declared before they exist.
    sup.register(idle("c", &["a", "b"])).unwrap();
    sup.register(idle("b", &["a"])).unwrap();
    sup.register(idle("a", &[])).unwrap();
    sup.start();

    let events = collect_until(&mut rx, LIMIT, |ev| {
        ["a", "b", "c"].iter().all(|id| has(ev, id, Healthy))
    })
    .await;

    let a_running = position(&events, "a", Running).unwrap();
    let b_running = position(&events, "b", Running).unwrap();
    let b_starting = position(&events, "b", Starting).unwrap();
    let c_starting = position(&events, "c", Starting).unwrap();
    assert!(a_running < b_starting, "{}", render(&events));
    assert!(a_running < c_starting && b_running < c_starting, "{}", render(&events));

    assert_eq!(path(&events, "a"), vec![Preparing, Starting, Running, Healthy]);
    sup.shutdown().await.unwrap();
}

#[tokio::test]
async fn failed_preparation_blocks_dependents() {
    let sup = supervisor();
    let mut rx = sup.subscribe();

    sup.register(
        ServiceFn::builder("cri")
            .with_pre(|_ctx: CancellationToken| async {
                Err::<(), BoxError>("cannot create /var/lib/containerd".into())
            })
            .with_runner(idle_runner("cri"))
            .build(),
    )
    .unwrap();
    sup.register(idle("kubelet", &["cri"])).unwrap();
    sup.start();

    let events = collect_until(&mut rx, LIMIT, |ev| has(ev, "cri", Failed)).await;
    assert_eq!(path(&events, "cri"), vec![Preparing, Failed]);
    let failed = &events[position(&events, "cri", Failed).unwrap()];
    assert_eq!(
        failed.error.as_deref(),
        Some("preparation failed: cannot create /var/lib/containerd")
    );

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sup.state("kubelet"), Some(Waiting));
    let kubelet = sup
        .snapshot()
        .into_iter()
        .find(|s| s.id == "kubelet")
        .unwrap();
    assert_eq!(kubelet.waiting_on, vec!["cri".to_string()]);
    assert!(kubelet.events.is_empty());

    sup.shutdown().await.unwrap();
    assert_eq!(sup.state("kubelet"), Some(Finished));
}

struct Unobservable;

impl fmt::Display for Unobservable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("interface eth0 to have an address")
    }
}

#[async_trait]
impl Condition for Unobservable {
    async fn wait(&self, _ctx: CancellationToken) -> Result<(), ConditionError> {
        Err(ConditionError::Failed {
            condition: self.to_string(),
            reason: "netlink socket closed".into(),
        })
    }
}

#[tokio::test]
async fn condition_error_is_a_hard_failure() {
    let sup = supervisor();
    let mut rx = sup.subscribe();
    sup.register(
        ServiceFn::builder("networkd")
            .with_condition(|_node: &NodeState| {
                let cond: ConditionRef = Arc::new(Unobservable);
                Some(cond)
            })
            .with_runner(idle_runner("networkd"))
            .build(),
    )
    .unwrap();
    sup.start();

    let events = collect_until(&mut rx, LIMIT, |ev| has(ev, "networkd", Failed)).await;
    let failed = &events[position(&events, "networkd", Failed).unwrap()];
    assert_eq!(
        failed.error.as_deref(),
        Some("condition failed: interface eth0 to have an address: netlink socket closed")
    );
    assert!(!has(&events, "networkd", Starting));
    sup.shutdown().await.unwrap();
}

#[tokio::test]
async fn node_facts_gate_the_launch() {
    let node = NodeState::new();
    let sup = nodevisor::Supervisor::builder(config())
        .with_node_state(node.clone())
        .build();
    sup.register(
        ServiceFn::builder("timed")
            .with_condition(|node: &NodeState| Some(node.condition([Fact::AddressReady])))
            .with_runner(idle_runner("timed"))
            .build(),
    )
    .unwrap();
    sup.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sup.state("timed"), Some(Preparing));

    node.set(Fact::AddressReady);
    let healthy = sup.condition(["timed"], nodevisor::ServiceFilter::Healthy);
    tokio::time::timeout(LIMIT, healthy.wait(CancellationToken::new()))
        .await
        .expect("timed becomes healthy")
        .unwrap();

    sup.shutdown().await.unwrap();
}

#[tokio::test]
async fn shutdown_waiting_on_condition_finishes_without_stopping() {
    let sup = supervisor();
    let cleaned_up = Arc::new(Mutex::new(None));
    sup.register(
        ServiceFn::builder("timed")
            .with_condition(|node: &NodeState| Some(node.condition([Fact::TimeSynced])))
            .with_post({
                let cleaned_up = cleaned_up.clone();
                move |state| {
                    *cleaned_up.lock() = Some(state);
                    async { Ok::<_, BoxError>(()) }
                }
            })
            .with_runner(idle_runner("timed"))
            .build(),
    )
    .unwrap();
    sup.start();
    tokio::time::sleep(Duration::from_millis(50)).await;

    sup.shutdown().await.unwrap();
    let states: Vec<_> = sup.events("timed").unwrap().iter().map(|e| e.to).collect();
    assert_eq!(states, vec![Preparing, Finished]);
    assert_eq!(*cleaned_up.lock(), Some(Finished));
}

#[tokio::test]
async fn late_registration_and_missing_dependencies() {
    let sup = supervisor();
    let mut rx = sup.subscribe();
    sup.register(idle("kubelet", &["cri"])).unwrap();
    sup.start();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sup.state("kubelet"), Some(Waiting));

    sup.register(idle("cri", &[])).unwrap();
    let events = collect_until(&mut rx, LIMIT, |ev| has(ev, "kubelet", Healthy)).await;
    assert!(position(&events, "cri", Running) < position(&events, "kubelet", Starting));

    sup.shutdown().await.unwrap();
}

#[tokio::test]
async fn registration_errors_leave_the_registry_untouched() {
    let sup = supervisor();
    sup.register(idle("a", &["b"])).unwrap();
    sup.register(idle("b", &[])).unwrap();

    assert_eq!(
        sup.register(idle("a", &[])),
        Err(RegistrationError::Duplicate { id: "a".into() })
    );
    let err = sup.register(idle("c", &["c"])).unwrap_err();
    assert_eq!(err.as_label(), "registration_cycle");

    let ids: Vec<_> = sup.snapshot().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

    sup.shutdown().await.unwrap();
    assert_eq!(sup.register(idle("d", &[])), Err(RegistrationError::Closed));
}
