//! # Node boot
//!
//! Brings up a miniature node:
//! - `cri`: a host process (`sleep`) with a probe that always passes
//! - `kubelet`: depends on `cri`, gated on the node name being known, flags
//!   merged over a reserved set
//! - `timed`: gated on an address, flaps once to show a relaunch
//!
//! Node facts are published after a short delay. Press Ctrl-C (or wait 10s) to
//! shut down in reverse dependency order.
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example node_boot --features logging
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use nodevisor::{
    Args, BoxError, Fact, FnRunner, LaunchSpec, LogWriter, NodeState, ProbeFn, ProcessRunner,
    RestartPolicy, RunnerRef, ServiceFn, StateTracker, Subscribe, Supervisor, SupervisorConfig,
    merge_args,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

fn kubelet_runner() -> Result<RunnerRef, BoxError> {
    let reserved = Args::new()
        .with("node-ip", "10.5.0.2")
        .with("cert-dir", "/var/lib/kubelet/pki");
    let extra = Args::new().with("v", "2");
    let flags = merge_args(&reserved, &extra)?;

    let runner: RunnerRef = FnRunner::arc("kubelet", move |ctx: CancellationToken| {
        let flags = flags.to_flags();
        async move {
            tracing::info!(?flags, "kubelet serving");
            ctx.cancelled().await;
            Ok::<_, BoxError>(())
        }
    });
    Ok(runner)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let node = NodeState::new();
    let tracker = Arc::new(StateTracker::new());
    let log: Arc<dyn Subscribe> = Arc::new(LogWriter::new());
    let subs = vec![log, tracker.clone() as Arc<dyn Subscribe>];

    let sup = Supervisor::builder(SupervisorConfig {
        grace: Duration::from_secs(5),
        stop_grace: Duration::from_secs(2),
        ..SupervisorConfig::default()
    })
    .with_subscribers(subs)
    .with_node_state(node.clone())
    .build();

    sup.register(
        ServiceFn::builder("cri")
            .with_runner(Arc::new(ProcessRunner::new(
                LaunchSpec::new("cri").args(["sleep", "3600"]),
            )))
            .with_health_probe(ProbeFn::arc(|_ctx: CancellationToken| async {
                Ok::<_, BoxError>(())
            }))
            .with_restart(RestartPolicy::Forever)
            .build(),
    )?;

    sup.register(
        ServiceFn::builder("kubelet")
            .with_deps(["cri"])
            .with_condition(|node: &NodeState| Some(node.condition([Fact::NodenameReady])))
            .with_runner_factory(kubelet_runner)
            .with_restart(RestartPolicy::Forever)
            .build(),
    )?;

    let attempts = Arc::new(AtomicU32::new(0));
    sup.register(
        ServiceFn::builder("timed")
            .with_condition(|node: &NodeState| Some(node.condition([Fact::AddressReady])))
            .with_runner(FnRunner::arc("timed", move |ctx: CancellationToken| {
                let attempt = attempts.fetch_add(1, Ordering::Relaxed);
                async move {
                    if attempt == 0 {
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        return Err::<(), BoxError>("clock source unavailable".into());
                    }
                    ctx.cancelled().await;
                    Ok(())
                }
            }))
            .with_restart(RestartPolicy::Forever)
            .build(),
    )?;

    tokio::spawn({
        let node = node.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            node.set(Fact::AddressReady);
            tokio::time::sleep(Duration::from_millis(500)).await;
            node.set(Fact::NodenameReady);
        }
    });

    tokio::select! {
        res = sup.run_until_signal() => res?,
        _ = tokio::time::sleep(Duration::from_secs(10)) => {
            println!("up: {:?}", tracker.up());
            sup.shutdown().await?;
        }
    }

    println!();
    println!("Final states:");
    for snap in sup.snapshot() {
        println!(
            " ├─► {:<8} {:<9} restarts={} last_error={}",
            snap.id,
            snap.state.as_str(),
            snap.restarts,
            snap.last_error.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
