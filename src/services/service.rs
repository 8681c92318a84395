//! # Service plug-in contract.
//!
//! A [`Service`] describes one supervised unit: who it depends on, what it waits
//! for, how it is prepared and cleaned up, how it is launched, whether it is
//! relaunched, and how it is probed. The supervisor is generic over this
//! capability set and never over concrete service types.
//!
//! ```text
//! Service ──► id / depends_on           (graph + scheduler)
//!         ├─► condition(&NodeState)     (gate before launch)
//!         ├─► pre(ctx) / post(state)    (hooks)
//!         ├─► runner()                  (execution backend)
//!         ├─► restart_policy()          (restart engine)
//!         └─► health_probe()/settings   (health checker)
//! ```
//!
//! A descriptor is immutable once registered; every method may be called more
//! than once (a restarted service calls `runner()` again).

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::conditions::{ConditionRef, NodeState};
use crate::error::BoxError;
use crate::events::ServiceState;
use crate::health::{HealthSettings, ProbeRef};
use crate::policies::RestartPolicy;
use crate::runner::RunnerRef;

/// # A supervised service.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use nodevisor::{
///     BoxError, ConditionRef, Fact, LaunchSpec, NodeState, ProcessRunner, RunnerRef, Service,
/// };
/// use std::sync::Arc;
///
/// struct Timed;
///
/// #[async_trait]
/// impl Service for Timed {
///     fn id(&self) -> &str { "timed" }
///
///     fn condition(&self, node: &NodeState) -> Option<ConditionRef> {
///         Some(node.condition([Fact::AddressReady]))
///     }
///
///     fn runner(&self) -> Result<RunnerRef, BoxError> {
///         let spec = LaunchSpec::new("timed").arg("/usr/bin/timed");
///         Ok(Arc::new(ProcessRunner::new(spec)))
///     }
/// }
/// ```
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Unique identifier.
    fn id(&self) -> &str;

    /// Identifiers of services that must be running before this one starts.
    fn depends_on(&self) -> Vec<String> {
        Vec::new()
    }

    /// Readiness condition over node state; `None` means "no gate".
    fn condition(&self, _node: &NodeState) -> Option<ConditionRef> {
        None
    }

    /// Side-effecting setup run once per start (directories, credentials, images).
    async fn pre(&self, _ctx: CancellationToken) -> Result<(), BoxError> {
        Ok(())
    }

    /// Cleanup run once the service is stopping for good, with the state it is heading to.
    async fn post(&self, _state: ServiceState) -> Result<(), BoxError> {
        Ok(())
    }

    /// Produces the runner used to launch instances.
    fn runner(&self) -> Result<RunnerRef, BoxError>;

    fn restart_policy(&self) -> RestartPolicy {
        RestartPolicy::Forever
    }

    /// Health probe; a service without one is healthy as soon as it runs.
    fn health_probe(&self) -> Option<ProbeRef> {
        None
    }

    /// Health settings, given the supervisor-wide defaults.
    fn health_settings(&self, defaults: HealthSettings) -> HealthSettings {
        defaults
    }
}

/// Shared handle to a service.
pub type ServiceRef = Arc<dyn Service>;
