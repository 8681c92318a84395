//! # Node-state facts and conditions over them.
//!
//! [`NodeState`] is the in-process view of facts that other parts of the node
//! agent publish (network configured, clock synchronized, hostname resolved).
//! It is backed by a `tokio::sync::watch` channel, so a [`FactCondition`] wakes
//! on the same tick the fact is set: satisfaction latency is one scheduler hop.
//!
//! ```text
//! network controller ──► NodeState::set(Fact::AddressReady) ──► watch ──► FactCondition::wait
//! time sync          ──► NodeState::set(Fact::TimeSynced)   ──┘
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::condition::{Condition, ConditionRef};
use crate::error::ConditionError;

/// A fact about the node that services may wait for.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Fact {
    /// At least one routable address is assigned.
    AddressReady,
    /// Hostname is resolved and applied.
    HostnameReady,
    /// `/etc/hosts`, `/etc/resolv.conf` and friends are written.
    EtcFilesReady,
    /// Clock is considered synchronized.
    TimeSynced,
    /// Node name is known.
    NodenameReady,
    /// The named interface has an address.
    InterfaceAddress(String),
    /// Free-form fact published by an integration.
    Custom(String),
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fact::AddressReady => f.write_str("network address ready"),
            Fact::HostnameReady => f.write_str("hostname ready"),
            Fact::EtcFilesReady => f.write_str("etc files ready"),
            Fact::TimeSynced => f.write_str("time synchronized"),
            Fact::NodenameReady => f.write_str("nodename ready"),
            Fact::InterfaceAddress(link) => write!(f, "address on {link}"),
            Fact::Custom(name) => f.write_str(name),
        }
    }
}

/// Shared, observable set of node facts.
///
/// Clones share the same store.
#[derive(Clone, Debug)]
pub struct NodeState {
    tx: Arc<watch::Sender<BTreeSet<Fact>>>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(BTreeSet::new());
        Self { tx: Arc::new(tx) }
    }

    /// Marks `fact` as true. Waiters are only woken if the set changed.
    pub fn set(&self, fact: Fact) {
        self.tx.send_if_modified(|facts| facts.insert(fact));
    }

    /// Marks `fact` as no longer true.
    pub fn clear(&self, fact: &Fact) {
        self.tx.send_if_modified(|facts| facts.remove(fact));
    }

    pub fn is_set(&self, fact: &Fact) -> bool {
        self.tx.borrow().contains(fact)
    }

    /// Returns a copy of the current facts.
    pub fn facts(&self) -> BTreeSet<Fact> {
        self.tx.borrow().clone()
    }

    /// Builds a condition satisfied once every fact in `facts` is set at the same time.
    pub fn condition(&self, facts: impl IntoIterator<Item = Fact>) -> ConditionRef {
        Arc::new(FactCondition {
            facts: facts.into_iter().collect(),
            rx: self.tx.subscribe(),
        })
    }
}

/// Leaf condition over [`NodeState`].
pub struct FactCondition {
    facts: BTreeSet<Fact>,
    rx: watch::Receiver<BTreeSet<Fact>>,
}

#[async_trait]
impl Condition for FactCondition {
    async fn wait(&self, ctx: CancellationToken) -> Result<(), ConditionError> {
        let mut rx = self.rx.clone();
        let ready = async {
            rx.wait_for(|current| self.facts.is_subset(current))
                .await
                .map(|_| ())
        };
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ConditionError::Cancelled),
            res = ready => res.map_err(|_| ConditionError::Failed {
                condition: self.to_string(),
                reason: "node state store is gone".into(),
            }),
        }
    }
}

impl fmt::Display for FactCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for fact in &self.facts {
            if !first {
                f.write_str(" and ")?;
            }
            write!(f, "{fact}")?;
            first = false;
        }
        if first {
            f.write_str("no facts")?;
        }
        Ok(())
    }
}
