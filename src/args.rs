//! # Command-line argument sets with reserved keys.
//!
//! Services build their command line from two maps: the flags the supervisor
//! insists on (paths to credentials, runtime endpoints, the node name) and the
//! extra flags an operator supplied in configuration. Operators may add flags but
//! never override a reserved one.
//!
//! ```text
//! reserved  { config, kubeconfig, hostname-override }
//! overrides { v, hostname-override }             ─► Err(DenylistError { key: "hostname-override" })
//! overrides { v, feature-gates }                 ─► Ok(reserved ∪ overrides)
//! ```
//!
//! [`merge_args`] is a pure function; keys are kept sorted so rendered command
//! lines are stable.
//!
//! # Example
//! ```rust
//! use nodevisor::{merge_args, Args};
//!
//! let reserved = Args::new().with("config", "/etc/kubelet.yaml");
//! let extra = Args::new().with("v", "2");
//!
//! let merged = merge_args(&reserved, &extra).unwrap();
//! assert_eq!(merged.to_flags(), vec!["--config=/etc/kubelet.yaml", "--v=2"]);
//! ```

use std::collections::BTreeMap;
use std::collections::btree_map;

use thiserror::Error;

/// An override tried to replace a reserved argument.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("argument {key:?} is reserved and may not be overridden")]
pub struct DenylistError {
    /// The offending key.
    pub key: String,
}

impl DenylistError {
    /// Returns a short stable label for use in logs.
    pub fn as_label(&self) -> &'static str {
        "args_denylisted"
    }
}

/// Ordered key/value argument set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Args(BTreeMap<String, String>);

impl Args {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces `key`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`Args::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns a new set with every entry of `other` applied on top of `self`.
    pub fn merge(&self, other: &Args) -> Args {
        let mut out = self.clone();
        for (k, v) in &other.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// Renders `--key=value` flags in key order.
    pub fn to_flags(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("--{k}={v}")).collect()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Args {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Args(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for Args {
    fn from(map: BTreeMap<String, String>) -> Self {
        Args(map)
    }
}

impl<'a> IntoIterator for &'a Args {
    type Item = (&'a String, &'a String);
    type IntoIter = btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Merges operator `overrides` into `reserved`, rejecting any override of a reserved key.
///
/// The first offending key in key order is reported.
pub fn merge_args(reserved: &Args, overrides: &Args) -> Result<Args, DenylistError> {
    if let Some(key) = reserved.0.keys().find(|k| overrides.contains(k)) {
        return Err(DenylistError { key: key.clone() });
    }
    Ok(reserved.merge(overrides))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reserved() -> Args {
        Args::new()
            .with("kubeconfig", "/etc/kubernetes/kubeconfig")
            .with("hostname-override", "node-1")
            .with("container-runtime-endpoint", "unix:///run/containerd.sock")
    }

    #[test]
    fn disjoint_overrides_are_merged() {
        let extra: Args = [("v", "4"), ("feature-gates", "Foo=true")].into_iter().collect();
        let merged = merge_args(&reserved(), &extra).unwrap();

        assert_eq!(merged.len(), 5);
        assert_eq!(merged.get("v"), Some("4"));
        assert_eq!(merged.get("hostname-override"), Some("node-1"));
    }

    #[test]
    fn reserved_key_is_rejected() {
        let extra = Args::new().with("v", "4").with("hostname-override", "evil");
        let err = merge_args(&reserved(), &extra).unwrap_err();
        assert_eq!(err.key, "hostname-override");
        assert_eq!(
            err.to_string(),
            "argument \"hostname-override\" is reserved and may not be overridden"
        );
    }

    #[test]
    fn first_offending_key_in_order_is_reported() {
        let extra = Args::new()
            .with("kubeconfig", "x")
            .with("container-runtime-endpoint", "y");
        let err = merge_args(&reserved(), &extra).unwrap_err();
        assert_eq!(err.key, "container-runtime-endpoint");
    }

    #[test]
    fn empty_sides() {
        assert_eq!(merge_args(&Args::new(), &Args::new()).unwrap(), Args::new());
        assert_eq!(merge_args(&reserved(), &Args::new()).unwrap(), reserved());
    }

    #[test]
    fn flags_render_sorted() {
        let args = Args::new().with("b", "2").with("a", "1");
        assert_eq!(args.to_flags(), vec!["--a=1", "--b=2"]);
    }
}
