//! # Service dependency graph.
//!
//! Directed graph `service → dependency`. Kept acyclic at all times: every
//! insertion is validated first ([`DependencyGraph::check_insert`]) and either
//! applied whole or rejected with the registry untouched.
//!
//! Dependencies may name services that are not registered yet. Such edges are
//! kept; the dependent simply cannot be released until the dependency appears
//! and runs. A later registration that closes a cycle through them is rejected.

use std::collections::{BTreeMap, BTreeSet};

use crate::error::RegistrationError;

#[derive(Clone, Debug, Default)]
pub(crate) struct DependencyGraph {
    /// Registered service → its declared dependencies (deduplicated, declaration order).
    edges: BTreeMap<String, Vec<String>>,
    /// Dependency id (registered or not) → services that depend on it.
    reverse: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub(crate) fn contains(&self, id: &str) -> bool {
        self.edges.contains_key(id)
    }

    /// Validates that `id` with `deps` can be inserted.
    pub(crate) fn check_insert(&self, id: &str, deps: &[String]) -> Result<(), RegistrationError> {
        if id.is_empty() {
            return Err(RegistrationError::EmptyId);
        }
        if self.contains(id) {
            return Err(RegistrationError::Duplicate { id: id.to_string() });
        }

        let mut visited = BTreeSet::new();
        let mut on_path = BTreeSet::new();
        let mut path = Vec::new();
        match self.find_cycle_dfs(id, (id, deps), &mut visited, &mut on_path, &mut path) {
            Some(chain) => Err(RegistrationError::Cycle { chain }),
            None => Ok(()),
        }
    }

    /// Inserts a validated node. Call [`check_insert`](Self::check_insert) first.
    pub(crate) fn insert(&mut self, id: &str, deps: &[String]) {
        let mut seen = BTreeSet::new();
        let deps: Vec<String> = deps
            .iter()
            .filter(|d| seen.insert(d.as_str()))
            .cloned()
            .collect();
        for dep in &deps {
            self.reverse
                .entry(dep.clone())
                .or_default()
                .insert(id.to_string());
        }
        self.edges.insert(id.to_string(), deps);
    }

    pub(crate) fn dependencies(&self, id: &str) -> &[String] {
        self.edges.get(id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Services that declared `id` as a dependency.
    pub(crate) fn dependents(&self, id: &str) -> impl Iterator<Item = &String> {
        self.reverse.get(id).into_iter().flatten()
    }

    /// Registered ids ordered so that every service comes after its registered
    /// dependencies; ties broken by id.
    pub(crate) fn topological_order(&self) -> Vec<String> {
        let mut in_degree: BTreeMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| {
                let n = deps.iter().filter(|d| self.contains(d)).count();
                (id.as_str(), n)
            })
            .collect();

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(self.edges.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.to_string());
            for dependent in self.dependents(id) {
                if let Some(n) = in_degree.get_mut(dependent.as_str()) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }
        order
    }

    /// Depth-first search for a cycle reachable from `node`, treating `candidate`
    /// as if it were already inserted.
    fn find_cycle_dfs(
        &self,
        node: &str,
        candidate: (&str, &[String]),
        visited: &mut BTreeSet<String>,
        on_path: &mut BTreeSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        on_path.insert(node.to_string());
        path.push(node.to_string());

        let deps = if node == candidate.0 {
            candidate.1
        } else {
            self.dependencies(node)
        };
        for dep in deps {
            if on_path.contains(dep) {
                let start = path.iter().position(|n| n == dep).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = self.find_cycle_dfs(dep, candidate, visited, on_path, path) {
                    return Some(cycle);
                }
            }
        }

        on_path.remove(node);
        path.pop();
        None
    }
}
