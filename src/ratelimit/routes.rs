//! Per-route admission policies.
//!
//! Routes are configured by resource scope. An entry ending in `*` matches
//! every scope with that prefix. Exact entries beat wildcards, and among
//! wildcards the longest prefix wins.

use std::collections::HashMap;

use tracing::info;

use super::policy::{AdmissionPolicy, PolicyOverrides};
use crate::error::Result;

/// Resolved route policies.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    exact: HashMap<String, AdmissionPolicy>,
    /// (prefix, policy), longest prefix first
    prefixes: Vec<(String, AdmissionPolicy)>,
}

impl RouteTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve configured overrides against `base`, failing on the first
    /// invalid entry.
    pub fn from_overrides(
        base: &AdmissionPolicy,
        routes: &HashMap<String, PolicyOverrides>,
    ) -> Result<Self> {
        let mut table = RouteTable::new();

        for (route, overrides) in routes {
            let route = route.trim();
            let policy = overrides.resolve(&base.for_route(route))?;
            table.insert(route, policy);
        }

        if !routes.is_empty() {
            info!(
                exact = table.exact.len(),
                wildcard = table.prefixes.len(),
                "Loaded route policies"
            );
        }
        Ok(table)
    }

    /// Register a policy under `route` (exact or `prefix*`).
    pub fn insert(&mut self, route: &str, policy: AdmissionPolicy) {
        match route.strip_suffix('*') {
            Some(prefix) => {
                self.prefixes.retain(|(p, _)| p != prefix);
                self.prefixes.push((prefix.to_string(), policy));
                self.prefixes.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
            }
            None => {
                self.exact.insert(route.to_string(), policy.for_route(route));
            }
        }
    }

    /// Policy for `route`, scoped to that route.
    pub fn find(&self, route: &str) -> Option<AdmissionPolicy> {
        if let Some(policy) = self.exact.get(route) {
            return Some(policy.clone());
        }

        self.prefixes
            .iter()
            .find(|(prefix, _)| route.starts_with(prefix.as_str()))
            .map(|(_, policy)| policy.for_route(route))
    }

    /// Number of configured routes.
    pub fn len(&self) -> usize {
        self.exact.len() + self.prefixes.len()
    }

    /// Whether no routes are configured.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
