//! River network topology as a map of immediate upstream nodes.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{InflowError, InflowResult};

/// Node -> nodes whose flow passes through it without any node in between.
///
/// Nodes with no upstream contributors may be listed with an empty vector or
/// left out.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UpstreamMap(IndexMap<String, Vec<String>>);

impl UpstreamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, node: &str, upstream: &[&str]) -> Self {
        self.insert(node, upstream.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn insert(&mut self, node: impl Into<String>, upstream: Vec<String>) {
        self.0.insert(node.into(), upstream);
    }

    /// Immediate upstream nodes of `node` (empty when unknown).
    pub fn upstream_of(&self, node: &str) -> &[String] {
        self.0.get(node).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Every node named in the map, downstream or upstream, in first-seen order.
    pub fn nodes(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for (node, upstream) in &self.0 {
            for name in std::iter::once(node).chain(upstream) {
                if seen.insert(name.as_str()) {
                    out.push(name.as_str());
                }
            }
        }
        out
    }

    /// Reject self-references and cycles.
    pub fn validate(&self) -> InflowResult<()> {
        for (node, upstream) in &self.0 {
            if upstream.iter().any(|u| u == node) {
                return Err(InflowError::SelfUpstream { node: node.clone() });
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Nodes ordered so that every node comes after all of its upstream nodes.
    pub fn topological_order(&self) -> InflowResult<Vec<String>> {
        let nodes = self.nodes();
        let mut pending: HashMap<&str, usize> = nodes
            .iter()
            .map(|n| (*n, self.upstream_of(n).len()))
            .collect();
        let mut downstream: HashMap<&str, Vec<&str>> = HashMap::new();
        for (node, upstream) in &self.0 {
            for u in upstream {
                downstream.entry(u.as_str()).or_default().push(node.as_str());
            }
        }

        let mut ready: Vec<&str> = nodes
            .iter()
            .copied()
            .filter(|n| pending[n] == 0)
            .collect();
        ready.reverse();
        let mut order = Vec::with_capacity(nodes.len());
        while let Some(node) = ready.pop() {
            order.push(node.to_string());
            for d in downstream.get(node).into_iter().flatten() {
                if let Some(count) = pending.get_mut(d) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(*d);
                    }
                }
            }
        }

        if order.len() < nodes.len() {
            let stuck = nodes
                .iter()
                .find(|n| pending[*n] > 0)
                .map(|n| n.to_string())
                .unwrap_or_default();
            return Err(InflowError::Cycle { node: stuck });
        }
        Ok(order)
    }

    /// Delaware River Basin network used by the published streamflow ensembles.
    pub fn delaware_river_basin() -> Self {
        Self::new()
            // NYC reservoirs and their downstream gauges
            .with("01425000", &["cannonsville"])
            .with("01417000", &["pepacton"])
            .with("delLordville", &["01425000", "01417000"])
            .with("01436000", &["neversink"])
            .with(
                "delMontague",
                &[
                    "delLordville",
                    "prompton",
                    "wallenpaupack",
                    "shoholaPA",
                    "mongaupeCombined",
                    "01436000",
                ],
            )
            // Lower basin
            .with("01449800", &["beltzvilleCombined"])
            .with("01447800", &["fewalter"])
            .with(
                "delDRCanal",
                &[
                    "delMontague",
                    "01449800",
                    "01447800",
                    "hopatcong",
                    "merrillCreek",
                    "nockamixon",
                ],
            )
            .with("delTrenton", &["delDRCanal"])
            // Schuylkill
            .with("01470960", &["blueMarsh"])
            .with(
                "delSchuylkill",
                &["01470960", "ontelaunee", "stillCreek", "greenLane"],
            )
            .with("01463620", &["assunpink"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_network_is_acyclic() {
        let map = UpstreamMap::delaware_river_basin();
        map.validate().unwrap();

        let order = map.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|o| o == n).unwrap();
        assert!(pos("cannonsville") < pos("01425000"));
        assert!(pos("01425000") < pos("delLordville"));
        assert!(pos("delLordville") < pos("delMontague"));
        assert!(pos("delDRCanal") < pos("delTrenton"));
    }

    #[test]
    fn cycle_is_rejected() {
        let map = UpstreamMap::new().with("a", &["b"]).with("b", &["a"]);
        assert!(matches!(map.validate(), Err(InflowError::Cycle { .. })));
    }

    #[test]
    fn self_reference_is_rejected() {
        let map = UpstreamMap::new().with("a", &["a"]);
        assert!(matches!(
            map.validate(),
            Err(InflowError::SelfUpstream { .. })
        ));
    }

    #[test]
    fn unknown_node_has_no_upstream() {
        let map = UpstreamMap::delaware_river_basin();
        assert!(map.upstream_of("cannonsville").is_empty());
        assert_eq!(map.upstream_of("delTrenton"), ["delDRCanal"]);
    }
}
