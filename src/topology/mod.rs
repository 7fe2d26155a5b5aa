//! Topology graph collaborators
//!
//! - [`Graph`] / [`GraphGuard`] - the shared node container and its scoped lock
//! - [`Node`] - a topology entity with string metadata
//! - [`TopologyProbeBundle`] - the set of active topology probes, handed to
//!   flow probe constructors

pub mod graph;
pub mod node;

pub use graph::{load_nodes, Graph, GraphGuard};
pub use node::{
    Metadata, Node, NodeId, IF_INDEX_KEY, MAC_KEY, NAME_KEY, TID_KEY, TYPE_KEY,
};

use std::collections::BTreeSet;

/// Name of the OVSDB topology probe, required by sFlow capture
pub const OVSDB_TOPOLOGY_PROBE: &str = "ovsdb";

/// Active topology probes (netlink, ovsdb, ...)
///
/// Flow probe constructors only query it; it is otherwise opaque to the
/// flow probe bundle.
#[derive(Debug, Clone, Default)]
pub struct TopologyProbeBundle {
    probes: BTreeSet<String>,
}

impl TopologyProbeBundle {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            probes: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_probe(&self, name: &str) -> bool {
        self.probes.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.probes.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_probe_bundle() {
        let tb = TopologyProbeBundle::new(["netlink", "ovsdb"]);
        assert!(tb.has_probe(OVSDB_TOPOLOGY_PROBE));
        assert!(!tb.has_probe("docker"));
        assert_eq!(tb.names().collect::<Vec<_>>(), vec!["netlink", "ovsdb"]);
    }
}
