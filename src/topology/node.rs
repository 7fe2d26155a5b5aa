//! Topology nodes and their metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Metadata key holding the node type (`device`, `ovsbridge`, `veth`, ...)
pub const TYPE_KEY: &str = "Type";

/// Metadata key holding the interface name
pub const NAME_KEY: &str = "Name";

/// Metadata key holding the hardware address
pub const MAC_KEY: &str = "MAC";

/// Metadata key holding the topology id used to tag flows
pub const TID_KEY: &str = "TID";

/// Metadata key holding the kernel/OVS interface index
pub const IF_INDEX_KEY: &str = "IfIndex";

/// String-keyed, string-valued node metadata
pub type Metadata = BTreeMap<String, String>;

/// Identifier of a node in the topology graph
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A node of the topology graph
///
/// Nodes are owned by the [`Graph`](super::Graph). Probes only ever see
/// borrowed `&Node` values for the duration of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Node {
    /// Create a node with empty metadata
    pub fn new(id: impl Into<NodeId>) -> Self {
        Self {
            id: id.into(),
            metadata: Metadata::new(),
        }
    }

    /// Builder-style metadata setter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Get a metadata value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The `"Type"` metadata value, if any
    pub fn node_type(&self) -> Option<&str> {
        self.get(TYPE_KEY)
    }

    /// The `"Name"` metadata value, if any
    pub fn name(&self) -> Option<&str> {
        self.get(NAME_KEY)
    }

    /// Topology id used when tagging flows: `TID` metadata, else the node id
    pub fn tid(&self) -> &str {
        self.get(TID_KEY).unwrap_or(self.id.as_str())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}
