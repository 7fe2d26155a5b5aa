//! The shared topology graph
//!
//! A [`Graph`] is created once at startup and shared through `Arc` by every
//! subsystem. A single exclusive lock governs it: [`Graph::lock`] returns a
//! [`GraphGuard`] that stays valid until dropped, so any traversal of "all
//! nodes" done through one guard sees a consistent snapshot.
//!
//! The lock is not reentrant. Code running while a guard is held (for example
//! probe teardown callbacks) must not call back into [`Graph::lock`].

use super::node::{Node, NodeId};
use crate::error::{FlowProbeError, Result};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

#[derive(Debug, Default)]
struct GraphData {
    nodes: BTreeMap<NodeId, Node>,
}

/// Lockable container of topology nodes
#[derive(Debug, Default)]
pub struct Graph {
    data: Mutex<GraphData>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a graph seeded with `nodes`
    pub fn with_nodes(nodes: impl IntoIterator<Item = Node>) -> Self {
        let graph = Self::new();
        {
            let mut guard = graph.lock();
            for node in nodes {
                guard.add_node(node);
            }
        }
        graph
    }

    /// Acquire the exclusive graph lock
    ///
    /// A lock poisoned by a panicking holder is recovered: graph data is a
    /// plain map and stays structurally valid.
    pub fn lock(&self) -> GraphGuard<'_> {
        let inner = self.data.lock().unwrap_or_else(|poisoned: PoisonError<_>| {
            tracing::warn!("Topology graph lock was poisoned, recovering");
            poisoned.into_inner()
        });
        GraphGuard { inner }
    }

    /// Acquire the lock only if nobody else holds it
    pub fn try_lock(&self) -> Option<GraphGuard<'_>> {
        match self.data.try_lock() {
            Ok(inner) => Some(GraphGuard { inner }),
            Err(TryLockError::Poisoned(poisoned)) => Some(GraphGuard {
                inner: poisoned.into_inner(),
            }),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    /// Insert or replace a node
    pub fn add_node(&self, node: Node) -> Option<Node> {
        self.lock().add_node(node)
    }

    /// Remove a node
    pub fn del_node(&self, id: &NodeId) -> Option<Node> {
        self.lock().del_node(id)
    }

    /// Clone a node out of the graph
    pub fn get_node(&self, id: &NodeId) -> Option<Node> {
        self.lock().node(id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.lock().len()
    }
}

/// Scoped exclusive access to the graph
///
/// Dropping the guard releases the lock, on every exit path.
pub struct GraphGuard<'a> {
    inner: MutexGuard<'a, GraphData>,
}

impl GraphGuard<'_> {
    /// Iterate all nodes, ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.inner.nodes.values()
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.inner.nodes.get(id)
    }

    /// First node whose metadata `key` equals `value`
    pub fn find_node(&self, key: &str, value: &str) -> Option<&Node> {
        self.nodes().find(|n| n.get(key) == Some(value))
    }

    pub fn add_node(&mut self, node: Node) -> Option<Node> {
        self.inner.nodes.insert(node.id.clone(), node)
    }

    pub fn del_node(&mut self, id: &NodeId) -> Option<Node> {
        self.inner.nodes.remove(id)
    }

    /// Set one metadata entry, returns false if the node does not exist
    pub fn set_metadata(
        &mut self,
        id: &NodeId,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        match self.inner.nodes.get_mut(id) {
            Some(node) => {
                node.metadata.insert(key.into(), value.into());
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.nodes.is_empty()
    }
}

/// Load a static topology from a JSON array of nodes
pub fn load_nodes(path: impl AsRef<Path>) -> Result<Vec<Node>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        FlowProbeError::Config(format!(
            "Failed to read topology file {:?}: {}",
            path, e
        ))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        FlowProbeError::Config(format!(
            "Failed to parse topology file {:?}: {}",
            path, e
        ))
    })
}
