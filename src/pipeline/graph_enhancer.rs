//! Topology enhancer: tags flow endpoints with their graph nodes.

use super::FlowEnhancer;
use crate::flow::Flow;
use crate::topology::{Graph, GraphGuard, MAC_KEY};
use std::sync::Arc;

/// Fills `a_node_tid` / `b_node_tid` from link-layer addresses
///
/// Each endpoint MAC is matched against node `MAC` metadata. Already-set
/// TIDs are left alone.
pub struct GraphFlowEnhancer {
    graph: Arc<Graph>,
}

impl GraphFlowEnhancer {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    fn tid_for_mac(guard: &GraphGuard<'_>, mac: &str) -> Option<String> {
        guard.find_node(MAC_KEY, mac).map(|n| n.tid().to_string())
    }

    fn enhance_locked(guard: &GraphGuard<'_>, flow: &mut Flow) {
        let Some(link) = flow.link.as_ref() else {
            return;
        };

        if flow.a_node_tid.is_none() {
            flow.a_node_tid = Self::tid_for_mac(guard, &link.a);
        }
        if flow.b_node_tid.is_none() {
            flow.b_node_tid = Self::tid_for_mac(guard, &link.b);
        }
    }
}

impl FlowEnhancer for GraphFlowEnhancer {
    fn name(&self) -> &str {
        "graph"
    }

    fn enhance(&self, flow: &mut Flow) {
        let guard = self.graph.lock();
        Self::enhance_locked(&guard, flow);
    }

    fn enhance_batch(&self, flows: &mut [Flow]) {
        let guard = self.graph.lock();
        for flow in flows.iter_mut() {
            Self::enhance_locked(&guard, flow);
        }
    }
}
