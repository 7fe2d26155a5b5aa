//! OVS enhancer: maps sFlow interface indexes to bridge ports.

use super::FlowEnhancer;
use crate::flow::Flow;
use crate::topology::{Graph, GraphGuard, IF_INDEX_KEY};
use std::sync::Arc;

/// Sets `node_tid` for flows reported by an OVS sFlow agent
///
/// The agent reports the input port as an interface index. The node whose
/// `IfIndex` metadata matches becomes the capture node. When no port
/// matches, the A-side TID filled in by the topology enhancer is used.
pub struct OvsFlowEnhancer {
    graph: Arc<Graph>,
}

impl OvsFlowEnhancer {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self { graph }
    }

    fn enhance_locked(guard: &GraphGuard<'_>, flow: &mut Flow) {
        if flow.node_tid.is_some() {
            return;
        }

        let port_tid = flow.if_index.and_then(|idx| {
            guard
                .find_node(IF_INDEX_KEY, &idx.to_string())
                .map(|n| n.tid().to_string())
        });

        flow.node_tid = port_tid.or_else(|| flow.a_node_tid.clone());
    }
}

impl FlowEnhancer for OvsFlowEnhancer {
    fn name(&self) -> &str {
        "ovs"
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
