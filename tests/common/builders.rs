//! Test data builders for creating test objects

use flowprobe_rs::config::AgentConfig;
use flowprobe_rs::topology::{IF_INDEX_KEY, MAC_KEY, NAME_KEY, TYPE_KEY};
use flowprobe_rs::{Graph, Node};
use std::sync::Arc;

/// Builder for creating test Nodes
pub struct NodeBuilder {
    node: Node,
}

impl NodeBuilder {
    pub fn new(id: &str) -> Self {
        Self { node: Node::new(id) }
    }

    /// Interface node: `Type` plus `Name` set to the id
    pub fn interface(id: &str, node_type: &str) -> Self {
        Self::new(id).node_type(node_type).name(id)
    }

    pub fn node_type(mut self, node_type: &str) -> Self {
        self.node = self.node.with(TYPE_KEY, node_type);
        self
    }

    pub fn name(mut self, name: &str) -> Self {
        self.node = self.node.with(NAME_KEY, name);
        self
    }

    pub fn mac(mut self, mac: &str) -> Self {
        self.node = self.node.with(MAC_KEY, mac);
        self
    }

    pub fn if_index(mut self, if_index: u32) -> Self {
        self.node = self.node.with(IF_INDEX_KEY, if_index.to_string());
        self
    }

    pub fn build(self) -> Node {
        self.node
    }
}

/// Builder for creating shared test graphs
#[derive(Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(mut self, node: NodeBuilder) -> Self {
        self.nodes.push(node.build());
        self
    }

    /// Add `count` device nodes named `{prefix}{i}`
    pub fn devices(mut self, prefix: &str, count: usize) -> Self {
        for i in 0..count {
            let id = format!("{}{}", prefix, i);
            self.nodes.push(NodeBuilder::interface(&id, "device").build());
        }
        self
    }

    pub fn build(self) -> Arc<Graph> {
        Arc::new(Graph::with_nodes(self.nodes))
    }
}

/// Builder for agent configurations
pub struct ConfigBuilder {
    config: AgentConfig,
}

impl ConfigBuilder {
    /// Offline configuration requesting `probes`
    pub fn new(probes: &[&str]) -> Self {
        let mut config = AgentConfig::default();
        config.agent.flow.probes = probes.iter().map(|p| p.to_string()).collect();
        config.agent.flow.sflow.bind_address = "127.0.0.1".to_string();
        config.agent.flow.sflow.port_min = 41_000;
        config.agent.flow.sflow.port_max = 41_999;
        Self { config }
    }

    pub fn analyzer(mut self, addr: &str) -> Self {
        self.config.analyzers = vec![addr.to_string()];
        self
    }

    pub fn snaplen(mut self, snaplen: u32) -> Self {
        self.config.agent.flow.pcap.snaplen = snaplen;
        self
    }

    pub fn build(self) -> AgentConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_builder() {
        let node = NodeBuilder::interface("eth0", "device")
            .mac("aa:00:00:00:00:01")
            .if_index(3)
            .build();

        assert_eq!(node.node_type(), Some("device"));
        assert_eq!(node.name(), Some("eth0"));
        assert_eq!(node.get(IF_INDEX_KEY), Some("3"));
    }
}
