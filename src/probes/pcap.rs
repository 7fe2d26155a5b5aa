//! Packet capture probe handler
//!
//! Attaches a capture to the interface behind any capture-eligible node.
//! The capture itself is described (interface, snaplen, promiscuous mode)
//! and its flows are accumulated in a per-interface table.

use super::capture::{Capture, Captures};
use super::registry::ProbeContext;
use super::{is_capture_allowed, FlowForwarder, FlowProbe};
use crate::config::{PcapSettings, MAX_SNAPLEN};
use crate::error::{FlowProbeError, Result};
use crate::flow::{Flow, TableAllocator};
use crate::topology::{Node, NodeId};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Registry name of the packet capture probe
pub const PCAP_PROBE: &str = "pcap";

/// Description of an active interface capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcapCapture {
    pub interface: String,
    pub snaplen: u32,
    pub promiscuous: bool,
    pub started_at: DateTime<Utc>,
}

/// `pcap` handler
pub struct PcapProbesHandler {
    forwarder: FlowForwarder,
    allocator: Arc<TableAllocator>,
    settings: PcapSettings,
    captures: Captures<PcapCapture>,
}

impl PcapProbesHandler {
    pub fn new(ctx: &ProbeContext<'_>) -> Result<Self> {
        let settings = ctx.config.agent.flow.pcap.clone();
        if settings.snaplen == 0 || settings.snaplen > MAX_SNAPLEN {
            return Err(FlowProbeError::ProbeConstruction {
                probe: PCAP_PROBE.to_string(),
                reason: format!(
                    "snaplen {} out of range 1..={}",
                    settings.snaplen, MAX_SNAPLEN
                ),
            });
        }

        Ok(Self {
            forwarder: FlowForwarder::new(ctx.pipeline.clone(), ctx.analyzer.clone()),
            allocator: ctx.allocator.clone(),
            settings,
            captures: Captures::new(),
        })
    }

    pub fn forwarder(&self) -> &FlowForwarder {
        &self.forwarder
    }

    pub fn registered_nodes(&self) -> Vec<NodeId> {
        self.captures.node_ids()
    }

    pub fn capture(&self, node: &NodeId) -> Option<PcapCapture> {
        self.captures.with_state(node, PcapCapture::clone)
    }

    pub fn ingest(&self, node: &NodeId, flows: Vec<Flow>) -> Result<()> {
        self.captures.ingest(node, flows)
    }

    pub fn flush_all(&self) -> Result<usize> {
        self.forwarder.forward(self.captures.drain())
    }
}

impl FlowProbe for PcapProbesHandler {
    fn register_probe(&self, node: &Node) -> Result<()> {
        if !is_capture_allowed(node) {
            return Err(FlowProbeError::Capture(format!(
                "node {} of type {:?} does not support capture",
                node.id,
                node.node_type()
            )));
        }
        let interface = node
            .name()
            .ok_or_else(|| FlowProbeError::Capture(format!("node {} has no interface name", node.id)))?;

        if self.captures.contains(&node.id) {
            tracing::debug!("Capture already running on {}", interface);
            return Ok(());
        }

        let capture = PcapCapture {
            interface: interface.to_string(),
            snaplen: self.settings.snaplen,
            promiscuous: self.settings.promiscuous,
            started_at: Utc::now(),
        };
        let (snaplen, promiscuous) = (capture.snaplen, capture.promiscuous);
        let rejected = self.captures.insert_if_absent(
            node.id.clone(),
            Capture {
                table: self.allocator.alloc(),
                state: capture,
            },
        );
        if rejected.is_some() {
            tracing::debug!("Capture already running on {}", interface);
            return Ok(());
        }

        tracing::info!(
            "Packet capture started on {} (snaplen {}, promiscuous {})",
            interface,
            snaplen,
            promiscuous
        );
        Ok(())
    }

    fn unregister_probe(&self, node: &Node) -> Result<()> {
        if let Some(capture) = self.captures.remove(&node.id) {
            tracing::info!("Packet capture stopped on {}", capture.state.interface);
        }
        Ok(())
    }

    fn flush_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.forwarder.forward(self.captures.expired(now))
    }

    fn stop(&self) {
        if let Err(e) = self.flush_all() {
            tracing::warn!("Unable to flush captured flows: {}", e);
        }
        let stopped = self.captures.take_all().len();
        tracing::debug!("Stopped {} packet captures", stopped);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentConfig;
    use crate::flow::FlowEndpoints;
    use crate::pipeline::FlowEnhancerPipeline;
    use crate::topology::{Graph, TopologyProbeBundle, NAME_KEY, TYPE_KEY};

    fn handler_with(config: &AgentConfig, allocator: &Arc<TableAllocator>) -> Result<PcapProbesHandler> {
        let topology = TopologyProbeBundle::default();
        let graph = Arc::new(Graph::new());
        PcapProbesHandler::new(&ProbeContext {
            name: PCAP_PROBE,
            topology: &topology,
            graph: &graph,
            pipeline: Arc::new(FlowEnhancerPipeline::default()),
            analyzer: None,
            allocator,
            config,
        })
    }

    fn iface(id: &str, node_type: &str) -> Node {
        Node::new(id).with(TYPE_KEY, node_type).with(NAME_KEY, id)
    }

    #[test]
    fn test_snaplen_validation() {
        let allocator = Arc::new(TableAllocator::default());
        let mut config = AgentConfig::default();
        assert!(handler_with(&config, &allocator).is_ok());

        config.agent.flow.pcap.snaplen = 0;
        assert!(handler_with(&config, &allocator).is_err());

        config.agent.flow.pcap.snaplen = MAX_SNAPLEN + 1;
        assert!(handler_with(&config, &allocator).is_err());
    }

    #[test]
    fn test_register_eligible_nodes_only() {
        let allocator = Arc::new(TableAllocator::default());
        let handler = handler_with(&AgentConfig::default(), &allocator).unwrap();

        handler.register_probe(&iface("eth0", "device")).unwrap();
        handler.register_probe(&iface("veth0", "veth")).unwrap();
        assert!(handler.register_probe(&iface("ns1", "netns")).is_err());
        assert!(handler
            .register_probe(&Node::new("noname").with(TYPE_KEY, "device"))
            .is_err());

        assert_eq!(handler.registered_nodes().len(), 2);
        assert_eq!(allocator.live_tables(), 2);

        let capture = handler.capture(&NodeId::new("eth0")).unwrap();
        assert_eq!(capture.interface, "eth0");
        assert_eq!(capture.snaplen, crate::config::DEFAULT_SNAPLEN);
        assert!(capture.promiscuous);
    }

    #[test]
    fn test_unregister_releases_table() {
        let allocator = Arc::new(TableAllocator::default());
        let handler = handler_with(&AgentConfig::default(), &allocator).unwrap();
        let eth0 = iface("eth0", "device");

        handler.register_probe(&eth0).unwrap();
        handler.unregister_probe(&eth0).unwrap();
        handler.unregister_probe(&eth0).unwrap();
        assert!(handler.registered_nodes().is_empty());
        assert_eq!(allocator.live_tables(), 0);
    }

    #[test]
    fn test_stop_flushes_pending_flows() {
        let allocator = Arc::new(TableAllocator::default());
        let handler = handler_with(&AgentConfig::default(), &allocator).unwrap();
        let eth0 = iface("eth0", "device");
        handler.register_probe(&eth0).unwrap();

        let flow = Flow::new(
            "IPv4",
            None,
            Some(FlowEndpoints::new("10.0.0.1", "10.0.0.2")),
            Utc::now().timestamp_millis(),
        );
        handler.ingest(&eth0.id, vec![flow]).unwrap();
        assert_eq!(handler.flush_expired(Utc::now()).unwrap(), 0);

        handler.stop();
        assert_eq!(handler.forwarder().forwarded(), 1);
        assert!(handler.registered_nodes().is_empty());
    }
}
