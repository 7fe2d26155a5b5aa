//! Flow records and flow tables
//!
//! A [`Flow`] is the unit every probe produces and every enhancer annotates.
//! Probes keep live flows in a [`Table`] obtained from the shared
//! [`TableAllocator`]; the probe bundle itself never looks inside tables.

pub mod table;

pub use table::{Table, TableAllocator};

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A pair of endpoints for one protocol layer (A → B)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowEndpoints {
    pub a: String,
    pub b: String,
}

impl FlowEndpoints {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            a: a.into(),
            b: b.into(),
        }
    }
}

/// Packet and byte counters in both directions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMetric {
    pub ab_packets: u64,
    pub ab_bytes: u64,
    pub ba_packets: u64,
    pub ba_bytes: u64,
}

impl FlowMetric {
    /// Accumulate another metric into this one, saturating at `u64::MAX`
    pub fn add(&mut self, other: &FlowMetric) {
        self.ab_packets = self.ab_packets.saturating_add(other.ab_packets);
        self.ab_bytes = self.ab_bytes.saturating_add(other.ab_bytes);
        self.ba_packets = self.ba_packets.saturating_add(other.ba_packets);
        self.ba_bytes = self.ba_bytes.saturating_add(other.ba_bytes);
    }
}

/// A captured flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flow {
    /// Stable identifier derived from the layers path and endpoints
    pub uuid: String,
    /// Protocol stack, e.g. `Ethernet/IPv4/TCP`
    pub layers_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<FlowEndpoints>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<FlowEndpoints>,
    /// Input interface index reported by an sFlow agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_index: Option<u32>,
    /// Topology id of the node the flow was captured on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_tid: Option<String>,
    /// Topology id of the A-side endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a_node_tid: Option<String>,
    /// Topology id of the B-side endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b_node_tid: Option<String>,
    #[serde(default)]
    pub metric: FlowMetric,
    /// First packet, ms since the Unix epoch
    pub start: i64,
    /// Last packet, ms since the Unix epoch
    pub last: i64,
}

impl Flow {
    /// Create a flow seen at `timestamp_ms`
    pub fn new(
        layers_path: impl Into<String>,
        link: Option<FlowEndpoints>,
        network: Option<FlowEndpoints>,
        timestamp_ms: i64,
    ) -> Self {
        let layers_path = layers_path.into();
        let uuid = flow_uuid(&layers_path, link.as_ref(), network.as_ref());
        Self {
            uuid,
            layers_path,
            link,
            network,
            if_index: None,
            node_tid: None,
            a_node_tid: None,
            b_node_tid: None,
            metric: FlowMetric::default(),
            start: timestamp_ms,
            last: timestamp_ms,
        }
    }

    pub fn with_if_index(mut self, if_index: u32) -> Self {
        self.if_index = Some(if_index);
        self
    }

    pub fn with_metric(mut self, metric: FlowMetric) -> Self {
        self.metric = metric;
        self
    }

    /// Merge a later observation of the same flow
    pub fn merge(&mut self, other: &Flow) {
        self.metric.add(&other.metric);
        self.start = self.start.min(other.start);
        self.last = self.last.max(other.last);
        if self.if_index.is_none() {
            self.if_index = other.if_index;
        }
    }
}

fn flow_uuid(
    layers_path: &str,
    link: Option<&FlowEndpoints>,
    network: Option<&FlowEndpoints>,
) -> String {
    let mut hasher = DefaultHasher::new();
    layers_path.hash(&mut hasher);
    link.hash(&mut hasher);
    network.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
