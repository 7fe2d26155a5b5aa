//! # flowprobe-rs: flow probe bundle manager
//!
//! The agent side of a network flow collector. Given a topology graph and a
//! configuration, it instantiates the configured flow probe types, wires each
//! one into a flow enhancement pipeline, optionally connects them to a remote
//! analyzer, and tears every probe down against every graph node on shutdown.
//!
//! ## Architecture
//!
//! - **Topology**: a shared, lockable graph of nodes with string metadata
//! - **Probes**: `ovssflow` (sFlow collectors on OVS bridges) and `pcap`
//!   (interface captures), built through a name-keyed registry
//! - **Pipeline**: per-type enhancer chains that tag flows with topology ids
//! - **Analyzer**: an optional UDP client shared by all probes
//!
//! ## Configuration
//!
//! The agent reads `agent.toml` from the platform config directory under
//! `flowprobe-rs`, e.g. `~/.config/flowprobe-rs/agent.toml` on Linux.
//!
//! ## Example
//!
//! ```no_run
//! use flowprobe_rs::{AgentConfig, FlowProbeBundle, Graph, TableAllocator, TopologyProbeBundle};
//! use std::sync::Arc;
//!
//! fn main() -> flowprobe_rs::Result<()> {
//!     let config = AgentConfig::load_default()?;
//!     let graph = Arc::new(Graph::new());
//!     let allocator = Arc::new(TableAllocator::from_config(&config.flow));
//!     let topology = TopologyProbeBundle::new(["netlink", "ovsdb"]);
//!
//!     let bundle = FlowProbeBundle::from_config(&topology, graph, allocator, &config)?;
//!     bundle.start();
//!     // ...
//!     bundle.stop();
//!     let report = bundle.unregister_all_probes();
//!     assert_eq!(report.calls, report.nodes * report.probes);
//!     Ok(())
//! }
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod flow;
pub mod logging;
pub mod pipeline;
pub mod probes;
pub mod topology;

// Re-export commonly used types
pub use analyzer::{AnalyzerAddr, AnalyzerClient, AnalyzerConnector, UdpConnector};
pub use config::AgentConfig;
pub use error::{FlowProbeError, Result};
pub use flow::{Flow, TableAllocator};
pub use probes::{
    is_capture_allowed, FlowProbe, FlowProbeBundle, ProbeFactory, ProbeRegistry, TeardownReport,
};
pub use topology::{Graph, Node, NodeId, TopologyProbeBundle};
