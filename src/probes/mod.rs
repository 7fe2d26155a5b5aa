//! Flow probes and the probe bundle
//!
//! This module turns a list of configured probe type names into a running
//! set of capture handlers, and tears them down again.
//!
//! # Architecture
//!
//! ```text
//!   agent.flow.probes ──► ProbeFactory ──► FlowProbeBundle { name → dyn FlowProbe }
//!                            │
//!                            ├── ProbeRegistry   (name → enhancers + constructor)
//!                            ├── AnalyzerConnector (resolved once, shared)
//!                            └── TableAllocator  (passed through)
//! ```
//!
//! # Probe types
//!
//! | Name       | Handler                   | Extra enhancers    |
//! |------------|---------------------------|--------------------|
//! | `ovssflow` | [`OvsSFlowProbesHandler`] | [`OvsFlowEnhancer`](crate::pipeline::OvsFlowEnhancer) |
//! | `pcap`     | [`PcapProbesHandler`]     | none               |
//!
//! New types are added with [`ProbeRegistry::register`].

mod bundle;
mod capture;
mod eligibility;
mod forwarder;
mod pcap;
mod registry;
mod sflow;

pub use bundle::{FlowProbeBundle, TeardownReport};
pub use eligibility::{is_capture_allowed, CAPTURE_ALLOWED_TYPES};
pub use forwarder::FlowForwarder;
pub use pcap::{PcapProbesHandler, PCAP_PROBE};
pub use registry::{ProbeContext, ProbeFactory, ProbeRegistry, SkippedProbe};
pub use sflow::{OvsSFlowProbesHandler, OVS_SFLOW_PROBE};

use crate::error::Result;
use crate::topology::Node;
use chrono::{DateTime, Utc};

/// A flow capture handler attachable to topology nodes
///
/// Implementations own their capture resources (sockets, threads, tables)
/// but never the graph or its nodes.
///
/// `register_probe` and `unregister_probe` may be called while the graph
/// lock is held and must not lock the graph themselves.
#[cfg_attr(test, mockall::automock)]
pub trait FlowProbe: Send + Sync {
    /// Start capturing on `node`
    fn register_probe(&self, node: &Node) -> Result<()>;

    /// Stop capturing on `node`
    ///
    /// Must succeed as a no-op when nothing is registered on `node`.
    fn unregister_probe(&self, node: &Node) -> Result<()>;

    /// Forward flows idle since before the expire delay, returns how many
    fn flush_expired(&self, _now: DateTime<Utc>) -> Result<usize> {
        Ok(0)
    }

    /// Called once when the bundle starts
    fn start(&self) {}

    /// Called once when the bundle stops
    fn stop(&self) {}
}
