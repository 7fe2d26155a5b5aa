//! The flow probe bundle and its teardown sweep

use super::registry::{ProbeFactory, SkippedProbe};
use super::FlowProbe;
use crate::config::AgentConfig;
use crate::error::{FlowProbeError, Result, ResultExt};
use crate::flow::TableAllocator;
use crate::topology::{Graph, NodeId, TopologyProbeBundle};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of [`FlowProbeBundle::unregister_all_probes`]
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Nodes present when the sweep started
    pub nodes: usize,
    /// Probes in the bundle
    pub probes: usize,
    /// `unregister_probe` calls made, always `nodes * probes`
    pub calls: usize,
    /// One [`FlowProbeError::Teardown`] per failed call
    pub failures: Vec<FlowProbeError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Active flow probes, keyed by type name
pub struct FlowProbeBundle {
    probes: BTreeMap<String, Arc<dyn FlowProbe>>,
    graph: Arc<Graph>,
    skipped: Vec<SkippedProbe>,
}

impl FlowProbeBundle {
    pub fn new(
        probes: BTreeMap<String, Arc<dyn FlowProbe>>,
        graph: Arc<Graph>,
        skipped: Vec<SkippedProbe>,
    ) -> Self {
        Self {
            probes,
            graph,
            skipped,
        }
    }

    /// Build with the built-in probe types and a UDP analyzer connector
    pub fn from_config(
        topology: &TopologyProbeBundle,
        graph: Arc<Graph>,
        allocator: Arc<TableAllocator>,
        config: &AgentConfig,
    ) -> Result<Self> {
        ProbeFactory::default().build(topology, graph, allocator, config)
    }

    pub fn probe(&self, name: &str) -> Option<&Arc<dyn FlowProbe>> {
        self.probes.get(name)
    }

    /// Probe names, sorted
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.probes.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn FlowProbe>)> {
        self.probes.iter().map(|(name, probe)| (name.as_str(), probe))
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    pub fn graph(&self) -> &Arc<Graph> {
        &self.graph
    }

    /// Requested types that were not built, in request order
    pub fn skipped(&self) -> &[SkippedProbe] {
        &self.skipped
    }

    pub fn start(&self) {
        for (name, probe) in &self.probes {
            tracing::debug!("Starting flow probe {}", name);
            probe.start();
        }
    }

    pub fn stop(&self) {
        for (name, probe) in &self.probes {
            tracing::debug!("Stopping flow probe {}", name);
            probe.stop();
        }
    }

    /// Register probe `probe` on the node `node`
    pub fn register_capture(&self, probe: &str, node: &NodeId) -> Result<()> {
        let handler = self
            .probes
            .get(probe)
            .ok_or_else(|| FlowProbeError::UnknownProbeType(probe.to_string()))?;

        let guard = self.graph.lock();
        let node = guard
            .node(node)
            .ok_or_else(|| FlowProbeError::NodeNotFound(node.to_string()))?;
        handler
            .register_probe(node)
            .with_context(|| format!("Unable to register probe {} on {}", probe, node.id))
    }

    /// Forward expired flows of every probe, returns the total
    ///
    /// Enhancers lock the graph, so this must not run inside a sweep.
    pub fn flush_expired(&self, now: DateTime<Utc>) -> usize {
        let mut total = 0;
        for (name, probe) in &self.probes {
            match probe.flush_expired(now) {
                Ok(n) => total += n,
                Err(e) => tracing::warn!("Unable to flush flows of probe {}: {}", name, e),
            }
        }
        total
    }

    /// Unregister every probe from every node
    ///
    /// Holds the graph lock for the whole sweep. Every (node, probe) pair is
    /// visited even when some calls fail; failures are logged and returned in
    /// the report. Probes stay in the bundle.
    pub fn unregister_all_probes(&self) -> TeardownReport {
        let guard = self.graph.lock();
        let mut report = TeardownReport {
            nodes: guard.len(),
            probes: self.probes.len(),
            ..Default::default()
        };

        for node in guard.nodes() {
            for (name, probe) in &self.probes {
                report.calls += 1;
                if let Err(e) = probe.unregister_probe(node) {
                    tracing::warn!("Failed to unregister probe {} from {}: {}", name, node.id, e);
                    report.failures.push(FlowProbeError::Teardown {
                        probe: name.clone(),
                        node: node.id.to_string(),
                        source: Box::new(e),
                    });
                }
            }
        }

        tracing::debug!(
            "Teardown swept {} nodes x {} probes, {} failures",
            report.nodes,
            report.probes,
            report.failures.len()
        );
        report
    }
}

impl fmt::Debug for FlowProbeBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowProbeBundle")
            .field("probes", &self.names().collect::<Vec<_>>())
            .field("skipped", &self.skipped)
            .finish()
    }
}
