//! Probe type registry and the bundle factory

use super::bundle::FlowProbeBundle;
use super::pcap::{PcapProbesHandler, PCAP_PROBE};
use super::sflow::{OvsSFlowProbesHandler, OVS_SFLOW_PROBE};
use super::FlowProbe;
use crate::analyzer::{resolve_analyzer_client, AnalyzerClient, AnalyzerConnector, UdpConnector};
use crate::config::AgentConfig;
use crate::error::{FlowProbeError, Result};
use crate::flow::TableAllocator;
use crate::pipeline::{FlowEnhancer, FlowEnhancerPipeline, GraphFlowEnhancer, OvsFlowEnhancer};
use crate::topology::{Graph, TopologyProbeBundle};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Everything a probe constructor gets to build its handler
pub struct ProbeContext<'a> {
    /// Registry name being constructed
    pub name: &'a str,
    pub topology: &'a TopologyProbeBundle,
    pub graph: &'a Arc<Graph>,
    /// Graph enhancer followed by the type's own enhancers
    pub pipeline: Arc<FlowEnhancerPipeline>,
    /// Shared analyzer client, `None` in offline mode
    pub analyzer: Option<Arc<AnalyzerClient>>,
    pub allocator: &'a Arc<TableAllocator>,
    pub config: &'a AgentConfig,
}

type EnhancerBuilder = Box<dyn Fn(&Arc<Graph>) -> Vec<Arc<dyn FlowEnhancer>> + Send + Sync>;
type ProbeConstructor = Box<dyn Fn(&ProbeContext<'_>) -> Result<Arc<dyn FlowProbe>> + Send + Sync>;

struct ProbeType {
    enhancers: EnhancerBuilder,
    constructor: ProbeConstructor,
}

/// Catalog of known probe types, keyed by name
pub struct ProbeRegistry {
    types: BTreeMap<String, ProbeType>,
}

impl ProbeRegistry {
    /// A registry with no types at all
    pub fn empty() -> Self {
        Self {
            types: BTreeMap::new(),
        }
    }

    /// Register (or replace) a probe type
    ///
    /// `enhancers` returns the type-specific enhancers, which run after the
    /// shared graph enhancer. `constructor` builds the handler; an error is
    /// reported as a skipped probe and never fails the bundle.
    pub fn register<E, C>(&mut self, name: impl Into<String>, enhancers: E, constructor: C) -> &mut Self
    where
        E: Fn(&Arc<Graph>) -> Vec<Arc<dyn FlowEnhancer>> + Send + Sync + 'static,
        C: Fn(&ProbeContext<'_>) -> Result<Arc<dyn FlowProbe>> + Send + Sync + 'static,
    {
        self.types.insert(
            name.into(),
            ProbeType {
                enhancers: Box::new(enhancers),
                constructor: Box::new(constructor),
            },
        );
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(String::as_str)
    }

    fn get(&self, name: &str) -> Option<&ProbeType> {
        self.types.get(name)
    }
}

impl Default for ProbeRegistry {
    /// Built-in types: `ovssflow` and `pcap`
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(
                OVS_SFLOW_PROBE,
                |graph| vec![Arc::new(OvsFlowEnhancer::new(graph.clone())) as Arc<dyn FlowEnhancer>],
                |ctx| Ok(Arc::new(OvsSFlowProbesHandler::new(ctx)?) as Arc<dyn FlowProbe>),
            )
            .register(
                PCAP_PROBE,
                |_| Vec::new(),
                |ctx| Ok(Arc::new(PcapProbesHandler::new(ctx)?) as Arc<dyn FlowProbe>),
            );
        registry
    }
}

impl fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// A requested probe type left out of the bundle
#[derive(Debug)]
pub struct SkippedProbe {
    pub name: String,
    pub reason: FlowProbeError,
}

/// Builds [`FlowProbeBundle`]s from configuration
pub struct ProbeFactory {
    registry: ProbeRegistry,
    connector: Box<dyn AnalyzerConnector>,
}

impl ProbeFactory {
    pub fn new(registry: ProbeRegistry) -> Self {
        Self {
            registry,
            connector: Box::new(UdpConnector),
        }
    }

    /// Use a custom analyzer connector
    pub fn with_connector(mut self, connector: impl AnalyzerConnector + 'static) -> Self {
        self.connector = Box::new(connector);
        self
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    /// Build the bundle for `config.agent.flow.probes`
    ///
    /// The analyzer client is resolved first; a malformed address or a
    /// failed connection aborts before any probe is constructed. Unknown and
    /// failing types are skipped and listed in [`FlowProbeBundle::skipped`].
    /// Repeated names keep their first occurrence.
    pub fn build(
        &self,
        topology: &TopologyProbeBundle,
        graph: Arc<Graph>,
        allocator: Arc<TableAllocator>,
        config: &AgentConfig,
    ) -> Result<FlowProbeBundle> {
        let requested = config.flow_probes();
        tracing::info!("Flow probes: {:?}", requested);

        let analyzer = resolve_analyzer_client(config, self.connector.as_ref())?;

        let graph_enhancer: Arc<dyn FlowEnhancer> = Arc::new(GraphFlowEnhancer::new(graph.clone()));
        let mut probes: BTreeMap<String, Arc<dyn FlowProbe>> = BTreeMap::new();
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();

        for name in requested {
            if !seen.insert(name.as_str()) {
                tracing::debug!("Flow probe {} requested twice, ignoring", name);
                continue;
            }

            let Some(probe_type) = self.registry.get(name) else {
                tracing::error!("Unknown probe type: {}", name);
                skipped.push(SkippedProbe {
                    name: name.clone(),
                    reason: FlowProbeError::UnknownProbeType(name.clone()),
                });
                continue;
            };

            let mut enhancers = vec![graph_enhancer.clone()];
            enhancers.extend((probe_type.enhancers)(&graph));
            let pipeline = Arc::new(FlowEnhancerPipeline::new(enhancers));

            let ctx = ProbeContext {
                name: name.as_str(),
                topology,
                graph: &graph,
                pipeline,
                analyzer: analyzer.clone(),
                allocator: &allocator,
                config,
            };

            match (probe_type.constructor)(&ctx) {
                Ok(probe) => {
                    tracing::debug!("Flow probe {} created", name);
                    probes.insert(name.clone(), probe);
                }
                Err(e) => {
                    tracing::error!("Failed to create {} probe: {}", name, e);
                    skipped.push(SkippedProbe {
                        name: name.clone(),
                        reason: e,
                    });
                }
            }
        }

        Ok(FlowProbeBundle::new(probes, graph, skipped))
    }
}

impl Default for ProbeFactory {
    fn default() -> Self {
        Self::new(ProbeRegistry::default())
    }
}
