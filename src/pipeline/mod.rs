//! Flow enhancement pipeline.
//!
//! Captured flows pass through an ordered chain of enhancers before they
//! leave the agent:
//!
//! ```text
//! [capture] ──► [GraphFlowEnhancer] ──► [type-specific enhancers...] ──► [analyzer]
//! ```
//!
//! # Design
//!
//! - **Topology first**: the graph enhancer always runs first so later
//!   enhancers can rely on the node TIDs it fills in.
//! - **Immutable and shared**: a [`FlowEnhancerPipeline`] is frozen at
//!   construction and shared through `Arc` by the probe that requested it.
//! - **Batch friendly**: enhancers see whole batches so graph-backed ones
//!   take the graph lock once per batch, not once per flow.

pub mod graph_enhancer;
pub mod ovs_enhancer;

pub use graph_enhancer::GraphFlowEnhancer;
pub use ovs_enhancer::OvsFlowEnhancer;

use crate::flow::Flow;
use std::fmt;
use std::sync::Arc;

/// Annotates flows with context the capture itself does not know about
pub trait FlowEnhancer: Send + Sync {
    /// Human-readable name of this enhancer.
    fn name(&self) -> &str;

    /// Enhance a single flow in place.
    fn enhance(&self, flow: &mut Flow);

    /// Enhance a batch. Override to amortize per-batch setup.
    fn enhance_batch(&self, flows: &mut [Flow]) {
        for flow in flows.iter_mut() {
            self.enhance(flow);
        }
    }
}

/// Ordered, immutable chain of enhancers
#[derive(Clone, Default)]
pub struct FlowEnhancerPipeline {
    enhancers: Vec<Arc<dyn FlowEnhancer>>,
}

impl FlowEnhancerPipeline {
    pub fn new(enhancers: Vec<Arc<dyn FlowEnhancer>>) -> Self {
        Self { enhancers }
    }

    /// Run every enhancer over the batch, in declared order
    pub fn enhance(&self, flows: &mut [Flow]) {
        if flows.is_empty() {
            return;
        }
        for enhancer in &self.enhancers {
            enhancer.enhance_batch(flows);
        }
    }

    /// Enhancer names, in order
    pub fn names(&self) -> Vec<&str> {
        self.enhancers.iter().map(|e| e.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.enhancers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enhancers.is_empty()
    }
}

impl fmt::Debug for FlowEnhancerPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowEnhancerPipeline")
            .field("enhancers", &self.names())
            .finish()
    }
}
