use crate::analyzer::AnalyzerClient;
use crate::error::Result;
use crate::flow::Flow;
use crate::pipeline::FlowEnhancerPipeline;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Enhances flow batches and sends them to the analyzer, if any
///
/// Every probe handler owns one. Without an analyzer client, flows are
/// enhanced and dropped (offline mode).
#[derive(Debug)]
pub struct FlowForwarder {
    pipeline: Arc<FlowEnhancerPipeline>,
    analyzer: Option<Arc<AnalyzerClient>>,
    forwarded: AtomicU64,
}

impl FlowForwarder {
    pub fn new(pipeline: Arc<FlowEnhancerPipeline>, analyzer: Option<Arc<AnalyzerClient>>) -> Self {
        Self {
            pipeline,
            analyzer,
            forwarded: AtomicU64::new(0),
        }
    }

    pub fn pipeline(&self) -> &FlowEnhancerPipeline {
        &self.pipeline
    }

    pub fn has_analyzer(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Enhance and send a batch, returns the batch size
    pub fn forward(&self, mut flows: Vec<Flow>) -> Result<usize> {
        if flows.is_empty() {
            return Ok(0);
        }

        self.pipeline.enhance(&mut flows);
        let count = flows.len();
        self.forwarded.fetch_add(count as u64, Ordering::Relaxed);

        if let Some(analyzer) = &self.analyzer {
            analyzer.send_flows(&flows)?;
        }
        Ok(count)
    }

    /// Flows that went through the pipeline so far
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }
}
