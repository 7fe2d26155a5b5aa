//! Mock construction helpers

use flowprobe_rs::{FlowProbe, FlowProbeError, Graph, Node, NodeId, ProbeRegistry, Result};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Probe that records every call it receives
///
/// When built with a graph it also checks, on each unregister call, that
/// the graph lock is held by someone else (the teardown sweep).
#[derive(Default)]
pub struct RecordingProbe {
    graph: Option<Arc<Graph>>,
    fail_on: Option<NodeId>,
    registered: Mutex<Vec<NodeId>>,
    unregistered: Mutex<Vec<NodeId>>,
    unlocked_calls: AtomicUsize,
}

impl RecordingProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watching(graph: Arc<Graph>) -> Self {
        Self {
            graph: Some(graph),
            ..Self::default()
        }
    }

    /// Fail unregistering from `node`
    pub fn failing_on(mut self, node: &str) -> Self {
        self.fail_on = Some(NodeId::new(node));
        self
    }

    pub fn registered(&self) -> Vec<NodeId> {
        self.registered.lock().unwrap().clone()
    }

    pub fn unregistered(&self) -> Vec<NodeId> {
        self.unregistered.lock().unwrap().clone()
    }

    /// Unregister calls made while the graph was not locked
    pub fn unlocked_calls(&self) -> usize {
        self.unlocked_calls.load(Ordering::SeqCst)
    }
}

impl FlowProbe for RecordingProbe {
    fn register_probe(&self, node: &Node) -> Result<()> {
        self.registered.lock().unwrap().push(node.id.clone());
        Ok(())
    }

    fn unregister_probe(&self, node: &Node) -> Result<()> {
        if let Some(graph) = &self.graph {
            if graph.try_lock().is_some() {
                self.unlocked_calls.fetch_add(1, Ordering::SeqCst);
            }
        }
        self.unregistered.lock().unwrap().push(node.id.clone());

        if self.fail_on.as_ref() == Some(&node.id) {
            return Err(FlowProbeError::Capture(format!("{} is busy", node.id)));
        }
        Ok(())
    }
}

/// Register `name` so every construction hands out a clone of `probe`
pub fn register_recording(registry: &mut ProbeRegistry, name: &str, probe: Arc<RecordingProbe>) {
    registry.register(name, |_| Vec::new(), move |_| {
        Ok(probe.clone() as Arc<dyn FlowProbe>)
    });
}
