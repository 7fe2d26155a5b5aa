//! OVS sFlow probe handler
//!
//! Each registered OVS bridge gets a UDP collector socket that its sFlow
//! agent exports to. Collector ports are taken from the configured range,
//! first free port wins.
//!
//! # Threading
//!
//! One receive thread per bridge. The socket uses a short read timeout so
//! the thread can notice the stop signal sent over a crossbeam channel:
//!
//! ```text
//! register_probe ──► bind socket ──► spawn "sflow-<node>" ──► loop { recv, count }
//! unregister_probe ──► stop_tx.send(()) ──► join
//! ```

use super::capture::{Capture, Captures};
use super::registry::ProbeContext;
use super::{FlowForwarder, FlowProbe};
use crate::config::SFlowSettings;
use crate::error::{FlowProbeError, Result, ResultExt};
use crate::flow::{Flow, TableAllocator};
use crate::topology::{Node, NodeId, OVSDB_TOPOLOGY_PROBE};
use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Registry name of the OVS sFlow probe
pub const OVS_SFLOW_PROBE: &str = "ovssflow";

/// Node type the sFlow probe attaches to
const OVS_BRIDGE_TYPE: &str = "ovsbridge";

/// Receive timeout, bounds how long a stop request may wait
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Largest sFlow datagram we accept
const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Collector counters, updated by the receive thread
#[derive(Debug, Default)]
pub struct CollectorStats {
    datagrams: AtomicU64,
    bytes: AtomicU64,
}

impl CollectorStats {
    pub fn datagrams(&self) -> u64 {
        self.datagrams.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

/// Running collector for one bridge
struct SFlowAgent {
    port: u16,
    stats: Arc<CollectorStats>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl SFlowAgent {
    fn stop(mut self, node: &NodeId) -> Result<()> {
        // the receiver may already be gone if the thread exited on error
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| {
                FlowProbeError::Capture(format!("sFlow collector thread for {} panicked", node))
            })?;
        }
        tracing::info!("sFlow collector for {} stopped (port {})", node, self.port);
        Ok(())
    }
}

/// `ovssflow` handler
pub struct OvsSFlowProbesHandler {
    forwarder: FlowForwarder,
    allocator: Arc<TableAllocator>,
    settings: SFlowSettings,
    agents: Captures<SFlowAgent>,
}

impl OvsSFlowProbesHandler {
    /// Build the handler
    ///
    /// Fails without an active OVSDB topology probe, since bridges would
    /// never show up in the graph, or when the port range is empty.
    pub fn new(ctx: &ProbeContext<'_>) -> Result<Self> {
        let construction_error = |reason: String| FlowProbeError::ProbeConstruction {
            probe: OVS_SFLOW_PROBE.to_string(),
            reason,
        };

        if !ctx.topology.has_probe(OVSDB_TOPOLOGY_PROBE) {
            return Err(construction_error(format!(
                "requires the `{}` topology probe",
                OVSDB_TOPOLOGY_PROBE
            )));
        }

        let settings = ctx.config.agent.flow.sflow.clone();
        if settings.port_min > settings.port_max {
            return Err(construction_error(format!(
                "empty port range {}..={}",
                settings.port_min, settings.port_max
            )));
        }

        Ok(Self {
            forwarder: FlowForwarder::new(ctx.pipeline.clone(), ctx.analyzer.clone()),
            allocator: ctx.allocator.clone(),
            settings,
            agents: Captures::new(),
        })
    }

    pub fn forwarder(&self) -> &FlowForwarder {
        &self.forwarder
    }

    /// Bridges with a running collector
    pub fn registered_nodes(&self) -> Vec<NodeId> {
        self.agents.node_ids()
    }

    /// Collector port bound for `node`
    pub fn collector_port(&self, node: &NodeId) -> Option<u16> {
        self.agents.with_state(node, |a| a.port)
    }

    /// Collector counters for `node`
    pub fn collector_stats(&self, node: &NodeId) -> Option<Arc<CollectorStats>> {
        self.agents.with_state(node, |a| a.stats.clone())
    }

    /// Feed decoded flows for the bridge `node`
    pub fn ingest(&self, node: &NodeId, flows: Vec<Flow>) -> Result<()> {
        self.agents.ingest(node, flows)
    }

    /// Forward every buffered flow
    pub fn flush_all(&self) -> Result<usize> {
        self.forwarder.forward(self.agents.drain())
    }

    fn bind_collector(&self) -> Result<UdpSocket> {
        let addr = self.settings.bind_address.as_str();
        for port in self.settings.port_min..=self.settings.port_max {
            match UdpSocket::bind((addr, port)) {
                Ok(socket) => return Ok(socket),
                Err(e) => tracing::debug!("sFlow port {}:{} unavailable: {}", addr, port, e),
            }
        }
        Err(FlowProbeError::Capture(format!(
            "no free sFlow port in {}..={} on {}",
            self.settings.port_min, self.settings.port_max, addr
        )))
    }
}

fn receive_loop(socket: UdpSocket, stats: Arc<CollectorStats>, stop_rx: Receiver<()>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                stats.datagrams.fetch_add(1, Ordering::Relaxed);
                stats.bytes.fetch_add(len as u64, Ordering::Relaxed);
                tracing::trace!("sFlow datagram from {} ({} bytes)", from, len);
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(e) => {
                tracing::warn!("sFlow collector receive error: {}", e);
                break;
            }
        }
    }
}

impl FlowProbe for OvsSFlowProbesHandler {
    fn register_probe(&self, node: &Node) -> Result<()> {
        if node.node_type() != Some(OVS_BRIDGE_TYPE) {
            return Err(FlowProbeError::Capture(format!(
                "sFlow capture needs an {} node, {} is {:?}",
                OVS_BRIDGE_TYPE,
                node.id,
                node.node_type()
            )));
        }
        if self.agents.contains(&node.id) {
            tracing::debug!("sFlow collector already running for {}", node.id);
            return Ok(());
        }

        let socket = self
            .bind_collector()
            .with_context(|| format!("sFlow collector for {}", node.id))?;
        socket.set_read_timeout(Some(RECV_TIMEOUT))?;
        let port = socket.local_addr()?.port();

        let stats = Arc::new(CollectorStats::default());
        let (stop_tx, stop_rx) = bounded(1);
        let handle = {
            let stats = stats.clone();
            std::thread::Builder::new()
                .name(format!("sflow-{}", node.id))
                .spawn(move || receive_loop(socket, stats, stop_rx))?
        };

        let rejected = self.agents.insert_if_absent(
            node.id.clone(),
            Capture {
                table: self.allocator.alloc(),
                state: SFlowAgent {
                    port,
                    stats,
                    stop_tx,
                    handle: Some(handle),
                },
            },
        );
        if let Some(rejected) = rejected {
            // registered concurrently, keep the collector that won
            tracing::debug!("sFlow collector already running for {}", node.id);
            return rejected.state.stop(&node.id);
        }

        tracing::info!("sFlow collector for {} listening on port {}", node.id, port);
        Ok(())
    }

    fn unregister_probe(&self, node: &Node) -> Result<()> {
        match self.agents.remove(&node.id) {
            Some(capture) => capture.state.stop(&node.id),
            None => Ok(()),
        }
    }

    fn flush_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.forwarder.forward(self.agents.expired(now))
    }

    fn start(&self) {
        tracing::debug!(
            "sFlow handler ready, ports {}..={}",
            self.settings.port_min,
            self.settings.port_max
        );
    }

    fn stop(&self) {
        if let Err(e) = self.flush_all() {
            tracing::warn!("Unable to flush sFlow flows: {}", e);
        }
        for (id, capture) in self.agents.take_all() {
            if let Err(e) = capture.state.stop(&id) {
                tracing::warn!("{}", e);
            }
        }
    }
}
