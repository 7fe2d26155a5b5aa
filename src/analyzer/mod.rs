//! Analyzer client
//!
//! The analyzer is the remote service that ingests enhanced flows. The agent
//! keeps at most one client for the whole probe bundle:
//!
//! - [`AnalyzerAddr`] - a parsed `host:port` endpoint
//! - [`AnalyzerConnector`] - opens a client for an address (UDP by default)
//! - [`AnalyzerClient`] - the shared handle probes send flows through
//! - [`resolve_analyzer_client`] - config → `Option<Arc<AnalyzerClient>>`
//!
//! Flows are sent one JSON document per datagram.

use crate::config::AgentConfig;
use crate::error::{FlowProbeError, Result};
use crate::flow::Flow;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// ==================== Address ====================

/// Analyzer endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzerAddr {
    pub host: String,
    pub port: u16,
}

impl AnalyzerAddr {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `host:port` (`[v6]:port` for IPv6 literals)
    ///
    /// An empty or blank entry yields `Ok(None)`.
    pub fn parse(entry: &str) -> Result<Option<Self>> {
        let entry = entry.trim();
        if entry.is_empty() {
            return Ok(None);
        }

        let (host, port) = entry.rsplit_once(':').ok_or_else(|| {
            FlowProbeError::Config(format!("analyzer address `{}` is missing a port", entry))
        })?;

        let host = match host.strip_prefix('[') {
            Some(rest) => rest.strip_suffix(']').ok_or_else(|| {
                FlowProbeError::Config(format!("analyzer address `{}` has an unclosed bracket", entry))
            })?,
            None if host.contains(':') => {
                return Err(FlowProbeError::Config(format!(
                    "analyzer address `{}` must bracket IPv6 hosts",
                    entry
                )))
            }
            None => host,
        };

        if host.is_empty() {
            return Err(FlowProbeError::Config(format!(
                "analyzer address `{}` has an empty host",
                entry
            )));
        }

        let port: u16 = port.parse().map_err(|e| {
            FlowProbeError::Config(format!("analyzer address `{}` has an invalid port: {}", entry, e))
        })?;
        if port == 0 {
            return Err(FlowProbeError::Config(format!(
                "analyzer address `{}` has port 0",
                entry
            )));
        }

        Ok(Some(Self::new(host, port)))
    }
}

impl fmt::Display for AnalyzerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

// ==================== Client ====================

/// Connection to the analyzer, shared read-only by every probe
#[derive(Debug)]
pub struct AnalyzerClient {
    addr: AnalyzerAddr,
    socket: UdpSocket,
    flows_sent: AtomicU64,
}

impl AnalyzerClient {
    /// Open a UDP client to `addr`
    pub fn connect(addr: &AnalyzerAddr) -> Result<Self> {
        let connection_error = |source: std::io::Error| FlowProbeError::Connection {
            addr: addr.to_string(),
            source,
        };

        let remote: SocketAddr = (addr.host.as_str(), addr.port)
            .to_socket_addrs()
            .map_err(connection_error)?
            .next()
            .ok_or_else(|| {
                connection_error(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "address resolved to nothing",
                ))
            })?;

        let local = if remote.is_ipv6() {
            SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
        } else {
            SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
        };

        let socket = UdpSocket::bind(local).map_err(connection_error)?;
        socket.connect(remote).map_err(connection_error)?;

        tracing::info!("Analyzer client connected to {} ({})", addr, remote);
        Ok(Self {
            addr: addr.clone(),
            socket,
            flows_sent: AtomicU64::new(0),
        })
    }

    pub fn addr(&self) -> &AnalyzerAddr {
        &self.addr
    }

    /// Send flows, one datagram each
    ///
    /// Every flow is attempted even after a failed send. Returns the number
    /// sent, or the first error when any send failed.
    pub fn send_flows(&self, flows: &[Flow]) -> Result<usize> {
        let mut sent = 0;
        let mut first_error = None;
        for flow in flows {
            match self.send_flow(flow) {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::debug!("Unable to send flow {} to {}: {}", flow.uuid, self.addr, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        self.flows_sent.fetch_add(sent as u64, Ordering::Relaxed);
        tracing::trace!("Sent {}/{} flows to analyzer {}", sent, flows.len(), self.addr);

        match first_error {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }

    fn send_flow(&self, flow: &Flow) -> Result<()> {
        let payload = serde_json::to_vec(flow)?;
        self.socket.send(&payload)?;
        Ok(())
    }

    /// Total flows sent since the client was opened
    pub fn flows_sent(&self) -> u64 {
        self.flows_sent.load(Ordering::Relaxed)
    }
}

// ==================== Connector ====================

/// Opens analyzer clients
pub trait AnalyzerConnector: Send + Sync {
    fn connect(&self, addr: &AnalyzerAddr) -> Result<AnalyzerClient>;
}

/// Default connector: a UDP socket connected to the analyzer
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpConnector;

impl AnalyzerConnector for UdpConnector {
    fn connect(&self, addr: &AnalyzerAddr) -> Result<AnalyzerClient> {
        AnalyzerClient::connect(addr)
    }
}

/// Resolve the configured analyzer into at most one shared client
///
/// - malformed address → [`FlowProbeError::Config`]
/// - no address → `Ok(None)`
/// - connection failure → [`FlowProbeError::Connection`]
pub fn resolve_analyzer_client(
    config: &AgentConfig,
    connector: &dyn AnalyzerConnector,
) -> Result<Option<Arc<AnalyzerClient>>> {
    let addr = match config.analyzer_client_addr() {
        Ok(Some(addr)) => addr,
        Ok(None) => {
            tracing::info!("No analyzer configured, flows stay local");
            return Ok(None);
        }
        Err(e) => {
            tracing::error!("Unable to parse analyzer client: {}", e);
            return Err(e);
        }
    };

    match connector.connect(&addr) {
        Ok(client) => Ok(Some(Arc::new(client))),
        Err(e) => {
            tracing::error!("Analyzer client error {}: {}", addr, e);
            Err(e)
        }
    }
}
