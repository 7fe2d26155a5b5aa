//! Configuration module for flowprobe-rs
//!
//! The agent reads one configuration file, TOML by default or JSON when the
//! file has a `.json` extension. Every section falls back to its defaults
//! when absent, so an empty file is a valid (offline) configuration.
//!
//! # Default Location
//!
//! When no path is given the agent looks for `agent.toml` under the
//! platform configuration directory:
//!
//! - **Linux**: `~/.config/flowprobe-rs/agent.toml`
//! - **macOS**: `~/Library/Application Support/flowprobe-rs/agent.toml`
//! - **Windows**: `%APPDATA%\flowprobe-rs\agent.toml`
//!
//! # Example
//!
//! ```toml
//! analyzers = ["127.0.0.1:8082"]
//!
//! [agent.flow]
//! probes = ["ovssflow", "pcap"]
//!
//! [agent.flow.sflow]
//! port_min = 6345
//! port_max = 6355
//!
//! [flow]
//! expire = 600
//! ```

use crate::analyzer::AnalyzerAddr;
use crate::error::{FlowProbeError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for configuration directories
pub const APP_ID: &str = "flowprobe-rs";

/// Default configuration filename
pub const CONFIG_FILE: &str = "agent.toml";

/// Default first port of the sFlow collector range
pub const DEFAULT_SFLOW_PORT_MIN: u16 = 6345;

/// Default last port of the sFlow collector range
pub const DEFAULT_SFLOW_PORT_MAX: u16 = 6355;

/// Default capture length for packet capture
pub const DEFAULT_SNAPLEN: u32 = 65535;

/// Largest capture length accepted by packet capture
pub const MAX_SNAPLEN: u32 = 262_144;

/// Default flow table update interval in seconds
pub const DEFAULT_FLOW_UPDATE_SECS: u64 = 60;

/// Default flow expiry in seconds
pub const DEFAULT_FLOW_EXPIRE_SECS: u64 = 600;

/// Get the default configuration file path
pub fn default_config_path() -> Option<PathBuf> {
    dirs_next::config_dir().map(|p| p.join(APP_ID).join(CONFIG_FILE))
}

// ==================== Agent Config ====================

/// Root of the agent configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Analyzer endpoints as `host:port`; only the first one is used
    #[serde(default)]
    pub analyzers: Vec<String>,

    /// Agent section (`[agent]`)
    #[serde(default)]
    pub agent: AgentSection,

    /// Flow table settings (`[flow]`)
    #[serde(default)]
    pub flow: FlowTableConfig,

    /// Logging settings (`[logging]`)
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AgentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| FlowProbeError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load a configuration file (JSON if the extension is `.json`, TOML otherwise)
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            FlowProbeError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        if is_json {
            serde_json::from_str(&content).map_err(|e| {
                FlowProbeError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        } else {
            toml::from_str(&content).map_err(|e| {
                FlowProbeError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })
        }
    }

    /// Load from the default location, returning defaults if it is missing
    pub fn load_default() -> Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => {
                tracing::info!("No agent configuration found, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Save the configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                FlowProbeError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| FlowProbeError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content).map_err(|e| {
            FlowProbeError::Config(format!("Failed to write config file {:?}: {}", path, e))
        })
    }

    /// Requested flow probe types (`agent.flow.probes`), in order
    pub fn flow_probes(&self) -> &[String] {
        &self.agent.flow.probes
    }

    /// Resolve the analyzer client address
    ///
    /// `Ok(None)` means no analyzer is configured (offline mode). A malformed
    /// entry is a [`FlowProbeError::Config`].
    pub fn analyzer_client_addr(&self) -> Result<Option<AnalyzerAddr>> {
        match self.analyzers.first() {
            None => Ok(None),
            Some(entry) => AnalyzerAddr::parse(entry),
        }
    }
}

/// `[agent]` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentSection {
    #[serde(default)]
    pub flow: FlowProbesConfig,
}

// ==================== Flow Probes Config ====================

/// `[agent.flow]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowProbesConfig {
    /// Probe types to instantiate, duplicates are ignored
    #[serde(default = "default_probes")]
    pub probes: Vec<String>,

    /// Captures to register once the bundle is built
    #[serde(default)]
    pub captures: Vec<CaptureConfig>,

    #[serde(default)]
    pub sflow: SFlowSettings,

    #[serde(default)]
    pub pcap: PcapSettings,
}

fn default_probes() -> Vec<String> {
    vec!["ovssflow".to_string(), "pcap".to_string()]
}

impl Default for FlowProbesConfig {
    fn default() -> Self {
        Self {
            probes: default_probes(),
            captures: Vec::new(),
            sflow: SFlowSettings::default(),
            pcap: PcapSettings::default(),
        }
    }
}

/// A capture to start at boot: probe type + topology node id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub node: String,
    pub probe: String,
}

/// `[agent.flow.sflow]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SFlowSettings {
    /// Address the sFlow collector sockets bind to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// First port of the collector range
    #[serde(default = "default_port_min")]
    pub port_min: u16,

    /// Last port of the collector range (inclusive)
    #[serde(default = "default_port_max")]
    pub port_max: u16,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port_min() -> u16 {
    DEFAULT_SFLOW_PORT_MIN
}

fn default_port_max() -> u16 {
    DEFAULT_SFLOW_PORT_MAX
}

impl Default for SFlowSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port_min: DEFAULT_SFLOW_PORT_MIN,
            port_max: DEFAULT_SFLOW_PORT_MAX,
        }
    }
}

/// `[agent.flow.pcap]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcapSettings {
    /// Bytes captured per packet
    #[serde(default = "default_snaplen")]
    pub snaplen: u32,

    /// Put interfaces in promiscuous mode
    #[serde(default = "default_true")]
    pub promiscuous: bool,
}

fn default_snaplen() -> u32 {
    DEFAULT_SNAPLEN
}

fn default_true() -> bool {
    true
}

impl Default for PcapSettings {
    fn default() -> Self {
        Self {
            snaplen: DEFAULT_SNAPLEN,
            promiscuous: true,
        }
    }
}

// ==================== Flow Table Config ====================

/// `[flow]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowTableConfig {
    /// Update interval in seconds
    #[serde(default = "default_update")]
    pub update: u64,

    /// Idle time in seconds before a flow expires
    #[serde(default = "default_expire")]
    pub expire: u64,
}

fn default_update() -> u64 {
    DEFAULT_FLOW_UPDATE_SECS
}

fn default_expire() -> u64 {
    DEFAULT_FLOW_EXPIRE_SECS
}

impl Default for FlowTableConfig {
    fn default() -> Self {
        Self {
            update: DEFAULT_FLOW_UPDATE_SECS,
            expire: DEFAULT_FLOW_EXPIRE_SECS,
        }
    }
}

// ==================== Logging Config ====================

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, overridden by `RUST_LOG`
    #[serde(default = "default_level")]
    pub level: String,

    /// Optional log file, written in addition to stdout
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
        }
    }
}

// ==================== Tests ====================
