//! Error handling for flowprobe-rs
//!
//! Every fallible operation in the crate returns [`Result`], whose error type
//! is [`FlowProbeError`]. Errors fall in two classes:
//!
//! - **Fatal to bundle construction**: [`FlowProbeError::Config`] and
//!   [`FlowProbeError::Connection`]. The factory returns them and no bundle
//!   is produced.
//! - **Recoverable**: [`FlowProbeError::UnknownProbeType`],
//!   [`FlowProbeError::ProbeConstruction`] and [`FlowProbeError::Teardown`].
//!   They are logged and recorded, and never stop the surrounding operation.

use thiserror::Error;

/// Main error type for flow probe operations
#[derive(Error, Debug)]
pub enum FlowProbeError {
    /// Malformed or unreadable configuration (including analyzer addresses)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The analyzer client could not be opened
    #[error("Analyzer connection error for {addr}: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A requested probe type is not in the registry
    #[error("Unknown probe type: {0}")]
    UnknownProbeType(String),

    /// A known probe type refused to build (type-specific misconfiguration)
    #[error("Unable to construct probe `{probe}`: {reason}")]
    ProbeConstruction { probe: String, reason: String },

    /// A single probe failed to unregister from a single node
    #[error("Probe `{probe}` failed to unregister from node {node}: {source}")]
    Teardown {
        probe: String,
        node: String,
        #[source]
        source: Box<FlowProbeError>,
    },

    /// Capture setup or capture-side failures
    #[error("Capture error: {0}")]
    Capture(String),

    /// A node id that is not present in the graph
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<FlowProbeError>,
    },
}

impl FlowProbeError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        FlowProbeError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error aborts bundle construction
    pub fn is_fatal(&self) -> bool {
        match self {
            FlowProbeError::Config(_) | FlowProbeError::Connection { .. } => true,
            FlowProbeError::WithContext { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for FlowProbeError {
    fn from(err: serde_json::Error) -> Self {
        FlowProbeError::Serialization(err.to_string())
    }
}

/// Result type alias for flow probe operations
pub type Result<T> = std::result::Result<T, FlowProbeError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}
