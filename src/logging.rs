//! Tracing subscriber setup for the agent

use crate::config::LoggingConfig;
use crate::error::{FlowProbeError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// `RUST_LOG` wins over `config.level`. When `config.file` is set, events
/// are also written there through a non-blocking appender; keep the returned
/// guard alive until shutdown or buffered lines are lost.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => filter_from(&config.level)?,
    };

    let (file_layer, guard) = match &config.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| FlowProbeError::Config(format!("logging already initialized: {}", e)))?;

    Ok(guard)
}

/// Parse an `EnvFilter` directive string
pub fn filter_from(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| FlowProbeError::Config(format!("invalid log level `{}`: {}", level, e)))
}

fn file_appender(path: &Path) -> Result<tracing_appender::rolling::RollingFileAppender> {
    let file_name = path
        .file_name()
        .ok_or_else(|| FlowProbeError::Config(format!("log file {:?} has no file name", path)))?;
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;
    Ok(tracing_appender::rolling::never(dir, file_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert!(filter_from("info").is_ok());
        assert!(filter_from("warn,flowprobe_rs=trace").is_ok());
        assert!(filter_from("flowprobe_rs::probes=debug").is_ok());
    }

    #[test]
    fn test_file_appender_rejects_directory_path() {
        assert!(file_appender(Path::new("/")).is_err());
    }
}
