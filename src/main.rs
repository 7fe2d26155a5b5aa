//! flowprobe-agent - Main Entry Point
//!
//! Builds the flow probe bundle from the agent configuration, runs it until
//! Ctrl-C, then stops every probe and unregisters it from every node.

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use flowprobe_rs::{
    config::AgentConfig, logging::init_logging, topology::load_nodes, FlowProbeBundle, Graph,
    NodeId, TableAllocator, TopologyProbeBundle,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "flowprobe-agent")]
#[command(about = "Flow capture agent: sFlow and packet capture probes")]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, env = "FLOWPROBES_CONFIG")]
    config: Option<PathBuf>,

    /// JSON file with the initial topology nodes
    #[arg(short, long)]
    nodes: Option<PathBuf>,

    /// Active topology probes
    #[arg(short = 't', long = "topology-probe", default_values = ["netlink", "ovsdb"])]
    topology_probes: Vec<String>,

    /// Log level, overrides the configuration file
    #[arg(short, long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AgentConfig::load(path)?,
        None => AgentConfig::load_default()?,
    };
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    let _log_guard = init_logging(&config.logging)?;

    tracing::info!("Starting flowprobe-agent");

    let graph = match &cli.nodes {
        Some(path) => Graph::with_nodes(
            load_nodes(path).with_context(|| format!("Unable to load nodes from {:?}", path))?,
        ),
        None => Graph::new(),
    };
    let graph = Arc::new(graph);
    tracing::info!("Topology graph seeded with {} nodes", graph.node_count());

    let topology = TopologyProbeBundle::new(cli.topology_probes);
    let allocator = Arc::new(TableAllocator::from_config(&config.flow));

    let bundle = FlowProbeBundle::from_config(&topology, graph, allocator.clone(), &config)
        .context("Unable to build the flow probe bundle")?;
    for skipped in bundle.skipped() {
        tracing::warn!("Flow probe {} disabled: {}", skipped.name, skipped.reason);
    }

    bundle.start();
    for capture in &config.agent.flow.captures {
        if let Err(e) = bundle.register_capture(&capture.probe, &NodeId::new(&capture.node)) {
            tracing::warn!(
                "Unable to start {} capture on {}: {}",
                capture.probe,
                capture.node,
                e
            );
        }
    }

    let mut ticker = tokio::time::interval(allocator.update_interval().max(Duration::from_secs(1)));
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let flushed = bundle.flush_expired(Utc::now());
                if flushed > 0 {
                    tracing::debug!("Forwarded {} expired flows", flushed);
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Unable to listen for the shutdown signal")?;
                break;
            }
        }
    }

    tracing::info!("Shutting down...");
    bundle.stop();
    let report = bundle.unregister_all_probes();
    tracing::info!(
        "Unregistered {} probes from {} nodes ({} failures)",
        report.probes,
        report.nodes,
        report.failures.len()
    );

    Ok(())
}
