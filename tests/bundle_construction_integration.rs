//! Integration tests for building flow probe bundles from configuration

mod common;

use common::builders::{ConfigBuilder, GraphBuilder, NodeBuilder};
use common::mock_helpers::{register_recording, RecordingProbe};
use flowprobe_rs::config::AgentConfig;
use flowprobe_rs::flow::{Flow, FlowEndpoints};
use flowprobe_rs::pipeline::{FlowEnhancer, OvsFlowEnhancer};
use flowprobe_rs::probes::{OvsSFlowProbesHandler, PcapProbesHandler};
use flowprobe_rs::{
    FlowProbe, FlowProbeBundle, FlowProbeError, NodeId, ProbeFactory, ProbeRegistry,
    TableAllocator, TopologyProbeBundle,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn topology() -> TopologyProbeBundle {
    TopologyProbeBundle::new(["netlink", "ovsdb"])
}

fn build(config: &AgentConfig) -> flowprobe_rs::Result<FlowProbeBundle> {
    FlowProbeBundle::from_config(
        &topology(),
        GraphBuilder::new().devices("eth", 2).build(),
        Arc::new(TableAllocator::default()),
        config,
    )
}

#[test]
fn test_builtin_probes_with_unknown_entry() {
    let config = ConfigBuilder::new(&["ovssflow", "bogus", "pcap"])
        .analyzer("")
        .build();
    let bundle = build(&config).unwrap();

    assert_eq!(bundle.names().collect::<Vec<_>>(), vec!["ovssflow", "pcap"]);
    assert!(bundle.probe("pcap").is_some());
    assert!(bundle.probe("bogus").is_none());
    assert_eq!(
        bundle.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        vec!["ovssflow", "pcap"]
    );
    assert_eq!(bundle.skipped().len(), 1);
    assert_eq!(bundle.skipped()[0].name, "bogus");
    assert!(matches!(
        bundle.skipped()[0].reason,
        FlowProbeError::UnknownProbeType(_)
    ));
}

#[test]
fn test_duplicates_keep_one_instance() {
    let config = ConfigBuilder::new(&["pcap", "ovssflow", "pcap", "pcap"]).build();
    let bundle = build(&config).unwrap();

    assert_eq!(bundle.len(), 2);
    assert!(bundle.skipped().is_empty());
}

#[test]
fn test_empty_request_list_gives_empty_bundle() {
    let bundle = build(&ConfigBuilder::new(&[]).build()).unwrap();
    assert!(bundle.is_empty());
    assert!(bundle.skipped().is_empty());
}

#[test]
fn test_sflow_needs_ovsdb_topology_probe() {
    let config = ConfigBuilder::new(&["ovssflow", "pcap"]).build();
    let bundle = FlowProbeBundle::from_config(
        &TopologyProbeBundle::new(["netlink"]),
        GraphBuilder::new().build(),
        Arc::new(TableAllocator::default()),
        &config,
    )
    .unwrap();

    assert_eq!(bundle.names().collect::<Vec<_>>(), vec!["pcap"]);
    assert!(matches!(
        bundle.skipped()[0].reason,
        FlowProbeError::ProbeConstruction { .. }
    ));
}

#[test]
fn test_invalid_snaplen_skips_pcap_only() {
    let config = ConfigBuilder::new(&["pcap", "ovssflow"]).snaplen(0).build();
    let bundle = build(&config).unwrap();

    assert_eq!(bundle.names().collect::<Vec<_>>(), vec!["ovssflow"]);
    assert_eq!(bundle.skipped()[0].name, "pcap");
}

#[test]
fn test_malformed_analyzer_aborts_build() {
    let probe = Arc::new(RecordingProbe::new());
    let constructed = Arc::new(AtomicUsize::new(0));
    let mut registry = ProbeRegistry::empty();
    {
        let constructed = constructed.clone();
        registry.register("recording", |_| Vec::new(), move |_| {
            constructed.fetch_add(1, Ordering::SeqCst);
            Ok(probe.clone() as Arc<dyn FlowProbe>)
        });
    }
    let factory = ProbeFactory::new(registry);

    for bad in ["analyzer", "analyzer:port", "[::1:8082"] {
        let config = ConfigBuilder::new(&["recording"]).analyzer(bad).build();
        let err = factory
            .build(
                &topology(),
                GraphBuilder::new().build(),
                Arc::new(TableAllocator::default()),
                &config,
            )
            .unwrap_err();
        assert!(err.is_fatal(), "{} should abort the build", bad);
        assert!(matches!(err, FlowProbeError::Config(_)));
    }
    assert_eq!(constructed.load(Ordering::SeqCst), 0);
}

#[test]
fn test_recording_probe_through_registry() {
    let probe = Arc::new(RecordingProbe::new());
    let mut registry = ProbeRegistry::default();
    register_recording(&mut registry, "recording", probe.clone());

    let config = ConfigBuilder::new(&["recording", "pcap"]).build();
    let bundle = ProbeFactory::new(registry)
        .build(
            &topology(),
            GraphBuilder::new().devices("eth", 1).build(),
            Arc::new(TableAllocator::default()),
            &config,
        )
        .unwrap();

    assert_eq!(bundle.names().collect::<Vec<_>>(), vec!["pcap", "recording"]);
    bundle
        .register_capture("recording", &NodeId::new("eth0"))
        .unwrap();
    assert_eq!(probe.registered(), vec![NodeId::new("eth0")]);
}

#[test]
fn test_config_file_to_bundle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("agent.toml");
    std::fs::write(
        &path,
        r#"
        analyzers = []

        [agent.flow]
        probes = ["pcap", "bogus", "pcap"]
        "#,
    )
    .unwrap();

    let config = AgentConfig::load(&path).unwrap();
    let bundle = build(&config).unwrap();
    assert_eq!(bundle.names().collect::<Vec<_>>(), vec!["pcap"]);
    assert_eq!(bundle.skipped().len(), 1);
}

#[test]
fn test_flows_reach_analyzer_enhanced() {
    let (receiver, addr) = common::analyzer_receiver();
    let config = ConfigBuilder::new(&["pcap"]).analyzer(&addr).build();
    let graph = GraphBuilder::new()
        .node(NodeBuilder::interface("eth0", "device").mac("aa:00:00:00:00:01"))
        .node(NodeBuilder::interface("veth0", "veth").mac("aa:00:00:00:00:02"))
        .build();

    // keep a typed handle on the handler the factory builds
    let slot: Arc<Mutex<Option<Arc<PcapProbesHandler>>>> = Arc::default();
    let mut registry = ProbeRegistry::empty();
    {
        let slot = slot.clone();
        registry.register("pcap", |_| Vec::new(), move |ctx| {
            let handler = Arc::new(PcapProbesHandler::new(ctx)?);
            *slot.lock().unwrap() = Some(handler.clone());
            Ok(handler as Arc<dyn FlowProbe>)
        });
    }

    let bundle = ProbeFactory::new(registry)
        .build(&topology(), graph, Arc::new(TableAllocator::default()), &config)
        .unwrap();
    let eth0 = NodeId::new("eth0");
    bundle.register_capture("pcap", &eth0).unwrap();

    let handler = slot.lock().unwrap().clone().unwrap();
    assert!(handler.forwarder().has_analyzer());
    let flow = Flow::new(
        "Ethernet",
        Some(FlowEndpoints::new("aa:00:00:00:00:01", "aa:00:00:00:00:02")),
        None,
        chrono::Utc::now().timestamp_millis(),
    );
    handler.ingest(&eth0, vec![flow]).unwrap();
    assert_eq!(handler.flush_all().unwrap(), 1);

    let mut buf = [0u8; 4096];
    let len = receiver.recv(&mut buf).unwrap();
    let received: Flow = serde_json::from_slice(&buf[..len]).unwrap();
    assert_eq!(received.a_node_tid.as_deref(), Some("eth0"));
    assert_eq!(received.b_node_tid.as_deref(), Some("veth0"));
}

#[test]
fn test_sflow_handler_exposes_pipeline_order() {
    let config = ConfigBuilder::new(&["ovssflow"]).build();
    let slot: Arc<Mutex<Option<Arc<OvsSFlowProbesHandler>>>> = Arc::default();
    let mut registry = ProbeRegistry::empty();
    {
        let slot = slot.clone();
        registry.register(
            "ovssflow",
            |graph| {
                vec![Arc::new(OvsFlowEnhancer::new(graph.clone())) as Arc<dyn FlowEnhancer>]
            },
            move |ctx| {
                let handler = Arc::new(OvsSFlowProbesHandler::new(ctx)?);
                *slot.lock().unwrap() = Some(handler.clone());
                Ok(handler as Arc<dyn FlowProbe>)
            },
        );
    }

    ProbeFactory::new(registry)
        .build(
            &topology(),
            GraphBuilder::new().build(),
            Arc::new(TableAllocator::default()),
            &config,
        )
        .unwrap();

    let handler = slot.lock().unwrap().clone().unwrap();
    assert_eq!(handler.forwarder().pipeline().names(), vec!["graph", "ovs"]);
    assert!(!handler.forwarder().has_analyzer());
}
