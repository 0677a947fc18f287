//! End-to-end tests for the node facade: every subsystem wired to the
//! nullable transport and prober, no real network.

use std::sync::Arc;
use std::time::Duration;

use onet_consensus::ProposalStatus;
use onet_discovery::DiscoveryConfig;
use onet_node::{NodeConfig, NodeError, OnetNode};
use onet_nullables::{NullProber, NullTransport};
use onet_routing::{RoutePriority, RoutingError};
use onet_transport::{TransportError, TransportEvent};
use onet_types::{NodeStatus, RemoteNode, Timestamp};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn config() -> NodeConfig {
    NodeConfig {
        node_id: Some("me".to_string()),
        advertise_address: Some("127.0.0.1:9000".to_string()),
        discovery: DiscoveryConfig::empty(),
        enable_metrics: true,
        ..NodeConfig::default()
    }
}

fn build(config: NodeConfig) -> (OnetNode, Arc<NullTransport>, Arc<NullProber>) {
    let transport = Arc::new(NullTransport::new());
    let prober = Arc::new(NullProber::new());
    let node = OnetNode::new(config, transport.clone(), prober.clone()).expect("node builds");
    (node, transport, prober)
}

async fn running() -> (OnetNode, Arc<NullTransport>, Arc<NullProber>) {
    let (node, transport, prober) = build(config());
    node.start_network().await.expect("network starts");
    (node, transport, prober)
}

/// Poll `check` until it holds or two seconds pass.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

// ---------------------------------------------------------------------------
// Lifecycle and status
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_reflects_lifecycle() {
    let (node, _, _) = build(config());
    let status = node.network_status().await;
    assert!(!status.running);
    assert_eq!(status.network_id, "onet-devnet");
    assert_eq!(status.node_id, "me");
    assert_eq!(status.health, 0.0);

    node.start_network().await.unwrap();
    assert!(node.network_status().await.running);
    assert_eq!(node.discovery().registered_ids().await, vec!["me".to_string()]);

    node.stop_network().await.unwrap();
    assert!(!node.network_status().await.running);
    assert!(node.discovery().registered_ids().await.is_empty());
    assert!(!node.routing().is_running());
    assert!(!node.consensus().is_running());
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_and_disconnect_update_registry_and_routing() {
    let (node, transport, _) = running().await;

    node.connect_to_node("peer", "10.0.0.2:8080").await.unwrap();
    let connected = node.connected_nodes().await;
    assert_eq!(connected.len(), 1);
    assert_eq!(connected[0].id, "peer");
    assert_eq!(transport.connected_ids(), vec!["peer".to_string()]);
    assert!(node.network_health().await > 0.0);

    node.disconnect_from_node("peer").await.unwrap();
    let n = &node;
    let settled = eventually(|| async move {
        let routed = n.routing().nodes().await;
        n.connected_nodes().await.is_empty()
            && routed.len() == 1
            && routed[0].status == NodeStatus::Lost
    })
    .await;
    assert!(settled, "disconnect never reached registry and routing");

    let again = node.disconnect_from_node("peer").await;
    assert!(matches!(
        again,
        Err(NodeError::Transport(TransportError::NotConnected(_)))
    ));
    node.stop_network().await.unwrap();
}

#[tokio::test]
async fn transport_events_reach_registry_and_routing() {
    let (node, transport, _) = running().await;
    transport.emit(TransportEvent::NodeConnected {
        node_id: "ev".into(),
        address: "10.0.0.5:8080".into(),
    });

    let n = &node;
    let seen = eventually(|| async move {
        let in_registry = n.connected_nodes().await.iter().any(|r| r.id == "ev");
        let in_routing = n.routing().nodes().await.iter().any(|r| r.id == "ev");
        in_registry && in_routing
    })
    .await;
    assert!(seen, "connected node never became visible");

    let route = node
        .send_message("ev", b"ping", RoutePriority::Normal)
        .await
        .unwrap();
    assert_eq!(route, vec!["me".to_string(), "ev".to_string()]);
    node.stop_network().await.unwrap();
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

#[tokio::test]
async fn send_goes_to_first_hop_of_route() {
    let (node, transport, _) = running().await;
    node.connect_to_node("peer", "10.0.0.2:8080").await.unwrap();
    let now = Timestamp::now();
    node.routing()
        .add_node(&RemoteNode::new("far", "10.0.0.3:8080", now).with_links(["peer"]))
        .await;

    let route = node
        .send_message("far", b"payload", RoutePriority::High)
        .await
        .unwrap();
    assert_eq!(route, vec!["me", "peer", "far"]);
    assert_eq!(transport.sent(), vec![("peer".to_string(), b"payload".to_vec())]);

    let metrics = node.metrics().unwrap();
    assert_eq!(metrics.messages_sent.get(), 1);
    node.stop_network().await.unwrap();
}

#[tokio::test]
async fn unknown_target_is_not_found() {
    let (node, transport, _) = running().await;
    let result = node.send_message("ghost", b"x", RoutePriority::Normal).await;
    assert!(matches!(
        result,
        Err(NodeError::Routing(RoutingError::NotFound(ref id))) if id == "ghost"
    ));
    assert!(transport.sent().is_empty());
    assert_eq!(node.routing().routing_stats().await.algorithm, "intelligent");
    node.stop_network().await.unwrap();
}

#[tokio::test]
async fn unreachable_target_forces_shortest_path() {
    let (node, _, _) = running().await;
    node.routing()
        .add_node(&RemoteNode::new("island", "10.0.0.9:8080", Timestamp::now()))
        .await;

    let result = node.send_message("island", b"x", RoutePriority::Normal).await;
    assert!(matches!(
        result,
        Err(NodeError::Routing(RoutingError::NoRoute(_)))
    ));
    assert_eq!(node.routing().routing_stats().await.algorithm, "shortest_path");
    node.stop_network().await.unwrap();
}

#[tokio::test]
async fn send_timeout_raises_probe_tolerance() {
    let (node, transport, _) = running().await;
    node.connect_to_node("peer", "10.0.0.2:8080").await.unwrap();
    transport.fail_sends_to("peer", TransportError::Timeout("peer".into()));

    let result = node.send_message("peer", b"x", RoutePriority::Normal).await;
    assert!(matches!(
        result,
        Err(NodeError::Transport(TransportError::Timeout(_)))
    ));
    let stats = node.routing().routing_stats().await;
    assert_eq!(stats.probe_timeout_ms, 3_000);

    transport.clear_send_failures();
    assert!(node
        .send_message("peer", b"x", RoutePriority::Normal)
        .await
        .is_ok());
    node.stop_network().await.unwrap();
}

#[tokio::test]
async fn broadcast_reports_recipients() {
    let (node, transport, _) = running().await;
    node.connect_to_node("a", "10.0.0.2:8080").await.unwrap();
    node.connect_to_node("b", "10.0.0.3:8080").await.unwrap();

    assert_eq!(node.broadcast_message(b"hello").await.unwrap(), 2);
    assert!(transport.broadcasts().contains(&b"hello".to_vec()));
    assert_eq!(node.metrics().unwrap().messages_sent.get(), 2);

    node.stop_network().await.unwrap();
    assert!(matches!(
        node.broadcast_message(b"late").await,
        Err(NodeError::NotRunning)
    ));
}

// ---------------------------------------------------------------------------
// Topology and metrics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn topology_lists_nodes_and_links() {
    let (node, _, _) = running().await;
    node.connect_to_node("peer", "10.0.0.2:8080").await.unwrap();
    node.routing()
        .add_node(&RemoteNode::new("far", "10.0.0.3:8080", Timestamp::now()).with_links(["peer"]))
        .await;

    let topology = node.network_topology().await;
    assert_eq!(topology.local_id, "me");
    let ids: Vec<&str> = topology.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["far", "peer"]);
    let mut around_peer: Vec<&str> = topology.neighbours("peer").collect();
    around_peer.sort();
    assert_eq!(around_peer, vec!["far", "me"]);
    node.stop_network().await.unwrap();
}

#[tokio::test]
async fn refresh_metrics_copies_snapshots() {
    let (node, _, _) = running().await;
    node.connect_to_node("peer", "10.0.0.2:8080").await.unwrap();
    node.send_message("peer", b"x", RoutePriority::Normal).await.unwrap();
    node.send_message("peer", b"y", RoutePriority::Normal).await.unwrap();
    node.refresh_metrics().await;

    let metrics = node.metrics().unwrap();
    assert_eq!(metrics.known_nodes.get(), 1);
    assert_eq!(metrics.connected_nodes.get(), 1);
    assert_eq!(metrics.routing_table_size.get(), 1);
    assert_eq!(metrics.routes_computed.get(), 1);
    assert_eq!(metrics.route_cache_hits.get(), 1);
    assert!(metrics.network_health.get() > 0);
    assert!(metrics.encode_text().unwrap().contains("onet_connected_nodes 1"));
    node.stop_network().await.unwrap();
}

// ---------------------------------------------------------------------------
// Consensus through the node
// ---------------------------------------------------------------------------

#[tokio::test]
async fn staked_node_joins_roster_and_decides() {
    let (node, transport, _) = build(NodeConfig {
        consensus_stake: Some(10.0),
        ..config()
    });
    node.start_network().await.unwrap();

    let consensus = node.consensus();
    consensus
        .add_consensus_node("b", 5.0, Default::default())
        .await
        .unwrap();
    let id = consensus.propose("me", "upgrade", b"v2".to_vec()).await;
    consensus.vote(&id, "me", true, "ready").await;
    consensus.vote(&id, "b", true, "").await;
    consensus.tally().await;

    let proposal = consensus.proposal(&id).await.unwrap();
    assert_eq!(proposal.status, ProposalStatus::Approved);
    let stats = consensus.consensus_stats().await;
    assert_eq!(stats.current_leader.as_deref(), Some("me"));
    assert!(!transport.broadcasts().is_empty());
    node.stop_network().await.unwrap();
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[tokio::test]
async fn node_builds_from_config_file() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("onet.toml");
    let mut file_config = config();
    file_config.network = onet_types::NetworkId::Test;
    std::fs::write(&path, file_config.to_toml_string().unwrap()).unwrap();

    let loaded = NodeConfig::from_toml_file(&path).unwrap();
    assert_eq!(loaded, file_config);
    let (node, _, _) = build(loaded);
    assert_eq!(node.network_status().await.network_id, "onet-testnet");
    assert_eq!(node.address(), "127.0.0.1:9000");
}
