//! The ONET node: discovery, routing and consensus wired to one transport
//! and one node registry, behind the network facade used by higher layers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use onet_consensus::{Consensus, ConsensusEvent};
use onet_discovery::{Discovery, DiscoveryEvent};
use onet_registry::{NodeRegistry, SharedRegistry};
use onet_routing::{ErrorClass, RoutePriority, Routing, RoutingError};
use onet_transport::{Prober, Transport};
use onet_types::{NodeStatus, RemoteNode, Timestamp};
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::{NetworkStatus, NetworkTopology, NodeConfig, NodeError, NodeMetrics};

/// How long `stop_network` waits for owned tasks.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

struct Shared {
    config: NodeConfig,
    node_id: String,
    registry: SharedRegistry,
    transport: Arc<dyn Transport>,
    routing: Arc<Routing>,
    metrics: Option<NodeMetrics>,
}

pub struct OnetNode {
    shared: Arc<Shared>,
    address: String,
    discovery: Discovery,
    consensus: Consensus,
    running: AtomicBool,
    shutdown: broadcast::Sender<()>,
    started_at: RwLock<Option<Timestamp>>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl OnetNode {
    /// Build every subsystem around `transport` and `prober`. Nothing runs
    /// until [`start_network`](Self::start_network).
    pub fn new(
        config: NodeConfig,
        transport: Arc<dyn Transport>,
        prober: Arc<dyn Prober>,
    ) -> Result<Self, NodeError> {
        config.validate()?;
        let node_id = config.resolved_node_id();
        let address = config.resolved_address();
        let registry: SharedRegistry = Arc::new(RwLock::new(NodeRegistry::with_max_failures(
            config.discovery.max_probe_failures,
        )));

        let discovery = Discovery::new(
            &config.discovery,
            Arc::clone(&registry),
            Arc::clone(&transport),
            Arc::clone(&prober),
        );
        let routing = Arc::new(Routing::new(
            node_id.clone(),
            config.routing.clone(),
            Arc::clone(&registry),
            Arc::clone(&transport),
            prober,
        ));
        let consensus = Consensus::new(config.consensus.clone(), Arc::clone(&transport));
        let metrics = if config.enable_metrics {
            Some(NodeMetrics::new()?)
        } else {
            None
        };

        let (shutdown, _) = broadcast::channel(1);
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                node_id,
                registry,
                transport,
                routing,
                metrics,
            }),
            address,
            discovery,
            consensus,
            running: AtomicBool::new(false),
            shutdown,
            started_at: RwLock::new(None),
            task_handles: Mutex::new(Vec::new()),
        })
    }

    // -- Lifecycle -------------------------------------------------------------

    /// Announce the local node and start every subsystem. Idempotent.
    pub async fn start_network(&self) -> Result<(), NodeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("network already running");
            return Ok(());
        }
        let config = &self.shared.config;
        tracing::info!(
            network = config.network.as_str(),
            node = %self.shared.node_id,
            address = %self.address,
            "ONET node starting"
        );

        if let Some(stake) = config.consensus_stake {
            if let Err(e) = self
                .consensus
                .add_consensus_node(&self.shared.node_id, stake, config.capabilities.clone())
                .await
            {
                self.running.store(false, Ordering::SeqCst);
                return Err(e.into());
            }
        }
        if let Err(e) = self
            .discovery
            .register_node(&self.shared.node_id, &self.address, config.capabilities.clone())
            .await
        {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        let mut handles = self.task_handles.lock().await;
        handles.push(tokio::spawn(discovery_pump(
            Arc::clone(&self.shared),
            self.discovery.subscribe(),
            self.shutdown.subscribe(),
        )));
        handles.push(tokio::spawn(consensus_pump(
            Arc::clone(&self.shared),
            self.consensus.subscribe(),
            self.shutdown.subscribe(),
        )));
        drop(handles);

        self.discovery.start_discovery().await;
        self.shared.routing.start_routing().await;
        self.consensus.start_consensus().await;
        *self.started_at.write().await = Some(Timestamp::now());

        tracing::info!(node = %self.shared.node_id, "ONET node started");
        Ok(())
    }

    /// Stop every subsystem and withdraw the local announcement.
    pub async fn stop_network(&self) -> Result<(), NodeError> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!(node = %self.shared.node_id, "ONET node stopping");
        let _ = self.shutdown.send(());

        self.consensus.stop_consensus().await;
        self.shared.routing.stop_routing().await;
        self.discovery.stop_discovery().await;
        self.discovery.unregister_node(&self.shared.node_id).await;

        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().await.drain(..).collect();
        let wait_all = async {
            for handle in handles {
                let _ = handle.await;
            }
        };
        if tokio::time::timeout(SHUTDOWN_TIMEOUT, wait_all).await.is_err() {
            tracing::warn!(
                "shutdown timeout ({:?}), some tasks may still be running",
                SHUTDOWN_TIMEOUT
            );
        }

        *self.started_at.write().await = None;
        self.refresh_metrics().await;
        tracing::info!(node = %self.shared.node_id, "ONET node stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // -- Network facade --------------------------------------------------------

    pub async fn network_status(&self) -> NetworkStatus {
        let (connected_nodes, known_nodes, health) = {
            let registry = self.shared.registry.read().await;
            (registry.connected().len(), registry.len(), registry.health())
        };
        let uptime_secs = self
            .started_at
            .read()
            .await
            .map(|t| t.elapsed_since(Timestamp::now()))
            .unwrap_or(0);
        NetworkStatus {
            running: self.is_running(),
            network_id: self.shared.config.network.as_str(),
            node_id: self.shared.node_id.clone(),
            connected_nodes,
            known_nodes,
            health,
            uptime_secs,
        }
    }

    pub async fn connected_nodes(&self) -> Vec<RemoteNode> {
        self.shared.registry.read().await.connected()
    }

    /// Open a transport connection and record the node as connected.
    pub async fn connect_to_node(&self, node_id: &str, address: &str) -> Result<(), NodeError> {
        if node_id == self.shared.node_id {
            return Err(NodeError::SelfTarget(node_id.to_string()));
        }
        if !self.shared.transport.connect_to_node(node_id, address).await {
            tracing::debug!(node = %node_id, %address, "connection refused");
            return Err(NodeError::ConnectionRefused(node_id.to_string()));
        }
        self.shared.record_connected(node_id, address).await;
        tracing::info!(node = %node_id, %address, "connected to node");
        Ok(())
    }

    pub async fn disconnect_from_node(&self, node_id: &str) -> Result<(), NodeError> {
        self.shared.transport.disconnect_from_node(node_id).await?;
        self.shared
            .registry
            .write()
            .await
            .mark_status(node_id, NodeStatus::Lost, Timestamp::now());
        self.shared.routing.set_status(node_id, NodeStatus::Lost).await;
        tracing::info!(node = %node_id, "disconnected from node");
        Ok(())
    }

    /// Route `payload` towards `target` and hand it to the first hop.
    /// Returns the route used. Routing and transport failures trigger the
    /// matching routing recovery before the error is returned.
    pub async fn send_message(
        &self,
        target: &str,
        payload: &[u8],
        priority: RoutePriority,
    ) -> Result<Vec<String>, NodeError> {
        if !self.is_running() {
            return Err(NodeError::NotRunning);
        }
        if target == self.shared.node_id {
            return Err(NodeError::SelfTarget(target.to_string()));
        }
        let routing = &self.shared.routing;
        let route = match routing.find_optimal_route(target, priority).await {
            Ok(route) => route,
            Err(RoutingError::NotFound(id)) => return Err(RoutingError::NotFound(id).into()),
            Err(e) => {
                tracing::warn!(%target, error = %e, "route lookup failed");
                routing.recover(e.class()).await;
                return Err(e.into());
            }
        };
        let Some(next_hop) = route.get(1) else {
            return Err(RoutingError::NoRoute(target.to_string()).into());
        };

        if let Err(e) = self.shared.transport.send_message(next_hop, payload).await {
            let class = ErrorClass::from(&e);
            tracing::warn!(%target, %next_hop, error = %e, class = class.as_str(), "send failed");
            routing.recover(class).await;
            return Err(e.into());
        }
        if let Some(metrics) = &self.shared.metrics {
            metrics.messages_sent.inc();
        }
        tracing::debug!(%target, %next_hop, hops = route.len() - 1, bytes = payload.len(), "message sent");
        Ok(route)
    }

    /// Hand `payload` to every connected node. Returns how many took it.
    pub async fn broadcast_message(&self, payload: &[u8]) -> Result<usize, NodeError> {
        if !self.is_running() {
            return Err(NodeError::NotRunning);
        }
        let delivered = self.shared.transport.broadcast_message(payload).await?;
        if let Some(metrics) = &self.shared.metrics {
            metrics.messages_sent.inc_by(delivered as u64);
        }
        tracing::debug!(delivered, bytes = payload.len(), "message broadcast");
        Ok(delivered)
    }

    /// Run every active discovery method once and make the results routable.
    pub async fn discover_nodes(&self) -> Vec<RemoteNode> {
        let found = self.discovery.discover_available_nodes().await;
        for node in &found {
            self.shared.routing.add_node(node).await;
        }
        if let Some(metrics) = &self.shared.metrics {
            metrics.nodes_discovered.inc_by(found.len() as u64);
        }
        found
    }

    pub async fn network_topology(&self) -> NetworkTopology {
        let nodes = self.shared.routing.nodes().await;
        let adjacency = self.shared.routing.adjacency().await;
        NetworkTopology::build(&self.shared.node_id, &nodes, &adjacency)
    }

    /// Composite health in `[0, 1]` from connection ratio and latency.
    pub async fn network_health(&self) -> f64 {
        self.shared.registry.read().await.health()
    }

    /// Copy subsystem snapshots into the Prometheus gauges.
    pub async fn refresh_metrics(&self) {
        let Some(metrics) = &self.shared.metrics else {
            return;
        };
        {
            let registry = self.shared.registry.read().await;
            metrics.known_nodes.set(registry.len() as i64);
            metrics.connected_nodes.set(registry.connected().len() as i64);
            metrics.set_health(registry.health());
        }
        let routing = self.shared.routing.routing_stats().await;
        metrics.routing_table_size.set(routing.total_nodes as i64);
        metrics.cached_paths.set(routing.cached_paths as i64);
        NodeMetrics::catch_up(&metrics.routes_computed, routing.routes_computed);
        NodeMetrics::catch_up(&metrics.route_cache_hits, routing.cache_hits);

        let consensus = self.consensus.consensus_stats().await;
        metrics.pending_proposals.set(consensus.pending_proposals as i64);
    }

    // -- Accessors -------------------------------------------------------------

    pub fn node_id(&self) -> &str {
        &self.shared.node_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.shared.registry
    }

    pub fn discovery(&self) -> &Discovery {
        &self.discovery
    }

    pub fn routing(&self) -> &Routing {
        &self.shared.routing
    }

    pub fn consensus(&self) -> &Consensus {
        &self.consensus
    }

    pub fn metrics(&self) -> Option<&NodeMetrics> {
        self.shared.metrics.as_ref()
    }
}

impl Shared {
    async fn record_connected(&self, node_id: &str, address: &str) {
        let now = Timestamp::now();
        let node = {
            let mut registry = self.registry.write().await;
            if registry.contains(node_id) {
                registry.mark_status(node_id, NodeStatus::Connected, now);
            } else {
                registry.merge(
                    RemoteNode::new(node_id, address, now).with_status(NodeStatus::Connected),
                );
            }
            registry.get(node_id).cloned()
        };
        if let Some(node) = node {
            self.routing.add_node(&node).await;
        }
    }

    async fn handle_discovery_event(&self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::NodesDiscovered { method, nodes } => {
                tracing::debug!(method = method.as_str(), count = nodes.len(), "nodes discovered");
                if let Some(metrics) = &self.metrics {
                    metrics.nodes_discovered.inc_by(nodes.len() as u64);
                }
                for node in &nodes {
                    self.routing.add_node(node).await;
                }
                if self.config.auto_connect {
                    self.auto_connect(nodes).await;
                }
            }
            DiscoveryEvent::NodeLost { node_id } => {
                let still_known = self.registry.read().await.contains(&node_id);
                if still_known {
                    self.routing.set_status(&node_id, NodeStatus::Lost).await;
                } else if self.routing.remove_node(&node_id).await.is_ok() {
                    tracing::debug!(node = %node_id, "dropped lost node from routing");
                }
            }
        }
    }

    /// Connect to discovered nodes that are not connected yet, up to the
    /// configured connection limit.
    async fn auto_connect(&self, nodes: Vec<RemoteNode>) {
        let (mut open, candidates) = {
            let registry = self.registry.read().await;
            let open = registry.connected().len();
            let candidates: Vec<RemoteNode> = nodes
                .into_iter()
                .filter(|n| n.id != self.node_id)
                .filter(|n| {
                    registry
                        .get(&n.id)
                        .is_some_and(|known| !known.status.is_reachable())
                })
                .collect();
            (open, candidates)
        };
        for node in candidates {
            if open >= self.config.max_connections {
                tracing::debug!(limit = self.config.max_connections, "connection limit reached");
                break;
            }
            if self.transport.connect_to_node(&node.id, &node.address).await {
                self.record_connected(&node.id, &node.address).await;
                open += 1;
            }
        }
    }
}

async fn discovery_pump(
    shared: Arc<Shared>,
    mut events_rx: broadcast::Receiver<DiscoveryEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    tracing::debug!("discovery pump started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            event = events_rx.recv() => match event {
                Ok(event) => shared.handle_discovery_event(event).await,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "discovery pump lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    tracing::debug!("discovery pump stopped");
}

async fn consensus_pump(
    shared: Arc<Shared>,
    mut events_rx: broadcast::Receiver<ConsensusEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            event = events_rx.recv() => match event {
                Ok(ConsensusEvent::LeaderChanged { leader }) => {
                    tracing::info!(leader = leader.as_deref().unwrap_or("none"), "consensus leader changed");
                }
                Ok(_) => {
                    if let Some(metrics) = &shared.metrics {
                        metrics.proposals_decided.inc();
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "consensus pump lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}
