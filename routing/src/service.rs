//! The routing service: a locked [`Router`] plus the background optimizer,
//! the membership listener and error-class recovery.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use onet_registry::SharedRegistry;
use onet_transport::{ProbeOutcome, Prober, Transport, TransportEvent};
use onet_types::{NodeStatus, RemoteNode, Timestamp};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};

use crate::router::{OptimizationReport, Router, RoutingStats};
use crate::table::RouteNode;
use crate::{Algorithm, ErrorClass, RoutePriority, RoutingConfig, RoutingError};

/// What a recovery pass did.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RecoveryReport {
    pub probed: usize,
    /// Nodes removed because they failed the recovery probe.
    pub removed: Vec<String>,
    pub recomputed: usize,
    pub cleared_paths: usize,
    pub forced_algorithm: Option<Algorithm>,
    pub probe_timeout_ms: u64,
}

struct Shared {
    router: Mutex<Router>,
    registry: SharedRegistry,
    transport: Arc<dyn Transport>,
    prober: Arc<dyn Prober>,
    running: AtomicBool,
    shutdown: broadcast::Sender<()>,
}

pub struct Routing {
    shared: Arc<Shared>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Routing {
    pub fn new(
        local_id: impl Into<String>,
        config: RoutingConfig,
        registry: SharedRegistry,
        transport: Arc<dyn Transport>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            shared: Arc::new(Shared {
                router: Mutex::new(Router::new(local_id, config)),
                registry,
                transport,
                prober,
                running: AtomicBool::new(false),
                shutdown,
            }),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    // -- Lifecycle -------------------------------------------------------------

    /// Spawn the optimizer and membership loops. Idempotent.
    pub async fn start_routing(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("routing already running");
            return;
        }
        self.shared.sync_from_registry().await;

        let mut handles = self.task_handles.lock().await;
        let shared = Arc::clone(&self.shared);
        let shutdown_rx = self.shared.shutdown.subscribe();
        handles.push(tokio::spawn(optimizer_loop(shared, shutdown_rx)));

        let shared = Arc::clone(&self.shared);
        let events_rx = self.shared.transport.subscribe();
        let shutdown_rx = self.shared.shutdown.subscribe();
        handles.push(tokio::spawn(membership_loop(shared, events_rx, shutdown_rx)));

        tracing::info!("routing started");
    }

    pub async fn stop_routing(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.shutdown.send(());
        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "routing task ended abnormally");
            }
        }
        tracing::info!("routing stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    // -- Operations ------------------------------------------------------------

    pub async fn add_node(&self, node: &RemoteNode) -> bool {
        self.shared.router.lock().await.add_node(node, Timestamp::now())
    }

    /// Remove a node from the routing table and the shared registry, so the
    /// next optimizer cycle does not bring it back.
    pub async fn remove_node(&self, node_id: &str) -> Result<RouteNode, RoutingError> {
        let mut router = self.shared.router.lock().await;
        self.shared.registry.write().await.remove(node_id);
        router.remove_node(node_id)
    }

    pub async fn find_optimal_route(
        &self,
        target: &str,
        priority: RoutePriority,
    ) -> Result<Vec<String>, RoutingError> {
        self.shared
            .router
            .lock()
            .await
            .find_optimal_route(target, priority, Timestamp::now())
    }

    pub async fn update_node_metrics(
        &self,
        node_id: &str,
        latency_ms: f64,
        reliability: u8,
        throughput: f64,
    ) -> Result<(), RoutingError> {
        self.shared.router.lock().await.update_node_metrics(
            node_id,
            latency_ms,
            reliability,
            throughput,
            Timestamp::now(),
        )
    }

    pub async fn set_status(&self, node_id: &str, status: NodeStatus) -> bool {
        self.shared
            .router
            .lock()
            .await
            .set_status(node_id, status, Timestamp::now())
    }

    pub async fn routing_stats(&self) -> RoutingStats {
        self.shared.router.lock().await.stats(Timestamp::now())
    }

    /// Every node in the routing table, ordered by id.
    pub async fn nodes(&self) -> Vec<RouteNode> {
        self.shared.router.lock().await.table().nodes().cloned().collect()
    }

    /// Connections between nodes as the path algorithms see them.
    pub async fn adjacency(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.shared.router.lock().await.table().adjacency()
    }

    pub async fn health(&self) -> f64 {
        self.shared.router.lock().await.health()
    }

    /// Run one optimizer cycle now.
    pub async fn optimize(&self) -> OptimizationReport {
        self.shared.optimize().await
    }

    /// Apply the recovery procedure for a failure class.
    pub async fn recover(&self, class: ErrorClass) -> RecoveryReport {
        self.shared.recover(class).await
    }
}

impl Shared {
    /// Pull every registry record into the routing table.
    ///
    /// Lock order is router, then registry. Removals take the same order, so
    /// a snapshot can never resurrect a node removed after it was taken.
    async fn sync_from_registry(&self) {
        let now = Timestamp::now();
        let mut router = self.router.lock().await;
        let snapshot = self.registry.read().await.snapshot();
        for node in &snapshot {
            router.add_node(node, now);
        }
    }

    /// One optimizer cycle: drop inactive records from the registry, pull in
    /// what remains, then maintain the routing table.
    async fn optimize(&self) -> OptimizationReport {
        let now = Timestamp::now();
        let threshold = self.router.lock().await.config().inactivity_threshold_secs;
        let evicted = self.registry.write().await.evict_stale(threshold, now);
        if !evicted.is_empty() {
            tracing::debug!(evicted = evicted.len(), "inactive nodes dropped from registry");
        }
        self.sync_from_registry().await;

        let mut router = self.router.lock().await;
        let mut report = router.optimize(now);
        for id in evicted {
            let _ = router.remove_node(&id);
            if !report.evicted.contains(&id) {
                report.evicted.push(id);
            }
        }
        report.evicted.sort();
        report
    }

    async fn recover(&self, class: ErrorClass) -> RecoveryReport {
        let now = Timestamp::now();
        let mut report = RecoveryReport::default();
        match class {
            ErrorClass::Timeout => {
                let (targets, timeout) = {
                    let mut router = self.router.lock().await;
                    let timeout = router.raise_timeout_tolerance(now);
                    (router.probe_targets(true), timeout)
                };
                report.probed = targets.len();
                let dead = self.reprobe(targets, timeout).await;
                let mut router = self.router.lock().await;
                for id in &dead {
                    router.set_status(id, NodeStatus::Lost, now);
                }
            }
            ErrorClass::Unreachable => {
                let (targets, timeout) = {
                    let router = self.router.lock().await;
                    (router.probe_targets(false), router.probe_timeout())
                };
                report.probed = targets.len();
                let dead = self.reprobe(targets, timeout).await;
                let mut router = self.router.lock().await;
                {
                    let mut registry = self.registry.write().await;
                    for id in &dead {
                        registry.remove(id);
                    }
                }
                let affected = router.remove_dead(&dead);
                report.recomputed = router.recompute(&affected, now);
                report.removed = dead;
            }
            ErrorClass::RouteCalculation => {
                let mut router = self.router.lock().await;
                report.cleared_paths = router.clear_cache();
                router.force_algorithm(Algorithm::ShortestPath, now);
                report.forced_algorithm = Some(Algorithm::ShortestPath);
            }
            ErrorClass::Other => {
                let (targets, timeout) = {
                    let mut router = self.router.lock().await;
                    report.removed = router.optimize(now).evicted;
                    report.cleared_paths = router.clear_cache();
                    router.force_algorithm(Algorithm::ShortestPath, now);
                    report.forced_algorithm = Some(Algorithm::ShortestPath);
                    (router.probe_targets(true), router.probe_timeout())
                };
                report.probed = targets.len();
                let dead = self.reprobe(targets, timeout).await;
                let mut router = self.router.lock().await;
                for id in &dead {
                    router.set_status(id, NodeStatus::Lost, now);
                }
            }
        }
        report.probe_timeout_ms = self.router.lock().await.probe_timeout().as_millis() as u64;
        tracing::info!(
            class = class.as_str(),
            probed = report.probed,
            removed = report.removed.len(),
            recomputed = report.recomputed,
            cleared = report.cleared_paths,
            "routing recovery applied"
        );
        report
    }

    /// Probe `targets` concurrently. Successful probes refresh registry and
    /// routing metrics; the ids that failed are returned.
    async fn reprobe(&self, targets: Vec<(String, String)>, timeout: Duration) -> Vec<String> {
        let mut probes = JoinSet::new();
        for (id, address) in targets {
            let prober = Arc::clone(&self.prober);
            probes.spawn(async move {
                let outcome = prober.probe(&address, timeout).await;
                (id, outcome)
            });
        }
        let mut outcomes = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(result) => outcomes.push(result),
                Err(e) => tracing::warn!(error = %e, "recovery probe task failed"),
            }
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));

        let now = Timestamp::now();
        let mut dead = Vec::new();
        let mut refreshed = Vec::new();
        {
            let mut registry = self.registry.write().await;
            for (id, outcome) in outcomes {
                match outcome {
                    ProbeOutcome::Reachable { rtt_ms } => {
                        let reliability = registry.record_probe_success(&id, rtt_ms, now);
                        refreshed.push((id, rtt_ms, reliability));
                    }
                    ProbeOutcome::Unreachable => {
                        registry.record_probe_failure(&id, now);
                        dead.push(id);
                    }
                }
            }
        }
        let mut router = self.router.lock().await;
        for (id, rtt_ms, reliability) in refreshed {
            let throughput = router
                .table()
                .get(&id)
                .map(|n| n.metrics.throughput)
                .unwrap_or_default();
            let _ = router.update_node_metrics(&id, rtt_ms, reliability, throughput, now);
        }
        dead
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        let now = Timestamp::now();
        let mut router = self.router.lock().await;
        match event {
            TransportEvent::NodeConnected { node_id, address } => {
                if !router.set_status(&node_id, NodeStatus::Connected, now) {
                    router.add_node(
                        &RemoteNode::new(node_id, address, now).with_status(NodeStatus::Connected),
                        now,
                    );
                }
            }
            TransportEvent::NodeDisconnected { node_id } => {
                router.set_status(&node_id, NodeStatus::Lost, now);
            }
            TransportEvent::MessageReceived { from, .. } => router.touch(&from, now),
        }
    }
}

async fn optimizer_loop(shared: Arc<Shared>, mut shutdown_rx: broadcast::Receiver<()>) {
    loop {
        let report = shared.optimize().await;
        if !report.evicted.is_empty() || report.purged_paths > 0 {
            tracing::debug!(
                evicted = report.evicted.len(),
                purged = report.purged_paths,
                "routing table maintained"
            );
        }
        for improvement in &report.improvements {
            tracing::info!(
                target_node = %improvement.target,
                priority = improvement.priority.as_str(),
                current = improvement.current.as_str(),
                better = improvement.better.as_str(),
                gain = improvement.gain,
                "better route available"
            );
        }
        let delay = shared.router.lock().await.next_interval();
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!("routing optimizer shutting down");
}

async fn membership_loop(
    shared: Arc<Shared>,
    mut events_rx: broadcast::Receiver<TransportEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            event = events_rx.recv() => match event {
                Ok(event) => shared.handle_transport_event(event).await,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(missed, "routing lagged behind transport events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onet_nullables::{NullProber, NullTransport};
    use onet_registry::NodeRegistry;

    fn connected(id: &str, address: &str) -> RemoteNode {
        RemoteNode::new(id, address, Timestamp::now())
            .with_latency(20.0)
            .with_status(NodeStatus::Connected)
    }

    fn routing(prober: Arc<NullProber>, transport: Arc<NullTransport>) -> Routing {
        Routing::new(
            "me",
            RoutingConfig::default(),
            NodeRegistry::shared(),
            transport,
            prober,
        )
    }

    #[tokio::test]
    async fn routes_through_connected_neighbour() {
        let r = routing(Arc::new(NullProber::new()), Arc::new(NullTransport::new()));
        r.add_node(&connected("a", "10.0.0.1:1").with_links(["t"])).await;
        r.add_node(&RemoteNode::new("t", "10.0.0.2:1", Timestamp::now())).await;

        let path = r.find_optimal_route("t", RoutePriority::Normal).await.unwrap();
        assert_eq!(path, vec!["me", "a", "t"]);
        assert_eq!(r.routing_stats().await.total_nodes, 2);
    }

    #[tokio::test]
    async fn route_calculation_recovery_forces_shortest_path() {
        let r = routing(Arc::new(NullProber::new()), Arc::new(NullTransport::new()));
        r.add_node(&connected("a", "10.0.0.1:1")).await;
        r.find_optimal_route("a", RoutePriority::Normal).await.unwrap();

        let report = r.recover(ErrorClass::RouteCalculation).await;
        assert_eq!(report.cleared_paths, 1);
        assert_eq!(report.forced_algorithm, Some(Algorithm::ShortestPath));
        assert_eq!(r.routing_stats().await.algorithm, "shortest_path");
    }

    #[tokio::test]
    async fn unreachable_recovery_removes_dead_nodes() {
        let prober = Arc::new(NullProber::new());
        prober.unreachable("10.0.0.2:1");
        let r = routing(Arc::clone(&prober), Arc::new(NullTransport::new()));
        r.add_node(&connected("a", "10.0.0.1:1")).await;
        r.add_node(&connected("b", "10.0.0.2:1")).await;
        r.find_optimal_route("b", RoutePriority::High).await.unwrap();

        let report = r.recover(ErrorClass::Unreachable).await;
        assert_eq!(report.probed, 2);
        assert_eq!(report.removed, vec!["b".to_string()]);
        assert_eq!(
            r.find_optimal_route("b", RoutePriority::High).await,
            Err(RoutingError::NotFound("b".into()))
        );
        assert!(r.find_optimal_route("a", RoutePriority::Normal).await.is_ok());
    }

    #[tokio::test]
    async fn timeout_recovery_raises_probe_timeout_and_refreshes_latency() {
        let prober = Arc::new(NullProber::new());
        prober.reachable("10.0.0.1:1", 35.0);
        let r = routing(Arc::clone(&prober), Arc::new(NullTransport::new()));
        r.add_node(&connected("a", "10.0.0.1:1")).await;

        let report = r.recover(ErrorClass::Timeout).await;
        assert_eq!(report.probed, 1);
        assert_eq!(report.probe_timeout_ms, 3_000);
        let a = r.nodes().await.into_iter().find(|n| n.id == "a").unwrap();
        assert_eq!(a.metrics.latency_ms, 35.0);
    }

    #[tokio::test]
    async fn generic_recovery_marks_silent_nodes_lost() {
        let prober = Arc::new(NullProber::new());
        prober.unreachable("10.0.0.1:1");
        let r = routing(Arc::clone(&prober), Arc::new(NullTransport::new()));
        r.add_node(&connected("a", "10.0.0.1:1")).await;

        let report = r.recover(ErrorClass::Other).await;
        assert_eq!(report.probed, 1);
        assert_eq!(report.forced_algorithm, Some(Algorithm::ShortestPath));
        let a = r.nodes().await.into_iter().find(|n| n.id == "a").unwrap();
        assert_eq!(a.status, NodeStatus::Lost);
    }

    #[tokio::test]
    async fn membership_events_drive_status() {
        let transport = Arc::new(NullTransport::new());
        let r = routing(Arc::new(NullProber::new()), Arc::clone(&transport));
        r.start_routing().await;
        r.start_routing().await;

        transport.connect_to_node("peer", "10.0.0.5:1").await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while r.find_optimal_route("peer", RoutePriority::Normal).await.is_err() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        transport.disconnect_from_node("peer").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while r.find_optimal_route("peer", RoutePriority::Normal).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        r.stop_routing().await;
        assert!(!r.is_running());
        assert!(r.task_handles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn optimize_pulls_registry_records() {
        let registry = NodeRegistry::shared();
        registry.write().await.merge(connected("a", "10.0.0.1:1"));
        let r = Routing::new(
            "me",
            RoutingConfig::default(),
            Arc::clone(&registry),
            Arc::new(NullTransport::new()),
            Arc::new(NullProber::new()),
        );
        r.optimize().await;
        assert_eq!(r.routing_stats().await.active_nodes, 1);
    }

    fn routing_over(registry: SharedRegistry, prober: Arc<NullProber>) -> Routing {
        Routing::new(
            "me",
            RoutingConfig::default(),
            registry,
            Arc::new(NullTransport::new()),
            prober,
        )
    }

    #[tokio::test]
    async fn removed_node_stays_removed_after_optimize() {
        let registry = NodeRegistry::shared();
        registry.write().await.merge(connected("a", "10.0.0.1:1"));
        let r = routing_over(Arc::clone(&registry), Arc::new(NullProber::new()));
        r.optimize().await;
        assert!(r.find_optimal_route("a", RoutePriority::Normal).await.is_ok());

        r.remove_node("a").await.unwrap();
        r.optimize().await;
        assert_eq!(
            r.find_optimal_route("a", RoutePriority::Normal).await,
            Err(RoutingError::NotFound("a".into()))
        );
        assert!(!registry.read().await.contains("a"));
    }

    #[tokio::test]
    async fn unreachable_removal_survives_optimize() {
        let registry = NodeRegistry::shared();
        registry.write().await.merge(connected("a", "10.0.0.1:1"));
        registry.write().await.merge(connected("b", "10.0.0.2:1"));
        let prober = Arc::new(NullProber::new());
        prober.unreachable("10.0.0.2:1");
        let r = routing_over(Arc::clone(&registry), prober);
        r.optimize().await;

        let report = r.recover(ErrorClass::Unreachable).await;
        assert_eq!(report.removed, vec!["b".to_string()]);
        r.optimize().await;
        assert_eq!(
            r.find_optimal_route("b", RoutePriority::High).await,
            Err(RoutingError::NotFound("b".into()))
        );
        assert!(r.find_optimal_route("a", RoutePriority::Normal).await.is_ok());
    }

    #[tokio::test]
    async fn rediscovered_node_is_routable_again() {
        let registry = NodeRegistry::shared();
        let r = routing_over(Arc::clone(&registry), Arc::new(NullProber::new()));
        r.add_node(&connected("a", "10.0.0.1:1")).await;
        r.remove_node("a").await.unwrap();

        registry.write().await.merge(connected("a", "10.0.0.1:1"));
        r.optimize().await;
        assert!(r.find_optimal_route("a", RoutePriority::Normal).await.is_ok());
    }

    #[tokio::test]
    async fn optimize_evicts_stale_registry_records() {
        let registry = NodeRegistry::shared();
        let an_hour_ago = Timestamp::new(Timestamp::now().as_secs() - 3_600);
        registry.write().await.merge(
            RemoteNode::new("stale", "10.0.0.3:1", an_hour_ago).with_status(NodeStatus::Connected),
        );
        registry.write().await.merge(connected("fresh", "10.0.0.4:1"));
        let r = routing_over(Arc::clone(&registry), Arc::new(NullProber::new()));

        let report = r.optimize().await;
        assert_eq!(report.evicted, vec!["stale".to_string()]);
        let registry = registry.read().await;
        assert!(!registry.contains("stale"));
        assert!(registry.contains("fresh"));
        assert_eq!(registry.connected().len(), 1);
    }
}
