//! The discovery service: runs every active method on its own cadence,
//! probes what they return and keeps the shared node registry current.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use onet_registry::SharedRegistry;
use onet_transport::{ProbeOutcome, Prober, Transport, TransportEvent};
use onet_types::{Capabilities, NodeStatus, RemoteNode, Timestamp};
use onet_utils::StatsCounter;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::{JoinHandle, JoinSet};

use crate::bootstrap::BootstrapSource;
use crate::dht::DhtSource;
use crate::local::LocalSegmentSource;
use crate::public_registry::RegistrySource;
use crate::stats::DISCOVERY_RATE_WINDOW_SECS;
use crate::{
    DiscoveryConfig, DiscoveryError, DiscoveryEvent, DiscoveryMethod, DiscoverySource,
    DiscoveryStats, MethodKind, NodeDescriptor, DISCOVERY_EVENT_CAPACITY,
};

const PROBES_SUCCEEDED: &str = "probes_succeeded";
const PROBES_FAILED: &str = "probes_failed";
const QUERIES_FAILED: &str = "queries_failed";
const NODES_DROPPED: &str = "nodes_dropped";

/// A method descriptor paired with the source that implements it.
pub type MethodEntry = (DiscoveryMethod, Arc<dyn DiscoverySource>);

struct Shared {
    registry: SharedRegistry,
    transport: Arc<dyn Transport>,
    prober: Arc<dyn Prober>,
    probe_timeout: Duration,
    /// Ordered by priority.
    methods: Vec<MethodEntry>,
    running: AtomicBool,
    shutdown: broadcast::Sender<()>,
    events: broadcast::Sender<DiscoveryEvent>,
    /// Local identities registered through `register_node`, by id.
    announced: RwLock<BTreeMap<String, NodeDescriptor>>,
    last_discovery: RwLock<Option<Timestamp>>,
    counters: StatsCounter,
}

pub struct Discovery {
    shared: Arc<Shared>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Discovery {
    /// Build the four standard sources from `config`.
    pub fn new(
        config: &DiscoveryConfig,
        registry: SharedRegistry,
        transport: Arc<dyn Transport>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let timeout = config.query_timeout();
        let sources: Vec<Arc<dyn DiscoverySource>> = vec![
            Arc::new(
                DhtSource::new(config.dht_endpoints.clone(), config.dht_find_rounds, timeout)
                    .with_advertised_endpoint(config.dht_advertise_endpoint.clone()),
            ),
            Arc::new(LocalSegmentSource::new(
                &config.local_hosts,
                &config.local_ports,
                config.local_announce_port,
                timeout,
            )),
            Arc::new(RegistrySource::new(config.registry_url.clone(), timeout)),
            Arc::new(BootstrapSource::new(
                config.bootstrap_endpoints.clone(),
                config.bootstrap_attempts,
                timeout,
            )),
        ];
        let methods = sources
            .into_iter()
            .map(|source| {
                let mut method = DiscoveryMethod::default_for(source.kind());
                method.active = config.is_enabled(method.kind);
                (method, source)
            })
            .collect();
        Self::with_sources(registry, transport, prober, config.probe_timeout(), methods)
    }

    /// Build from explicit sources.
    pub fn with_sources(
        registry: SharedRegistry,
        transport: Arc<dyn Transport>,
        prober: Arc<dyn Prober>,
        probe_timeout: Duration,
        mut methods: Vec<MethodEntry>,
    ) -> Self {
        methods.sort_by_key(|(m, _)| m.priority);
        let (shutdown, _) = broadcast::channel(1);
        let (events, _) = broadcast::channel(DISCOVERY_EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                registry,
                transport,
                prober,
                probe_timeout,
                methods,
                running: AtomicBool::new(false),
                shutdown,
                events,
                announced: RwLock::new(BTreeMap::new()),
                last_discovery: RwLock::new(None),
                counters: StatsCounter::new(&[
                    PROBES_SUCCEEDED,
                    PROBES_FAILED,
                    QUERIES_FAILED,
                    NODES_DROPPED,
                ]),
            }),
            task_handles: Mutex::new(Vec::new()),
        }
    }

    // -- Lifecycle -------------------------------------------------------------

    /// Spawn one loop per active method plus the membership listener.
    /// Calling this while already running does nothing.
    pub async fn start_discovery(&self) {
        if self.shared.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("discovery already running");
            return;
        }
        let mut handles = self.task_handles.lock().await;

        for (method, source) in self.shared.methods.iter().filter(|(m, _)| m.active) {
            let shared = Arc::clone(&self.shared);
            let method = method.clone();
            let source = Arc::clone(source);
            let shutdown_rx = self.shared.shutdown.subscribe();
            handles.push(tokio::spawn(method_loop(shared, method, source, shutdown_rx)));
        }

        let shared = Arc::clone(&self.shared);
        let events_rx = self.shared.transport.subscribe();
        let shutdown_rx = self.shared.shutdown.subscribe();
        handles.push(tokio::spawn(membership_loop(shared, events_rx, shutdown_rx)));

        tracing::info!(
            methods = self.active_methods().len(),
            "node discovery started"
        );
    }

    /// Signal every loop and wait for it to finish.
    pub async fn stop_discovery(&self) {
        if !self.shared.running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shared.shutdown.send(());
        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "discovery task ended abnormally");
            }
        }
        tracing::info!("node discovery stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    // -- Operations ------------------------------------------------------------

    /// Run every active method once, in priority order, and return the
    /// reachable nodes found. A node reported by several methods is taken
    /// from the highest-priority one. Failing methods contribute nothing.
    pub async fn discover_available_nodes(&self) -> Vec<RemoteNode> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut found = Vec::new();
        for (method, source) in self.shared.methods.iter().filter(|(m, _)| m.active) {
            match self.shared.run_method(method, source.as_ref(), &seen).await {
                Ok(nodes) => {
                    for node in nodes {
                        if seen.insert(node.id.clone()) {
                            found.push(node);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(method = method.name(), error = %e, "discovery method failed");
                }
            }
        }
        found
    }

    /// Announce the local node through every active method. Returns how many
    /// methods accepted the announcement.
    pub async fn register_node(
        &self,
        node_id: &str,
        address: &str,
        capabilities: Capabilities,
    ) -> Result<usize, DiscoveryError> {
        if node_id.trim().is_empty() || address.trim().is_empty() {
            return Err(DiscoveryError::Config(
                "node id and address must not be empty".into(),
            ));
        }
        let descriptor = NodeDescriptor {
            capabilities,
            ..NodeDescriptor::new(node_id, address)
        };
        self.shared
            .announced
            .write()
            .await
            .insert(node_id.to_string(), descriptor.clone());

        let mut accepted = 0;
        for (method, source) in self.shared.methods.iter().filter(|(m, _)| m.active) {
            match source.announce(&descriptor).await {
                Ok(()) => accepted += 1,
                Err(e) => {
                    tracing::warn!(method = method.name(), node = %node_id, error = %e, "announce failed")
                }
            }
        }
        tracing::info!(node = %node_id, %address, accepted, "registered local node");
        Ok(accepted)
    }

    /// Withdraw a registration. Returns `false` if `node_id` was never registered.
    pub async fn unregister_node(&self, node_id: &str) -> bool {
        if self.shared.announced.write().await.remove(node_id).is_none() {
            return false;
        }
        for (method, source) in self.shared.methods.iter().filter(|(m, _)| m.active) {
            if let Err(e) = source.withdraw(node_id).await {
                tracing::warn!(method = method.name(), node = %node_id, error = %e, "withdraw failed");
            }
        }
        tracing::info!(node = %node_id, "unregistered local node");
        true
    }

    pub async fn discovery_stats(&self) -> DiscoveryStats {
        let now = Timestamp::now();
        let since = Timestamp::new(now.as_secs().saturating_sub(DISCOVERY_RATE_WINDOW_SECS));
        let registry = self.shared.registry.read().await;
        let counters = &self.shared.counters;
        DiscoveryStats {
            total_discovered: registry.len(),
            active_nodes: registry.active_count(),
            discovery_methods: self.active_methods().len(),
            last_discovery: *self.shared.last_discovery.read().await,
            discovery_rate: registry.discovered_since(since),
            is_running: self.is_running(),
            probes_succeeded: counters.get(PROBES_SUCCEEDED),
            probes_failed: counters.get(PROBES_FAILED),
            queries_failed: counters.get(QUERIES_FAILED),
            nodes_dropped: counters.get(NODES_DROPPED),
        }
    }

    pub fn methods(&self) -> Vec<DiscoveryMethod> {
        self.shared.methods.iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn active_methods(&self) -> Vec<MethodKind> {
        self.shared
            .methods
            .iter()
            .filter(|(m, _)| m.active)
            .map(|(m, _)| m.kind)
            .collect()
    }

    /// Ids registered as local through [`register_node`](Self::register_node).
    pub async fn registered_ids(&self) -> Vec<String> {
        self.shared.announced.read().await.keys().cloned().collect()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.shared.registry
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryEvent> {
        self.shared.events.subscribe()
    }
}

impl Shared {
    /// One round of one method: query, probe outside any lock, then fold the
    /// results into the registry. Candidates in `skip` are ignored.
    async fn run_method(
        &self,
        method: &DiscoveryMethod,
        source: &dyn DiscoverySource,
        skip: &HashSet<String>,
    ) -> Result<Vec<RemoteNode>, DiscoveryError> {
        let candidates = match source.query().await {
            Ok(candidates) => candidates,
            Err(e) => {
                self.counters.increment(QUERIES_FAILED);
                return Err(e);
            }
        };

        let candidates = {
            let announced = self.announced.read().await;
            let mut unique = HashSet::new();
            candidates
                .into_iter()
                .filter(|c| c.is_well_formed())
                .filter(|c| !announced.contains_key(&c.id) && !skip.contains(&c.id))
                .filter(|c| unique.insert(c.id.clone()))
                .collect::<Vec<_>>()
        };
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut probes = JoinSet::new();
        for candidate in candidates {
            let prober = Arc::clone(&self.prober);
            let timeout = self.probe_timeout;
            probes.spawn(async move {
                let outcome = prober.probe(&candidate.address, timeout).await;
                (candidate, outcome)
            });
        }
        let mut results = Vec::new();
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!(error = %e, "probe task failed"),
            }
        }
        results.sort_by(|a, b| a.0.id.cmp(&b.0.id));

        let now = Timestamp::now();
        let mut found = Vec::new();
        let mut lost = Vec::new();
        {
            let mut registry = self.registry.write().await;
            for (candidate, outcome) in results {
                let id = candidate.id.clone();
                match outcome {
                    ProbeOutcome::Reachable { rtt_ms } => {
                        self.counters.increment(PROBES_SUCCEEDED);
                        registry.merge(candidate.into_remote(rtt_ms, now));
                        registry.record_probe_success(&id, rtt_ms, now);
                        if let Some(node) = registry.get(&id) {
                            found.push(node.clone());
                        }
                    }
                    ProbeOutcome::Unreachable => {
                        self.counters.increment(PROBES_FAILED);
                        if registry.contains(&id) {
                            if let Some(dropped) = registry.record_probe_failure(&id, now) {
                                self.counters.increment(NODES_DROPPED);
                                lost.push(dropped.id);
                            }
                        }
                    }
                }
            }
        }

        tracing::debug!(
            method = method.name(),
            found = found.len(),
            dropped = lost.len(),
            "discovery round complete"
        );
        for node_id in lost {
            let _ = self.events.send(DiscoveryEvent::NodeLost { node_id });
        }
        if !found.is_empty() {
            *self.last_discovery.write().await = Some(now);
            let _ = self.events.send(DiscoveryEvent::NodesDiscovered {
                method: method.kind,
                nodes: found.clone(),
            });
        }
        Ok(found)
    }

    async fn handle_transport_event(&self, event: TransportEvent) {
        let now = Timestamp::now();
        match event {
            TransportEvent::NodeConnected { node_id, address } => {
                let mut registry = self.registry.write().await;
                if registry.contains(&node_id) {
                    registry.mark_status(&node_id, NodeStatus::Connected, now);
                } else {
                    registry.merge(
                        RemoteNode::new(node_id.clone(), address, now)
                            .with_status(NodeStatus::Connected),
                    );
                }
                tracing::debug!(node = %node_id, "node connected");
            }
            TransportEvent::NodeDisconnected { node_id } => {
                self.registry
                    .write()
                    .await
                    .mark_status(&node_id, NodeStatus::Lost, now);
                tracing::debug!(node = %node_id, "node disconnected");
                let _ = self.events.send(DiscoveryEvent::NodeLost { node_id });
            }
            TransportEvent::MessageReceived { from, .. } => {
                self.registry.write().await.touch(&from, now);
            }
        }
    }
}

async fn method_loop(
    shared: Arc<Shared>,
    method: DiscoveryMethod,
    source: Arc<dyn DiscoverySource>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let none = HashSet::new();
    loop {
        let result = tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            result = shared.run_method(&method, source.as_ref(), &none) => result,
        };
        let delay = match result {
            Ok(_) => method.interval,
            Err(e) => {
                tracing::warn!(
                    method = method.name(),
                    error = %e,
                    retry_in = ?method.recovery_interval,
                    "discovery round failed"
                );
                method.recovery_interval
            }
        };
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::debug!(method = method.name(), "discovery loop shutting down");
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
                    tracing::warn!(missed, "discovery lagged behind transport events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use onet_nullables::{NullProber, NullTransport};
    use onet_registry::NodeRegistry;
    use std::sync::Mutex as StdMutex;

    struct StaticSource {
        kind: MethodKind,
        nodes: StdMutex<Vec<NodeDescriptor>>,
        fail: bool,
        announced: StdMutex<Vec<String>>,
    }

    impl StaticSource {
        fn new(kind: MethodKind, nodes: Vec<NodeDescriptor>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                nodes: StdMutex::new(nodes),
                fail: false,
                announced: StdMutex::new(Vec::new()),
            })
        }

        fn failing(kind: MethodKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                nodes: StdMutex::new(Vec::new()),
                fail: true,
                announced: StdMutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl DiscoverySource for StaticSource {
        fn kind(&self) -> MethodKind {
            self.kind
        }

        async fn query(&self) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
            if self.fail {
                return Err(DiscoveryError::Timeout("static".into()));
            }
            Ok(self.nodes.lock().unwrap().clone())
        }

        async fn announce(&self, local: &NodeDescriptor) -> Result<(), DiscoveryError> {
            self.announced.lock().unwrap().push(local.id.clone());
            Ok(())
        }
    }

    fn desc(id: &str, address: &str) -> NodeDescriptor {
        NodeDescriptor::new(id, address)
    }

    fn discovery(
        sources: Vec<Arc<StaticSource>>,
        prober: Arc<NullProber>,
        transport: Arc<NullTransport>,
    ) -> Discovery {
        let methods = sources
            .into_iter()
            .map(|s| {
                let source: Arc<dyn DiscoverySource> = s;
                (DiscoveryMethod::default_for(source.kind()), source)
            })
            .collect();
        Discovery::with_sources(
            NodeRegistry::shared(),
            transport,
            prober,
            Duration::from_millis(100),
            methods,
        )
    }

    #[tokio::test]
    async fn higher_priority_method_wins_duplicates() {
        let bootstrap = StaticSource::new(MethodKind::Bootstrap, vec![desc("n1", "10.0.0.9:1")]);
        let dht = StaticSource::new(
            MethodKind::Dht,
            vec![desc("n1", "10.0.0.1:1"), desc("n2", "10.0.0.2:1")],
        );
        let d = discovery(vec![bootstrap, dht], Arc::new(NullProber::new()), Arc::new(NullTransport::new()));

        let nodes = d.discover_available_nodes().await;
        assert_eq!(nodes.len(), 2);
        let n1 = nodes.iter().find(|n| n.id == "n1").unwrap();
        assert_eq!(n1.address, "10.0.0.1:1");
        assert_eq!(d.registry().read().await.get("n1").unwrap().address, "10.0.0.1:1");
    }

    #[tokio::test]
    async fn repeated_discovery_yields_the_same_unique_ids() {
        let dht = StaticSource::new(
            MethodKind::Dht,
            vec![desc("n1", "10.0.0.1:1"), desc("n2", "10.0.0.2:1"), desc("n2", "10.0.0.2:1")],
        );
        let local = StaticSource::new(
            MethodKind::LocalSegment,
            vec![desc("n2", "10.0.0.2:1"), desc("n3", "10.0.0.3:1"), desc("me", "127.0.0.1:1")],
        );
        let bootstrap = StaticSource::new(
            MethodKind::Bootstrap,
            vec![desc("n3", "10.0.0.3:1"), desc("n1", "10.0.0.1:1")],
        );
        let d = discovery(
            vec![dht, local, bootstrap],
            Arc::new(NullProber::new()),
            Arc::new(NullTransport::new()),
        );
        d.register_node("me", "127.0.0.1:1", Capabilities::new()).await.unwrap();

        let ids = |nodes: Vec<RemoteNode>| nodes.into_iter().map(|n| n.id).collect::<Vec<_>>();
        let mut first = ids(d.discover_available_nodes().await);
        let mut second = ids(d.discover_available_nodes().await);
        for pass in [&first, &second] {
            let unique: HashSet<&String> = pass.iter().collect();
            assert_eq!(unique.len(), pass.len());
        }
        first.sort();
        second.sort();
        assert_eq!(first, vec!["n1", "n2", "n3"]);
        assert_eq!(first, second);
        assert_eq!(d.registry().read().await.len(), 3);
    }

    #[tokio::test]
    async fn unreachable_candidates_are_not_added() {
        let prober = Arc::new(NullProber::new());
        prober.unreachable("10.0.0.2:1");
        let source = StaticSource::new(
            MethodKind::Registry,
            vec![desc("n1", "10.0.0.1:1"), desc("n2", "10.0.0.2:1")],
        );
        let d = discovery(vec![source], prober, Arc::new(NullTransport::new()));

        let nodes = d.discover_available_nodes().await;
        assert_eq!(nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["n1"]);
        assert!(!d.registry().read().await.contains("n2"));
    }

    #[tokio::test]
    async fn repeated_probe_failures_drop_known_node() {
        let prober = Arc::new(NullProber::new());
        let source = StaticSource::new(MethodKind::Dht, vec![desc("n1", "10.0.0.1:1")]);
        let d = discovery(vec![source], Arc::clone(&prober), Arc::new(NullTransport::new()));
        let mut events = d.subscribe();

        d.discover_available_nodes().await;
        assert!(d.registry().read().await.contains("n1"));

        prober.unreachable("10.0.0.1:1");
        for _ in 0..onet_registry::DEFAULT_MAX_PROBE_FAILURES {
            d.discover_available_nodes().await;
        }
        assert!(!d.registry().read().await.contains("n1"));

        let mut saw_lost = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, DiscoveryEvent::NodeLost { ref node_id } if node_id == "n1") {
                saw_lost = true;
            }
        }
        assert!(saw_lost);
        assert_eq!(d.discovery_stats().await.nodes_dropped, 1);
    }

    #[tokio::test]
    async fn failing_method_does_not_block_others() {
        let good = StaticSource::new(MethodKind::Bootstrap, vec![desc("n1", "10.0.0.1:1")]);
        let d = discovery(
            vec![StaticSource::failing(MethodKind::Dht), good],
            Arc::new(NullProber::new()),
            Arc::new(NullTransport::new()),
        );
        assert_eq!(d.discover_available_nodes().await.len(), 1);
        assert_eq!(d.discovery_stats().await.queries_failed, 1);
    }

    #[tokio::test]
    async fn registered_local_node_is_announced_and_never_discovered() {
        let source = StaticSource::new(
            MethodKind::LocalSegment,
            vec![desc("me", "127.0.0.1:8080"), desc("n1", "10.0.0.1:1")],
        );
        let d = discovery(
            vec![Arc::clone(&source)],
            Arc::new(NullProber::new()),
            Arc::new(NullTransport::new()),
        );

        let accepted = d
            .register_node("me", "127.0.0.1:8080", Capabilities::from(["p2p".to_string()]))
            .await
            .unwrap();
        assert_eq!(accepted, 1);
        assert_eq!(*source.announced.lock().unwrap(), vec!["me".to_string()]);

        let nodes = d.discover_available_nodes().await;
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "n1");

        assert!(d.unregister_node("me").await);
        assert!(!d.unregister_node("me").await);
    }

    #[tokio::test]
    async fn empty_registration_is_rejected() {
        let d = discovery(vec![], Arc::new(NullProber::new()), Arc::new(NullTransport::new()));
        assert!(d.register_node("", "x:1", Capabilities::new()).await.is_err());
    }

    #[tokio::test]
    async fn stats_reflect_registry() {
        let source = StaticSource::new(
            MethodKind::Registry,
            vec![desc("n1", "10.0.0.1:1"), desc("n2", "10.0.0.2:1")],
        );
        let d = discovery(vec![source], Arc::new(NullProber::new()), Arc::new(NullTransport::new()));
        d.discover_available_nodes().await;

        let stats = d.discovery_stats().await;
        assert_eq!(stats.total_discovered, 2);
        assert_eq!(stats.active_nodes, 2);
        assert_eq!(stats.discovery_methods, 1);
        assert_eq!(stats.discovery_rate, 2);
        assert!(stats.last_discovery.is_some());
        assert!(!stats.is_running);
    }

    #[tokio::test]
    async fn background_loops_populate_registry_and_stop_cleanly() {
        let source = StaticSource::new(MethodKind::Bootstrap, vec![desc("n1", "10.0.0.1:1")]);
        let d = discovery(vec![source], Arc::new(NullProber::new()), Arc::new(NullTransport::new()));

        d.start_discovery().await;
        d.start_discovery().await;
        assert!(d.is_running());

        tokio::time::timeout(Duration::from_secs(5), async {
            while !d.registry().read().await.contains("n1") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        d.stop_discovery().await;
        assert!(!d.is_running());
        assert!(d.task_handles.lock().await.is_empty());
    }

    #[tokio::test]
    async fn transport_events_update_status() {
        let transport = Arc::new(NullTransport::new());
        let d = discovery(vec![], Arc::new(NullProber::new()), Arc::clone(&transport));
        d.start_discovery().await;

        transport.connect_to_node("peer", "10.0.0.5:8080").await;
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = d.registry().read().await.get("peer").map(|n| n.status);
                if status == Some(NodeStatus::Connected) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        transport.disconnect_from_node("peer").await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let status = d.registry().read().await.get("peer").map(|n| n.status);
                if status == Some(NodeStatus::Lost) {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        d.stop_discovery().await;
    }
}
