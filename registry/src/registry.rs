//! The node table itself.

use std::collections::HashMap;
use std::sync::Arc;

use onet_types::{NodeStatus, RemoteNode, Timestamp};
use tokio::sync::RwLock;

use crate::ProbeHistory;

/// Consecutive failed probes after which a node is dropped.
pub const DEFAULT_MAX_PROBE_FAILURES: u32 = 3;

/// The registry as shared between subsystems.
pub type SharedRegistry = Arc<RwLock<NodeRegistry>>;

/// What [`NodeRegistry::merge`] did with a record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
}

/// Known remote nodes keyed by node id, with their probe history.
pub struct NodeRegistry {
    nodes: HashMap<String, RemoteNode>,
    history: HashMap<String, ProbeHistory>,
    max_probe_failures: u32,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::with_max_failures(DEFAULT_MAX_PROBE_FAILURES)
    }

    pub fn with_max_failures(max_probe_failures: u32) -> Self {
        Self {
            nodes: HashMap::new(),
            history: HashMap::new(),
            max_probe_failures: max_probe_failures.max(1),
        }
    }

    /// Wrap a fresh registry for sharing.
    pub fn shared() -> SharedRegistry {
        Arc::new(RwLock::new(Self::new()))
    }

    // -- Mutation --------------------------------------------------------------

    /// Insert a node or refresh an existing record.
    ///
    /// An existing record keeps its `discovered_at` and, unless it was
    /// `Lost`, its status. Address, capabilities, links and metrics are
    /// replaced by the incoming values.
    pub fn merge(&mut self, node: RemoteNode) -> MergeOutcome {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                existing.address = node.address;
                existing.capabilities = node.capabilities;
                existing.latency_ms = node.latency_ms;
                existing.reliability = node.reliability;
                existing.last_seen = existing.last_seen.max(node.last_seen);
                if !node.links.is_empty() {
                    existing.links = node.links;
                }
                if existing.status == NodeStatus::Lost {
                    existing.status = node.status;
                }
                MergeOutcome::Updated
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
                MergeOutcome::Inserted
            }
        }
    }

    /// Record a successful probe and refresh the node's latency, reliability
    /// and `last_seen`. Returns the updated reliability.
    pub fn record_probe_success(&mut self, id: &str, rtt_ms: f64, now: Timestamp) -> u8 {
        let history = self.history.entry(id.to_string()).or_default();
        history.record_success(rtt_ms, now);
        let reliability = history.reliability(now);
        if let Some(node) = self.nodes.get_mut(id) {
            node.latency_ms = rtt_ms;
            node.reliability = reliability;
            node.last_seen = now;
            if node.status == NodeStatus::Lost {
                node.status = NodeStatus::Discovered;
            }
        }
        reliability
    }

    /// Record a failed probe. Once the failure streak reaches the configured
    /// maximum the node is removed and returned.
    pub fn record_probe_failure(&mut self, id: &str, now: Timestamp) -> Option<RemoteNode> {
        let history = self.history.entry(id.to_string()).or_default();
        let streak = history.record_failure(now);
        let reliability = history.reliability(now);

        if streak >= self.max_probe_failures {
            tracing::debug!(node = %id, streak, "dropping node after repeated probe failures");
            return self.remove(id);
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.reliability = reliability;
            node.status = NodeStatus::Lost;
        }
        None
    }

    /// Reliability for `id` derived from its history (baseline when none).
    pub fn reliability(&self, id: &str, now: Timestamp) -> u8 {
        self.history
            .get(id)
            .map(|h| h.reliability(now))
            .unwrap_or(onet_types::DEFAULT_RELIABILITY)
    }

    /// Set a node's status and touch it. No-op for unknown ids.
    pub fn mark_status(&mut self, id: &str, status: NodeStatus, now: Timestamp) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.status = status;
            if status != NodeStatus::Lost {
                node.last_seen = now;
            }
        }
    }

    /// Update `last_seen` on inbound traffic.
    pub fn touch(&mut self, id: &str, now: Timestamp) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.last_seen = now;
        }
    }

    /// Remove a node and its history.
    pub fn remove(&mut self, id: &str) -> Option<RemoteNode> {
        self.history.remove(id);
        self.nodes.remove(id)
    }

    /// Remove every node unseen for at least `threshold_secs`.
    pub fn evict_stale(&mut self, threshold_secs: u64, now: Timestamp) -> Vec<String> {
        let stale: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.is_stale(threshold_secs, now))
            .map(|n| n.id.clone())
            .collect();
        for id in &stale {
            self.remove(id);
        }
        stale
    }

    // -- Queries ---------------------------------------------------------------

    pub fn get(&self, id: &str) -> Option<&RemoteNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes not currently marked `Lost`.
    pub fn active_count(&self) -> usize {
        self.nodes
            .values()
            .filter(|n| n.status != NodeStatus::Lost)
            .count()
    }

    /// Nodes the transport is connected to.
    pub fn connected(&self) -> Vec<RemoteNode> {
        let mut nodes: Vec<RemoteNode> = self
            .nodes
            .values()
            .filter(|n| n.status.is_reachable())
            .cloned()
            .collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }

    /// Number of nodes first discovered at or after `since`.
    pub fn discovered_since(&self, since: Timestamp) -> usize {
        self.nodes
            .values()
            .filter(|n| n.discovered_at >= since)
            .count()
    }

    /// Most recent `last_seen` across all nodes.
    pub fn last_seen(&self) -> Option<Timestamp> {
        self.nodes.values().map(|n| n.last_seen).max()
    }

    /// Mean latency over nodes not marked `Lost`.
    pub fn average_latency_ms(&self) -> f64 {
        let latencies: Vec<f64> = self
            .nodes
            .values()
            .filter(|n| n.status != NodeStatus::Lost)
            .map(|n| n.latency_ms)
            .collect();
        if latencies.is_empty() {
            return 0.0;
        }
        latencies.iter().sum::<f64>() / latencies.len() as f64
    }

    /// Composite health over the whole registry, see [`crate::health_score`].
    pub fn health(&self) -> f64 {
        crate::health_score(
            self.connected().len(),
            self.nodes.len(),
            self.average_latency_ms(),
        )
    }

    /// Copy of every record, ordered by node id.
    pub fn snapshot(&self) -> Vec<RemoteNode> {
        let mut nodes: Vec<RemoteNode> = self.nodes.values().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        nodes
    }
}

impl Default for NodeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
