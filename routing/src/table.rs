//! The routing table: routable nodes, their metrics and the edges between them.

use std::collections::{BTreeMap, BTreeSet};

use onet_types::{Capabilities, NodeStatus, RemoteNode, Timestamp};
use serde::Serialize;

/// Most recent measurements for one node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct NodeMetrics {
    pub latency_ms: f64,
    /// Percentage, `0..=100`.
    pub reliability: u8,
    /// Messages per second observed by the caller that reported it.
    pub throughput: f64,
    pub updated_at: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteNode {
    pub id: String,
    pub address: String,
    pub capabilities: Capabilities,
    pub status: NodeStatus,
    pub metrics: NodeMetrics,
    pub last_seen: Timestamp,
    /// Neighbours this node advertised.
    pub links: BTreeSet<String>,
}

impl RouteNode {
    pub fn from_remote(node: &RemoteNode, now: Timestamp) -> Self {
        Self {
            id: node.id.clone(),
            address: node.address.clone(),
            capabilities: node.capabilities.clone(),
            status: node.status,
            metrics: NodeMetrics {
                latency_ms: node.latency_ms,
                reliability: node.reliability,
                throughput: 0.0,
                updated_at: now,
            },
            last_seen: node.last_seen,
            links: node.links.clone(),
        }
    }

    /// Whether the node can carry traffic at all.
    pub fn is_usable(&self) -> bool {
        self.status != NodeStatus::Lost
    }
}

/// Nodes keyed by id, plus the local node's identity.
#[derive(Clone, Debug)]
pub struct RoutingTable {
    local_id: String,
    nodes: BTreeMap<String, RouteNode>,
}

impl RoutingTable {
    pub fn new(local_id: impl Into<String>) -> Self {
        Self {
            local_id: local_id.into(),
            nodes: BTreeMap::new(),
        }
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Insert or refresh from a registry record. Throughput survives refreshes.
    /// Returns `true` for a new node. The local node is never stored.
    pub fn upsert(&mut self, node: &RemoteNode, now: Timestamp) -> bool {
        if node.id == self.local_id {
            return false;
        }
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                let throughput = existing.metrics.throughput;
                let last_seen = existing.last_seen.max(node.last_seen);
                *existing = RouteNode::from_remote(node, now);
                existing.metrics.throughput = throughput;
                existing.last_seen = last_seen;
                false
            }
            None => {
                self.nodes
                    .insert(node.id.clone(), RouteNode::from_remote(node, now));
                true
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<RouteNode> {
        self.nodes.remove(id)
    }

    /// Refresh measurements. Returns `false` for unknown ids.
    pub fn update_metrics(
        &mut self,
        id: &str,
        latency_ms: f64,
        reliability: u8,
        throughput: f64,
        now: Timestamp,
    ) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.metrics = NodeMetrics {
            latency_ms,
            reliability: reliability.min(onet_types::MAX_RELIABILITY),
            throughput,
            updated_at: now,
        };
        node.last_seen = now;
        true
    }

    /// Returns `false` for unknown ids.
    pub fn set_status(&mut self, id: &str, status: NodeStatus, now: Timestamp) -> bool {
        let Some(node) = self.nodes.get_mut(id) else {
            return false;
        };
        node.status = status;
        if status != NodeStatus::Lost {
            node.last_seen = now;
        }
        true
    }

    pub fn touch(&mut self, id: &str, now: Timestamp) {
        if let Some(node) = self.nodes.get_mut(id) {
            node.last_seen = now;
        }
    }

    /// Remove every node unseen for at least `threshold_secs`.
    pub fn evict_inactive(&mut self, threshold_secs: u64, now: Timestamp) -> Vec<String> {
        let stale: Vec<String> = self
            .nodes
            .values()
            .filter(|n| n.last_seen.has_expired(threshold_secs, now))
            .map(|n| n.id.clone())
            .collect();
        for id in &stale {
            self.nodes.remove(id);
        }
        stale
    }

    pub fn get(&self, id: &str) -> Option<&RouteNode> {
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

    pub fn nodes(&self) -> impl Iterator<Item = &RouteNode> {
        self.nodes.values()
    }

    /// Nodes with a live transport connection.
    pub fn reachable_count(&self) -> usize {
        self.nodes.values().filter(|n| n.status.is_reachable()).count()
    }

    pub fn average_latency_ms(&self) -> f64 {
        average(self.nodes.values().map(|n| n.metrics.latency_ms))
    }

    pub fn average_reliability(&self) -> f64 {
        average(self.nodes.values().map(|n| f64::from(n.metrics.reliability)))
    }

    /// Undirected adjacency: the local node links to every connected node;
    /// advertised links join nodes to each other. Lost nodes carry no edges.
    pub fn adjacency(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut adjacency: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        adjacency.entry(self.local_id.clone()).or_default();

        let mut link = |a: &str, b: &str| {
            if a == b {
                return;
            }
            adjacency.entry(a.to_string()).or_default().insert(b.to_string());
            adjacency.entry(b.to_string()).or_default().insert(a.to_string());
        };

        for node in self.nodes.values().filter(|n| n.is_usable()) {
            if node.status.is_reachable() {
                link(&self.local_id, &node.id);
            }
            for neighbour in &node.links {
                let usable = *neighbour == self.local_id
                    || self.nodes.get(neighbour).is_some_and(RouteNode::is_usable);
                if usable {
                    link(&node.id, neighbour);
                }
            }
        }
        adjacency
    }
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn remote(id: &str, status: NodeStatus) -> RemoteNode {
        RemoteNode::new(id, format!("{id}:8080"), Timestamp::new(100)).with_status(status)
    }

    #[test]
    fn upsert_keeps_throughput_and_skips_self() {
        let mut table = RoutingTable::new("me");
        assert!(!table.upsert(&remote("me", NodeStatus::Active), Timestamp::new(1)));
        assert!(table.upsert(&remote("a", NodeStatus::Connected), Timestamp::new(1)));

        table.update_metrics("a", 20.0, 90, 55.0, Timestamp::new(2));
        assert!(!table.upsert(&remote("a", NodeStatus::Connected), Timestamp::new(3)));
        assert_eq!(table.get("a").unwrap().metrics.throughput, 55.0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn unknown_node_metrics_are_rejected() {
        let mut table = RoutingTable::new("me");
        assert!(!table.update_metrics("ghost", 1.0, 1, 1.0, Timestamp::new(1)));
    }

    #[test]
    fn adjacency_links_self_to_connected_only() {
        let mut table = RoutingTable::new("me");
        table.upsert(&remote("a", NodeStatus::Connected), Timestamp::new(1));
        table.upsert(&remote("b", NodeStatus::Discovered), Timestamp::new(1));
        table.upsert(
            &remote("c", NodeStatus::Active).with_links(["b", "ghost"]),
            Timestamp::new(1),
        );
        table.upsert(&remote("d", NodeStatus::Lost).with_links(["a"]), Timestamp::new(1));

        let adj = table.adjacency();
        assert_eq!(adj["me"], BTreeSet::from(["a".to_string(), "c".to_string()]));
        assert_eq!(adj["b"], BTreeSet::from(["c".to_string()]));
        assert!(!adj.contains_key("d"));
        assert!(!adj.contains_key("ghost"));
    }

    #[test]
    fn eviction_uses_last_seen() {
        let mut table = RoutingTable::new("me");
        table.upsert(&remote("a", NodeStatus::Connected), Timestamp::new(1));
        table.upsert(&remote("b", NodeStatus::Connected), Timestamp::new(1));
        table.touch("b", Timestamp::new(350));

        assert_eq!(table.evict_inactive(300, Timestamp::new(400)), vec!["a".to_string()]);
        assert!(table.contains("b"));
    }

    #[test]
    fn averages_are_zero_when_empty() {
        let table = RoutingTable::new("me");
        assert_eq!(table.average_latency_ms(), 0.0);
        assert_eq!(table.average_reliability(), 0.0);
    }
}
