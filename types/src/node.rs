//! Remote node records shared by discovery, routing and the network facade.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::Timestamp;

/// Capability tags advertised by a node (e.g. `"p2p"`, `"storage"`).
///
/// Ordered so snapshots and serialized records are deterministic.
pub type Capabilities = BTreeSet<String>;

/// Reliability assigned to a node before any probe history exists.
pub const DEFAULT_RELIABILITY: u8 = 85;

/// Upper bound of the reliability percentage.
pub const MAX_RELIABILITY: u8 = 100;

/// Lifecycle status of a remote node.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Seen by a discovery method and passed a connectivity probe.
    #[default]
    Discovered,
    /// The transport holds an open connection to the node.
    Connected,
    /// Connected and recently exchanged traffic.
    Active,
    /// Failed repeated probes or was reported disconnected.
    Lost,
}

impl NodeStatus {
    /// Whether the node can currently be used as a routing hop.
    pub fn is_reachable(self) -> bool {
        matches!(self, Self::Connected | Self::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Connected => "connected",
            Self::Active => "active",
            Self::Lost => "lost",
        }
    }
}

/// A known remote node and its most recent health metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RemoteNode {
    pub id: String,
    /// Transport address, usually `"host:port"`.
    pub address: String,
    pub capabilities: Capabilities,
    pub status: NodeStatus,
    /// Last measured round-trip latency in milliseconds.
    pub latency_ms: f64,
    /// Reliability percentage, `0..=100`.
    pub reliability: u8,
    pub discovered_at: Timestamp,
    pub last_seen: Timestamp,
    /// Neighbours this node advertised as directly reachable from it.
    #[serde(default)]
    pub links: BTreeSet<String>,
}

impl RemoteNode {
    /// A freshly discovered node with baseline metrics.
    pub fn new(id: impl Into<String>, address: impl Into<String>, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            capabilities: Capabilities::new(),
            status: NodeStatus::Discovered,
            latency_ms: 0.0,
            reliability: DEFAULT_RELIABILITY,
            discovered_at: now,
            last_seen: now,
            links: BTreeSet::new(),
        }
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_status(mut self, status: NodeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_latency(mut self, latency_ms: f64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    pub fn with_reliability(mut self, reliability: u8) -> Self {
        self.reliability = reliability.min(MAX_RELIABILITY);
        self
    }

    pub fn with_links<I, S>(mut self, links: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.links = links.into_iter().map(Into::into).collect();
        self
    }

    /// Whether the node has not been seen for at least `threshold_secs`.
    pub fn is_stale(&self, threshold_secs: u64, now: Timestamp) -> bool {
        self.last_seen.has_expired(threshold_secs, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_node_starts_discovered_with_baseline_reliability() {
        let node = RemoteNode::new("a", "10.0.0.1:8080", Timestamp::new(10));
        assert_eq!(node.status, NodeStatus::Discovered);
        assert_eq!(node.reliability, DEFAULT_RELIABILITY);
        assert_eq!(node.last_seen, Timestamp::new(10));
    }

    #[test]
    fn reliability_is_clamped() {
        let node = RemoteNode::new("a", "x", Timestamp::EPOCH).with_reliability(250);
        assert_eq!(node.reliability, MAX_RELIABILITY);
    }

    #[test]
    fn staleness_uses_last_seen() {
        let node = RemoteNode::new("a", "x", Timestamp::new(100));
        assert!(!node.is_stale(300, Timestamp::new(399)));
        assert!(node.is_stale(300, Timestamp::new(400)));
    }

    #[test]
    fn only_connected_and_active_are_reachable() {
        assert!(!NodeStatus::Discovered.is_reachable());
        assert!(NodeStatus::Connected.is_reachable());
        assert!(NodeStatus::Active.is_reachable());
        assert!(!NodeStatus::Lost.is_reachable());
    }
}
