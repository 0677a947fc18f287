//! Snapshots reported upward by [`OnetNode`](crate::OnetNode).

use std::collections::{BTreeMap, BTreeSet};

use onet_routing::RouteNode;
use onet_types::NodeStatus;
use serde::Serialize;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NetworkStatus {
    pub running: bool,
    pub network_id: &'static str,
    pub node_id: String,
    pub connected_nodes: usize,
    pub known_nodes: usize,
    pub health: f64,
    pub uptime_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TopologyNode {
    pub id: String,
    pub address: String,
    pub status: NodeStatus,
    pub latency_ms: f64,
    pub reliability: u8,
}

impl From<&RouteNode> for TopologyNode {
    fn from(node: &RouteNode) -> Self {
        Self {
            id: node.id.clone(),
            address: node.address.clone(),
            status: node.status,
            latency_ms: node.metrics.latency_ms,
            reliability: node.metrics.reliability,
        }
    }
}

/// An undirected link, stored with `a < b`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct TopologyLink {
    pub a: String,
    pub b: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NetworkTopology {
    pub local_id: String,
    pub nodes: Vec<TopologyNode>,
    pub connections: Vec<TopologyLink>,
}

impl NetworkTopology {
    pub fn build(
        local_id: &str,
        nodes: &[RouteNode],
        adjacency: &BTreeMap<String, BTreeSet<String>>,
    ) -> Self {
        let mut connections: BTreeSet<TopologyLink> = BTreeSet::new();
        for (from, neighbours) in adjacency {
            for to in neighbours {
                let (a, b) = if from < to { (from, to) } else { (to, from) };
                connections.insert(TopologyLink {
                    a: a.clone(),
                    b: b.clone(),
                });
            }
        }
        Self {
            local_id: local_id.to_string(),
            nodes: nodes.iter().map(TopologyNode::from).collect(),
            connections: connections.into_iter().collect(),
        }
    }

    /// Ids directly linked to `id`.
    pub fn neighbours<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> {
        self.connections.iter().filter_map(move |link| {
            if link.a == id {
                Some(link.b.as_str())
            } else if link.b == id {
                Some(link.a.as_str())
            } else {
                None
            }
        })
    }
}
