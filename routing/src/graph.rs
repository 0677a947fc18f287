//! A weighted view over the routing table used by the path algorithms.

use std::collections::{BTreeMap, BTreeSet};

use crate::{RoutingConfig, RoutingTable};

pub struct Graph<'a> {
    table: &'a RoutingTable,
    adjacency: BTreeMap<String, BTreeSet<String>>,
    fallback_latency_ms: f64,
    max_edge_latency_ms: f64,
}

impl<'a> Graph<'a> {
    pub fn new(table: &'a RoutingTable, config: &RoutingConfig) -> Self {
        Self {
            table,
            adjacency: table.adjacency(),
            fallback_latency_ms: config.fallback_latency_ms,
            max_edge_latency_ms: config.max_edge_latency_ms.max(config.fallback_latency_ms),
        }
    }

    pub fn local_id(&self) -> &str {
        self.table.local_id()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.adjacency.contains_key(id)
    }

    /// Neighbours in id order.
    pub fn neighbours(&self, id: &str) -> impl Iterator<Item = &String> {
        self.adjacency.get(id).into_iter().flatten()
    }

    /// Latency used for weighting: zero for the local node, the fallback for
    /// unmeasured nodes, capped at the configured maximum.
    pub fn latency(&self, id: &str) -> f64 {
        if id == self.table.local_id() {
            return 0.0;
        }
        let measured = self
            .table
            .get(id)
            .map(|n| n.metrics.latency_ms)
            .unwrap_or(self.fallback_latency_ms);
        if measured.is_finite() && measured > 0.0 {
            measured.min(self.max_edge_latency_ms)
        } else {
            self.fallback_latency_ms
        }
    }

    /// Edge weight: the sum of both endpoints' latencies.
    pub fn weight(&self, from: &str, to: &str) -> f64 {
        self.latency(from) + self.latency(to)
    }

    /// Reliability percentage of `id`; the local node counts as fully reliable.
    pub fn reliability(&self, id: &str) -> u8 {
        if id == self.table.local_id() {
            return onet_types::MAX_RELIABILITY;
        }
        self.table.get(id).map(|n| n.metrics.reliability).unwrap_or(0)
    }

    pub fn node_count(&self) -> usize {
        self.table.len()
    }
}
