//! Prometheus metrics for the ONET node.
//!
//! [`NodeMetrics`] owns a dedicated [`Registry`]. Gauges are refreshed from
//! subsystem snapshots by [`OnetNode::refresh_metrics`](crate::OnetNode::refresh_metrics);
//! counters are bumped where the events happen.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};

use crate::NodeError;

pub struct NodeMetrics {
    pub registry: Registry,

    // -- Counters ----------------------------------------------------------------
    /// Nodes first reported by a discovery round.
    pub nodes_discovered: IntCounter,
    pub routes_computed: IntCounter,
    pub route_cache_hits: IntCounter,
    /// Proposals that left `Pending` in a tally.
    pub proposals_decided: IntCounter,
    pub messages_sent: IntCounter,

    // -- Gauges ------------------------------------------------------------------
    pub known_nodes: IntGauge,
    pub connected_nodes: IntGauge,
    pub routing_table_size: IntGauge,
    pub cached_paths: IntGauge,
    pub pending_proposals: IntGauge,
    /// Network health scaled to 0..=1000.
    pub network_health: IntGauge,
}

impl NodeMetrics {
    pub fn new() -> Result<Self, NodeError> {
        let registry = Registry::new();

        let nodes_discovered = register_int_counter_with_registry!(
            Opts::new("onet_nodes_discovered_total", "Nodes reported by discovery rounds"),
            registry
        )?;
        let routes_computed = register_int_counter_with_registry!(
            Opts::new("onet_routes_computed_total", "Routes computed from scratch"),
            registry
        )?;
        let route_cache_hits = register_int_counter_with_registry!(
            Opts::new("onet_route_cache_hits_total", "Routes served from the path cache"),
            registry
        )?;
        let proposals_decided = register_int_counter_with_registry!(
            Opts::new("onet_proposals_decided_total", "Proposals approved, rejected or expired"),
            registry
        )?;
        let messages_sent = register_int_counter_with_registry!(
            Opts::new("onet_messages_sent_total", "Messages handed to the transport"),
            registry
        )?;

        let known_nodes = register_int_gauge_with_registry!(
            Opts::new("onet_known_nodes", "Nodes in the node registry"),
            registry
        )?;
        let connected_nodes = register_int_gauge_with_registry!(
            Opts::new("onet_connected_nodes", "Nodes with a live connection"),
            registry
        )?;
        let routing_table_size = register_int_gauge_with_registry!(
            Opts::new("onet_routing_table_size", "Nodes in the routing table"),
            registry
        )?;
        let cached_paths = register_int_gauge_with_registry!(
            Opts::new("onet_cached_paths", "Paths held in the route cache"),
            registry
        )?;
        let pending_proposals = register_int_gauge_with_registry!(
            Opts::new("onet_pending_proposals", "Consensus proposals awaiting a decision"),
            registry
        )?;
        let network_health = register_int_gauge_with_registry!(
            Opts::new("onet_network_health_permille", "Composite network health, 0 to 1000"),
            registry
        )?;

        Ok(Self {
            registry,
            nodes_discovered,
            routes_computed,
            route_cache_hits,
            proposals_decided,
            messages_sent,
            known_nodes,
            connected_nodes,
            routing_table_size,
            cached_paths,
            pending_proposals,
            network_health,
        })
    }

    /// Health in `[0, 1]` as a permille gauge value.
    pub fn set_health(&self, health: f64) {
        self.network_health
            .set((health.clamp(0.0, 1.0) * 1000.0).round() as i64);
    }

    /// Raise a counter to `target` when it lags behind a subsystem total.
    pub fn catch_up(counter: &IntCounter, target: u64) {
        let current = counter.get();
        if target > current {
            counter.inc_by(target - current);
        }
    }

    /// Encode every metric in the Prometheus text exposition format.
    pub fn encode_text(&self) -> Result<String, NodeError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        String::from_utf8(buf).map_err(|e| NodeError::Config(e.to_string()))
    }
}
