//! Routing configuration, embedded in the node config as `[routing]`.

use serde::{Deserialize, Serialize};

use crate::Algorithm;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    pub algorithm: Algorithm,
    /// Nodes unseen for this long are evicted by the optimizer.
    pub inactivity_threshold_secs: u64,
    /// Cached paths older than this are purged.
    pub path_ttl_secs: u64,
    /// Cached paths unused for this long are purged.
    pub path_idle_secs: u64,
    /// Starting point for the adaptive optimizer interval.
    pub optimize_interval_secs: u64,
    /// Latency used for nodes with no usable measurement.
    pub fallback_latency_ms: f64,
    /// Upper bound on any single node's contribution to an edge weight.
    pub max_edge_latency_ms: f64,
    /// Cached routes re-evaluated per optimizer cycle.
    pub sample_routes: usize,
    /// Quality gain (in `[0, 1]`) that counts as a material improvement.
    pub improvement_threshold: f64,
    /// How long recovery pins the shortest-path algorithm.
    pub forced_algorithm_secs: u64,
    pub probe_timeout_ms: u64,
    /// Ceiling for the probe timeout while timeout recovery is in effect.
    pub max_probe_timeout_ms: u64,
    /// How long a raised probe timeout stays in effect.
    pub timeout_tolerance_secs: u64,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Intelligent,
            inactivity_threshold_secs: 300,
            path_ttl_secs: 600,
            path_idle_secs: 1_800,
            optimize_interval_secs: 10,
            fallback_latency_ms: onet_transport::probe::DEFAULT_LATENCY_MS,
            max_edge_latency_ms: 10_000.0,
            sample_routes: 5,
            improvement_threshold: 0.1,
            forced_algorithm_secs: 60,
            probe_timeout_ms: 2_000,
            max_probe_timeout_ms: 10_000,
            timeout_tolerance_secs: 120,
        }
    }
}
