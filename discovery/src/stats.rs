use onet_types::Timestamp;
use serde::Serialize;

/// Window over which the discovery rate is measured.
pub const DISCOVERY_RATE_WINDOW_SECS: u64 = 60;

/// Point-in-time discovery statistics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DiscoveryStats {
    pub total_discovered: usize,
    /// Known nodes not currently marked lost.
    pub active_nodes: usize,
    /// Number of active discovery methods.
    pub discovery_methods: usize,
    pub last_discovery: Option<Timestamp>,
    /// Nodes first discovered within the last minute.
    pub discovery_rate: usize,
    pub is_running: bool,
    pub probes_succeeded: u64,
    pub probes_failed: u64,
    pub queries_failed: u64,
    pub nodes_dropped: u64,
}
