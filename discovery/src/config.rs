//! Discovery configuration, embedded in the node config as `[discovery]`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::MethodKind;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Methods to run. Anything not listed stays inactive.
    pub methods: Vec<MethodKind>,

    /// Base URLs of DHT bootstrap endpoints (e.g. `http://dht1.onet.network:8080`).
    pub dht_endpoints: Vec<String>,
    /// Base URL this node serves `/dht/find` on, advertised with its DHT
    /// record. `None` keeps the node out of other nodes' find rounds.
    pub dht_advertise_endpoint: Option<String>,
    /// Maximum find-closer rounds when a direct DHT lookup comes back empty.
    pub dht_find_rounds: usize,

    /// Hosts probed on the local segment.
    pub local_hosts: Vec<String>,
    /// Well-known ports probed on each local host.
    pub local_ports: Vec<u16>,
    /// Port on which this node answers local-segment handshakes once
    /// registered. `None` disables answering.
    pub local_announce_port: Option<u16>,

    /// JSON-RPC URL of the public node registry.
    pub registry_url: Option<String>,

    /// Base URLs of bootstrap servers queried at `{endpoint}/peers`.
    pub bootstrap_endpoints: Vec<String>,
    /// Attempts per bootstrap endpoint before giving up on it.
    pub bootstrap_attempts: u32,

    /// Timeout for a single HTTP or handshake exchange, in milliseconds.
    pub query_timeout_ms: u64,
    /// Timeout for a single connectivity probe, in milliseconds.
    pub probe_timeout_ms: u64,
    /// Consecutive failed probes after which a node is dropped.
    pub max_probe_failures: u32,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            methods: MethodKind::ALL.to_vec(),
            dht_endpoints: vec![
                "http://dht1.onet.network:8080".to_string(),
                "http://dht2.onet.network:8080".to_string(),
            ],
            dht_advertise_endpoint: None,
            dht_find_rounds: 3,
            local_hosts: vec!["127.0.0.1".to_string()],
            local_ports: vec![8080, 8081, 8082, 8083],
            local_announce_port: None,
            registry_url: Some("https://registry.onet.network/rpc".to_string()),
            bootstrap_endpoints: vec![
                "http://bootstrap1.onet.network:8080".to_string(),
                "http://bootstrap2.onet.network:8080".to_string(),
                "http://bootstrap3.onet.network:8080".to_string(),
            ],
            bootstrap_attempts: 3,
            query_timeout_ms: 5_000,
            probe_timeout_ms: 2_000,
            max_probe_failures: onet_registry::DEFAULT_MAX_PROBE_FAILURES,
        }
    }
}

impl DiscoveryConfig {
    /// A config with every method disabled and no endpoints. Tests and
    /// embedders start from this and switch on what they need.
    pub fn empty() -> Self {
        Self {
            methods: Vec::new(),
            dht_endpoints: Vec::new(),
            local_hosts: Vec::new(),
            local_ports: Vec::new(),
            registry_url: None,
            bootstrap_endpoints: Vec::new(),
            ..Self::default()
        }
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn is_enabled(&self, kind: MethodKind) -> bool {
        self.methods.contains(&kind)
    }
}
