//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};

use onet_consensus::ConsensusConfig;
use onet_discovery::DiscoveryConfig;
use onet_routing::RoutingConfig;
use onet_types::{Capabilities, NetworkId};

use crate::NodeError;

/// Configuration for an ONET node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which overlay to join.
    #[serde(default = "default_network")]
    pub network: NetworkId,

    /// Identity of this node. Derived from the local DHT key when unset.
    #[serde(default)]
    pub node_id: Option<String>,

    /// Address other nodes reach this node at. Defaults to
    /// `127.0.0.1:<network port>`.
    #[serde(default)]
    pub advertise_address: Option<String>,

    /// Capability tags announced for this node.
    #[serde(default = "default_capabilities")]
    pub capabilities: Capabilities,

    /// Open transport connections to newly discovered nodes.
    #[serde(default = "default_true")]
    pub auto_connect: bool,

    /// Upper bound on connections opened by auto-connect.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Stake this node votes with. The node stays out of the consensus
    /// roster when unset.
    #[serde(default)]
    pub consensus_stake: Option<f64>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Whether to keep Prometheus metrics.
    #[serde(default)]
    pub enable_metrics: bool,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub routing: RoutingConfig,

    #[serde(default)]
    pub consensus: ConsensusConfig,
}

fn default_network() -> NetworkId {
    NetworkId::Dev
}

fn default_capabilities() -> Capabilities {
    ["routing", "consensus"].iter().map(|c| c.to_string()).collect()
}

fn default_true() -> bool {
    true
}

fn default_max_connections() -> usize {
    50
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// -- Impl ----------------------------------------------------------------------

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<std::path::Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if let Some(id) = &self.node_id {
            if id.trim().is_empty() {
                return Err(NodeError::Config("node_id must not be empty".into()));
            }
        }
        if let Some(stake) = self.consensus_stake {
            if !stake.is_finite() || stake < 0.0 {
                return Err(NodeError::Config(format!(
                    "consensus_stake must be a non-negative number, got {stake}"
                )));
            }
        }
        if self.consensus.tally_interval_secs == 0 {
            return Err(NodeError::Config("consensus.tally_interval_secs must be > 0".into()));
        }
        self.log_format.parse::<crate::LogFormat>()?;
        Ok(())
    }

    /// The configured node id, or one derived from the local DHT key.
    pub fn resolved_node_id(&self) -> String {
        match &self.node_id {
            Some(id) => id.clone(),
            None => hex::encode(onet_discovery::dht::local_key()),
        }
    }

    pub fn resolved_address(&self) -> String {
        match &self.advertise_address {
            Some(address) => address.clone(),
            None => format!("127.0.0.1:{}", self.network.default_port()),
        }
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            node_id: None,
            advertise_address: None,
            capabilities: default_capabilities(),
            auto_connect: true,
            max_connections: default_max_connections(),
            consensus_stake: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
            enable_metrics: false,
            discovery: DiscoveryConfig::default(),
            routing: RoutingConfig::default(),
            consensus: ConsensusConfig::default(),
        }
    }
}
