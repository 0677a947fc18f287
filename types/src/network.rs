//! Network identifier.

use serde::{Deserialize, Serialize};

/// Identifies which ONET overlay a node participates in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkId {
    /// The production overlay.
    Live,
    /// The public test overlay.
    Test,
    /// Local development overlay.
    #[default]
    Dev,
}

impl NetworkId {
    /// Default P2P port for this network.
    pub fn default_port(&self) -> u16 {
        match self {
            Self::Live => 8080,
            Self::Test => 18080,
            Self::Dev => 28080,
        }
    }

    /// Network id string reported by `GetNetworkStatus`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "onet-network",
            Self::Test => "onet-testnet",
            Self::Dev => "onet-devnet",
        }
    }

    /// Parse a user-supplied network name. Unknown names map to `Dev`.
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "live" | "onet-network" => Self::Live,
            "test" | "onet-testnet" => Self::Test,
            _ => Self::Dev,
        }
    }
}
