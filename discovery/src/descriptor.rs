//! The JSON node record exchanged with registries, bootstrap servers and
//! DHT endpoints.

use onet_types::{Capabilities, RemoteNode, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A node as advertised by some discovery source, before it is probed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub id: String,
    pub address: String,
    #[serde(default)]
    pub capabilities: Capabilities,
    #[serde(default)]
    pub links: BTreeSet<String>,
    /// Base URL where the node answers `/dht/find`. Nodes without one are
    /// kept as contacts but never asked for closer contacts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dht_endpoint: Option<String>,
}

impl NodeDescriptor {
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            capabilities: Capabilities::new(),
            links: BTreeSet::new(),
            dht_endpoint: None,
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

    /// Sources occasionally return half-filled records; those are skipped.
    pub fn is_well_formed(&self) -> bool {
        !self.id.trim().is_empty() && !self.address.trim().is_empty()
    }

    /// A registry record for a node that answered its probe.
    pub fn into_remote(self, latency_ms: f64, now: Timestamp) -> RemoteNode {
        RemoteNode::new(self.id, self.address, now)
            .with_capabilities(self.capabilities)
            .with_links(self.links)
            .with_latency(latency_ms)
    }
}

impl From<&RemoteNode> for NodeDescriptor {
    fn from(node: &RemoteNode) -> Self {
        Self {
            id: node.id.clone(),
            address: node.address.clone(),
            capabilities: node.capabilities.clone(),
            links: node.links.clone(),
            dht_endpoint: None,
        }
    }
}
