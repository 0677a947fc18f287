//! The seam between the discovery service and the places it finds nodes.

use async_trait::async_trait;

use crate::{DiscoveryError, MethodKind, NodeDescriptor};

/// One way of finding candidate nodes.
///
/// `query` returns unprobed candidates; the service probes them. A source
/// that is misconfigured returns an empty list rather than an error, so one
/// broken method never stops the others.
#[async_trait]
pub trait DiscoverySource: Send + Sync + 'static {
    fn kind(&self) -> MethodKind;

    async fn query(&self) -> Result<Vec<NodeDescriptor>, DiscoveryError>;

    /// Advertise the local node through this source.
    async fn announce(&self, _local: &NodeDescriptor) -> Result<(), DiscoveryError> {
        Ok(())
    }

    /// Withdraw a previous announcement.
    async fn withdraw(&self, _node_id: &str) -> Result<(), DiscoveryError> {
        Ok(())
    }
}
