//! The transport contract consumed by every subsystem.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::TransportError;

/// Capacity of the membership/message event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events a transport emits to its subscribers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    NodeConnected { node_id: String, address: String },
    NodeDisconnected { node_id: String },
    MessageReceived { from: String, payload: Vec<u8> },
}

/// Low-level message transport between overlay nodes.
///
/// Implementations own sockets and framing. The overlay only relies on the
/// operations below and on the events delivered through [`subscribe`].
///
/// [`subscribe`]: Transport::subscribe
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Open a connection to `node_id` at `address`. Returns `false` when the
    /// node could not be reached.
    async fn connect_to_node(&self, node_id: &str, address: &str) -> bool;

    /// Close the connection to `node_id`, if any.
    async fn disconnect_from_node(&self, node_id: &str) -> Result<(), TransportError>;

    /// Deliver `payload` to a directly connected node.
    async fn send_message(&self, target_id: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Deliver `payload` to every connected node. Returns how many nodes the
    /// message was handed to.
    async fn broadcast_message(&self, payload: &[u8]) -> Result<usize, TransportError>;

    /// Subscribe to membership and message events.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;
}
