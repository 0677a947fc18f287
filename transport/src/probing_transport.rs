//! A stand-in transport that tracks connections by probing.
//!
//! Used by the daemon when no real framing layer is wired in: a connection
//! "opens" when the address answers a TCP probe, and sends are logged rather
//! than written to the wire.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};

use crate::{Prober, TcpProber, Transport, TransportError, TransportEvent, EVENT_CHANNEL_CAPACITY};

pub struct ProbingTransport<P = TcpProber> {
    prober: P,
    connect_timeout: Duration,
    /// node id -> address of nodes that answered the connect probe.
    connections: RwLock<HashMap<String, String>>,
    events: broadcast::Sender<TransportEvent>,
}

impl ProbingTransport<TcpProber> {
    pub fn new(connect_timeout: Duration) -> Self {
        Self::with_prober(TcpProber, connect_timeout)
    }
}

impl<P: Prober> ProbingTransport<P> {
    pub fn with_prober(prober: P, connect_timeout: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            prober,
            connect_timeout,
            connections: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }
}

#[async_trait]
impl<P: Prober> Transport for ProbingTransport<P> {
    async fn connect_to_node(&self, node_id: &str, address: &str) -> bool {
        let outcome = self.prober.probe(address, self.connect_timeout).await;
        if !outcome.is_reachable() {
            return false;
        }
        self.connections
            .write()
            .await
            .insert(node_id.to_string(), address.to_string());
        let _ = self.events.send(TransportEvent::NodeConnected {
            node_id: node_id.to_string(),
            address: address.to_string(),
        });
        true
    }

    async fn disconnect_from_node(&self, node_id: &str) -> Result<(), TransportError> {
        if self.connections.write().await.remove(node_id).is_none() {
            return Err(TransportError::NotConnected(node_id.to_string()));
        }
        let _ = self.events.send(TransportEvent::NodeDisconnected {
            node_id: node_id.to_string(),
        });
        Ok(())
    }

    async fn send_message(&self, target_id: &str, payload: &[u8]) -> Result<(), TransportError> {
        let connections = self.connections.read().await;
        let Some(address) = connections.get(target_id) else {
            return Err(TransportError::NotConnected(target_id.to_string()));
        };
        tracing::debug!(target = %target_id, %address, bytes = payload.len(), "send");
        Ok(())
    }

    async fn broadcast_message(&self, payload: &[u8]) -> Result<usize, TransportError> {
        let count = self.connections.read().await.len();
        tracing::debug!(peers = count, bytes = payload.len(), "broadcast");
        Ok(count)
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_emits_event_and_enables_send() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let transport = ProbingTransport::new(Duration::from_secs(1));
        let mut events = transport.subscribe();

        assert!(transport.connect_to_node("n1", &addr).await);
        assert_eq!(
            events.recv().await.unwrap(),
            TransportEvent::NodeConnected {
                node_id: "n1".into(),
                address: addr.clone()
            }
        );
        assert!(transport.send_message("n1", b"hi").await.is_ok());
        assert_eq!(transport.broadcast_message(b"all").await, Ok(1));

        transport.disconnect_from_node("n1").await.unwrap();
        assert_eq!(
            transport.send_message("n1", b"hi").await,
            Err(TransportError::NotConnected("n1".into()))
        );
    }

    #[tokio::test]
    async fn unreachable_node_is_not_connected() {
        let transport = ProbingTransport::new(Duration::from_millis(200));
        assert!(!transport.connect_to_node("ghost", "127.0.0.1:1").await);
        assert_eq!(transport.connection_count().await, 0);
    }
}
