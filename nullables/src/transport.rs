//! Nullable transport: record traffic without sending it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use onet_transport::{Transport, TransportError, TransportEvent, EVENT_CHANNEL_CAPACITY};
use tokio::sync::broadcast;

/// A test transport that records messages instead of sending them.
///
/// Connections succeed unless the node id was marked unreachable. Sends to a
/// node can be scripted to fail with a specific [`TransportError`].
pub struct NullTransport {
    /// node id -> address of open connections.
    connections: Mutex<BTreeMap<String, String>>,
    unreachable: Mutex<HashSet<String>>,
    send_failures: Mutex<HashMap<String, TransportError>>,
    /// All point-to-point messages "sent", as (target, payload).
    sent: Mutex<Vec<(String, Vec<u8>)>>,
    /// All broadcast payloads.
    broadcasts: Mutex<Vec<Vec<u8>>>,
    events: broadcast::Sender<TransportEvent>,
}

impl NullTransport {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connections: Mutex::new(BTreeMap::new()),
            unreachable: Mutex::new(HashSet::new()),
            send_failures: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            broadcasts: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Make future connects to `node_id` fail.
    pub fn refuse(&self, node_id: &str) {
        lock(&self.unreachable).insert(node_id.to_string());
    }

    /// Make sends to `node_id` fail with `error` until cleared.
    pub fn fail_sends_to(&self, node_id: &str, error: TransportError) {
        lock(&self.send_failures).insert(node_id.to_string(), error);
    }

    pub fn clear_send_failures(&self) {
        lock(&self.send_failures).clear();
    }

    /// Deliver an event to every subscriber, as if the wire produced it.
    pub fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Get all sent messages (for assertions).
    pub fn sent(&self) -> Vec<(String, Vec<u8>)> {
        lock(&self.sent).clone()
    }

    pub fn broadcasts(&self) -> Vec<Vec<u8>> {
        lock(&self.broadcasts).clone()
    }

    pub fn connected_ids(&self) -> Vec<String> {
        lock(&self.connections).keys().cloned().collect()
    }

    /// Clear recorded traffic.
    pub fn reset(&self) {
        lock(&self.sent).clear();
        lock(&self.broadcasts).clear();
    }
}

impl Default for NullTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for NullTransport {
    async fn connect_to_node(&self, node_id: &str, address: &str) -> bool {
        if lock(&self.unreachable).contains(node_id) {
            return false;
        }
        lock(&self.connections).insert(node_id.to_string(), address.to_string());
        self.emit(TransportEvent::NodeConnected {
            node_id: node_id.to_string(),
            address: address.to_string(),
        });
        true
    }

    async fn disconnect_from_node(&self, node_id: &str) -> Result<(), TransportError> {
        if lock(&self.connections).remove(node_id).is_none() {
            return Err(TransportError::NotConnected(node_id.to_string()));
        }
        self.emit(TransportEvent::NodeDisconnected {
            node_id: node_id.to_string(),
        });
        Ok(())
    }

    async fn send_message(&self, target_id: &str, payload: &[u8]) -> Result<(), TransportError> {
        if let Some(error) = lock(&self.send_failures).get(target_id) {
            return Err(error.clone());
        }
        lock(&self.sent).push((target_id.to_string(), payload.to_vec()));
        Ok(())
    }

    async fn broadcast_message(&self, payload: &[u8]) -> Result<usize, TransportError> {
        lock(&self.broadcasts).push(payload.to_vec());
        Ok(lock(&self.connections).len())
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_sends_and_connections() {
        let transport = NullTransport::new();
        let mut events = transport.subscribe();

        assert!(transport.connect_to_node("a", "10.0.0.1:8080").await);
        assert!(matches!(
            events.recv().await.unwrap(),
            TransportEvent::NodeConnected { .. }
        ));

        transport.send_message("a", b"hi").await.unwrap();
        assert_eq!(transport.sent(), vec![("a".to_string(), b"hi".to_vec())]);
        assert_eq!(transport.broadcast_message(b"all").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn scripted_failures() {
        let transport = NullTransport::new();
        transport.refuse("b");
        assert!(!transport.connect_to_node("b", "10.0.0.2:8080").await);

        transport.fail_sends_to("c", TransportError::Timeout("c".into()));
        let err = transport.send_message("c", b"x").await.unwrap_err();
        assert_eq!(err, TransportError::Timeout("c".into()));
        assert!(transport.sent().is_empty());

        assert!(transport.disconnect_from_node("nobody").await.is_err());
    }
}
