//! DHT discovery: distance-based lookup through HTTP bootstrap endpoints.
//!
//! Endpoints expose:
//! - `GET  /dht/nodes?near=<hex key>` nodes the endpoint stores near a key
//! - `GET  /dht/find?target=<hex key>` contacts closer to a key
//! - `POST /dht/announce` store a node record under its key
//! - `DELETE /dht/nodes/<id>` drop a node record
//!
//! When the direct lookup finds nothing, up to `find_rounds` iterative
//! find-closer rounds run: first against the endpoints, then against the
//! closest contacts learned so far that advertise a `dht_endpoint`, stopping
//! once a round brings nothing closer. A contact's transport address is never
//! dialled over HTTP.

use std::collections::HashSet;
use std::sync::{Mutex, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::Serialize;

use crate::http;
use crate::kbucket::{key_for, xor_distance, DhtKey, KBucketTable, RoutingEntry, DEFAULT_BUCKET_SIZE};
use crate::{DiscoveryError, DiscoverySource, MethodKind, NodeDescriptor};

/// Contacts queried in parallel per find round.
const ALPHA: usize = 3;

static LOCAL_KEY: OnceLock<DhtKey> = OnceLock::new();

/// This process's DHT key.
///
/// Derived once from host name, user name, clock and pid, then reused for
/// the lifetime of the process.
pub fn local_key() -> DhtKey {
    *LOCAL_KEY.get_or_init(|| {
        let host = std::env::var("HOSTNAME")
            .or_else(|_| std::env::var("COMPUTERNAME"))
            .unwrap_or_default();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default();
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let seed = format!("{host}|{user}|{nanos}|{}", std::process::id());
        key_for(seed.as_bytes())
    })
}

#[derive(Serialize)]
struct Announcement<'a> {
    key: String,
    node: &'a NodeDescriptor,
}

pub struct DhtSource {
    endpoints: Vec<String>,
    find_rounds: usize,
    client: reqwest::Client,
    table: Mutex<KBucketTable>,
    /// Set on announced records so peers can query this node directly.
    advertised_endpoint: Option<String>,
}

impl DhtSource {
    pub fn new(endpoints: Vec<String>, find_rounds: usize, timeout: Duration) -> Self {
        Self::with_key(local_key(), endpoints, find_rounds, timeout)
    }

    pub fn with_key(
        key: DhtKey,
        endpoints: Vec<String>,
        find_rounds: usize,
        timeout: Duration,
    ) -> Self {
        let (valid, invalid): (Vec<String>, Vec<String>) =
            endpoints.into_iter().partition(|e| http::is_valid_endpoint(e));
        for endpoint in &invalid {
            tracing::warn!(%endpoint, "ignoring malformed DHT endpoint");
        }
        Self {
            endpoints: valid,
            find_rounds,
            client: http::client(timeout),
            table: Mutex::new(KBucketTable::new(key, DEFAULT_BUCKET_SIZE)),
            advertised_endpoint: None,
        }
    }

    /// Advertise `endpoint` as this node's `/dht/find` base URL.
    pub fn with_advertised_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.advertised_endpoint = endpoint.filter(|e| {
            let valid = http::is_valid_endpoint(e);
            if !valid {
                tracing::warn!(endpoint = %e, "ignoring malformed advertised DHT endpoint");
            }
            valid
        });
        self
    }

    /// Entries currently held in the k-bucket table.
    pub fn table_len(&self) -> usize {
        self.table().len()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, KBucketTable> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn own_key(&self) -> DhtKey {
        *self.table().own_key()
    }

    fn remember(&self, nodes: &[NodeDescriptor]) {
        let mut table = self.table();
        for node in nodes.iter().filter(|n| n.is_well_formed()) {
            table.update(RoutingEntry::new(node.clone()));
        }
    }

    fn closest_distance(&self, target: &DhtKey) -> Option<DhtKey> {
        self.table()
            .closest(target, 1)
            .first()
            .map(|e| xor_distance(&e.key, target))
    }

    /// Ask every endpoint for records stored near our key.
    async fn direct_lookup(&self, key_hex: &str) -> (Vec<NodeDescriptor>, Option<DiscoveryError>) {
        let mut found = Vec::new();
        let mut last_error = None;
        for endpoint in &self.endpoints {
            let url = http::join(endpoint, &format!("dht/nodes?near={key_hex}"));
            match http::get_json::<Vec<NodeDescriptor>>(&self.client, &url).await {
                Ok(nodes) => found.extend(nodes),
                Err(e) => {
                    tracing::debug!(%endpoint, error = %e, "DHT lookup failed");
                    last_error = Some(e);
                }
            }
        }
        (found, last_error)
    }

    async fn find_closer(&self, target: &DhtKey) -> Vec<NodeDescriptor> {
        let target_hex = hex::encode(target);
        let mut queried: HashSet<String> = HashSet::new();

        for round in 0..self.find_rounds {
            let peers: Vec<String> = if round == 0 {
                self.endpoints.clone()
            } else {
                self.table()
                    .closest(target, ALPHA * 2)
                    .into_iter()
                    .filter_map(|e| e.node.dht_endpoint)
                    .filter(|url| !queried.contains(url))
                    .take(ALPHA)
                    .collect()
            };
            if peers.is_empty() {
                break;
            }

            let before = self.closest_distance(target);
            for peer in peers {
                let url = http::join(&peer, &format!("dht/find?target={target_hex}"));
                queried.insert(peer);
                match http::get_json::<Vec<NodeDescriptor>>(&self.client, &url).await {
                    Ok(nodes) => self.remember(&nodes),
                    Err(e) => tracing::debug!(%url, error = %e, "DHT find failed"),
                }
            }
            let after = self.closest_distance(target);
            tracing::trace!(round, "DHT find round complete");
            if round > 0 && after >= before {
                break;
            }
        }

        self.table()
            .closest(target, DEFAULT_BUCKET_SIZE)
            .into_iter()
            .map(|e| e.node)
            .collect()
    }
}

#[async_trait]
impl DiscoverySource for DhtSource {
    fn kind(&self) -> MethodKind {
        MethodKind::Dht
    }

    async fn query(&self) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        if self.endpoints.is_empty() {
            tracing::debug!("no DHT endpoints configured");
            return Ok(Vec::new());
        }
        let own = self.own_key();
        let (found, last_error) = self.direct_lookup(&hex::encode(own)).await;
        if !found.is_empty() {
            self.remember(&found);
            return Ok(found);
        }

        let closer = self.find_closer(&own).await;
        match (closer.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(closer),
        }
    }

    async fn announce(&self, local: &NodeDescriptor) -> Result<(), DiscoveryError> {
        let mut record = local.clone();
        if record.dht_endpoint.is_none() {
            record.dht_endpoint = self.advertised_endpoint.clone();
        }
        let body = Announcement {
            key: hex::encode(key_for(local.id.as_bytes())),
            node: &record,
        };
        let mut stored = 0usize;
        for endpoint in &self.endpoints {
            let url = http::join(endpoint, "dht/announce");
            match http::send_ok(self.client.post(&url).json(&body), &url).await {
                Ok(()) => stored += 1,
                Err(e) => tracing::debug!(%endpoint, error = %e, "DHT announce failed"),
            }
        }
        if stored == 0 && !self.endpoints.is_empty() {
            return Err(DiscoveryError::Announce("no DHT endpoint accepted the record".into()));
        }
        Ok(())
    }

    async fn withdraw(&self, node_id: &str) -> Result<(), DiscoveryError> {
        for endpoint in &self.endpoints {
            let url = http::join(endpoint, &format!("dht/nodes/{node_id}"));
            if let Err(e) = http::send_ok(self.client.delete(&url), &url).await {
                tracing::debug!(%endpoint, error = %e, "DHT withdraw failed");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::test_server::{serve_json, serve_routes};

    #[test]
    fn local_key_is_stable() {
        assert_eq!(local_key(), local_key());
    }

    #[tokio::test]
    async fn no_endpoints_means_no_results() {
        let source = DhtSource::new(vec!["not-a-url".into()], 3, Duration::from_millis(200));
        assert!(source.query().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn direct_lookup_populates_table() {
        let body = r#"[{"id":"n1","address":"10.0.0.1:8080"},{"id":"n2","address":"10.0.0.2:8080"}]"#;
        let url = serve_json(body.to_string(), 1).await;
        let source = DhtSource::with_key([7u8; 32], vec![url], 3, Duration::from_secs(2));

        let found = source.query().await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(source.table_len(), 2);
    }

    #[tokio::test]
    async fn empty_lookup_falls_back_to_find_rounds() {
        let url = serve_routes(
            vec![
                ("/dht/nodes", "[]".to_string()),
                ("/dht/find", r#"[{"id":"n9","address":"127.0.0.1:1"}]"#.to_string()),
            ],
            2,
        )
        .await;
        let source = DhtSource::with_key([1u8; 32], vec![url], 2, Duration::from_millis(500));

        let found = source.query().await.unwrap();
        assert_eq!(found.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(), vec!["n9"]);
    }

    #[tokio::test]
    async fn unreachable_endpoints_surface_an_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let source = DhtSource::with_key(
            [2u8; 32],
            vec![format!("http://{addr}")],
            1,
            Duration::from_millis(300),
        );
        assert!(source.query().await.is_err());
    }

    #[tokio::test]
    async fn find_rounds_follow_advertised_dht_endpoints() {
        let peer = serve_routes(
            vec![("/dht/find", r#"[{"id":"n10","address":"10.0.0.10:1"}]"#.to_string())],
            1,
        )
        .await;
        let seed = serve_routes(
            vec![
                ("/dht/nodes", "[]".to_string()),
                (
                    "/dht/find",
                    format!(r#"[{{"id":"n9","address":"10.0.0.9:1","dht_endpoint":"{peer}"}}]"#),
                ),
            ],
            2,
        )
        .await;
        let source = DhtSource::with_key([3u8; 32], vec![seed], 3, Duration::from_millis(500));

        let mut ids: Vec<String> = source.query().await.unwrap().into_iter().map(|n| n.id).collect();
        ids.sort();
        assert_eq!(ids, vec!["n10", "n9"]);
    }

    #[test]
    fn malformed_advertised_endpoint_is_dropped() {
        let source = DhtSource::with_key([4u8; 32], Vec::new(), 1, Duration::from_millis(100))
            .with_advertised_endpoint(Some("not a url".into()));
        assert!(source.advertised_endpoint.is_none());
    }
}
