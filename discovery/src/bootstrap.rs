//! Bootstrap discovery: ask a static list of seed servers for their peers.

use std::time::Duration;

use async_trait::async_trait;

use crate::http;
use crate::{DiscoveryError, DiscoverySource, MethodKind, NodeDescriptor};

/// Pause between attempts against the same endpoint.
const RETRY_DELAY: Duration = Duration::from_millis(200);

pub struct BootstrapSource {
    endpoints: Vec<String>,
    attempts: u32,
    client: reqwest::Client,
}

impl BootstrapSource {
    pub fn new(endpoints: Vec<String>, attempts: u32, timeout: Duration) -> Self {
        let (valid, invalid): (Vec<String>, Vec<String>) =
            endpoints.into_iter().partition(|e| http::is_valid_endpoint(e));
        for endpoint in &invalid {
            tracing::warn!(%endpoint, "skipping malformed bootstrap endpoint");
        }
        Self {
            endpoints: valid,
            attempts: attempts.max(1),
            client: http::client(timeout),
        }
    }

    async fn peers_of(&self, endpoint: &str) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        let url = http::join(endpoint, "peers");
        let mut attempt = 1;
        loop {
            match http::get_json::<Vec<NodeDescriptor>>(&self.client, &url).await {
                Ok(peers) => return Ok(peers),
                Err(e) if attempt >= self.attempts => return Err(e),
                Err(e) => {
                    tracing::debug!(%endpoint, attempt, error = %e, "bootstrap query failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}

#[async_trait]
impl DiscoverySource for BootstrapSource {
    fn kind(&self) -> MethodKind {
        MethodKind::Bootstrap
    }

    async fn query(&self) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        if self.endpoints.is_empty() {
            tracing::debug!("no bootstrap endpoints configured");
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        let mut last_error = None;
        for endpoint in &self.endpoints {
            match self.peers_of(endpoint).await {
                Ok(peers) => found.extend(peers),
                Err(e) => {
                    tracing::warn!(%endpoint, error = %e, "bootstrap endpoint unavailable");
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if found.is_empty() => Err(e),
            _ => Ok(found),
        }
    }

    async fn announce(&self, local: &NodeDescriptor) -> Result<(), DiscoveryError> {
        let mut accepted = 0usize;
        for endpoint in &self.endpoints {
            let url = http::join(endpoint, "peers");
            match http::send_ok(self.client.post(&url).json(local), &url).await {
                Ok(()) => accepted += 1,
                Err(e) => tracing::debug!(%endpoint, error = %e, "bootstrap announce failed"),
            }
        }
        if accepted == 0 && !self.endpoints.is_empty() {
            return Err(DiscoveryError::Announce("no bootstrap server accepted the record".into()));
        }
        Ok(())
    }

    async fn withdraw(&self, node_id: &str) -> Result<(), DiscoveryError> {
        for endpoint in &self.endpoints {
            let url = http::join(endpoint, &format!("peers/{node_id}"));
            if let Err(e) = http::send_ok(self.client.delete(&url), &url).await {
                tracing::debug!(%endpoint, error = %e, "bootstrap withdraw failed");
            }
        }
        Ok(())
    }
}
