//! Public-registry discovery: a read-only JSON-RPC listing of announced nodes.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::http;
use crate::{DiscoveryError, DiscoverySource, MethodKind, NodeDescriptor};

const LIST_METHOD: &str = "onet_listNodes";

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: [(); 0],
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Vec<NodeDescriptor>>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

pub struct RegistrySource {
    url: Option<String>,
    client: reqwest::Client,
}

impl RegistrySource {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        let url = url.filter(|u| {
            let ok = http::is_valid_endpoint(u);
            if !ok {
                tracing::warn!(url = %u, "ignoring malformed registry URL");
            }
            ok
        });
        Self {
            url,
            client: http::client(timeout),
        }
    }
}

#[async_trait]
impl DiscoverySource for RegistrySource {
    fn kind(&self) -> MethodKind {
        MethodKind::Registry
    }

    async fn query(&self) -> Result<Vec<NodeDescriptor>, DiscoveryError> {
        let Some(url) = &self.url else {
            tracing::debug!("no registry URL configured");
            return Ok(Vec::new());
        };
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method: LIST_METHOD,
            params: [],
        };
        let response: RpcResponse = http::post_json(&self.client, url, &request).await?;
        if let Some(error) = response.error {
            return Err(DiscoveryError::Query {
                endpoint: url.clone(),
                reason: format!("rpc error {}: {}", error.code, error.message),
            });
        }
        Ok(response.result.unwrap_or_default())
    }
}
