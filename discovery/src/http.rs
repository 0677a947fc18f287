//! Small JSON-over-HTTP helpers shared by the DHT, registry and bootstrap
//! sources.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::DiscoveryError;

pub(crate) fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "falling back to default HTTP client");
            reqwest::Client::new()
        })
}

/// Only absolute http(s) URLs are usable endpoints.
pub(crate) fn is_valid_endpoint(endpoint: &str) -> bool {
    let rest = endpoint
        .strip_prefix("http://")
        .or_else(|| endpoint.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty() && !host.contains(char::is_whitespace))
}

pub(crate) fn join(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path.trim_start_matches('/'))
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
) -> Result<T, DiscoveryError> {
    let response = client.get(url).send().await.map_err(|e| request_error(url, e))?;
    decode(url, response).await
}

pub(crate) async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    body: &B,
) -> Result<T, DiscoveryError> {
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| request_error(url, e))?;
    decode(url, response).await
}

/// Fire a request whose response body is irrelevant.
pub(crate) async fn send_ok(
    request: reqwest::RequestBuilder,
    url: &str,
) -> Result<(), DiscoveryError> {
    let response = request.send().await.map_err(|e| request_error(url, e))?;
    if !response.status().is_success() {
        return Err(DiscoveryError::Query {
            endpoint: url.to_string(),
            reason: format!("status {}", response.status()),
        });
    }
    Ok(())
}

async fn decode<T: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<T, DiscoveryError> {
    if !response.status().is_success() {
        return Err(DiscoveryError::Query {
            endpoint: url.to_string(),
            reason: format!("status {}", response.status()),
        });
    }
    response.json::<T>().await.map_err(|e| DiscoveryError::Decode {
        endpoint: url.to_string(),
        reason: e.to_string(),
    })
}

fn request_error(url: &str, e: reqwest::Error) -> DiscoveryError {
    if e.is_timeout() {
        DiscoveryError::Timeout(url.to_string())
    } else {
        DiscoveryError::Query {
            endpoint: url.to_string(),
            reason: e.to_string(),
        }
    }
}
