use thiserror::Error;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("query to {endpoint} failed: {reason}")]
    Query { endpoint: String, reason: String },

    #[error("query to {0} timed out")]
    Timeout(String),

    #[error("malformed response from {endpoint}: {reason}")]
    Decode { endpoint: String, reason: String },

    #[error("announcement failed: {0}")]
    Announce(String),

    #[error("invalid discovery configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
