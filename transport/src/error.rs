use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("timed out talking to {0}")]
    Timeout(String),

    #[error("node {0} is unreachable")]
    Unreachable(String),

    #[error("node {0} is not connected")]
    NotConnected(String),

    #[error("transport rejected message: {0}")]
    Rejected(String),

    #[error("transport is shut down")]
    Closed,
}
