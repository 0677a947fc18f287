use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("discovery error: {0}")]
    Discovery(#[from] onet_discovery::DiscoveryError),

    #[error("routing error: {0}")]
    Routing(#[from] onet_routing::RoutingError),

    #[error("consensus error: {0}")]
    Consensus(#[from] onet_consensus::ConsensusError),

    #[error("transport error: {0}")]
    Transport(#[from] onet_transport::TransportError),

    #[error("config error: {0}")]
    Config(String),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("network is not running")]
    NotRunning,

    #[error("connection to {0} refused")]
    ConnectionRefused(String),

    #[error("message target {0} is the local node")]
    SelfTarget(String),
}
