//! ONET node: wires discovery, routing and consensus to one transport.
//!
//! The node is the coordinator that:
//! - Announces itself and keeps discovery running
//! - Feeds discovered nodes into routing and opens connections to them
//! - Sends and broadcasts through the transport along computed routes
//! - Runs consensus over the same transport
//! - Reports status, topology, health and Prometheus metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;
pub mod status;

pub use config::NodeConfig;
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::NodeMetrics;
pub use node::OnetNode;
pub use shutdown::ShutdownController;
pub use status::{NetworkStatus, NetworkTopology, TopologyLink, TopologyNode};
