//! Fundamental types for the ONET overlay network.
//!
//! Shared by every subsystem crate: remote node records and their lifecycle
//! status, capability tags, Unix-second timestamps and network identifiers.

pub mod network;
pub mod node;
pub mod time;

pub use network::NetworkId;
pub use node::{Capabilities, NodeStatus, RemoteNode, DEFAULT_RELIABILITY, MAX_RELIABILITY};
pub use time::Timestamp;
