//! Node discovery for the ONET overlay.
//!
//! Four methods find candidate nodes, each on its own polling cadence:
//! DHT lookup, local-segment handshake, a public registry and a static
//! bootstrap list. Every candidate is probed for reachability and latency
//! before it enters the shared node registry; nodes that keep failing probes
//! are dropped again.

pub mod bootstrap;
pub mod config;
pub mod descriptor;
pub mod dht;
pub mod error;
pub mod event;
mod http;
pub mod kbucket;
pub mod local;
pub mod method;
pub mod public_registry;
pub mod service;
pub mod source;
pub mod stats;

pub use config::DiscoveryConfig;
pub use descriptor::NodeDescriptor;
pub use error::DiscoveryError;
pub use event::{DiscoveryEvent, DISCOVERY_EVENT_CAPACITY};
pub use method::{DiscoveryMethod, MethodKind};
pub use service::{Discovery, MethodEntry};
pub use source::DiscoverySource;
pub use stats::DiscoveryStats;
