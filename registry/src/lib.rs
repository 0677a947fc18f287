//! Node registry & metrics for the ONET overlay.
//!
//! One table of known remote nodes shared by every subsystem. Discovery
//! merges probe results into it, routing reads snapshots of it and the
//! network facade reports from it. Mutations happen under a single
//! `tokio::sync::RwLock` owned by whoever constructs the [`SharedRegistry`];
//! probes are never run while that lock is held.

pub mod health;
pub mod history;
pub mod registry;

pub use health::health_score;
pub use history::ProbeHistory;
pub use registry::{MergeOutcome, NodeRegistry, SharedRegistry, DEFAULT_MAX_PROBE_FAILURES};
