//! Overlay routing.
//!
//! Keeps a routing table of known nodes, computes paths from the local node
//! with one of several algorithms, memoizes them per (target, priority) and
//! keeps the cache honest as node metrics and membership change. A
//! background optimizer evicts inactive nodes and looks for better routes;
//! failures are handled by class-specific recovery.

pub mod algorithm;
pub mod algorithms;
pub mod cache;
pub mod config;
pub mod error;
pub mod graph;
pub mod path;
pub mod router;
pub mod service;
pub mod table;

pub use algorithm::{Algorithm, RoutePriority};
pub use cache::{CacheKey, PathCache};
pub use config::RoutingConfig;
pub use error::{ErrorClass, RoutingError};
pub use path::{PathScores, RoutingPath};
pub use router::{OptimizationReport, RouteImprovement, Router, RoutingStats};
pub use service::{RecoveryReport, Routing};
pub use table::{NodeMetrics, RouteNode, RoutingTable};
