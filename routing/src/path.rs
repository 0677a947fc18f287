//! Computed paths and how they are scored.

use onet_types::Timestamp;
use serde::Serialize;

use crate::graph::Graph;
use crate::{Algorithm, RoutePriority};

/// Weight of the latency component in a path's quality.
const LATENCY_WEIGHT: f64 = 0.6;
/// Weight of the reliability component in a path's quality.
const RELIABILITY_WEIGHT: f64 = 0.4;
/// Average hop latency at which the latency component reaches zero.
const LATENCY_CEILING_MS: f64 = 1_000.0;

/// Derived scores for a node sequence.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct PathScores {
    /// Summed edge weight.
    pub cost: f64,
    /// `max(0, 1 - avg hop latency / 1000)`.
    pub efficiency: f64,
    /// Average hop reliability, in `[0, 1]`.
    pub stability: f64,
    /// Blend of efficiency and stability, in `[0, 1]`.
    pub quality: f64,
}

impl PathScores {
    /// Score `nodes` (local node first). The local node is not a hop.
    pub fn of(graph: &Graph<'_>, nodes: &[String]) -> Self {
        let cost = nodes.windows(2).map(|w| graph.weight(&w[0], &w[1])).sum();
        let hops = &nodes[1.min(nodes.len())..];
        if hops.is_empty() {
            return Self {
                cost,
                efficiency: 1.0,
                stability: 1.0,
                quality: 1.0,
            };
        }
        let n = hops.len() as f64;
        let avg_latency = hops.iter().map(|id| graph.latency(id)).sum::<f64>() / n;
        let avg_reliability =
            hops.iter().map(|id| f64::from(graph.reliability(id))).sum::<f64>() / n;

        let efficiency = (1.0 - avg_latency / LATENCY_CEILING_MS).clamp(0.0, 1.0);
        let stability = (avg_reliability / 100.0).clamp(0.0, 1.0);
        Self {
            cost,
            efficiency,
            stability,
            quality: LATENCY_WEIGHT * efficiency + RELIABILITY_WEIGHT * stability,
        }
    }
}

/// A cached route from the local node to a target.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutingPath {
    /// Local node first, target last.
    pub nodes: Vec<String>,
    pub computed_at: Timestamp,
    pub last_used: Timestamp,
    pub valid: bool,
    pub priority: RoutePriority,
    pub algorithm: Algorithm,
    pub scores: PathScores,
}

impl RoutingPath {
    pub fn new(
        nodes: Vec<String>,
        priority: RoutePriority,
        algorithm: Algorithm,
        scores: PathScores,
        now: Timestamp,
    ) -> Self {
        Self {
            nodes,
            computed_at: now,
            last_used: now,
            valid: true,
            priority,
            algorithm,
            scores,
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.nodes.last().map(String::as_str)
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.nodes.iter().any(|n| n == node_id)
    }

    pub fn hop_count(&self) -> usize {
        self.nodes.len().saturating_sub(1)
    }
}
