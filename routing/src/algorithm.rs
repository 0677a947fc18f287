use serde::{Deserialize, Serialize};

/// Path-finding strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Breadth-first, fewest hops, ignores weights.
    ShortestPath,
    /// Minimises summed edge weight.
    Dijkstra,
    /// Dijkstra guided by a latency-difference heuristic.
    AStar,
    /// Rule-table selection among the others, keeping the best-scoring path.
    #[default]
    Intelligent,
}

impl Algorithm {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ShortestPath => "shortest_path",
            Self::Dijkstra => "dijkstra",
            Self::AStar => "a_star",
            Self::Intelligent => "intelligent",
        }
    }
}

/// Importance of the traffic a route is requested for. Part of the cache key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutePriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl RoutePriority {
    pub const ALL: [RoutePriority; 4] = [Self::Low, Self::Normal, Self::High, Self::Critical];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}
