//! Path algorithms over a [`Graph`]. Every function returns the node
//! sequence from the local node to `target`, or `None` when no path exists.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::graph::Graph;
use crate::path::PathScores;
use crate::{Algorithm, RoutePriority};

/// Networks at or below this size are searched exhaustively.
const SMALL_NETWORK: usize = 16;
/// Networks above this size prefer the guided search.
const LARGE_NETWORK: usize = 64;
/// Network health below which hop count matters more than latency.
const DEGRADED_HEALTH: f64 = 0.5;

/// Run `algorithm`, returning the path and the algorithm that produced it
/// (the chosen candidate, for [`Algorithm::Intelligent`]).
pub fn compute(
    graph: &Graph<'_>,
    algorithm: Algorithm,
    target: &str,
    priority: RoutePriority,
    health: f64,
) -> Option<(Vec<String>, Algorithm)> {
    match algorithm {
        Algorithm::ShortestPath => shortest_path(graph, target).map(|p| (p, algorithm)),
        Algorithm::Dijkstra => dijkstra(graph, target).map(|p| (p, algorithm)),
        Algorithm::AStar => a_star(graph, target).map(|p| (p, algorithm)),
        Algorithm::Intelligent => intelligent(graph, target, priority, health),
    }
}

/// Breadth-first search: fewest hops, ties broken by neighbour id order.
pub fn shortest_path(graph: &Graph<'_>, target: &str) -> Option<Vec<String>> {
    let start = graph.local_id().to_string();
    if !graph.contains(target) {
        return None;
    }
    let mut previous: HashMap<String, String> = HashMap::new();
    let mut visited: HashSet<String> = HashSet::from([start.clone()]);
    let mut queue = VecDeque::from([start.clone()]);

    while let Some(current) = queue.pop_front() {
        if current == target {
            return Some(rebuild(&previous, &start, target));
        }
        for next in graph.neighbours(&current) {
            if visited.insert(next.clone()) {
                previous.insert(next.clone(), current.clone());
                queue.push_back(next.clone());
            }
        }
    }
    None
}

pub fn dijkstra(graph: &Graph<'_>, target: &str) -> Option<Vec<String>> {
    best_first(graph, target, |_| 0.0)
}

/// A* with `h(n) = |latency(n) - latency(target)|`.
///
/// Any path from `n` to the target pays at least `latency(n) + latency(target)`,
/// so the heuristic never overestimates.
pub fn a_star(graph: &Graph<'_>, target: &str) -> Option<Vec<String>> {
    let target_latency = graph.latency(target);
    best_first(graph, target, |id| (graph.latency(id) - target_latency).abs())
}

#[derive(Debug)]
struct Frontier {
    estimate: f64,
    id: String,
}

impl PartialEq for Frontier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Frontier {}

impl PartialOrd for Frontier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Frontier {
    /// Reversed so the max-heap pops the cheapest entry, lowest id first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.id.cmp(&self.id))
    }
}

fn best_first(
    graph: &Graph<'_>,
    target: &str,
    heuristic: impl Fn(&str) -> f64,
) -> Option<Vec<String>> {
    let start = graph.local_id().to_string();
    if !graph.contains(target) {
        return None;
    }
    let mut cost: HashMap<String, f64> = HashMap::from([(start.clone(), 0.0)]);
    let mut previous: HashMap<String, String> = HashMap::new();
    let mut settled: HashSet<String> = HashSet::new();
    let mut heap = BinaryHeap::from([Frontier {
        estimate: heuristic(&start),
        id: start.clone(),
    }]);

    while let Some(Frontier { id: current, .. }) = heap.pop() {
        if current == target {
            return Some(rebuild(&previous, &start, target));
        }
        if !settled.insert(current.clone()) {
            continue;
        }
        let base = cost.get(&current).copied().unwrap_or(f64::MAX);
        for next in graph.neighbours(&current) {
            if settled.contains(next) {
                continue;
            }
            let candidate = base + graph.weight(&current, next);
            let improves = cost.get(next).map_or(true, |known| candidate < *known);
            if improves {
                cost.insert(next.clone(), candidate);
                previous.insert(next.clone(), current.clone());
                heap.push(Frontier {
                    estimate: candidate + heuristic(next),
                    id: next.clone(),
                });
            }
        }
    }
    None
}

fn rebuild(previous: &HashMap<String, String>, start: &str, target: &str) -> Vec<String> {
    let mut path = vec![target.to_string()];
    let mut current = target;
    while current != start {
        match previous.get(current) {
            Some(prev) => {
                path.push(prev.clone());
                current = prev.as_str();
            }
            None => break,
        }
    }
    path.reverse();
    path
}

/// Candidate algorithms for a request, chosen by a fixed rule table over
/// network size, request priority and network health.
pub fn candidates(node_count: usize, priority: RoutePriority, health: f64) -> Vec<Algorithm> {
    use Algorithm::*;
    if priority == RoutePriority::Critical {
        return vec![Dijkstra, ShortestPath];
    }
    if health < DEGRADED_HEALTH {
        return vec![ShortestPath, Dijkstra];
    }
    if node_count > LARGE_NETWORK {
        return vec![AStar, ShortestPath];
    }
    match (node_count <= SMALL_NETWORK, priority) {
        (true, RoutePriority::Low) => vec![ShortestPath],
        (true, _) => vec![Dijkstra, ShortestPath],
        (false, RoutePriority::High) => vec![Dijkstra, AStar],
        (false, _) => vec![AStar, ShortestPath],
    }
}

/// Run every candidate and keep the best quality path. Earlier candidates win
/// ties.
pub fn intelligent(
    graph: &Graph<'_>,
    target: &str,
    priority: RoutePriority,
    health: f64,
) -> Option<(Vec<String>, Algorithm)> {
    let mut best: Option<(Vec<String>, Algorithm, f64)> = None;
    for algorithm in candidates(graph.node_count(), priority, health) {
        let Some((path, _)) = compute(graph, algorithm, target, priority, health) else {
            continue;
        };
        let quality = PathScores::of(graph, &path).quality;
        if best.as_ref().map_or(true, |(_, _, q)| quality > *q) {
            best = Some((path, algorithm, quality));
        }
    }
    best.map(|(path, algorithm, _)| (path, algorithm))
}
