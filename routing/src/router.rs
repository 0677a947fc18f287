//! Synchronous routing core. Owns the table, the path cache and the
//! algorithm state; the async [`Routing`](crate::Routing) service wraps it in
//! a lock and drives it from background loops.

use std::time::Duration;

use onet_types::{NodeStatus, RemoteNode, Timestamp};
use serde::Serialize;

use crate::algorithms;
use crate::cache::{CacheKey, PathCache};
use crate::graph::Graph;
use crate::path::PathScores;
use crate::table::RouteNode;
use crate::{Algorithm, RoutePriority, RoutingConfig, RoutingError, RoutingPath, RoutingTable};

const MIN_OPTIMIZE_INTERVAL_SECS: f64 = 1.0;
const MAX_OPTIMIZE_INTERVAL_SECS: f64 = 30.0;
/// Above this many nodes the optimizer runs twice as often.
const BUSY_NETWORK: usize = 100;
/// Average reliability (percent) below which the network counts as unstable.
const UNSTABLE_RELIABILITY: f64 = 70.0;
/// Share of invalid cached paths that counts as heavy churn.
const CHURN_RATIO: f64 = 0.25;

/// An alternative algorithm that would serve a cached route materially better.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteImprovement {
    pub target: String,
    pub priority: RoutePriority,
    pub current: Algorithm,
    pub better: Algorithm,
    pub gain: f64,
}

/// What one optimizer cycle did.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct OptimizationReport {
    pub evicted: Vec<String>,
    pub purged_paths: usize,
    pub restored_algorithm: Option<Algorithm>,
    pub improvements: Vec<RouteImprovement>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RoutingStats {
    pub total_nodes: usize,
    /// Nodes with a live connection.
    pub active_nodes: usize,
    pub cached_paths: usize,
    pub valid_paths: usize,
    pub average_latency_ms: f64,
    pub average_reliability: f64,
    /// Algorithm currently in effect.
    pub algorithm: &'static str,
    pub last_optimization: Option<Timestamp>,
    pub routes_computed: u64,
    pub cache_hits: u64,
    pub probe_timeout_ms: u64,
    pub health: f64,
}

pub struct Router {
    config: RoutingConfig,
    table: RoutingTable,
    cache: PathCache,
    /// Algorithm pinned by recovery, and until when.
    forced: Option<(Algorithm, Timestamp)>,
    probe_timeout_ms: u64,
    tolerance_until: Option<Timestamp>,
    last_optimization: Option<Timestamp>,
    routes_computed: u64,
    cache_hits: u64,
}

impl Router {
    pub fn new(local_id: impl Into<String>, config: RoutingConfig) -> Self {
        Self {
            probe_timeout_ms: config.probe_timeout_ms,
            table: RoutingTable::new(local_id),
            cache: PathCache::new(),
            forced: None,
            tolerance_until: None,
            last_optimization: None,
            routes_computed: 0,
            cache_hits: 0,
            config,
        }
    }

    pub fn config(&self) -> &RoutingConfig {
        &self.config
    }

    pub fn table(&self) -> &RoutingTable {
        &self.table
    }

    pub fn cache(&self) -> &PathCache {
        &self.cache
    }

    // -- Table maintenance -----------------------------------------------------

    /// Insert or refresh a node. Cached paths through it are invalidated when
    /// anything that affects routing changed. Returns `true` for a new node.
    pub fn add_node(&mut self, node: &RemoteNode, now: Timestamp) -> bool {
        let before = self.table.get(&node.id).map(routing_fingerprint);
        let inserted = self.table.upsert(node, now);
        let after = self.table.get(&node.id).map(routing_fingerprint);
        if !inserted && before != after {
            self.cache.invalidate_containing(&node.id);
        }
        inserted
    }

    pub fn remove_node(&mut self, id: &str) -> Result<RouteNode, RoutingError> {
        let removed = self
            .table
            .remove(id)
            .ok_or_else(|| RoutingError::NotFound(id.to_string()))?;
        self.cache.invalidate_containing(id);
        Ok(removed)
    }

    pub fn update_node_metrics(
        &mut self,
        id: &str,
        latency_ms: f64,
        reliability: u8,
        throughput: f64,
        now: Timestamp,
    ) -> Result<(), RoutingError> {
        if !self
            .table
            .update_metrics(id, latency_ms, reliability, throughput, now)
        {
            return Err(RoutingError::NotFound(id.to_string()));
        }
        self.cache.invalidate_containing(id);
        Ok(())
    }

    /// Record a connection change reported by the transport.
    pub fn set_status(&mut self, id: &str, status: NodeStatus, now: Timestamp) -> bool {
        let changed = self.table.get(id).is_some_and(|n| n.status != status);
        let known = self.table.set_status(id, status, now);
        if changed {
            self.cache.invalidate_containing(id);
        }
        known
    }

    pub fn touch(&mut self, id: &str, now: Timestamp) {
        self.table.touch(id, now);
    }

    // -- Route lookup ----------------------------------------------------------

    /// Algorithm in effect at `now`, honouring a recovery pin.
    pub fn effective_algorithm(&self, now: Timestamp) -> Algorithm {
        match self.forced {
            Some((algorithm, until)) if now < until => algorithm,
            _ => self.config.algorithm,
        }
    }

    pub fn health(&self) -> f64 {
        onet_registry::health_score(
            self.table.reachable_count(),
            self.table.len(),
            self.table.average_latency_ms(),
        )
    }

    /// Path from the local node to `target`, served from the cache when a
    /// valid entry exists.
    pub fn find_optimal_route(
        &mut self,
        target: &str,
        priority: RoutePriority,
        now: Timestamp,
    ) -> Result<Vec<String>, RoutingError> {
        if target == self.table.local_id() {
            return Ok(vec![target.to_string()]);
        }
        if !self.table.contains(target) {
            return Err(RoutingError::NotFound(target.to_string()));
        }
        if let Some(cached) = self.cache.get(target, priority, now) {
            let nodes = cached.nodes.clone();
            self.cache_hits += 1;
            return Ok(nodes);
        }

        let algorithm = self.effective_algorithm(now);
        let path = self
            .compute_path(target, priority, algorithm, now)
            .ok_or_else(|| RoutingError::NoRoute(target.to_string()))?;
        self.routes_computed += 1;
        tracing::trace!(
            %target,
            priority = priority.as_str(),
            algorithm = path.algorithm.as_str(),
            hops = path.hop_count(),
            "computed route"
        );
        let nodes = path.nodes.clone();
        self.cache.insert(target, path);
        Ok(nodes)
    }

    /// Compute a fresh path without touching the cache.
    pub fn compute_path(
        &self,
        target: &str,
        priority: RoutePriority,
        algorithm: Algorithm,
        now: Timestamp,
    ) -> Option<RoutingPath> {
        let graph = Graph::new(&self.table, &self.config);
        let (nodes, used) = algorithms::compute(&graph, algorithm, target, priority, self.health())?;
        let scores = PathScores::of(&graph, &nodes);
        Some(RoutingPath::new(nodes, priority, used, scores, now))
    }

    /// Recompute and re-cache the given keys. Returns how many succeeded.
    pub fn recompute(&mut self, keys: &[CacheKey], now: Timestamp) -> usize {
        let algorithm = self.effective_algorithm(now);
        let mut recomputed = 0;
        for (target, priority) in keys {
            if !self.table.contains(target) {
                continue;
            }
            if let Some(path) = self.compute_path(target, *priority, algorithm, now) {
                self.cache.insert(target, path);
                self.routes_computed += 1;
                recomputed += 1;
            }
        }
        recomputed
    }

    // -- Optimizer -------------------------------------------------------------

    /// One optimizer cycle: evict inactive nodes, purge stale paths, lift
    /// expired recovery measures and look for better algorithms on a sample
    /// of cached routes. Improvements are reported, never applied.
    pub fn optimize(&mut self, now: Timestamp) -> OptimizationReport {
        let mut report = OptimizationReport {
            evicted: self
                .table
                .evict_inactive(self.config.inactivity_threshold_secs, now),
            ..OptimizationReport::default()
        };
        for id in &report.evicted {
            self.cache.invalidate_containing(id);
        }
        report.purged_paths = self
            .cache
            .purge(self.config.path_ttl_secs, self.config.path_idle_secs, now);

        if let Some((algorithm, until)) = self.forced {
            if now >= until {
                self.forced = None;
                report.restored_algorithm = Some(self.config.algorithm);
                tracing::info!(
                    pinned = algorithm.as_str(),
                    restored = self.config.algorithm.as_str(),
                    "routing algorithm restored"
                );
            }
        }
        if self.tolerance_until.is_some_and(|until| now >= until) {
            self.tolerance_until = None;
            self.probe_timeout_ms = self.config.probe_timeout_ms;
        }

        report.improvements = self.sample_improvements(now);
        self.last_optimization = Some(now);
        report
    }

    fn sample_improvements(&self, now: Timestamp) -> Vec<RouteImprovement> {
        let sample: Vec<(CacheKey, Algorithm, f64)> = self
            .cache
            .valid_entries()
            .take(self.config.sample_routes)
            .map(|(key, path)| (key.clone(), path.algorithm, path.scores.quality))
            .collect();

        let mut improvements = Vec::new();
        for ((target, priority), current, quality) in sample {
            let best = [Algorithm::ShortestPath, Algorithm::Dijkstra, Algorithm::AStar]
                .into_iter()
                .filter(|alt| *alt != current)
                .filter_map(|alt| {
                    self.compute_path(&target, priority, alt, now)
                        .map(|p| (alt, p.scores.quality - quality))
                })
                .filter(|(_, gain)| *gain >= self.config.improvement_threshold)
                .max_by(|a, b| a.1.total_cmp(&b.1));
            if let Some((better, gain)) = best {
                improvements.push(RouteImprovement {
                    target,
                    priority,
                    current,
                    better,
                    gain,
                });
            }
        }
        improvements
    }

    /// Delay before the next optimizer cycle, derived from network size,
    /// stability and cache churn, clamped to 1–30 seconds.
    pub fn next_interval(&self) -> Duration {
        let mut secs = self.config.optimize_interval_secs as f64;
        let size = self.table.len();
        if size == 0 {
            secs *= 2.0;
        } else if size > BUSY_NETWORK {
            secs *= 0.5;
        }
        if size > 0 && self.table.average_reliability() < UNSTABLE_RELIABILITY {
            secs *= 0.5;
        }
        let cached = self.cache.len();
        if cached > 0 {
            let invalid = (cached - self.cache.valid_count()) as f64 / cached as f64;
            if invalid > CHURN_RATIO {
                secs *= 0.5;
            }
        }
        Duration::from_secs_f64(secs.clamp(MIN_OPTIMIZE_INTERVAL_SECS, MAX_OPTIMIZE_INTERVAL_SECS))
    }

    // -- Recovery measures -----------------------------------------------------

    /// Pin `algorithm` for the configured period.
    pub fn force_algorithm(&mut self, algorithm: Algorithm, now: Timestamp) {
        self.forced = Some((algorithm, now.plus_secs(self.config.forced_algorithm_secs)));
    }

    /// Raise the probe timeout by half, up to the configured ceiling, for the
    /// configured period. Returns the new timeout.
    pub fn raise_timeout_tolerance(&mut self, now: Timestamp) -> Duration {
        let raised = self.probe_timeout_ms.saturating_mul(3) / 2;
        self.probe_timeout_ms = raised.min(self.config.max_probe_timeout_ms);
        self.tolerance_until = Some(now.plus_secs(self.config.timeout_tolerance_secs));
        self.probe_timeout()
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn clear_cache(&mut self) -> usize {
        self.cache.clear()
    }

    /// Remove nodes confirmed dead and return the cache keys that routed
    /// through them.
    pub fn remove_dead(&mut self, ids: &[String]) -> Vec<CacheKey> {
        let mut affected = Vec::new();
        for id in ids {
            if self.table.remove(id).is_some() {
                affected.extend(self.cache.invalidate_containing(id));
            }
        }
        affected.sort();
        affected.dedup();
        affected
    }

    /// (id, address) of every node, or only of connected ones.
    pub fn probe_targets(&self, connected_only: bool) -> Vec<(String, String)> {
        self.table
            .nodes()
            .filter(|n| !connected_only || n.status.is_reachable())
            .map(|n| (n.id.clone(), n.address.clone()))
            .collect()
    }

    pub fn stats(&self, now: Timestamp) -> RoutingStats {
        RoutingStats {
            total_nodes: self.table.len(),
            active_nodes: self.table.reachable_count(),
            cached_paths: self.cache.len(),
            valid_paths: self.cache.valid_count(),
            average_latency_ms: self.table.average_latency_ms(),
            average_reliability: self.table.average_reliability(),
            algorithm: self.effective_algorithm(now).as_str(),
            last_optimization: self.last_optimization,
            routes_computed: self.routes_computed,
            cache_hits: self.cache_hits,
            probe_timeout_ms: self.probe_timeout_ms,
            health: self.health(),
        }
    }
}

/// The fields of a node that change which paths are best.
fn routing_fingerprint(node: &RouteNode) -> (NodeStatus, u64, u8, Vec<String>) {
    (
        node.status,
        node.metrics.latency_ms.to_bits(),
        node.metrics.reliability,
        node.links.iter().cloned().collect(),
    )
}
