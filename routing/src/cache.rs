//! Memoized routes keyed by (target, priority).

use std::collections::BTreeMap;

use onet_types::Timestamp;

use crate::{RoutePriority, RoutingPath};

pub type CacheKey = (String, RoutePriority);

#[derive(Clone, Debug, Default)]
pub struct PathCache {
    paths: BTreeMap<CacheKey, RoutingPath>,
}

impl PathCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A still-valid cached path, refreshing its last-used time.
    pub fn get(
        &mut self,
        target: &str,
        priority: RoutePriority,
        now: Timestamp,
    ) -> Option<&RoutingPath> {
        let path = self.paths.get_mut(&(target.to_string(), priority))?;
        if !path.valid {
            return None;
        }
        path.last_used = now;
        Some(&*path)
    }

    pub fn peek(&self, target: &str, priority: RoutePriority) -> Option<&RoutingPath> {
        self.paths.get(&(target.to_string(), priority))
    }

    pub fn insert(&mut self, target: &str, path: RoutingPath) {
        self.paths.insert((target.to_string(), path.priority), path);
    }

    /// Mark every path through `node_id` invalid. Returns the affected keys.
    pub fn invalidate_containing(&mut self, node_id: &str) -> Vec<CacheKey> {
        let mut affected = Vec::new();
        for (key, path) in self.paths.iter_mut() {
            if path.valid && path.contains(node_id) {
                path.valid = false;
                affected.push(key.clone());
            }
        }
        affected
    }

    /// Drop invalid paths, paths older than `ttl_secs` and paths unused for
    /// `idle_secs`. Returns how many were dropped.
    pub fn purge(&mut self, ttl_secs: u64, idle_secs: u64, now: Timestamp) -> usize {
        let before = self.paths.len();
        self.paths.retain(|_, p| {
            p.valid
                && !p.computed_at.has_expired(ttl_secs, now)
                && !p.last_used.has_expired(idle_secs, now)
        });
        before - self.paths.len()
    }

    pub fn clear(&mut self) -> usize {
        let n = self.paths.len();
        self.paths.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.paths.values().filter(|p| p.valid).count()
    }

    /// Valid entries in key order.
    pub fn valid_entries(&self) -> impl Iterator<Item = (&CacheKey, &RoutingPath)> {
        self.paths.iter().filter(|(_, p)| p.valid)
    }
}
