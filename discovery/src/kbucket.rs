//! Kademlia-style routing table for the DHT discovery method.
//!
//! Keys are 256-bit BLAKE2b digests. A contact lands in the bucket given by
//! the first bit in which its key differs from ours; each bucket keeps up to
//! `k` contacts in least-recently-seen order and prefers long-lived ones.

use std::cmp::Ordering;

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

use crate::NodeDescriptor;

pub type DhtKey = [u8; 32];

/// Contacts kept per bucket.
pub const DEFAULT_BUCKET_SIZE: usize = 20;

const BUCKET_COUNT: usize = 256;

type Blake2b256 = Blake2b<U32>;

/// BLAKE2b-256 of arbitrary bytes.
pub fn key_for(bytes: &[u8]) -> DhtKey {
    let mut hasher = Blake2b256::new();
    hasher.update(bytes);
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}

pub fn xor_distance(a: &DhtKey, b: &DhtKey) -> DhtKey {
    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = a[i] ^ b[i];
    }
    out
}

/// Position of the first differing bit; identical keys go to the last bucket.
pub fn bucket_index(own: &DhtKey, other: &DhtKey) -> usize {
    let dist = xor_distance(own, other);
    for (byte_idx, byte) in dist.iter().enumerate() {
        if *byte != 0 {
            return byte_idx * 8 + byte.leading_zeros() as usize;
        }
    }
    BUCKET_COUNT - 1
}

fn distance_cmp(a: &DhtKey, b: &DhtKey) -> Ordering {
    a.cmp(b)
}

/// A node known to the DHT table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingEntry {
    pub key: DhtKey,
    pub node: NodeDescriptor,
}

impl RoutingEntry {
    /// Entries are keyed by the hash of the node id.
    pub fn new(node: NodeDescriptor) -> Self {
        Self {
            key: key_for(node.id.as_bytes()),
            node,
        }
    }
}

#[derive(Debug, Default)]
struct Bucket {
    /// Oldest first.
    entries: Vec<RoutingEntry>,
}

#[derive(Debug)]
pub struct KBucketTable {
    own_key: DhtKey,
    k: usize,
    buckets: Vec<Bucket>,
}

impl KBucketTable {
    pub fn new(own_key: DhtKey, k: usize) -> Self {
        let mut buckets = Vec::with_capacity(BUCKET_COUNT);
        buckets.resize_with(BUCKET_COUNT, Bucket::default);
        Self {
            own_key,
            k: k.max(1),
            buckets,
        }
    }

    pub fn own_key(&self) -> &DhtKey {
        &self.own_key
    }

    /// Insert or refresh an entry. Returns `false` when the bucket is full and
    /// the newcomer was dropped.
    pub fn update(&mut self, entry: RoutingEntry) -> bool {
        if entry.key == self.own_key {
            return false;
        }
        let bucket = &mut self.buckets[bucket_index(&self.own_key, &entry.key)];
        if let Some(pos) = bucket.entries.iter().position(|e| e.key == entry.key) {
            bucket.entries.remove(pos);
            bucket.entries.push(entry);
            return true;
        }
        if bucket.entries.len() >= self.k {
            return false;
        }
        bucket.entries.push(entry);
        true
    }

    pub fn remove(&mut self, key: &DhtKey) -> bool {
        let bucket = &mut self.buckets[bucket_index(&self.own_key, key)];
        match bucket.entries.iter().position(|e| &e.key == key) {
            Some(pos) => {
                bucket.entries.remove(pos);
                true
            }
            None => false,
        }
    }

    /// The `n` entries closest to `target`, nearest first.
    pub fn closest(&self, target: &DhtKey, n: usize) -> Vec<RoutingEntry> {
        let mut all: Vec<RoutingEntry> = self
            .buckets
            .iter()
            .flat_map(|b| b.entries.iter().cloned())
            .collect();
        all.sort_by(|a, b| {
            distance_cmp(&xor_distance(&a.key, target), &xor_distance(&b.key, target))
        });
        all.truncate(n);
        all
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.entries.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> RoutingEntry {
        RoutingEntry::new(NodeDescriptor::new(id, format!("{id}:8080")))
    }

    #[test]
    fn xor_distance_is_symmetric_and_zero_on_self() {
        let a = key_for(b"a");
        let b = key_for(b"b");
        assert_eq!(xor_distance(&a, &b), xor_distance(&b, &a));
        assert_eq!(xor_distance(&a, &a), [0u8; 32]);
    }

    #[test]
    fn bucket_index_finds_first_different_bit() {
        let own = [0u8; 32];
        let mut other = [0u8; 32];
        other[0] = 0b1000_0000;
        assert_eq!(bucket_index(&own, &other), 0);
        other[0] = 0;
        other[1] = 0b0001_0000;
        assert_eq!(bucket_index(&own, &other), 11);
        assert_eq!(bucket_index(&own, &own), 255);
    }

    #[test]
    fn full_bucket_keeps_long_lived_entries() {
        // k=1, so two ids landing in the same bucket force a collision.
        let own = [0xFFu8; 32];
        let mut table = KBucketTable::new(own, 1);
        let ids: Vec<String> = (0..64).map(|i| format!("n{i}")).collect();
        let mut by_bucket = std::collections::HashMap::new();
        let mut pair = None;
        for id in &ids {
            let idx = bucket_index(&own, &key_for(id.as_bytes()));
            if let Some(prev) = by_bucket.insert(idx, id.clone()) {
                pair = Some((prev, id.clone()));
                break;
            }
        }
        let (first, second) = pair.expect("64 ids over a handful of buckets must collide");

        assert!(table.update(entry(&first)));
        assert!(!table.update(entry(&second)));
        assert!(table.update(entry(&first)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn closest_orders_by_distance() {
        let own = key_for(b"self");
        let mut table = KBucketTable::new(own, DEFAULT_BUCKET_SIZE);
        for i in 0..30 {
            table.update(entry(&format!("n{i}")));
        }
        let target = key_for(b"target");
        let closest = table.closest(&target, 5);
        assert_eq!(closest.len(), 5);
        for pair in closest.windows(2) {
            assert!(xor_distance(&pair[0].key, &target) <= xor_distance(&pair[1].key, &target));
        }
    }

    #[test]
    fn own_key_is_never_stored() {
        let e = entry("me");
        let mut table = KBucketTable::new(e.key, 4);
        assert!(!table.update(e));
        assert!(table.is_empty());
    }
}
