//! Discovery method descriptors: name, priority and polling cadence.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The four ways this node finds peers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKind {
    /// Distance-based (Kademlia-style) lookup via DHT bootstrap endpoints.
    Dht,
    /// Handshake probe of well-known addresses on the local segment.
    LocalSegment,
    /// Read-only public registry of announced nodes.
    Registry,
    /// Static bootstrap list queried for its known peers.
    Bootstrap,
}

impl MethodKind {
    pub const ALL: [MethodKind; 4] = [
        MethodKind::Dht,
        MethodKind::LocalSegment,
        MethodKind::Registry,
        MethodKind::Bootstrap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dht => "dht",
            Self::LocalSegment => "local_segment",
            Self::Registry => "registry",
            Self::Bootstrap => "bootstrap",
        }
    }
}

/// Immutable per-method configuration, created when discovery starts up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryMethod {
    pub kind: MethodKind,
    pub active: bool,
    /// Lower runs first and wins ties when merging results.
    pub priority: u8,
    /// Delay between successful rounds.
    pub interval: Duration,
    /// Delay after a failed round before retrying.
    pub recovery_interval: Duration,
}

impl DiscoveryMethod {
    /// Default cadence for each method.
    pub fn default_for(kind: MethodKind) -> Self {
        let (priority, interval_secs, recovery_secs) = match kind {
            MethodKind::Dht => (1, 30, 60),
            MethodKind::LocalSegment => (2, 15, 30),
            MethodKind::Registry => (3, 60, 120),
            MethodKind::Bootstrap => (4, 10, 20),
        };
        Self {
            kind,
            active: true,
            priority,
            interval: Duration::from_secs(interval_secs),
            recovery_interval: Duration::from_secs(recovery_secs),
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_back_off_longer_than_they_poll() {
        for kind in MethodKind::ALL {
            let method = DiscoveryMethod::default_for(kind);
            assert!(method.recovery_interval > method.interval, "{}", method.name());
        }
    }

    #[test]
    fn priorities_are_distinct_and_ordered() {
        let priorities: Vec<u8> = MethodKind::ALL
            .iter()
            .map(|k| DiscoveryMethod::default_for(*k).priority)
            .collect();
        assert_eq!(priorities, vec![1, 2, 3, 4]);
    }
}
