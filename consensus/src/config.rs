//! Consensus configuration, embedded in the node config as `[consensus]`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Seconds between tally cycles.
    pub tally_interval_secs: u64,
    /// Seconds to wait after a failed tally cycle.
    pub error_backoff_secs: u64,
    /// Pending proposals older than this are expired. Never, when unset.
    pub proposal_ttl_secs: Option<u64>,
    /// Votes for a proposal this node has not seen are dropped after this
    /// many seconds if the proposal never arrives.
    pub orphan_vote_ttl_secs: u64,
    /// Upper bound on votes held for unseen proposals.
    pub max_orphan_votes: usize,
    /// Reputation assigned to nodes joining the roster.
    pub initial_reputation: f64,
    /// Broadcast local proposals and votes through the transport.
    pub disseminate: bool,
}

impl ConsensusConfig {
    pub fn tally_interval(&self) -> Duration {
        Duration::from_secs(self.tally_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            tally_interval_secs: 5,
            error_backoff_secs: 10,
            proposal_ttl_secs: None,
            orphan_vote_ttl_secs: 300,
            max_orphan_votes: 10_000,
            initial_reputation: crate::roster::INITIAL_REPUTATION,
            disseminate: true,
        }
    }
}
