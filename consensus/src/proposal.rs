//! Proposals, votes and the decision rule applied to them.

use blake2::digest::consts::U16;
use blake2::{Blake2b, Digest};
use onet_types::Timestamp;
use serde::{Deserialize, Serialize};

/// Whole-percent approval needed to pass.
pub const APPROVAL_THRESHOLD_PCT: u64 = 67;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl ProposalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Expired => "expired",
        }
    }

    pub fn is_decided(self) -> bool {
        self != Self::Pending
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: String,
    pub proposer: String,
    pub kind: String,
    /// Opaque to consensus.
    pub payload: Vec<u8>,
    pub created_at: Timestamp,
    pub decided_at: Option<Timestamp>,
    pub status: ProposalStatus,
}

impl Proposal {
    pub fn new(
        proposer: impl Into<String>,
        kind: impl Into<String>,
        payload: Vec<u8>,
        now: Timestamp,
    ) -> Self {
        let proposer = proposer.into();
        let kind = kind.into();
        Self {
            id: proposal_id(&proposer, &kind, now, rand::random()),
            proposer,
            kind,
            payload,
            created_at: now,
            decided_at: None,
            status: ProposalStatus::Pending,
        }
    }

    pub(crate) fn decide(&mut self, status: ProposalStatus, now: Timestamp) {
        self.status = status;
        self.decided_at = Some(now);
    }
}

/// 32 hex characters derived from the proposal's origin and a nonce.
pub fn proposal_id(proposer: &str, kind: &str, created_at: Timestamp, nonce: u64) -> String {
    let mut hasher = Blake2b::<U16>::new();
    hasher.update(proposer.as_bytes());
    hasher.update([0u8]);
    hasher.update(kind.as_bytes());
    hasher.update(created_at.as_secs().to_le_bytes());
    hasher.update(nonce.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// One node's vote on one proposal. A later vote by the same voter replaces it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    pub proposal_id: String,
    pub voter: String,
    pub approve: bool,
    pub justification: String,
    pub voted_at: Timestamp,
}

/// Approval at whole-percent precision, rounded half up. Exactly two thirds
/// passes; 66 of 100 does not.
pub fn is_approved(approvals: u64, votes: u64) -> bool {
    if votes == 0 {
        return false;
    }
    let pct = (approvals.saturating_mul(200) + votes) / (2 * votes);
    pct >= APPROVAL_THRESHOLD_PCT
}

/// Participation reached half of the active roster. Requires at least one vote.
pub fn is_rejected(votes: u64, active_nodes: usize) -> bool {
    votes > 0 && votes.saturating_mul(2) >= active_nodes as u64
}

/// Outcome for a pending proposal with the given counts.
pub fn decide(approvals: u64, votes: u64, active_nodes: usize) -> ProposalStatus {
    if is_approved(approvals, votes) {
        ProposalStatus::Approved
    } else if is_rejected(votes, active_nodes) {
        ProposalStatus::Rejected
    } else {
        ProposalStatus::Pending
    }
}
