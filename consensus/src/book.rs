//! Synchronous consensus state: roster, proposals and votes, and the tally
//! step that decides proposals and elects the leader.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use onet_types::{Capabilities, Timestamp};
use serde::Serialize;

use crate::proposal::{self, Proposal, ProposalStatus, Vote};
use crate::roster::{ConsensusNode, Roster};
use crate::{ConsensusConfig, ConsensusError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum ConsensusState {
    #[default]
    Initializing,
    Active,
    Stopped,
    Error,
}

impl ConsensusState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initializing => "initializing",
            Self::Active => "active",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsensusStats {
    pub total_nodes: usize,
    pub active_nodes: usize,
    pub total_stake: f64,
    pub pending_proposals: usize,
    pub total_votes: usize,
    pub current_leader: Option<String>,
    pub state: ConsensusState,
    pub last_tally: Option<Timestamp>,
}

/// One-line summary for operators.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ConsensusStatus {
    pub state: ConsensusState,
    pub leader: Option<String>,
    pub pending_proposals: usize,
    pub total_votes: usize,
    pub last_tally: Option<Timestamp>,
}

impl fmt::Display for ConsensusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state: {}, leader: {}, pending proposals: {}, total votes: {}, last tally: ",
            self.state.as_str(),
            self.leader.as_deref().unwrap_or("none"),
            self.pending_proposals,
            self.total_votes,
        )?;
        match self.last_tally {
            Some(at) => write!(f, "{}", at.as_secs()),
            None => f.write_str("never"),
        }
    }
}

/// What one tally cycle decided.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct TallyReport {
    pub approved: Vec<String>,
    pub rejected: Vec<String>,
    pub expired: Vec<String>,
    pub leader: Option<String>,
    pub leader_changed: bool,
}

impl TallyReport {
    pub fn decided(&self) -> usize {
        self.approved.len() + self.rejected.len() + self.expired.len()
    }
}

pub struct ConsensusBook {
    roster: Roster,
    proposals: BTreeMap<String, Proposal>,
    /// Votes on pending or not yet seen proposals, keyed by (proposal id,
    /// voter id). Votes are folded into `decided_votes` once their proposal
    /// is decided.
    votes: BTreeMap<(String, String), Vote>,
    /// Unseen proposal ids with the time their first vote arrived.
    orphans: HashMap<String, Timestamp>,
    orphan_votes: usize,
    decided_votes: usize,
    state: ConsensusState,
    leader: Option<String>,
    last_tally: Option<Timestamp>,
    initial_reputation: f64,
    proposal_ttl_secs: Option<u64>,
    orphan_vote_ttl_secs: u64,
    max_orphan_votes: usize,
}

impl ConsensusBook {
    pub fn new(config: &ConsensusConfig) -> Self {
        Self {
            roster: Roster::new(),
            proposals: BTreeMap::new(),
            votes: BTreeMap::new(),
            orphans: HashMap::new(),
            orphan_votes: 0,
            decided_votes: 0,
            state: ConsensusState::Initializing,
            leader: None,
            last_tally: None,
            initial_reputation: config.initial_reputation,
            proposal_ttl_secs: config.proposal_ttl_secs,
            orphan_vote_ttl_secs: config.orphan_vote_ttl_secs,
            max_orphan_votes: config.max_orphan_votes,
        }
    }

    // -- Roster ----------------------------------------------------------------

    pub fn add_node(
        &mut self,
        id: &str,
        stake: f64,
        capabilities: Capabilities,
        now: Timestamp,
    ) -> Result<bool, ConsensusError> {
        self.roster
            .add(id, stake, capabilities, self.initial_reputation, now)
    }

    pub fn remove_node(&mut self, id: &str) -> Result<ConsensusNode, ConsensusError> {
        self.roster.remove(id)
    }

    pub fn set_active(&mut self, id: &str, active: bool) -> bool {
        self.roster.set_active(id, active)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    // -- Proposals and votes ---------------------------------------------------

    /// Record a new pending proposal and return it.
    pub fn propose(
        &mut self,
        proposer: &str,
        kind: &str,
        payload: Vec<u8>,
        now: Timestamp,
    ) -> Proposal {
        let mut proposal = Proposal::new(proposer, kind, payload, now);
        while self.proposals.contains_key(&proposal.id) {
            proposal = Proposal::new(proposer, kind, proposal.payload, now);
        }
        self.proposals.insert(proposal.id.clone(), proposal.clone());
        proposal
    }

    /// Accept a proposal learned from the network. Known ids are left alone.
    pub fn accept_proposal(&mut self, proposal: Proposal) -> bool {
        if self.proposals.contains_key(&proposal.id) {
            return false;
        }
        let mut proposal = proposal;
        // Decisions are local; a peer's verdict is not adopted.
        proposal.status = ProposalStatus::Pending;
        proposal.decided_at = None;
        if self.orphans.remove(&proposal.id).is_some() {
            let adopted = self.vote_keys(&proposal.id).len();
            self.orphan_votes -= adopted;
        }
        self.proposals.insert(proposal.id.clone(), proposal);
        true
    }

    /// Upsert a vote. Votes may arrive before their proposal.
    pub fn vote(
        &mut self,
        proposal_id: &str,
        voter: &str,
        approve: bool,
        justification: &str,
        now: Timestamp,
    ) -> Vote {
        let vote = Vote {
            proposal_id: proposal_id.to_string(),
            voter: voter.to_string(),
            approve,
            justification: justification.to_string(),
            voted_at: now,
        };
        self.accept_vote(vote.clone(), now);
        vote
    }

    /// Store a vote. Votes on decided proposals are dropped, as are new votes
    /// on unseen proposals once the orphan limit is reached. Returns whether
    /// the vote was kept.
    pub fn accept_vote(&mut self, vote: Vote, now: Timestamp) -> bool {
        let key = (vote.proposal_id.clone(), vote.voter.clone());
        match self.proposals.get(&vote.proposal_id) {
            Some(proposal) if proposal.status.is_decided() => return false,
            Some(_) => {}
            None if self.votes.contains_key(&key) => {}
            None => {
                if self.orphan_votes >= self.max_orphan_votes {
                    tracing::debug!(proposal = %vote.proposal_id, "orphan vote limit reached");
                    return false;
                }
                self.orphans.entry(vote.proposal_id.clone()).or_insert(now);
                self.orphan_votes += 1;
            }
        }
        self.votes.insert(key, vote);
        true
    }

    fn vote_keys(&self, proposal_id: &str) -> Vec<(String, String)> {
        self.votes
            .range((proposal_id.to_string(), String::new())..)
            .take_while(|((id, _), _)| id == proposal_id)
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn drop_votes(&mut self, proposal_id: &str) -> usize {
        let keys = self.vote_keys(proposal_id);
        for key in &keys {
            self.votes.remove(key);
        }
        keys.len()
    }

    /// Drop votes whose proposal never arrived within the orphan TTL.
    fn prune_orphans(&mut self, now: Timestamp) -> usize {
        let ttl = self.orphan_vote_ttl_secs;
        let expired: Vec<String> = self
            .orphans
            .iter()
            .filter(|(_, first_seen)| first_seen.has_expired(ttl, now))
            .map(|(id, _)| id.clone())
            .collect();
        let mut dropped = 0;
        for id in expired {
            self.orphans.remove(&id);
            dropped += self.drop_votes(&id);
        }
        self.orphan_votes -= dropped;
        dropped
    }

    /// Votes held for proposals this node has not seen.
    pub fn orphan_vote_count(&self) -> usize {
        self.orphan_votes
    }

    /// Votes cast on known proposals, including decided ones.
    pub fn total_votes(&self) -> usize {
        self.votes.len() - self.orphan_votes + self.decided_votes
    }

    pub fn proposal(&self, id: &str) -> Option<&Proposal> {
        self.proposals.get(id)
    }

    pub fn votes_for<'a>(&'a self, proposal_id: &'a str) -> impl Iterator<Item = &'a Vote> {
        self.votes.values().filter(move |v| v.proposal_id == proposal_id)
    }

    pub fn pending_count(&self) -> usize {
        self.proposals
            .values()
            .filter(|p| p.status == ProposalStatus::Pending)
            .count()
    }

    // -- Tally -----------------------------------------------------------------

    /// Decide every pending proposal that meets a threshold, expire stale
    /// ones, re-elect the leader and refresh the state.
    pub fn tally(&mut self, now: Timestamp) -> TallyReport {
        let mut counts: HashMap<&str, (u64, u64)> = HashMap::new();
        for vote in self.votes.values() {
            let entry = counts.entry(vote.proposal_id.as_str()).or_default();
            entry.1 += 1;
            if vote.approve {
                entry.0 += 1;
            }
        }

        let active = self.roster.active_count();
        let mut report = TallyReport::default();
        let mut settled = Vec::new();
        for proposal in self
            .proposals
            .values_mut()
            .filter(|p| p.status == ProposalStatus::Pending)
        {
            let (approvals, votes) = counts.get(proposal.id.as_str()).copied().unwrap_or_default();
            let status = match proposal::decide(approvals, votes, active) {
                ProposalStatus::Pending => match self.proposal_ttl_secs {
                    Some(ttl) if proposal.created_at.has_expired(ttl, now) => {
                        ProposalStatus::Expired
                    }
                    _ => continue,
                },
                decided => decided,
            };
            proposal.decide(status, now);
            let bucket = match status {
                ProposalStatus::Approved => &mut report.approved,
                ProposalStatus::Rejected => &mut report.rejected,
                _ => &mut report.expired,
            };
            bucket.push(proposal.id.clone());
            settled.push(proposal.id.clone());
        }
        for id in &settled {
            let released = self.drop_votes(id);
            self.decided_votes += released;
        }
        let pruned = self.prune_orphans(now);
        if pruned > 0 {
            tracing::debug!(pruned, "dropped votes for proposals that never arrived");
        }

        let leader = self.roster.leader().map(|n| n.id.clone());
        report.leader_changed = leader != self.leader;
        report.leader = leader.clone();
        self.leader = leader;

        if self.state != ConsensusState::Stopped {
            self.state = if self.roster.is_empty() {
                ConsensusState::Initializing
            } else {
                ConsensusState::Active
            };
        }
        self.last_tally = Some(now);
        report
    }

    // -- State -----------------------------------------------------------------

    pub fn state(&self) -> ConsensusState {
        self.state
    }

    pub fn set_state(&mut self, state: ConsensusState) {
        self.state = state;
    }

    pub fn leader(&self) -> Option<&str> {
        self.leader.as_deref()
    }

    pub fn stats(&self) -> ConsensusStats {
        ConsensusStats {
            total_nodes: self.roster.len(),
            active_nodes: self.roster.active_count(),
            total_stake: self.roster.total_stake(),
            pending_proposals: self.pending_count(),
            total_votes: self.total_votes(),
            current_leader: self.leader.clone(),
            state: self.state,
            last_tally: self.last_tally,
        }
    }

    pub fn status(&self) -> ConsensusStatus {
        ConsensusStatus {
            state: self.state,
            leader: self.leader.clone(),
            pending_proposals: self.pending_count(),
            total_votes: self.total_votes(),
            last_tally: self.last_tally,
        }
    }
}
