//! The voting roster: which nodes may vote and how much they weigh.

use std::collections::BTreeMap;

use onet_types::{Capabilities, Timestamp};
use serde::{Deserialize, Serialize};

use crate::ConsensusError;

pub const INITIAL_REPUTATION: f64 = 100.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConsensusNode {
    pub id: String,
    pub stake: f64,
    pub reputation: f64,
    pub capabilities: Capabilities,
    pub joined_at: Timestamp,
    /// Cleared while the transport reports the node disconnected.
    pub active: bool,
}

impl ConsensusNode {
    /// Leader-election weight.
    pub fn weight(&self) -> f64 {
        self.stake * self.reputation
    }
}

#[derive(Clone, Debug, Default)]
pub struct Roster {
    nodes: BTreeMap<String, ConsensusNode>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, or update stake and capabilities of a known one. A known
    /// node keeps its reputation and join time and is reactivated.
    pub fn add(
        &mut self,
        id: &str,
        stake: f64,
        capabilities: Capabilities,
        reputation: f64,
        now: Timestamp,
    ) -> Result<bool, ConsensusError> {
        if id.trim().is_empty() {
            return Err(ConsensusError::EmptyField("node id"));
        }
        if !stake.is_finite() || stake < 0.0 {
            return Err(ConsensusError::InvalidStake {
                node: id.to_string(),
                stake,
            });
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.stake = stake;
            node.capabilities = capabilities;
            node.active = true;
            return Ok(false);
        }
        self.nodes.insert(
            id.to_string(),
            ConsensusNode {
                id: id.to_string(),
                stake,
                reputation,
                capabilities,
                joined_at: now,
                active: true,
            },
        );
        Ok(true)
    }

    pub fn remove(&mut self, id: &str) -> Result<ConsensusNode, ConsensusError> {
        self.nodes
            .remove(id)
            .ok_or_else(|| ConsensusError::NodeNotFound(id.to_string()))
    }

    /// Returns `true` if the flag changed.
    pub fn set_active(&mut self, id: &str, active: bool) -> bool {
        match self.nodes.get_mut(id) {
            Some(node) if node.active != active => {
                node.active = active;
                true
            }
            _ => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&ConsensusNode> {
        self.nodes.get(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.nodes.values().filter(|n| n.active).count()
    }

    pub fn total_stake(&self) -> f64 {
        self.nodes.values().map(|n| n.stake).sum()
    }

    /// The active node with the greatest `stake × reputation`, lowest id on ties.
    pub fn leader(&self) -> Option<&ConsensusNode> {
        // Ids iterate in ascending order, so keeping the first maximum
        // resolves ties toward the lowest id.
        self.nodes
            .values()
            .filter(|n| n.active)
            .fold(None, |best: Option<&ConsensusNode>, node| match best {
                Some(b) if node.weight().total_cmp(&b.weight()).is_le() => Some(b),
                _ => Some(node),
            })
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConsensusNode> {
        self.nodes.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster(entries: &[(&str, f64)]) -> Roster {
        let mut roster = Roster::new();
        for (id, stake) in entries {
            roster
                .add(id, *stake, Capabilities::new(), INITIAL_REPUTATION, Timestamp::new(1))
                .unwrap();
        }
        roster
    }

    #[test]
    fn highest_weight_leads() {
        let roster = roster(&[("B", 5.0), ("A", 10.0)]);
        assert_eq!(roster.leader().map(|n| n.id.as_str()), Some("A"));
    }

    #[test]
    fn ties_go_to_lowest_id() {
        let roster = roster(&[("c", 7.0), ("b", 7.0), ("d", 7.0)]);
        assert_eq!(roster.leader().map(|n| n.id.as_str()), Some("b"));
    }

    #[test]
    fn inactive_nodes_cannot_lead() {
        let mut roster = roster(&[("A", 10.0), ("B", 5.0)]);
        assert!(roster.set_active("A", false));
        assert!(!roster.set_active("A", false));
        assert_eq!(roster.leader().map(|n| n.id.as_str()), Some("B"));
        assert_eq!(roster.active_count(), 1);
    }

    #[test]
    fn re_adding_updates_stake_and_keeps_join_time() {
        let mut roster = roster(&[("A", 10.0)]);
        roster.set_active("A", false);
        let added = roster
            .add("A", 3.0, Capabilities::new(), 50.0, Timestamp::new(9))
            .unwrap();
        assert!(!added);
        let a = roster.get("A").unwrap();
        assert_eq!(a.stake, 3.0);
        assert_eq!(a.reputation, INITIAL_REPUTATION);
        assert_eq!(a.joined_at, Timestamp::new(1));
        assert!(a.active);
    }

    #[test]
    fn rejects_bad_input() {
        let mut roster = Roster::new();
        let now = Timestamp::new(1);
        assert!(roster.add("", 1.0, Capabilities::new(), 100.0, now).is_err());
        assert!(roster.add("a", -1.0, Capabilities::new(), 100.0, now).is_err());
        assert!(roster.add("a", f64::NAN, Capabilities::new(), 100.0, now).is_err());
        assert_eq!(
            roster.remove("ghost"),
            Err(ConsensusError::NodeNotFound("ghost".into()))
        );
    }

    #[test]
    fn total_stake_sums_everyone() {
        let mut roster = roster(&[("A", 10.0), ("B", 5.5)]);
        roster.set_active("B", false);
        assert_eq!(roster.total_stake(), 15.5);
    }
}
