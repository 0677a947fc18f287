//! Consensus: stake-weighted proposal voting among roster nodes.
//!
//! - Proposals start `Pending` and are decided only by the periodic tally.
//! - A proposal is approved at ≥ 67% of the votes cast on it, rounded to
//!   whole percent.
//! - It is rejected once at least half of the active roster has voted
//!   without reaching approval.
//! - The leader is the active node with the greatest `stake × reputation`.
//!
//! ## Module overview
//!
//! - [`roster`]: voting-eligible nodes and leader selection.
//! - [`proposal`]: proposals, votes and the decision rule.
//! - [`book`]: synchronous state and the tally step.
//! - [`message`]: wire form of proposals and votes.
//! - [`service`]: the async service, tally loop and dissemination.

pub mod book;
pub mod config;
pub mod error;
pub mod message;
pub mod proposal;
pub mod roster;
pub mod service;

pub use book::{ConsensusBook, ConsensusState, ConsensusStats, ConsensusStatus, TallyReport};
pub use config::ConsensusConfig;
pub use error::ConsensusError;
pub use message::ConsensusMessage;
pub use proposal::{Proposal, ProposalStatus, Vote};
pub use roster::{ConsensusNode, Roster};
pub use service::{Consensus, ConsensusEvent, CONSENSUS_EVENT_CAPACITY};
