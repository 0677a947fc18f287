//! Consensus traffic carried over the transport.
//!
//! Payloads are bincode with a four-byte tag in front, so consensus can
//! recognise its own messages among everything else the transport delivers.

use serde::{Deserialize, Serialize};

use crate::proposal::{Proposal, Vote};
use crate::ConsensusError;

pub const MESSAGE_TAG: &[u8; 4] = b"OCN1";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsensusMessage {
    Proposal(Proposal),
    Vote(Vote),
}

impl ConsensusMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ConsensusError> {
        let mut bytes = MESSAGE_TAG.to_vec();
        bincode::serialize_into(&mut bytes, self)?;
        Ok(bytes)
    }

    /// `Ok(None)` for payloads that are not consensus messages.
    pub fn decode(payload: &[u8]) -> Result<Option<Self>, ConsensusError> {
        match payload.strip_prefix(MESSAGE_TAG.as_slice()) {
            Some(body) => Ok(Some(bincode::deserialize(body)?)),
            None => Ok(None),
        }
    }
}
