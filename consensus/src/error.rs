use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ConsensusError {
    #[error("consensus node {0} not found")]
    NodeNotFound(String),

    #[error("invalid stake {stake} for node {node}")]
    InvalidStake { node: String, stake: f64 },

    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    #[error("consensus message codec error: {0}")]
    Codec(String),
}

impl From<bincode::Error> for ConsensusError {
    fn from(e: bincode::Error) -> Self {
        Self::Codec(e.to_string())
    }
}
