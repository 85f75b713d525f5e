use std::fmt;

use stakd_consensus::{ConsensusError, Hash256};
use stakd_consensus::params::hash256_to_hex;
use stakd_storage::StoreError;

#[derive(Debug)]
pub enum StakeError {
    /// The block breaks a stake rule.
    Consensus(ConsensusError),
    /// No stake record exists for a block that should have one.
    MissingStake(Hash256),
    Store(StoreError),
    Corrupt(&'static str),
}

impl StakeError {
    pub fn consensus(&self) -> Option<ConsensusError> {
        match self {
            StakeError::Consensus(err) => Some(*err),
            _ => None,
        }
    }
}

impl fmt::Display for StakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StakeError::Consensus(err) => write!(f, "{err}"),
            StakeError::MissingStake(hash) => {
                write!(f, "missing stake record for block {}", hash256_to_hex(hash))
            }
            StakeError::Store(err) => write!(f, "{err}"),
            StakeError::Corrupt(message) => write!(f, "corrupt stake data: {message}"),
        }
    }
}

impl std::error::Error for StakeError {}

impl From<ConsensusError> for StakeError {
    fn from(err: ConsensusError) -> Self {
        StakeError::Consensus(err)
    }
}

impl From<StoreError> for StakeError {
    fn from(err: StoreError) -> Self {
        StakeError::Store(err)
    }
}
