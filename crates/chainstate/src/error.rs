use std::fmt;

use stakd_consensus::params::hash256_to_hex;
use stakd_consensus::{ConsensusError, Hash256};
use stakd_pos::StakeError;
use stakd_primitives::encoding::DecodeError;
use stakd_storage::StoreError;

#[derive(Debug)]
pub enum ChainStateError {
    /// The block breaks a consensus rule; the loop recovers from these.
    Consensus(ConsensusError),
    Store(StoreError),
    /// An input referenced coins that were never loaded into the working set.
    MissingCoins(Hash256),
    MissingHeader(Hash256),
    MissingStake(Hash256),
    Corrupt(&'static str),
}

impl ChainStateError {
    pub fn is_consensus(&self) -> bool {
        matches!(self, ChainStateError::Consensus(_))
    }

    pub fn consensus(&self) -> Option<ConsensusError> {
        match self {
            ChainStateError::Consensus(err) => Some(*err),
            _ => None,
        }
    }
}

impl fmt::Display for ChainStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainStateError::Consensus(err) => write!(f, "{err}"),
            ChainStateError::Store(err) => write!(f, "{err}"),
            ChainStateError::MissingCoins(txid) => {
                write!(f, "missing coins for tx {}", hash256_to_hex(txid))
            }
            ChainStateError::MissingHeader(hash) => {
                write!(f, "missing header {}", hash256_to_hex(hash))
            }
            ChainStateError::MissingStake(hash) => {
                write!(f, "missing stake record for block {}", hash256_to_hex(hash))
            }
            ChainStateError::Corrupt(message) => write!(f, "corrupt chain state: {message}"),
        }
    }
}

impl std::error::Error for ChainStateError {}

impl From<ConsensusError> for ChainStateError {
    fn from(err: ConsensusError) -> Self {
        ChainStateError::Consensus(err)
    }
}

impl From<StoreError> for ChainStateError {
    fn from(err: StoreError) -> Self {
        ChainStateError::Store(err)
    }
}

impl From<StakeError> for ChainStateError {
    fn from(err: StakeError) -> Self {
        match err {
            StakeError::Consensus(err) => ChainStateError::Consensus(err),
            StakeError::MissingStake(hash) => ChainStateError::MissingStake(hash),
            StakeError::Store(err) => ChainStateError::Store(err),
            StakeError::Corrupt(message) => ChainStateError::Corrupt(message),
        }
    }
}

impl From<DecodeError> for ChainStateError {
    fn from(_: DecodeError) -> Self {
        ChainStateError::Corrupt("undecodable record")
    }
}
