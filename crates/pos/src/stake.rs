//! Per-block stake records and the store they live in.

use std::collections::HashMap;
use std::sync::RwLock;

use stakd_consensus::Hash256;
use stakd_primitives::chain::ChainEntry;
use stakd_primitives::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use stakd_primitives::outpoint::OutPoint;

use crate::error::StakeError;

pub const BLOCK_PROOF_OF_STAKE: u32 = 1 << 0;
pub const BLOCK_STAKE_ENTROPY: u32 = 1 << 1;
pub const BLOCK_STAKE_MODIFIER: u32 = 1 << 2;

/// Stake metadata recorded for every accepted block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockStake {
    pub flags: u32,
    pub stake_modifier: u64,
    pub stake_modifier_v2: Hash256,
    pub hash_proof: Hash256,
    pub prevout_stake: OutPoint,
    pub stake_time: u32,
}

/// Lowest bit of the block hash.
pub fn stake_entropy_bit(block_hash: &Hash256) -> bool {
    block_hash[0] & 1 == 1
}

impl BlockStake {
    /// Record of the genesis block: zero modifiers, generated flag set.
    pub fn genesis() -> Self {
        Self {
            flags: BLOCK_STAKE_MODIFIER,
            ..Self::default()
        }
    }

    pub fn is_proof_of_stake(&self) -> bool {
        self.flags & BLOCK_PROOF_OF_STAKE != 0
    }

    pub fn is_proof_of_work(&self) -> bool {
        !self.is_proof_of_stake()
    }

    pub fn set_proof_of_stake(&mut self) {
        self.flags |= BLOCK_PROOF_OF_STAKE;
    }

    pub fn stake_entropy_bit(&self) -> u64 {
        u64::from(self.flags & BLOCK_STAKE_ENTROPY != 0)
    }

    pub fn set_stake_entropy_bit(&mut self, bit: bool) {
        if bit {
            self.flags |= BLOCK_STAKE_ENTROPY;
        } else {
            self.flags &= !BLOCK_STAKE_ENTROPY;
        }
    }

    pub fn generated_stake_modifier(&self) -> bool {
        self.flags & BLOCK_STAKE_MODIFIER != 0
    }

    pub fn set_stake_modifier(&mut self, modifier: u64, generated: bool) {
        self.stake_modifier = modifier;
        if generated {
            self.flags |= BLOCK_STAKE_MODIFIER;
        } else {
            self.flags &= !BLOCK_STAKE_MODIFIER;
        }
    }
}

impl Encodable for BlockStake {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_u32_le(self.flags);
        encoder.write_u64_le(self.stake_modifier);
        encoder.write_hash_le(&self.stake_modifier_v2);
        encoder.write_hash_le(&self.hash_proof);
        self.prevout_stake.consensus_encode(encoder);
        encoder.write_u32_le(self.stake_time);
    }
}

impl Decodable for BlockStake {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            flags: decoder.read_u32_le()?,
            stake_modifier: decoder.read_u64_le()?,
            stake_modifier_v2: decoder.read_hash_le()?,
            hash_proof: decoder.read_hash_le()?,
            prevout_stake: OutPoint::consensus_decode(decoder)?,
            stake_time: decoder.read_u32_le()?,
        })
    }
}

/// Read/write access to stake history, keyed by block hash.
///
/// Reads may run concurrently with one another; writes come from the single
/// validating thread.
pub trait StakeStore: Send + Sync {
    fn get(&self, block_hash: &Hash256) -> Result<Option<BlockStake>, StakeError>;
    fn set(&self, entry: &ChainEntry, stake: &BlockStake) -> Result<(), StakeError>;

    /// Like `get` but treats absence as a broken invariant.
    fn require(&self, block_hash: &Hash256) -> Result<BlockStake, StakeError> {
        self.get(block_hash)?
            .ok_or(StakeError::MissingStake(*block_hash))
    }
}

/// Map-backed stake store for tests and tooling.
#[derive(Default)]
pub struct MemoryStakeStore {
    records: RwLock<HashMap<Hash256, BlockStake>>,
}

impl MemoryStakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, block_hash: Hash256, stake: BlockStake) {
        self.records
            .write()
            .expect("stake store lock")
            .insert(block_hash, stake);
    }
}

impl StakeStore for MemoryStakeStore {
    fn get(&self, block_hash: &Hash256) -> Result<Option<BlockStake>, StakeError> {
        Ok(self
            .records
            .read()
            .expect("stake store lock")
            .get(block_hash)
            .cloned())
    }

    fn set(&self, entry: &ChainEntry, stake: &BlockStake) -> Result<(), StakeError> {
        self.insert(entry.hash, stake.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stakd_primitives::encoding::{decode, encode};

    #[test]
    fn flags_toggle_independently() {
        let mut stake = BlockStake::default();
        assert!(stake.is_proof_of_work());
        stake.set_proof_of_stake();
        stake.set_stake_entropy_bit(true);
        stake.set_stake_modifier(0xfeed, true);
        assert!(stake.is_proof_of_stake());
        assert_eq!(stake.stake_entropy_bit(), 1);
        assert!(stake.generated_stake_modifier());

        stake.set_stake_modifier(0xfeed, false);
        stake.set_stake_entropy_bit(false);
        assert!(stake.is_proof_of_stake());
        assert_eq!(stake.stake_entropy_bit(), 0);
        assert!(!stake.generated_stake_modifier());
        assert_eq!(stake.flags, BLOCK_PROOF_OF_STAKE);
    }

    #[test]
    fn entropy_bit_is_lowest_hash_bit() {
        let mut hash = [0u8; 32];
        assert!(!stake_entropy_bit(&hash));
        hash[0] = 0x03;
        assert!(stake_entropy_bit(&hash));
        hash[0] = 0x02;
        hash[31] = 0x01;
        assert!(!stake_entropy_bit(&hash));
    }

    #[test]
    fn record_encoding_is_fixed_width() {
        let stake = BlockStake {
            flags: BLOCK_PROOF_OF_STAKE | BLOCK_STAKE_MODIFIER,
            stake_modifier: 42,
            stake_modifier_v2: [1; 32],
            hash_proof: [2; 32],
            prevout_stake: OutPoint::new([3; 32], 4),
            stake_time: 1_600_000_000,
        };
        let bytes = encode(&stake);
        assert_eq!(bytes.len(), 4 + 8 + 32 + 32 + 36 + 4);
        assert_eq!(decode::<BlockStake>(&bytes).expect("decode"), stake);
    }
}
