//! Stake records persisted alongside the coin view.

use stakd_consensus::Hash256;
use stakd_pos::stake::{BlockStake, StakeStore};
use stakd_pos::StakeError;
use stakd_primitives::chain::ChainEntry;
use stakd_primitives::encoding::{decode, encode};
use stakd_storage::{Column, KeyValueStore};

/// [`StakeStore`] over a key/value store, keyed by block hash.
///
/// The genesis record is never written by validation; it is synthesized on
/// read so a fresh store starts with a generated zero modifier.
pub struct StoreStakeChain<S> {
    store: S,
    genesis_hash: Hash256,
}

impl<S: KeyValueStore> StoreStakeChain<S> {
    pub fn new(store: S, genesis_hash: Hash256) -> Self {
        Self {
            store,
            genesis_hash,
        }
    }
}

impl<S: KeyValueStore> StakeStore for StoreStakeChain<S> {
    fn get(&self, block_hash: &Hash256) -> Result<Option<BlockStake>, StakeError> {
        match self.store.get(Column::StakeRecord, block_hash)? {
            Some(bytes) => decode(&bytes)
                .map(Some)
                .map_err(|_| StakeError::Corrupt("undecodable stake record")),
            None if *block_hash == self.genesis_hash => Ok(Some(BlockStake::genesis())),
            None => Ok(None),
        }
    }

    fn set(&self, entry: &ChainEntry, stake: &BlockStake) -> Result<(), StakeError> {
        self.store
            .put(Column::StakeRecord, &entry.hash, &encode(stake))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use primitive_types::U256;
    use stakd_pos::stake::BLOCK_PROOF_OF_STAKE;
    use stakd_primitives::block::BlockHeader;
    use stakd_storage::memory::MemoryStore;

    #[test]
    fn genesis_is_synthesized_and_others_persist() {
        let genesis = ChainEntry::genesis(BlockHeader::default(), U256::one());
        let chain = StoreStakeChain::new(MemoryStore::new(), genesis.hash);
        assert_eq!(
            chain.get(&genesis.hash).expect("read"),
            Some(BlockStake::genesis())
        );
        assert_eq!(chain.get(&[3; 32]).expect("read"), None);
        assert!(matches!(
            chain.require(&[3; 32]),
            Err(StakeError::MissingStake(hash)) if hash == [3; 32]
        ));

        let child = ChainEntry::extend(
            &genesis,
            BlockHeader {
                prev_block: genesis.hash,
                nonce: 1,
                ..BlockHeader::default()
            },
            U256::one(),
        );
        let stake = BlockStake {
            flags: BLOCK_PROOF_OF_STAKE,
            stake_modifier: 5,
            ..BlockStake::default()
        };
        chain.set(&child, &stake).expect("write");
        assert_eq!(chain.get(&child.hash).expect("read"), Some(stake));
    }
}
