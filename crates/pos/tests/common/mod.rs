#![allow(dead_code)]

use std::sync::Arc;

use primitive_types::U256;
use stakd_pos::stake::{stake_entropy_bit, BlockStake, MemoryStakeStore};
use stakd_primitives::block::BlockHeader;
use stakd_primitives::chain::ChainEntry;

pub struct TestChain {
    pub entries: Vec<Arc<ChainEntry>>,
    pub store: MemoryStakeStore,
}

impl TestChain {
    /// Genesis at `start_time` with a generated zero modifier.
    pub fn new(start_time: u32, bits: u32) -> Self {
        let genesis = ChainEntry::genesis(
            BlockHeader {
                version: 1,
                time: start_time,
                bits,
                ..BlockHeader::default()
            },
            U256::one(),
        );
        let store = MemoryStakeStore::new();
        store.insert(genesis.hash, BlockStake::genesis());
        Self {
            entries: vec![genesis],
            store,
        }
    }

    pub fn tip(&self) -> &Arc<ChainEntry> {
        self.entries.last().expect("chain has genesis")
    }

    /// Appends a block; `stake` is completed with proof hash and entropy bit.
    pub fn push(&mut self, time: u32, bits: u32, proof_of_stake: bool) -> Arc<ChainEntry> {
        let prev = Arc::clone(self.tip());
        let header = BlockHeader {
            version: 7,
            prev_block: prev.hash,
            time,
            bits,
            nonce: self.entries.len() as u32,
            ..BlockHeader::default()
        };
        let entry = ChainEntry::extend(&prev, header, U256::one());
        let mut stake = BlockStake::default();
        if proof_of_stake {
            stake.set_proof_of_stake();
        }
        stake.hash_proof = entry.hash;
        stake.set_stake_entropy_bit(stake_entropy_bit(&entry.hash));
        self.store.insert(entry.hash, stake);
        self.entries.push(Arc::clone(&entry));
        entry
    }
}
