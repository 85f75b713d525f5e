//! In-memory header chain.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use stakd_consensus::{ConsensusError, Hash256};
use stakd_log::log_debug;
use stakd_pow::difficulty::block_proof;
use stakd_primitives::block::BlockHeader;
use stakd_primitives::chain::ChainEntry;

use crate::error::ChainStateError;

/// Every known header, plus the active branch indexed by height.
///
/// Entries are never removed; after a reorg the losing branch simply stops
/// being reachable from `active`.
pub struct HeaderChain {
    by_hash: HashMap<Hash256, Arc<ChainEntry>>,
    active: Vec<Arc<ChainEntry>>,
    invalid: HashSet<Hash256>,
}

impl HeaderChain {
    pub fn new(genesis: BlockHeader) -> Self {
        let work = block_proof(genesis.bits);
        let entry = ChainEntry::genesis(genesis, work);
        let mut by_hash = HashMap::new();
        by_hash.insert(entry.hash, Arc::clone(&entry));
        Self {
            by_hash,
            active: vec![entry],
            invalid: HashSet::new(),
        }
    }

    pub fn genesis(&self) -> &Arc<ChainEntry> {
        &self.active[0]
    }

    pub fn tip(&self) -> &Arc<ChainEntry> {
        &self.active[self.active.len() - 1]
    }

    pub fn height(&self) -> i32 {
        self.tip().height
    }

    pub fn get_by_hash(&self, hash: &Hash256) -> Option<&Arc<ChainEntry>> {
        self.by_hash.get(hash)
    }

    /// Entry at `height` on the active branch.
    pub fn get_by_height(&self, height: i32) -> Option<&Arc<ChainEntry>> {
        usize::try_from(height)
            .ok()
            .and_then(|index| self.active.get(index))
    }

    pub fn contains(&self, entry: &ChainEntry) -> bool {
        self.get_by_height(entry.height)
            .is_some_and(|active| active.hash == entry.hash)
    }

    /// Active-branch successor of `entry`, if `entry` is itself active.
    pub fn next(&self, entry: &ChainEntry) -> Option<&Arc<ChainEntry>> {
        if !self.contains(entry) {
            return None;
        }
        self.get_by_height(entry.height + 1)
    }

    /// Links `header` to its parent. The tip moves when the new entry has
    /// more work than the current one.
    pub fn add_header(&mut self, header: BlockHeader) -> Result<Arc<ChainEntry>, ChainStateError> {
        let hash = header.hash();
        if let Some(existing) = self.by_hash.get(&hash) {
            return Ok(Arc::clone(existing));
        }
        if self.invalid.contains(&header.prev_block) {
            self.invalid.insert(hash);
            return Err(ConsensusError::BadPrevBlock.into());
        }
        let prev = self
            .by_hash
            .get(&header.prev_block)
            .cloned()
            .ok_or(ChainStateError::MissingHeader(header.prev_block))?;
        let work = block_proof(header.bits);
        let entry = ChainEntry::extend(&prev, header, work);
        self.by_hash.insert(hash, Arc::clone(&entry));
        if entry.chain_work > self.tip().chain_work {
            self.set_tip(&entry);
        }
        Ok(entry)
    }

    /// Makes `entry` the active tip, rewriting the active branch above the fork.
    pub fn set_tip(&mut self, entry: &Arc<ChainEntry>) {
        let fork_height = self
            .find_fork(entry)
            .map(|fork| fork.height)
            .unwrap_or(0);
        let keep = usize::try_from(fork_height + 1).unwrap_or(1);
        self.active.truncate(keep);
        let mut branch: Vec<Arc<ChainEntry>> = entry
            .iter_back()
            .take_while(|walk| walk.height > fork_height)
            .collect();
        branch.reverse();
        self.active.extend(branch);
        log_debug!(
            "header tip set to height {} (fork at {})",
            entry.height,
            fork_height
        );
    }

    /// Last entry `entry` shares with the active branch.
    pub fn find_fork(&self, entry: &Arc<ChainEntry>) -> Option<Arc<ChainEntry>> {
        let start = if entry.height > self.height() {
            entry.ancestor(self.height())?
        } else {
            Arc::clone(entry)
        };
        start
            .iter_back()
            .find(|walk| self.contains(walk))
    }

    pub fn mark_invalid(&mut self, hash: &Hash256) {
        self.invalid.insert(*hash);
    }

    pub fn is_invalid(&self, hash: &Hash256) -> bool {
        self.invalid.contains(hash)
    }
}
