//! Linked chain entries with skip pointers.

use std::sync::Arc;

use primitive_types::U256;
use stakd_consensus::Hash256;

use crate::block::BlockHeader;

/// A header placed in the chain: height, cumulative work and back links.
#[derive(Debug)]
pub struct ChainEntry {
    pub header: BlockHeader,
    pub hash: Hash256,
    pub height: i32,
    pub chain_work: U256,
    prev: Option<Arc<ChainEntry>>,
    skip: Option<Arc<ChainEntry>>,
}

fn invert_lowest_one(value: i32) -> i32 {
    value & value.wrapping_sub(1)
}

/// Height the skip pointer of an entry at `height` jumps to.
pub fn skip_height(height: i32) -> i32 {
    if height < 2 {
        0
    } else if height & 1 != 0 {
        invert_lowest_one(invert_lowest_one(height - 1)) + 1
    } else {
        invert_lowest_one(height)
    }
}

impl ChainEntry {
    pub fn genesis(header: BlockHeader, work: U256) -> Arc<Self> {
        Arc::new(Self {
            hash: header.hash(),
            header,
            height: 0,
            chain_work: work,
            prev: None,
            skip: None,
        })
    }

    /// Links `header` on top of `prev`; `work` is the header's own proof.
    pub fn extend(prev: &Arc<ChainEntry>, header: BlockHeader, work: U256) -> Arc<Self> {
        let height = prev.height + 1;
        let skip = prev.ancestor(skip_height(height));
        Arc::new(Self {
            hash: header.hash(),
            header,
            height,
            chain_work: prev.chain_work.saturating_add(work),
            prev: Some(Arc::clone(prev)),
            skip,
        })
    }

    pub fn prev(&self) -> Option<&Arc<ChainEntry>> {
        self.prev.as_ref()
    }

    pub fn time(&self) -> u32 {
        self.header.time
    }

    /// The ancestor at `height`, walking skip pointers where they do not overshoot.
    pub fn ancestor(self: &Arc<Self>, height: i32) -> Option<Arc<ChainEntry>> {
        if height < 0 || height > self.height {
            return None;
        }
        let mut walk = Arc::clone(self);
        while walk.height > height {
            let skip_to = skip_height(walk.height);
            let prev_skip = skip_height(walk.height - 1);
            let use_skip = walk.skip.is_some()
                && (skip_to == height
                    || (skip_to > height
                        && !(prev_skip < skip_to - 2 && prev_skip >= height)));
            let next = if use_skip {
                walk.skip.clone()
            } else {
                walk.prev.clone()
            };
            walk = next?;
        }
        Some(walk)
    }

    /// Iterates from this entry back to genesis.
    pub fn iter_back(self: &Arc<Self>) -> impl Iterator<Item = Arc<ChainEntry>> {
        std::iter::successors(Some(Arc::clone(self)), |entry| entry.prev.clone())
    }

    /// Last common ancestor of two entries.
    pub fn find_fork(a: &Arc<ChainEntry>, b: &Arc<ChainEntry>) -> Option<Arc<ChainEntry>> {
        let height = a.height.min(b.height);
        let mut left = a.ancestor(height)?;
        let mut right = b.ancestor(height)?;
        while left.hash != right.hash {
            left = left.prev.clone()?;
            right = right.prev.clone()?;
        }
        Some(left)
    }
}
