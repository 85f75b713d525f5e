//! Hard-coded checkpoint tables.
//!
//! A checkpoint pins the block hash at a height and carries the V2 stake
//! modifier recorded for that block, so that blocks at or below the last
//! checkpoint can skip kernel verification while keeping modifier continuity.

use std::collections::BTreeMap;

use crate::params::{hash256_from_hex, Network};
use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CheckpointInfo {
    pub hash: Hash256,
    pub stake_modifier_v2: Hash256,
}

#[derive(Clone, Debug, Default)]
pub struct Checkpoints {
    entries: BTreeMap<i32, CheckpointInfo>,
}

const MAINNET_CHECKPOINTS: &[(i32, &str, &str)] = &[(
    0,
    "0000066e91e46e5a264d42c89e1204963b2ee6be230b443e9159020539d972af",
    "0000000000000000000000000000000000000000000000000000000000000000",
)];

const TESTNET_CHECKPOINTS: &[(i32, &str, &str)] = &[(
    0,
    "00000e246d7b73b88c9ab55f2e5e94d9e22d471def3df5ea448f5576b1d156b9",
    "0000000000000000000000000000000000000000000000000000000000000000",
)];

impl Checkpoints {
    /// Table for `network`; empty when `use_checkpoints` is false.
    pub fn new(network: Network, use_checkpoints: bool) -> Self {
        if !use_checkpoints {
            return Self::default();
        }
        let table: &[(i32, &str, &str)] = match network {
            Network::Mainnet => MAINNET_CHECKPOINTS,
            Network::Testnet => TESTNET_CHECKPOINTS,
            Network::Regtest | Network::Devnet => &[],
        };
        let mut entries = BTreeMap::new();
        for (height, hash, modifier) in table {
            if let (Ok(hash), Ok(stake_modifier_v2)) =
                (hash256_from_hex(hash), hash256_from_hex(modifier))
            {
                entries.insert(
                    *height,
                    CheckpointInfo {
                        hash,
                        stake_modifier_v2,
                    },
                );
            }
        }
        Self { entries }
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (i32, CheckpointInfo)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn last_checkpoint_height(&self) -> i32 {
        self.entries
            .keys()
            .next_back()
            .copied()
            .unwrap_or(0)
    }

    /// True when no checkpoint exists at `height` or its hash matches.
    pub fn check_hardened(&self, height: i32, hash: &Hash256) -> bool {
        match self.entries.get(&height) {
            Some(info) => info.hash == *hash,
            None => true,
        }
    }

    pub fn get_checkpoint(&self, height: i32) -> Option<&CheckpointInfo> {
        self.entries.get(&height)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
