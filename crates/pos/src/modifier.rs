//! Stake modifier computation.
//!
//! The 64-bit modifier is rebuilt once per modifier interval from the entropy
//! bits of 64 blocks chosen out of the preceding selection interval. The V2
//! modifier is a running hash chain over block kernels.

use std::collections::HashSet;
use std::sync::Arc;

use primitive_types::U256;
use stakd_consensus::constants::{MODIFIER_INTERVAL_RATIO, MODIFIER_SELECTION_ROUNDS};
use stakd_consensus::{ConsensusError, ConsensusParams, Hash256};
use stakd_log::log_trace;
use stakd_primitives::chain::ChainEntry;
use stakd_primitives::hash::{hash_to_u256, sha256d};

use crate::error::StakeError;
use crate::stake::StakeStore;

/// Length of selection round `section`; earlier rounds are shorter.
pub fn selection_interval_section(section: usize, params: &ConsensusParams) -> i64 {
    let section = section as i64;
    params.stake_modifier_interval * 63 / (63 + (63 - section) * (MODIFIER_INTERVAL_RATIO - 1))
}

/// Total span covered by all selection rounds.
pub fn selection_interval(params: &ConsensusParams) -> i64 {
    (0..MODIFIER_SELECTION_ROUNDS)
        .map(|section| selection_interval_section(section, params))
        .sum()
}

/// Most recent generated modifier at or before `entry`, with that block's time.
fn last_stake_modifier(
    store: &dyn StakeStore,
    entry: &Arc<ChainEntry>,
) -> Result<(u64, i64), StakeError> {
    for walk in entry.iter_back() {
        let stake = store.require(&walk.hash)?;
        if stake.generated_stake_modifier() {
            return Ok((stake.stake_modifier, i64::from(walk.time())));
        }
    }
    Err(ConsensusError::ModifierNotFound.into())
}

struct Candidate {
    entry: Arc<ChainEntry>,
    hash_proof: Hash256,
    proof_of_stake: bool,
    entropy_bit: u64,
}

fn selection_hash(candidate: &Candidate, prev_modifier: u64) -> U256 {
    let mut material = [0u8; 40];
    material[..32].copy_from_slice(&candidate.hash_proof);
    material[32..].copy_from_slice(&prev_modifier.to_le_bytes());
    let hash = hash_to_u256(&sha256d(&material));
    // Favour proof-of-stake blocks.
    if candidate.proof_of_stake {
        hash >> 32
    } else {
        hash
    }
}

fn select_from_candidates<'a>(
    candidates: &'a [Candidate],
    selected: &HashSet<Hash256>,
    selection_stop: i64,
    prev_modifier: u64,
) -> Option<&'a Candidate> {
    let mut best: Option<(&Candidate, U256)> = None;
    for candidate in candidates {
        if best.is_some() && i64::from(candidate.entry.time()) > selection_stop {
            break;
        }
        if selected.contains(&candidate.entry.hash) {
            continue;
        }
        let hash = selection_hash(candidate, prev_modifier);
        match best {
            Some((_, best_hash)) if hash >= best_hash => {}
            _ => best = Some((candidate, hash)),
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Returns the modifier for the block after `prev` and whether it was
/// freshly generated.
pub fn compute_next_stake_modifier(
    store: &dyn StakeStore,
    params: &ConsensusParams,
    prev: Option<&Arc<ChainEntry>>,
) -> Result<(u64, bool), StakeError> {
    let Some(prev) = prev else {
        return Ok((0, true));
    };

    let (modifier, modifier_time) = last_stake_modifier(store, prev)?;
    let interval = params.stake_modifier_interval;
    let prev_time = i64::from(prev.time());
    if modifier_time / interval >= prev_time / interval {
        return Ok((modifier, false));
    }

    let selection_start = (prev_time / interval) * interval - selection_interval(params);
    let mut candidates = Vec::new();
    for entry in prev.iter_back() {
        if i64::from(entry.time()) < selection_start {
            break;
        }
        let stake = store.require(&entry.hash)?;
        candidates.push(Candidate {
            hash_proof: stake.hash_proof,
            proof_of_stake: stake.is_proof_of_stake(),
            entropy_bit: stake.stake_entropy_bit(),
            entry,
        });
    }
    candidates.sort_by(|a, b| {
        a.entry
            .time()
            .cmp(&b.entry.time())
            .then_with(|| hash_to_u256(&a.entry.hash).cmp(&hash_to_u256(&b.entry.hash)))
    });

    let rounds = candidates.len().min(MODIFIER_SELECTION_ROUNDS);
    let mut new_modifier = 0u64;
    let mut selection_stop = selection_start;
    let mut selected = HashSet::with_capacity(rounds);
    for round in 0..rounds {
        selection_stop += selection_interval_section(round, params);
        let candidate =
            select_from_candidates(&candidates, &selected, selection_stop, modifier)
                .ok_or(ConsensusError::FailedSelectBlock)?;
        new_modifier |= candidate.entropy_bit << round;
        selected.insert(candidate.entry.hash);
        log_trace!(
            "modifier round {round}: selected height {} (stop {selection_stop})",
            candidate.entry.height
        );
    }

    Ok((new_modifier, true))
}

/// `sha256d(kernel ++ prev_modifier_v2)`, or zero for the genesis block.
pub fn compute_stake_modifier_v2(
    prev: Option<&Arc<ChainEntry>>,
    prev_modifier_v2: &Hash256,
    kernel: &Hash256,
) -> Hash256 {
    if prev.is_none() {
        return [0u8; 32];
    }
    let mut material = [0u8; 64];
    material[..32].copy_from_slice(kernel);
    material[32..].copy_from_slice(prev_modifier_v2);
    sha256d(&material)
}
