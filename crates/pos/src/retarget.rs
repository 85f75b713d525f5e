//! Next-target computation for proof-of-work and proof-of-stake blocks.

use std::sync::Arc;

use primitive_types::{U256, U512};
use stakd_consensus::protocol::{is_protocol_v3, is_v1_retargeting_fixed};
use stakd_consensus::ConsensusParams;
use stakd_pow::difficulty::{compact_to_u256, u256_to_compact};
use stakd_primitives::chain::ChainEntry;

use crate::error::StakeError;
use crate::stake::StakeStore;

/// Walks back from `start` to the nearest block mined the same way.
fn last_block_of_kind(
    store: &dyn StakeStore,
    start: &Arc<ChainEntry>,
    proof_of_stake: bool,
) -> Result<Arc<ChainEntry>, StakeError> {
    let mut walk = Arc::clone(start);
    loop {
        let Some(prev) = walk.prev().cloned() else {
            return Ok(walk);
        };
        if store.require(&walk.hash)?.is_proof_of_stake() == proof_of_stake {
            return Ok(walk);
        }
        walk = prev;
    }
}

/// Compact target the block after `tip` must carry.
pub fn get_next_target_required(
    store: &dyn StakeStore,
    tip: Option<&Arc<ChainEntry>>,
    params: &ConsensusParams,
    proof_of_stake: bool,
) -> Result<u32, StakeError> {
    let pow_limit = U256::from_little_endian(&params.pow_limit);
    let Some(tip) = tip else {
        return Ok(u256_to_compact(pow_limit));
    };
    let limit = if proof_of_stake {
        U256::from_little_endian(&params.pos_limit_v2)
    } else {
        pow_limit
    };

    let last = last_block_of_kind(store, tip, proof_of_stake)?;
    let Some(last_prev) = last.prev() else {
        return Ok(u256_to_compact(limit));
    };
    let prev_last = last_block_of_kind(store, last_prev, proof_of_stake)?;
    if prev_last.prev().is_none() {
        return Ok(u256_to_compact(limit));
    }
    if params.pow_no_retargeting {
        return Ok(last.header.bits);
    }

    let spacing = params.target_spacing;
    let mut actual_spacing = i64::from(last.time()) - i64::from(prev_last.time());
    if is_v1_retargeting_fixed(tip.height, params) && actual_spacing < 0 {
        actual_spacing = spacing;
    }
    if is_protocol_v3(i64::from(tip.time()), params) && actual_spacing > spacing * 10 {
        actual_spacing = spacing * 10;
    }

    let interval = params.retarget_interval();
    let multiply_by = (interval - 1) * spacing + 2 * actual_spacing;
    let divide_by = (interval + 1) * spacing;
    let Ok(last_target) = compact_to_u256(last.header.bits) else {
        return Ok(u256_to_compact(limit));
    };
    if multiply_by <= 0 || divide_by <= 0 {
        return Ok(u256_to_compact(limit));
    }

    let scaled = last_target.full_mul(U256::from(multiply_by as u64)) / U512::from(divide_by as u64);
    let target = match U256::try_from(scaled) {
        Ok(target) if !target.is_zero() && target <= limit => target,
        _ => limit,
    };
    Ok(u256_to_compact(target))
}
