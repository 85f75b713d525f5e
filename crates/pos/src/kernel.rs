//! Coinstake kernel verification.
//!
//! A coinstake proves stake by hashing its kernel (the first input's spent
//! output plus a stake modifier and timestamps) below a target scaled by the
//! value of that output.

use std::sync::Arc;

use primitive_types::{U256, U512};
use stakd_consensus::money::Amount;
use stakd_consensus::protocol::is_protocol_v3;
use stakd_consensus::{ConsensusError, ConsensusParams, Hash256};
use stakd_log::{log_debug, log_trace};
use stakd_pow::difficulty::compact_to_u256;
use stakd_primitives::chain::ChainEntry;
use stakd_primitives::coins::UnspentOutputs;
use stakd_primitives::encoding::Encoder;
use stakd_primitives::hash::{hash_to_u256, sha256d};
use stakd_primitives::outpoint::OutPoint;
use stakd_primitives::transaction::{Transaction, TxOut};

use crate::error::StakeError;
use crate::stake::BlockStake;

/// Resolves unspent outputs by transaction id.
pub trait CoinLookup {
    fn unspent_outputs(&self, txid: &Hash256) -> Option<&UnspentOutputs>;
}

/// Evaluates an input's unlocking script against the output it spends.
pub trait ScriptVerifier: Send + Sync {
    fn verify_input(&self, tx: &Transaction, input_index: usize, spent: &TxOut, flags: u32) -> bool;
}

/// Stake sub-context of one block validation attempt.
#[derive(Clone, Debug, Default)]
pub struct StakeContext {
    pub block_stake: BlockStake,
    pub hash_proof_of_stake: Hash256,
    pub target_proof_of_stake: U512,
    pub total_coinstake_value_in: Amount,
}

/// Modifier material mixed into the kernel hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelModifier {
    /// Protocol V3: the previous block's V2 modifier.
    V2(Hash256),
    /// Before V3: the 64-bit modifier and the time of the block holding the staked output.
    V1 { modifier: u64, block_from_time: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelProof {
    pub proof_hash: Hash256,
    pub weighted_target: U512,
}

/// Hash of the serialized kernel.
pub fn kernel_hash(
    modifier: &KernelModifier,
    prev_tx_time: u32,
    prevout: &OutPoint,
    coinstake_time: u32,
) -> Hash256 {
    let mut encoder = Encoder::with_capacity(84);
    match modifier {
        KernelModifier::V2(modifier_v2) => encoder.write_hash_le(modifier_v2),
        KernelModifier::V1 {
            modifier,
            block_from_time,
        } => {
            encoder.write_u64_le(*modifier);
            encoder.write_u32_le(*block_from_time);
        }
    }
    encoder.write_u32_le(prev_tx_time);
    encoder.write_hash_le(&prevout.hash);
    encoder.write_u32_le(prevout.index);
    encoder.write_u32_le(coinstake_time);
    sha256d(&encoder.into_inner())
}

/// `target(bits) * value`, widened so large stakes cannot overflow.
pub fn weighted_target(bits: u32, value: Amount) -> Result<U512, ConsensusError> {
    let target = compact_to_u256(bits).map_err(|_| ConsensusError::StakeHashInvalidTarget)?;
    let weight = u64::try_from(value).map_err(|_| ConsensusError::StakeHashInvalidTarget)?;
    Ok(target.full_mul(U256::from(weight)))
}

/// Checks `proof_hash <= target(bits) * value` for the staked output.
///
/// Pure: identical inputs give identical results.
pub fn check_stake_kernel_hash(
    modifier: &KernelModifier,
    bits: u32,
    staking_coins: &UnspentOutputs,
    prevout: &OutPoint,
    coinstake_time: u32,
) -> Result<KernelProof, ConsensusError> {
    if coinstake_time < staking_coins.time {
        return Err(ConsensusError::StakeTimeViolation);
    }
    let value = staking_coins
        .output(prevout.index)
        .map(|out| out.value)
        .ok_or(ConsensusError::ReadTxPrevFailed)?;

    let weighted_target = weighted_target(bits, value)?;
    let proof_hash = kernel_hash(modifier, staking_coins.time, prevout, coinstake_time);
    let proof = KernelProof {
        proof_hash,
        weighted_target,
    };
    if U512::from(hash_to_u256(&proof_hash)) > weighted_target {
        return Err(ConsensusError::StakeHashInvalidTarget);
    }
    Ok(proof)
}

/// Validates a block's coinstake against the stake rules and records the
/// kernel proof into `context`.
#[allow(clippy::too_many_arguments)]
pub fn check_proof_of_stake(
    context: &mut StakeContext,
    params: &ConsensusParams,
    prev: &Arc<ChainEntry>,
    prev_stake: &BlockStake,
    coinstake: &Transaction,
    bits: u32,
    coins: &dyn CoinLookup,
    scripts: &dyn ScriptVerifier,
) -> Result<(), StakeError> {
    if !coinstake.is_coinstake() {
        return Err(ConsensusError::NonCoinstake.into());
    }
    let kernel = &coinstake.vin[0];
    let staking_coins = coins
        .unspent_outputs(&kernel.prevout.hash)
        .ok_or(ConsensusError::ReadTxPrevFailed)?;
    let spent = staking_coins
        .output(kernel.prevout.index)
        .ok_or(ConsensusError::ReadTxPrevFailed)?;

    if !scripts.verify_input(coinstake, 0, spent, 0) {
        return Err(ConsensusError::CoinstakeVerifySignatureFailed.into());
    }

    let modifier = if is_protocol_v3(i64::from(coinstake.time), params) {
        let depth = prev.height - staking_coins.height;
        if depth < params.stake_min_confirmations - 1 {
            return Err(ConsensusError::InvalidStakeDepth.into());
        }
        KernelModifier::V2(prev_stake.stake_modifier_v2)
    } else {
        let block_from = prev
            .ancestor(staking_coins.height)
            .ok_or(ConsensusError::ReadTxPrevFailed)?;
        if i64::from(block_from.time()) + params.stake_min_age > i64::from(coinstake.time) {
            return Err(ConsensusError::MinAgeViolation.into());
        }
        KernelModifier::V1 {
            modifier: prev_stake.stake_modifier,
            block_from_time: block_from.time(),
        }
    };

    let proof = check_stake_kernel_hash(
        &modifier,
        bits,
        staking_coins,
        &kernel.prevout,
        coinstake.time,
    );
    let proof = match proof {
        Ok(proof) => proof,
        Err(err) => {
            log_trace!(
                "kernel rejected at height {}: {}",
                prev.height + 1,
                err.code()
            );
            return Err(err.into());
        }
    };

    log_debug!(
        "kernel accepted at height {} (staked output height {})",
        prev.height + 1,
        staking_coins.height
    );
    context.hash_proof_of_stake = proof.proof_hash;
    context.target_proof_of_stake = proof.weighted_target;
    Ok(())
}
