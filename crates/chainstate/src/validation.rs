//! Block validation pipeline.
//!
//! A block passes through an ordered list of stages. The proof-of-stake
//! capability adds the stake stage and switches on the stake-specific checks
//! inside the shared ones; every stage returns the first rule it finds broken.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rayon::prelude::*;
use stakd_consensus::constants::{
    CURRENT_BLOCK_VERSION, LOCKTIME_THRESHOLD, MAX_BLOCK_BASE_SIZE, MAX_BLOCK_SERIALIZED_SIZE,
    MAX_BLOCK_SIGOPS, MAX_COINBASE_SCRIPT_LEN, MAX_PRE_V2_BLOCK_VERSION, MAX_TX_SIZE,
    MIN_COINBASE_SCRIPT_LEN, WITNESS_COMMITMENT_HEADER,
};
use stakd_consensus::money::{money_range, Amount, MAX_MONEY};
use stakd_consensus::params::hash256_to_hex;
use stakd_consensus::protocol::{future_drift, is_protocol_v2, is_protocol_v3};
use stakd_consensus::{
    proof_of_stake_reward, proof_of_work_reward, Checkpoints, ConsensusError, ConsensusParams,
    DeploymentFlags, Hash256,
};
use stakd_log::{log_debug, log_trace, log_warn};
use stakd_pos::modifier::{compute_next_stake_modifier, compute_stake_modifier_v2};
use stakd_pos::retarget::get_next_target_required;
use stakd_pos::signature::check_block_signature;
use stakd_pos::stake::{stake_entropy_bit, StakeStore};
use stakd_pos::timing::{check_coinstake_timestamp, past_time_limit};
use stakd_pos::{check_proof_of_stake, ScriptVerifier, StakeContext};
use stakd_pow::difficulty::block_proof;
use stakd_pow::validation::{validate_pow_header, PowError};
use stakd_primitives::block::Block;
use stakd_primitives::chain::ChainEntry;
use stakd_primitives::hash::sha256d;
use stakd_primitives::script::{legacy_sigops, push_int, witness_commitment};
use stakd_primitives::transaction::{Transaction, TxOut};

use crate::error::ChainStateError;
use crate::utxo::UnspentOutputSet;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    CheckBlockHeader,
    ContextualCheckBlockHeader,
    ContextualCheckBlock,
    CheckBlock,
    CheckAndComputeStake,
    ExecuteBlock,
    CheckBlockReward,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::CheckBlockHeader => "check-block-header",
            Stage::ContextualCheckBlockHeader => "contextual-check-block-header",
            Stage::ContextualCheckBlock => "contextual-check-block",
            Stage::CheckBlock => "check-block",
            Stage::CheckAndComputeStake => "check-and-compute-stake",
            Stage::ExecuteBlock => "execute-block",
            Stage::CheckBlockReward => "check-block-reward",
        }
    }

    /// Stages that only look at the header and its ancestry.
    pub fn is_header_stage(self) -> bool {
        matches!(
            self,
            Stage::CheckBlockHeader | Stage::ContextualCheckBlockHeader
        )
    }
}

const BASIC_PIPELINE: &[Stage] = &[
    Stage::CheckBlockHeader,
    Stage::ContextualCheckBlockHeader,
    Stage::ContextualCheckBlock,
    Stage::CheckBlock,
    Stage::ExecuteBlock,
    Stage::CheckBlockReward,
];

const POS_PIPELINE: &[Stage] = &[
    Stage::CheckBlockHeader,
    Stage::ContextualCheckBlockHeader,
    Stage::ContextualCheckBlock,
    Stage::CheckBlock,
    Stage::CheckAndComputeStake,
    Stage::ExecuteBlock,
    Stage::CheckBlockReward,
];

/// Rule families a network enforces.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Capabilities {
    pub pos: bool,
}

impl Capabilities {
    pub const BASIC: Self = Self { pos: false };
    pub const POS: Self = Self { pos: true };

    pub fn pipeline(self) -> &'static [Stage] {
        if self.pos {
            POS_PIPELINE
        } else {
            BASIC_PIPELINE
        }
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::POS
    }
}

/// Everything one validation attempt reads and mutates. Dropped on
/// rejection; on acceptance the loop persists `coins` and `stake`.
pub struct ValidationContext<'b> {
    pub block: &'b Block,
    pub block_hash: Hash256,
    pub entry: Arc<ChainEntry>,
    pub prev: Arc<ChainEntry>,
    pub flags: DeploymentFlags,
    /// Network-adjusted wall clock, unix seconds.
    pub adjusted_time: i64,
    pub coins: UnspentOutputSet,
    pub stake: StakeContext,
    pub fees: Amount,
    pub header_only: bool,
    pub check_pow: bool,
    txids: Vec<Hash256>,
}

impl<'b> ValidationContext<'b> {
    pub fn new(
        block: &'b Block,
        prev: Arc<ChainEntry>,
        params: &ConsensusParams,
        adjusted_time: i64,
    ) -> Self {
        let entry = ChainEntry::extend(&prev, block.header.clone(), block_proof(block.header.bits));
        Self {
            block,
            block_hash: entry.hash,
            flags: DeploymentFlags::for_block(entry.height, params),
            entry,
            prev,
            adjusted_time,
            coins: UnspentOutputSet::new(),
            stake: StakeContext::default(),
            fees: 0,
            header_only: false,
            check_pow: true,
            txids: block.txids(),
        }
    }

    pub fn height(&self) -> i32 {
        self.entry.height
    }

    pub fn txids(&self) -> &[Hash256] {
        &self.txids
    }
}

/// Transaction ids whose coins a block needs: every spent output's
/// transaction, and with BIP30 the block's own transactions too.
pub fn ids_to_fetch(block: &Block, enforce_bip30: bool) -> Vec<Hash256> {
    let mut seen = HashSet::new();
    let mut ids = Vec::new();
    for tx in &block.transactions {
        if enforce_bip30 {
            let txid = tx.txid();
            if seen.insert(txid) {
                ids.push(txid);
            }
        }
        if tx.is_coinbase() {
            continue;
        }
        for input in &tx.vin {
            if seen.insert(input.prevout.hash) {
                ids.push(input.prevout.hash);
            }
        }
    }
    ids
}

pub struct BlockValidator<'a> {
    params: &'a ConsensusParams,
    checkpoints: &'a Checkpoints,
    stakes: &'a dyn StakeStore,
    scripts: &'a dyn ScriptVerifier,
    capabilities: Capabilities,
}

struct ScriptCheck {
    tx_index: usize,
    input_index: usize,
    spent: TxOut,
}

impl<'a> BlockValidator<'a> {
    pub fn new(
        params: &'a ConsensusParams,
        checkpoints: &'a Checkpoints,
        stakes: &'a dyn StakeStore,
        scripts: &'a dyn ScriptVerifier,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            params,
            checkpoints,
            stakes,
            scripts,
            capabilities,
        }
    }

    /// Runs the pipeline in order, stopping at the first failure.
    pub fn validate(&self, ctx: &mut ValidationContext<'_>) -> Result<(), ChainStateError> {
        for stage in self.capabilities.pipeline() {
            if ctx.header_only && !stage.is_header_stage() {
                break;
            }
            if let Err(err) = self.run_stage(*stage, ctx) {
                log_trace!(
                    "stage {} failed at height {}: {}",
                    stage.as_str(),
                    ctx.height(),
                    err
                );
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn run_stage(&self, stage: Stage, ctx: &mut ValidationContext<'_>) -> Result<(), ChainStateError> {
        match stage {
            Stage::CheckBlockHeader => self.check_block_header(ctx),
            Stage::ContextualCheckBlockHeader => {
                self.contextual_check_block_header(ctx).map_err(Into::into)
            }
            Stage::ContextualCheckBlock => self.contextual_check_block(ctx).map_err(Into::into),
            Stage::CheckBlock => self.check_block(ctx).map_err(Into::into),
            Stage::CheckAndComputeStake => self.check_and_compute_stake(ctx),
            Stage::ExecuteBlock => self.execute_block(ctx),
            Stage::CheckBlockReward => self.check_block_reward(ctx).map_err(Into::into),
        }
    }

    /// Writes the block's stake record. Called once the block is accepted.
    pub fn commit_stake(&self, ctx: &mut ValidationContext<'_>) -> Result<(), ChainStateError> {
        if !self.capabilities.pos {
            let stake = &mut ctx.stake.block_stake;
            stake.hash_proof = ctx.block_hash;
            stake.set_stake_entropy_bit(stake_entropy_bit(&ctx.block_hash));
        }
        self.stakes.set(&ctx.entry, &ctx.stake.block_stake)?;
        Ok(())
    }

    fn is_proof_of_stake(&self, block: &Block) -> bool {
        self.capabilities.pos && block.is_proof_of_stake()
    }

    fn check_block_header(&self, ctx: &mut ValidationContext<'_>) -> Result<(), ChainStateError> {
        let header = &ctx.block.header;
        let proof_of_stake = self.is_proof_of_stake(ctx.block);
        if proof_of_stake {
            ctx.stake.block_stake.set_proof_of_stake();
        } else if ctx.check_pow {
            validate_pow_header(header, &self.params.pow_limit).map_err(|err| match err {
                PowError::HashAboveTarget => ConsensusError::HighHash,
                PowError::InvalidBits(_) | PowError::Compact(_) => ConsensusError::BadDiffBits,
            })?;
        }

        let expected =
            get_next_target_required(self.stakes, Some(&ctx.prev), self.params, proof_of_stake)?;
        if header.bits != expected {
            log_debug!(
                "unexpected bits at height {}: expected {:#x}, got {:#x}",
                ctx.height(),
                expected,
                header.bits
            );
            return Err(ConsensusError::BadDiffBits.into());
        }
        Ok(())
    }

    fn contextual_check_block_header(&self, ctx: &ValidationContext<'_>) -> Result<(), ConsensusError> {
        let block = ctx.block;
        let header = &block.header;
        let height = ctx.height();
        let time = i64::from(header.time);

        if header.prev_block != ctx.prev.hash {
            return Err(ConsensusError::BadPrevBlock);
        }
        if !self.checkpoints.check_hardened(height, &ctx.block_hash) {
            return Err(ConsensusError::CheckpointViolation);
        }

        if !is_protocol_v3(time, self.params) && header.version > CURRENT_BLOCK_VERSION {
            return Err(ConsensusError::BadVersion);
        }
        if is_protocol_v2(height, self.params) {
            if header.version < CURRENT_BLOCK_VERSION {
                return Err(ConsensusError::BadVersion);
            }
        } else if header.version > MAX_PRE_V2_BLOCK_VERSION {
            return Err(ConsensusError::BadVersion);
        }

        if self.capabilities.pos {
            let proof_of_stake = block.is_proof_of_stake();
            if !proof_of_stake && height > self.params.last_pow_height {
                return Err(ConsensusError::ProofOfWorkTooHigh);
            }
            if let Some(coinbase) = block.transactions.first() {
                if time > future_drift(i64::from(coinbase.time), height, self.params) {
                    return Err(ConsensusError::BlockTimestampTooFar);
                }
            }
            if proof_of_stake {
                let coinstake = &block.transactions[1];
                if !check_coinstake_timestamp(height, header.time, coinstake.time, self.params) {
                    return Err(ConsensusError::StakeTimeViolation);
                }
            }
        }

        if time <= past_time_limit(&ctx.prev, self.params)
            || future_drift(time, height, self.params) < i64::from(ctx.prev.time())
        {
            return Err(ConsensusError::BlockTimestampTooEarly);
        }
        Ok(())
    }

    fn contextual_check_block(&self, ctx: &ValidationContext<'_>) -> Result<(), ConsensusError> {
        let block = ctx.block;
        let height = ctx.height();

        if block
            .transactions
            .iter()
            .any(|tx| !is_final_tx(tx, height, block.header.time))
        {
            return Err(ConsensusError::BadTransactionNonFinal);
        }

        if ctx.flags.enforce_bip34 {
            let expected = push_int(i64::from(height));
            let matches = block
                .transactions
                .first()
                .and_then(|coinbase| coinbase.vin.first())
                .is_some_and(|input| input.script_sig.starts_with(&expected));
            if !matches {
                return Err(ConsensusError::BadCoinbaseHeight);
            }
        }

        check_witness_commitment(block, ctx.flags.segwit)?;

        if self.capabilities.pos {
            check_stake_shape(block, ctx.flags.segwit)?;
            check_block_signature(block, self.params)?;
        }
        Ok(())
    }

    fn check_block(&self, ctx: &ValidationContext<'_>) -> Result<(), ConsensusError> {
        let block = ctx.block;
        let transactions = &block.transactions;
        if transactions.is_empty()
            || block.base_size() > MAX_BLOCK_BASE_SIZE
            || block.weight() > MAX_BLOCK_SERIALIZED_SIZE
        {
            return Err(ConsensusError::BadBlockLength);
        }
        if !transactions[0].is_coinbase() {
            return Err(ConsensusError::BadCoinbaseMissing);
        }
        if transactions.iter().skip(1).any(Transaction::is_coinbase) {
            return Err(ConsensusError::BadMultipleCoinbase);
        }
        for tx in transactions {
            check_transaction(tx)?;
        }

        let (root, mutated) = merkle_root(ctx.txids());
        if mutated {
            return Err(ConsensusError::BadTransactionDuplicate);
        }
        if root != block.header.merkle_root {
            return Err(ConsensusError::BadMerkleRoot);
        }

        if block_sigops(block) > MAX_BLOCK_SIGOPS {
            return Err(ConsensusError::BadBlockSigOps);
        }

        let height = ctx.height();
        if i64::from(block.header.time) > future_drift(ctx.adjusted_time, height, self.params) {
            return Err(ConsensusError::TimeTooNew);
        }
        if transactions.iter().any(|tx| tx.time > block.header.time) {
            return Err(ConsensusError::BlockTimeBeforeTrx);
        }
        Ok(())
    }

    fn check_and_compute_stake(&self, ctx: &mut ValidationContext<'_>) -> Result<(), ChainStateError> {
        let block = ctx.block;
        let height = ctx.height();
        let prev_stake = self
            .stakes
            .get(&ctx.prev.hash)?
            .ok_or(ConsensusError::PrevStakeNull)?;
        let last_checkpoint = self.checkpoints.last_checkpoint_height();

        let kernel = if block.is_proof_of_stake() {
            let coinstake = &block.transactions[1];
            if height > last_checkpoint {
                check_proof_of_stake(
                    &mut ctx.stake,
                    self.params,
                    &ctx.prev,
                    &prev_stake,
                    coinstake,
                    block.header.bits,
                    &ctx.coins,
                    self.scripts,
                )?;
            }
            let proof = ctx.stake.hash_proof_of_stake;
            let stake = &mut ctx.stake.block_stake;
            stake.set_proof_of_stake();
            stake.hash_proof = proof;
            stake.prevout_stake = coinstake.vin[0].prevout;
            stake.stake_time = coinstake.time;
            coinstake.vin[0].prevout.hash
        } else {
            ctx.stake.block_stake.hash_proof = ctx.block_hash;
            ctx.block_hash
        };
        ctx.stake
            .block_stake
            .set_stake_entropy_bit(stake_entropy_bit(&ctx.block_hash));

        if height > last_checkpoint {
            let (modifier, generated) =
                compute_next_stake_modifier(self.stakes, self.params, Some(&ctx.prev))?;
            let stake = &mut ctx.stake.block_stake;
            stake.set_stake_modifier(modifier, generated);
            stake.stake_modifier_v2 =
                compute_stake_modifier_v2(Some(&ctx.prev), &prev_stake.stake_modifier_v2, &kernel);
            log_trace!(
                "height {} modifier {:#018x} generated {}",
                height,
                modifier,
                generated
            );
        } else if let Some(checkpoint) = self.checkpoints.get_checkpoint(height) {
            ctx.stake.block_stake.stake_modifier_v2 = checkpoint.stake_modifier_v2;
        }
        Ok(())
    }

    fn execute_block(&self, ctx: &mut ValidationContext<'_>) -> Result<(), ChainStateError> {
        let block = ctx.block;
        let height = ctx.height();
        let maturity = self.params.coinbase_maturity;
        let mut fees: Amount = 0;
        let mut checks = Vec::new();

        for (tx_index, tx) in block.transactions.iter().enumerate() {
            let txid = ctx.txids[tx_index];
            if ctx.flags.enforce_bip30 && ctx.coins.get(&txid).is_some() {
                return Err(ConsensusError::BadTransactionBip30.into());
            }

            if !tx.is_coinbase() {
                if !ctx.coins.have_inputs(tx) {
                    return Err(ConsensusError::BadTransactionMissingInput.into());
                }
                let mut value_in: Amount = 0;
                for (input_index, input) in tx.vin.iter().enumerate() {
                    let coins = ctx
                        .coins
                        .get(&input.prevout.hash)
                        .ok_or(ConsensusError::BadTransactionMissingInput)?;
                    if (coins.is_coinbase || coins.is_coinstake) && height - coins.height < maturity {
                        return Err(if coins.is_coinstake {
                            ConsensusError::BadTransactionPrematureCoinstakeSpending
                        } else {
                            ConsensusError::BadTransactionPrematureCoinbaseSpending
                        }
                        .into());
                    }
                    if tx.time < coins.time {
                        return Err(ConsensusError::BadTransactionEarlyTimestamp.into());
                    }
                    let spent = coins
                        .output(input.prevout.index)
                        .ok_or(ConsensusError::BadTransactionMissingInput)?;
                    value_in = value_in
                        .checked_add(spent.value)
                        .filter(|total| money_range(spent.value) && money_range(*total))
                        .ok_or(ConsensusError::BadTransactionInputValueOutOfRange)?;
                    checks.push(ScriptCheck {
                        tx_index,
                        input_index,
                        spent: spent.clone(),
                    });
                }

                let value_out = tx
                    .total_out()
                    .ok_or(ConsensusError::BadTransactionTooLargeTotalOutput)?;
                if tx.is_coinstake() {
                    ctx.stake.total_coinstake_value_in = value_in;
                } else {
                    if value_in < value_out {
                        return Err(ConsensusError::BadTransactionInBelowOut.into());
                    }
                    let fee = value_in - value_out;
                    if fee < 0 {
                        return Err(ConsensusError::BadTransactionNegativeFee.into());
                    }
                    fees = fees
                        .checked_add(fee)
                        .filter(|total| money_range(*total))
                        .ok_or(ConsensusError::BadTransactionFeeOutOfRange)?;
                }
            }

            ctx.coins.update(tx, txid, height)?;
        }
        ctx.fees = fees;

        let flags = ctx.flags.script_flags;
        let scripts = self.scripts;
        let result = checks.par_iter().try_for_each(|check| {
            let tx = &block.transactions[check.tx_index];
            if scripts.verify_input(tx, check.input_index, &check.spent, flags) {
                Ok(())
            } else {
                Err(check)
            }
        });
        if let Err(check) = result {
            log_warn!(
                "script validation failed for tx {} input {}",
                hash256_to_hex(&ctx.txids[check.tx_index]),
                check.input_index
            );
            return Err(ConsensusError::BadTransactionScriptError.into());
        }
        Ok(())
    }

    fn check_block_reward(&self, ctx: &ValidationContext<'_>) -> Result<(), ConsensusError> {
        let block = ctx.block;
        let height = ctx.height();
        if self.is_proof_of_stake(block) {
            let value_out = block.transactions[1]
                .total_out()
                .ok_or(ConsensusError::BadCoinstakeAmount)?;
            let minted = value_out - ctx.stake.total_coinstake_value_in;
            let allowed = ctx.fees + proof_of_stake_reward(height, self.params);
            if minted > allowed {
                log_debug!(
                    "coinstake at height {} mints {} above allowance {}",
                    height,
                    minted,
                    allowed
                );
                return Err(ConsensusError::BadCoinstakeAmount);
            }
        } else {
            let value_out = block.transactions[0]
                .total_out()
                .ok_or(ConsensusError::BadCoinbaseAmount)?;
            let allowed = ctx.fees + proof_of_work_reward(height, self.params);
            if value_out > allowed {
                log_debug!(
                    "coinbase at height {} pays {} above allowance {}",
                    height,
                    value_out,
                    allowed
                );
                return Err(ConsensusError::BadCoinbaseAmount);
            }
        }
        Ok(())
    }
}

/// Context-free transaction checks.
pub fn check_transaction(tx: &Transaction) -> Result<(), ConsensusError> {
    if tx.vin.is_empty() {
        return Err(ConsensusError::BadTransactionNoInput);
    }
    if tx.vout.is_empty() {
        return Err(ConsensusError::BadTransactionNoOutput);
    }
    if tx.base_size() > MAX_TX_SIZE {
        return Err(ConsensusError::BadTransactionOversize);
    }

    let coinbase = tx.is_coinbase();
    let coinstake = tx.is_coinstake();
    let mut value_out: Amount = 0;
    for output in &tx.vout {
        if output.is_empty() && !coinbase && !coinstake {
            return Err(ConsensusError::BadTransactionEmptyOutput);
        }
        if output.value < 0 {
            return Err(ConsensusError::BadTransactionNegativeOutput);
        }
        if output.value > MAX_MONEY {
            return Err(ConsensusError::BadTransactionTooLargeOutput);
        }
        value_out += output.value;
        if !money_range(value_out) {
            return Err(ConsensusError::BadTransactionTooLargeTotalOutput);
        }
    }

    let mut seen_inputs = BTreeSet::new();
    for input in &tx.vin {
        if !seen_inputs.insert(input.prevout) {
            return Err(ConsensusError::BadTransactionDuplicateInputs);
        }
    }

    if coinbase {
        let script_len = tx.vin[0].script_sig.len();
        if !(MIN_COINBASE_SCRIPT_LEN..=MAX_COINBASE_SCRIPT_LEN).contains(&script_len) {
            return Err(ConsensusError::BadCoinbaseSize);
        }
    } else if tx.vin.iter().any(|input| input.prevout.is_null()) {
        return Err(ConsensusError::BadTransactionNullPrevout);
    }
    Ok(())
}

/// A stake block's coinbase carries no value: one empty output, followed by a
/// zero-value witness commitment once segwit is active. Only the second
/// transaction may stake.
fn check_stake_shape(block: &Block, segwit: bool) -> Result<(), ConsensusError> {
    let Some(coinbase) = block.transactions.first() else {
        return Ok(());
    };
    if block.is_proof_of_stake() {
        let mut outputs = coinbase.vout.iter();
        let first_empty = outputs.next().is_some_and(TxOut::is_empty);
        let rest_commit = outputs.all(|out| {
            segwit
                && out.value == 0
                && witness_commitment(&out.script_pubkey, &WITNESS_COMMITMENT_HEADER).is_some()
        });
        if !first_empty || !rest_commit || coinbase.vout.len() > 2 {
            return Err(ConsensusError::BadStakeBlock);
        }
    }
    if block
        .transactions
        .iter()
        .skip(2)
        .any(Transaction::is_coinstake)
    {
        return Err(ConsensusError::BadMultipleCoinstake);
    }
    Ok(())
}

fn check_witness_commitment(block: &Block, segwit: bool) -> Result<(), ConsensusError> {
    let Some(coinbase) = block.transactions.first() else {
        return Ok(());
    };
    let commitment = if segwit {
        coinbase
            .vout
            .iter()
            .rev()
            .find_map(|out| witness_commitment(&out.script_pubkey, &WITNESS_COMMITMENT_HEADER))
    } else {
        None
    };

    let Some(commitment) = commitment else {
        if block.transactions.iter().any(Transaction::has_witness) {
            return Err(ConsensusError::UnexpectedWitness);
        }
        return Ok(());
    };

    let nonce = match coinbase.vin.first().map(|input| input.witness.as_slice()) {
        Some([nonce]) if nonce.len() == 32 => nonce,
        _ => return Err(ConsensusError::BadWitnessNonceSize),
    };
    let wtxids: Vec<Hash256> = block.transactions.iter().map(Transaction::wtxid).collect();
    let (witness_root, _) = merkle_root(&wtxids);
    let mut material = [0u8; 64];
    material[..32].copy_from_slice(&witness_root);
    material[32..].copy_from_slice(nonce);
    if sha256d(&material) != commitment {
        return Err(ConsensusError::BadWitnessMerkleMatch);
    }
    Ok(())
}

/// Merkle root of `hashes` and whether the tree was mutated by a duplicated
/// trailing pair.
pub fn merkle_root(hashes: &[Hash256]) -> (Hash256, bool) {
    if hashes.is_empty() {
        return ([0u8; 32], false);
    }
    let mut layer = hashes.to_vec();
    let mut mutated = false;
    while layer.len() > 1 {
        let size = layer.len();
        let mut next = Vec::with_capacity(size.div_ceil(2));
        let mut i = 0usize;
        while i < size {
            let i2 = if i + 1 < size { i + 1 } else { i };
            if i2 == i + 1 && i2 + 1 == size && layer[i] == layer[i2] {
                mutated = true;
            }
            let mut data = [0u8; 64];
            data[..32].copy_from_slice(&layer[i]);
            data[32..].copy_from_slice(&layer[i2]);
            next.push(sha256d(&data));
            i += 2;
        }
        layer = next;
    }
    (layer[0], mutated)
}

fn is_final_tx(tx: &Transaction, height: i32, block_time: u32) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let limit = if tx.lock_time < LOCKTIME_THRESHOLD {
        i64::from(height)
    } else {
        i64::from(block_time)
    };
    if i64::from(tx.lock_time) < limit {
        return true;
    }
    tx.vin.iter().all(|input| input.sequence == u32::MAX)
}

fn block_sigops(block: &Block) -> u32 {
    block
        .transactions
        .iter()
        .map(|tx| {
            let input_ops: u32 = tx
                .vin
                .iter()
                .map(|input| legacy_sigops(&input.script_sig))
                .sum();
            let output_ops: u32 = tx
                .vout
                .iter()
                .map(|output| legacy_sigops(&output.script_pubkey))
                .sum();
            input_ops + output_ops
        })
        .sum()
}
