mod common;

use std::collections::HashMap;

use common::TestChain;
use stakd_consensus::money::COIN;
use stakd_consensus::{consensus_params, ConsensusError, ConsensusParams, Hash256, Network};
use stakd_pos::stake::StakeStore;
use stakd_pos::{
    check_proof_of_stake, CoinLookup, ScriptVerifier, StakeContext, StakeError,
};
use stakd_primitives::coins::UnspentOutputs;
use stakd_primitives::outpoint::OutPoint;
use stakd_primitives::transaction::{Transaction, TxIn, TxOut};

const START: u32 = 1_600_000_000;
const STAKED_TXID: Hash256 = [0x42; 32];

struct Coins(HashMap<Hash256, UnspentOutputs>);

impl CoinLookup for Coins {
    fn unspent_outputs(&self, txid: &Hash256) -> Option<&UnspentOutputs> {
        self.0.get(txid)
    }
}

struct Scripts(bool);

impl ScriptVerifier for Scripts {
    fn verify_input(&self, _: &Transaction, _: usize, _: &TxOut, _: u32) -> bool {
        self.0
    }
}

fn coins_at(height: i32, time: u32, value: i64) -> Coins {
    let mut map = HashMap::new();
    map.insert(
        STAKED_TXID,
        UnspentOutputs {
            txid: STAKED_TXID,
            height,
            time,
            is_coinbase: false,
            is_coinstake: false,
            outputs: vec![Some(TxOut::new(value, vec![0x51]))],
        },
    );
    Coins(map)
}

fn coinstake(time: u32) -> Transaction {
    Transaction {
        version: 1,
        time,
        vin: vec![TxIn::new(OutPoint::new(STAKED_TXID, 0), Vec::new())],
        vout: vec![TxOut::empty(), TxOut::new(10 * COIN, vec![0x51])],
        lock_time: 0,
    }
}

fn long_chain(blocks: u32) -> TestChain {
    let mut chain = TestChain::new(START, 0x207fffff);
    for i in 1..=blocks {
        chain.push(START + i * 64, 0x207fffff, false);
    }
    chain
}

fn run(
    chain: &TestChain,
    params: &ConsensusParams,
    tx: &Transaction,
    coins: &Coins,
    scripts_ok: bool,
) -> (Result<(), StakeError>, StakeContext) {
    let mut context = StakeContext::default();
    let prev = chain.tip();
    let prev_stake = chain.store.require(&prev.hash).expect("prev stake");
    let result = check_proof_of_stake(
        &mut context,
        params,
        prev,
        &prev_stake,
        tx,
        0x207fffff,
        coins,
        &Scripts(scripts_ok),
    );
    (result, context)
}

fn consensus_code(result: Result<(), StakeError>) -> Option<ConsensusError> {
    result.err().and_then(|err| err.consensus())
}

#[test]
fn rich_mature_stake_is_accepted_and_recorded() {
    let chain = long_chain(20);
    let params = consensus_params(Network::Regtest);
    let tx = coinstake(START + 21 * 64);
    let (result, context) = run(&chain, &params, &tx, &coins_at(2, START + 128, i64::MAX), true);
    result.expect("kernel meets weighted target");
    assert_ne!(context.hash_proof_of_stake, [0u8; 32]);
    assert!(!context.target_proof_of_stake.is_zero());
}

#[test]
fn coinbase_is_not_a_coinstake() {
    let chain = long_chain(20);
    let params = consensus_params(Network::Regtest);
    let mut tx = coinstake(START + 21 * 64);
    tx.vout.remove(0);
    let (result, _) = run(&chain, &params, &tx, &coins_at(2, START, COIN), true);
    assert_eq!(consensus_code(result), Some(ConsensusError::NonCoinstake));
}

#[test]
fn unknown_kernel_input_fails_read() {
    let chain = long_chain(20);
    let params = consensus_params(Network::Regtest);
    let tx = coinstake(START + 21 * 64);
    let (result, _) = run(&chain, &params, &tx, &Coins(HashMap::new()), true);
    assert_eq!(consensus_code(result), Some(ConsensusError::ReadTxPrevFailed));
}

#[test]
fn failed_kernel_script_is_rejected() {
    let chain = long_chain(20);
    let params = consensus_params(Network::Regtest);
    let tx = coinstake(START + 21 * 64);
    let (result, _) = run(&chain, &params, &tx, &coins_at(2, START, i64::MAX), false);
    assert_eq!(
        consensus_code(result),
        Some(ConsensusError::CoinstakeVerifySignatureFailed)
    );
}

#[test]
fn shallow_stake_violates_depth_under_v3() {
    let chain = long_chain(20);
    let params = consensus_params(Network::Regtest);
    let tx = coinstake(START + 21 * 64);
    // Depth 20 - 12 = 8 is below the nine confirmations required.
    let (result, _) = run(&chain, &params, &tx, &coins_at(12, START, i64::MAX), true);
    assert_eq!(consensus_code(result), Some(ConsensusError::InvalidStakeDepth));

    let (result, _) = run(&chain, &params, &tx, &coins_at(11, START, i64::MAX), true);
    assert!(result.is_ok());
}

#[test]
fn young_stake_violates_min_age_before_v3() {
    let chain = long_chain(20);
    let mut params = consensus_params(Network::Regtest);
    params.protocol_v3_time = u32::MAX;
    // Staked output sits in block 20, whose time is only 30 seconds before the coinstake.
    let tx = coinstake(START + 20 * 64 + 30);
    let (result, _) = run(&chain, &params, &tx, &coins_at(20, START, i64::MAX), true);
    assert_eq!(consensus_code(result), Some(ConsensusError::MinAgeViolation));
}

#[test]
fn stake_time_must_not_precede_staked_output() {
    let chain = long_chain(20);
    let params = consensus_params(Network::Regtest);
    let tx = coinstake(START + 21 * 64);
    let (result, context) =
        run(&chain, &params, &tx, &coins_at(2, START + 21 * 64 + 1, i64::MAX), true);
    assert_eq!(consensus_code(result), Some(ConsensusError::StakeTimeViolation));
    assert_eq!(context.hash_proof_of_stake, [0u8; 32]);
}
