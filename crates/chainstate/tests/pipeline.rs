mod common;

use std::sync::Arc;

use common::*;
use stakd_chainstate::{BlockValidator, Capabilities, ChainStateError, ValidationContext};
use stakd_consensus::money::COIN;
use stakd_consensus::{CheckpointInfo, Checkpoints, ConsensusError, Network};
use stakd_pos::stake::{BlockStake, MemoryStakeStore};
use stakd_pos::StakeStore;
use stakd_pow::difficulty::block_proof;
use stakd_pow::validation::check_proof_of_work;
use stakd_primitives::block::Block;
use stakd_primitives::chain::ChainEntry;
use stakd_primitives::outpoint::OutPoint;
use stakd_primitives::transaction::TxOut;

const NOW: i64 = 1_700_000_000;

struct Fixture {
    genesis: Arc<ChainEntry>,
    stakes: MemoryStakeStore,
}

impl Fixture {
    fn new() -> Self {
        let genesis = ChainEntry::genesis(genesis_header(), block_proof(BITS));
        let stakes = MemoryStakeStore::new();
        stakes.insert(genesis.hash, BlockStake::genesis());
        Self { genesis, stakes }
    }

    /// Same chain, but the genesis stake record was never written.
    fn without_genesis_stake() -> Self {
        let genesis = ChainEntry::genesis(genesis_header(), block_proof(BITS));
        Self {
            genesis,
            stakes: MemoryStakeStore::new(),
        }
    }

    fn validate<'b>(
        &self,
        block: &'b Block,
        checkpoints: &Checkpoints,
        header_only: bool,
    ) -> Result<ValidationContext<'b>, ChainStateError> {
        let params = regtest();
        let mut ctx = ValidationContext::new(block, Arc::clone(&self.genesis), &params, NOW);
        ctx.header_only = header_only;
        let validator = BlockValidator::new(
            &params,
            checkpoints,
            &self.stakes,
            &AcceptAll,
            Capabilities::POS,
        );
        validator.validate(&mut ctx)?;
        Ok(ctx)
    }
}

fn rule(result: Result<ValidationContext<'_>, ChainStateError>) -> Option<ConsensusError> {
    result.err().and_then(|err| err.consensus())
}

#[test]
fn unlisted_heights_pass_any_hash() {
    let checkpoints = Checkpoints::from_entries([(
        5,
        CheckpointInfo {
            hash: [5u8; 32],
            stake_modifier_v2: [0u8; 32],
        },
    )]);
    for height in 0..64 {
        if height == 5 {
            continue;
        }
        assert!(checkpoints.check_hardened(height, &[height as u8; 32]));
    }
    assert!(checkpoints.check_hardened(5, &[5u8; 32]));
    assert!(!checkpoints.check_hardened(5, &[6u8; 32]));
    assert!(Checkpoints::new(Network::Regtest, true).is_empty());
}

#[test]
fn checkpoint_pins_hash_and_modifier() {
    let fixture = Fixture::new();
    let params = regtest();
    let block = pow_block(&fixture.genesis.hash, 1, 0x01, COIN, vec![0x51], &params);

    let wrong = Checkpoints::from_entries([(
        1,
        CheckpointInfo {
            hash: [9u8; 32],
            stake_modifier_v2: [3u8; 32],
        },
    )]);
    assert_eq!(
        rule(fixture.validate(&block, &wrong, false)),
        Some(ConsensusError::CheckpointViolation)
    );

    let pinned = Checkpoints::from_entries([(
        1,
        CheckpointInfo {
            hash: block.hash(),
            stake_modifier_v2: [3u8; 32],
        },
    )]);
    let ctx = fixture.validate(&block, &pinned, false).expect("pinned block");
    assert_eq!(ctx.stake.block_stake.stake_modifier_v2, [3u8; 32]);
    assert!(fixture.stakes.get(&block.hash()).expect("read").is_none());
}

#[test]
fn header_rules() {
    let fixture = Fixture::new();
    let params = regtest();
    let none = Checkpoints::default();

    let mut wrong_bits = pow_block(&fixture.genesis.hash, 1, 0x02, COIN, vec![0x51], &params);
    wrong_bits.header.bits = 0x207f_fffe;
    let wrong_bits = seal_pow(wrong_bits, &params);
    assert_eq!(
        rule(fixture.validate(&wrong_bits, &none, false)),
        Some(ConsensusError::BadDiffBits)
    );

    let orphan = pow_block(&[1u8; 32], 1, 0x03, COIN, vec![0x51], &params);
    assert_eq!(
        rule(fixture.validate(&orphan, &none, false)),
        Some(ConsensusError::BadPrevBlock)
    );

    let mut stale = pow_block(&fixture.genesis.hash, 1, 0x04, COIN, vec![0x51], &params);
    stale.header.time = fixture.genesis.time() - 100;
    stale.transactions[0].time = stale.header.time;
    let stale = seal_pow(stale, &params);
    assert_eq!(
        rule(fixture.validate(&stale, &none, false)),
        Some(ConsensusError::BlockTimestampTooEarly)
    );

    let mut old_version = pow_block(&fixture.genesis.hash, 1, 0x05, COIN, vec![0x51], &params);
    old_version.header.version = 6;
    let old_version = seal_pow(old_version, &params);
    assert_eq!(
        rule(fixture.validate(&old_version, &none, false)),
        Some(ConsensusError::BadVersion)
    );
}

#[test]
fn header_only_skips_body_stages() {
    let fixture = Fixture::new();
    let params = regtest();
    let none = Checkpoints::default();
    let greedy = pow_block(&fixture.genesis.hash, 1, 0x06, 50 * COIN, vec![0x51], &params);

    assert!(fixture.validate(&greedy, &none, true).is_ok());
    assert_eq!(
        rule(fixture.validate(&greedy, &none, false)),
        Some(ConsensusError::BadCoinbaseAmount)
    );
}

#[test]
fn block_structure_rules() {
    let fixture = Fixture::new();
    let params = regtest();
    let none = Checkpoints::default();

    let mut bad_root = pow_block(&fixture.genesis.hash, 1, 0x07, COIN, vec![0x51], &params);
    bad_root.header.merkle_root = [0u8; 32];
    while check_proof_of_work(
        &bad_root.header.hash(),
        bad_root.header.bits,
        &params.pow_limit,
    )
    .is_err()
    {
        bad_root.header.nonce += 1;
    }
    assert_eq!(
        rule(fixture.validate(&bad_root, &none, false)),
        Some(ConsensusError::BadMerkleRoot)
    );

    let mut no_height = pow_block(&fixture.genesis.hash, 1, 0x08, COIN, vec![0x51], &params);
    no_height.transactions[0].vin[0].script_sig = vec![0x01, 0x01, 0x08];
    let no_height = seal_pow(no_height, &params);
    assert_eq!(
        rule(fixture.validate(&no_height, &none, false)),
        Some(ConsensusError::BadCoinbaseHeight)
    );

    let mut late_tx = pow_block(&fixture.genesis.hash, 1, 0x09, COIN, vec![0x51], &params);
    late_tx.transactions[0].time = late_tx.header.time + 1;
    let late_tx = seal_pow(late_tx, &params);
    assert_eq!(
        rule(fixture.validate(&late_tx, &none, false)),
        Some(ConsensusError::BlockTimeBeforeTrx)
    );

    let mut two_coinbases = pow_block(&fixture.genesis.hash, 1, 0x0a, COIN, vec![0x51], &params);
    let time = two_coinbases.header.time;
    two_coinbases
        .transactions
        .push(coinbase(1, time, 0x0c, vec![TxOut::new(COIN, vec![0x51])]));
    let two_coinbases = seal_pow(two_coinbases, &params);
    assert_eq!(
        rule(fixture.validate(&two_coinbases, &none, false)),
        Some(ConsensusError::BadMultipleCoinbase)
    );
}

#[test]
fn basic_capabilities_skip_stake_rules() {
    let fixture = Fixture::new();
    let params = regtest();
    let none = Checkpoints::default();
    let block = pow_block(&fixture.genesis.hash, 1, 0x0b, COIN, vec![0x51], &params);

    let mut ctx = ValidationContext::new(&block, Arc::clone(&fixture.genesis), &params, NOW);
    let validator = BlockValidator::new(
        &params,
        &none,
        &fixture.stakes,
        &AcceptAll,
        Capabilities::BASIC,
    );
    validator.validate(&mut ctx).expect("basic pipeline");
    validator.commit_stake(&mut ctx).expect("commit");

    let record = fixture
        .stakes
        .get(&block.hash())
        .expect("read")
        .expect("record");
    assert_eq!(record.hash_proof, block.hash());
    assert!(!record.is_proof_of_stake());
}

#[test]
fn stake_block_needs_the_parent_stake_record() {
    let fixture = Fixture::without_genesis_stake();
    let none = Checkpoints::default();
    let staker = Staker::new(0x44);
    let stake = OutPoint::new([7u8; 32], 0);
    let block = staker.stake_block(&fixture.genesis.hash, 1, stake, 2 * COIN);
    assert!(block.is_proof_of_stake());

    assert_eq!(
        rule(fixture.validate(&block, &none, false)),
        Some(ConsensusError::PrevStakeNull)
    );
    assert!(fixture.stakes.get(&block.hash()).expect("read").is_none());
}
