#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use stakd_chainstate::validation::merkle_root;
use stakd_chainstate::{
    BlockSource, CachedCoinView, CancelToken, ConsensusLoop, ConsensusLoopConfig, HeaderChain,
    Pulled, StoreCoinView, StoreStakeChain, NODE_WITNESS,
};
use stakd_consensus::constants::{CURRENT_BLOCK_VERSION, WITNESS_COMMITMENT_HEADER};
use stakd_consensus::money::{Amount, COIN};
use stakd_consensus::{consensus_params, Checkpoints, ConsensusParams, Hash256, Network};
use stakd_pos::ScriptVerifier;
use stakd_pow::validation::check_proof_of_work;
use stakd_primitives::block::{Block, BlockHeader};
use stakd_primitives::chain::ChainEntry;
use stakd_primitives::hash::sha256d;
use stakd_primitives::outpoint::OutPoint;
use stakd_primitives::script::{p2pk_script, push_int, OP_RETURN};
use stakd_primitives::transaction::{Transaction, TxIn, TxOut};
use stakd_storage::memory::MemoryStore;

/// Divisible by 16 so every `START_TIME + 64 * n` sits on the stake grid.
pub const START_TIME: u32 = 1_600_000_000;
pub const BITS: u32 = 0x207f_ffff;
pub const SPACING: u32 = 64;

pub struct AcceptAll;

impl ScriptVerifier for AcceptAll {
    fn verify_input(&self, _tx: &Transaction, _input_index: usize, _spent: &TxOut, _flags: u32) -> bool {
        true
    }
}

pub fn regtest() -> ConsensusParams {
    consensus_params(Network::Regtest)
}

pub fn genesis_header() -> BlockHeader {
    BlockHeader {
        version: 1,
        time: START_TIME,
        bits: BITS,
        ..BlockHeader::default()
    }
}

pub fn block_time(height: i32) -> u32 {
    START_TIME + SPACING * height as u32
}

pub fn coinbase(height: i32, time: u32, tag: u8, vout: Vec<TxOut>) -> Transaction {
    let mut script_sig = push_int(i64::from(height));
    script_sig.extend_from_slice(&[0x01, tag]);
    Transaction {
        version: 1,
        time,
        vin: vec![TxIn::new(OutPoint::null(), script_sig)],
        vout,
        lock_time: 0,
    }
}

pub fn header(prev: &Hash256, time: u32) -> BlockHeader {
    BlockHeader {
        version: CURRENT_BLOCK_VERSION,
        prev_block: *prev,
        time,
        bits: BITS,
        ..BlockHeader::default()
    }
}

/// Sets the merkle root and grinds the nonce until the header meets `BITS`.
pub fn seal_pow(mut block: Block, params: &ConsensusParams) -> Block {
    block.header.merkle_root = merkle_root(&block.txids()).0;
    while check_proof_of_work(&block.header.hash(), block.header.bits, &params.pow_limit).is_err() {
        block.header.nonce += 1;
    }
    block
}

/// Proof-of-work block at `height` whose coinbase pays `value` to `script`.
pub fn pow_block(
    prev: &Hash256,
    height: i32,
    tag: u8,
    value: Amount,
    script: Vec<u8>,
    params: &ConsensusParams,
) -> Block {
    let time = block_time(height);
    let block = Block {
        header: header(prev, time),
        transactions: vec![coinbase(height, time, tag, vec![TxOut::new(value, script)])],
        signature: Vec::new(),
    };
    seal_pow(block, params)
}

/// Proof-of-work block carrying `extra` after a coinbase worth `value`.
pub fn pow_block_with(
    prev: &Hash256,
    height: i32,
    value: Amount,
    extra: Vec<Transaction>,
    params: &ConsensusParams,
) -> Block {
    let time = block_time(height);
    let mut transactions = vec![coinbase(height, time, 0x0e, vec![TxOut::new(value, vec![0x51])])];
    transactions.extend(extra);
    let block = Block {
        header: header(prev, time),
        transactions,
        signature: Vec::new(),
    };
    seal_pow(block, params)
}

/// Spends `prevout` into a single output worth `value`.
pub fn spend(prevout: OutPoint, value: Amount, time: u32) -> Transaction {
    Transaction {
        version: 1,
        time,
        vin: vec![TxIn::new(prevout, Vec::new())],
        vout: vec![TxOut::new(value, vec![0x51])],
        lock_time: 0,
    }
}

/// `count` proof-of-work blocks on top of `prev` at heights `first..`.
pub fn pow_chain(
    prev: &Hash256,
    first: i32,
    count: i32,
    tag: u8,
    params: &ConsensusParams,
) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut prev = *prev;
    for height in first..first + count {
        let block = pow_block(&prev, height, tag, COIN, vec![0x51], params);
        prev = block.hash();
        blocks.push(block);
    }
    blocks
}

pub struct Staker {
    pub secret: SecretKey,
    pub pubkey: PublicKey,
}

impl Staker {
    pub fn new(seed: u8) -> Self {
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[seed; 32]).expect("secret key");
        let pubkey = PublicKey::from_secret_key(&secp, &secret);
        Self { secret, pubkey }
    }

    pub fn script(&self) -> Vec<u8> {
        p2pk_script(&self.pubkey.serialize())
    }

    /// Signed proof-of-stake block at `height` spending `stake` into one
    /// output worth `value_out`.
    pub fn stake_block(
        &self,
        prev: &Hash256,
        height: i32,
        stake: OutPoint,
        value_out: Amount,
    ) -> Block {
        let time = block_time(height);
        let coinstake = Transaction {
            version: 1,
            time,
            vin: vec![TxIn::new(stake, Vec::new())],
            vout: vec![TxOut::empty(), TxOut::new(value_out, self.script())],
            lock_time: 0,
        };
        let mut block = Block {
            header: header(prev, time),
            transactions: vec![coinbase(height, time, 0x5a, vec![TxOut::empty()]), coinstake],
            signature: Vec::new(),
        };
        block.header.merkle_root = merkle_root(&block.txids()).0;
        self.sign(&mut block);
        block
    }

    pub fn sign(&self, block: &mut Block) {
        let secp = Secp256k1::new();
        let msg = Message::from_digest_slice(&block.hash()).expect("digest");
        block.signature = secp
            .sign_ecdsa(&msg, &self.secret)
            .serialize_der()
            .to_vec();
    }
}

/// Appends a coinbase output committing to the block's witness tree under
/// `nonce`. The coinbase witness itself is left to the caller.
pub fn commit_witness(block: &mut Block, nonce: [u8; 32]) {
    commit_witness_worth(block, nonce, 0);
}

pub fn commit_witness_worth(block: &mut Block, nonce: [u8; 32], value: Amount) {
    let wtxids: Vec<Hash256> = block.transactions.iter().map(Transaction::wtxid).collect();
    let (witness_root, _) = merkle_root(&wtxids);
    let mut material = [0u8; 64];
    material[..32].copy_from_slice(&witness_root);
    material[32..].copy_from_slice(&nonce);
    let mut script = vec![OP_RETURN, 0x24];
    script.extend_from_slice(&WITNESS_COMMITMENT_HEADER);
    script.extend_from_slice(&sha256d(&material));
    block.transactions[0].vout.push(TxOut::new(value, script));
}

pub enum Feed {
    Block(Arc<Block>),
    Reorg,
}

/// Source replaying a scripted queue. An empty queue reads as cancellation.
#[derive(Default)]
pub struct QueueSource {
    pub queue: VecDeque<Feed>,
    pub locations: Vec<Hash256>,
    pub options: u32,
    /// Offered again once witness data is requested.
    pub witness_retry: Option<Arc<Block>>,
}

impl QueueSource {
    pub fn push(&mut self, block: Block) {
        self.queue.push_back(Feed::Block(Arc::new(block)));
    }

    pub fn push_all(&mut self, blocks: &[Block]) {
        for block in blocks {
            self.push(block.clone());
        }
    }
}

impl BlockSource for QueueSource {
    fn next_block(&mut self, cancel: &CancelToken) -> Pulled {
        if cancel.is_cancelled() {
            return Pulled::Cancelled;
        }
        match self.queue.pop_front() {
            Some(Feed::Block(block)) => Pulled::Block(block),
            Some(Feed::Reorg) => Pulled::Reorg,
            None => Pulled::Cancelled,
        }
    }

    fn set_location(&mut self, entry: &Arc<ChainEntry>) {
        self.locations.push(entry.hash);
    }

    fn try_get_lookahead(&self, offset: usize) -> Option<Arc<Block>> {
        match self.queue.get(offset.checked_sub(1)?)? {
            Feed::Block(block) => Some(Arc::clone(block)),
            Feed::Reorg => None,
        }
    }

    fn request_options(&mut self, services: u32) {
        self.options |= services;
        if services & NODE_WITNESS != 0 {
            if let Some(block) = self.witness_retry.take() {
                self.queue.push_front(Feed::Block(block));
            }
        }
    }
}

pub type MemoryCoins = CachedCoinView<StoreCoinView<Arc<MemoryStore>>>;

pub struct Harness {
    pub params: ConsensusParams,
    pub store: Arc<MemoryStore>,
    pub headers: Arc<RwLock<HeaderChain>>,
    pub coins: Arc<MemoryCoins>,
    pub genesis: Hash256,
}

impl Harness {
    pub fn new() -> Self {
        let params = regtest();
        let genesis = genesis_header();
        let genesis_hash = genesis.hash();
        let store = Arc::new(MemoryStore::new());
        let coins = CachedCoinView::new(
            StoreCoinView::open(Arc::clone(&store), genesis_hash).expect("coin view"),
        );
        Self {
            params,
            store,
            headers: Arc::new(RwLock::new(HeaderChain::new(genesis))),
            coins: Arc::new(coins),
            genesis: genesis_hash,
        }
    }

    pub fn consensus_loop(
        &self,
        config: ConsensusLoopConfig,
        source: QueueSource,
    ) -> ConsensusLoop<MemoryCoins, QueueSource> {
        let mut consensus = ConsensusLoop::new(
            self.params.clone(),
            Checkpoints::new(Network::Regtest, true),
            config,
            Arc::clone(&self.headers),
            Arc::clone(&self.coins),
            Arc::new(StoreStakeChain::new(Arc::clone(&self.store), self.genesis)),
            Arc::new(AcceptAll),
            source,
        )
        .expect("consensus loop");
        consensus.start().expect("start");
        consensus
    }

    pub fn add_headers(&self, blocks: &[Block]) {
        let mut headers = self.headers.write().expect("headers");
        for block in blocks {
            headers.add_header(block.header.clone()).expect("header");
        }
    }
}
