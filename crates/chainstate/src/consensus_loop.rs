//! The consensus loop: pulls blocks from a source, validates them one at a
//! time against the current tip and commits the survivors.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::thread::{self, JoinHandle};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use stakd_consensus::params::hash256_to_hex;
use stakd_consensus::{Checkpoints, ConsensusError, ConsensusParams, DeploymentFlags, Hash256};
use stakd_log::{log_debug, log_error, log_info, log_trace, log_warn};
use stakd_pos::{ScriptVerifier, StakeStore};
use stakd_primitives::block::Block;
use stakd_primitives::chain::ChainEntry;
use stakd_primitives::coins::UnspentOutputs;

use crate::chain::HeaderChain;
use crate::coinview::{CoinView, FetchedCoins};
use crate::error::ChainStateError;
use crate::metrics::{LoopMetrics, LoopMetricsSnapshot};
use crate::validation::{ids_to_fetch, BlockValidator, Capabilities, ValidationContext};

/// Service bit asking peers for blocks with witness data.
pub const NODE_WITNESS: u32 = 1 << 3;

/// Shared stop flag. Checked between blocks and by blocking pulls.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub enum Pulled {
    Block(Arc<Block>),
    /// The source's chain no longer extends our tip.
    Reorg,
    Cancelled,
}

/// Where blocks come from. Implemented by the download layer.
pub trait BlockSource: Send {
    /// Blocks until the next block is available, a reorg is detected or
    /// `cancel` is raised.
    fn next_block(&mut self, cancel: &CancelToken) -> Pulled;

    /// Restarts delivery from the block after `entry`.
    fn set_location(&mut self, entry: &Arc<ChainEntry>);

    /// Block `offset` positions past the last one delivered, if already
    /// downloaded.
    fn try_get_lookahead(&self, offset: usize) -> Option<Arc<Block>>;

    fn request_options(&mut self, services: u32);
}

#[derive(Clone, Debug)]
pub struct BlockAccepted {
    pub entry: Arc<ChainEntry>,
    pub block: Arc<Block>,
}

/// Fan-out of accepted blocks. Subscribers that hang up are dropped.
#[derive(Default)]
pub struct BlockNotifier {
    subscribers: Vec<Sender<BlockAccepted>>,
}

impl BlockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<BlockAccepted> {
        let (tx, rx) = unbounded();
        self.subscribers.push(tx);
        rx
    }

    pub fn notify(&mut self, event: &BlockAccepted) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Pulling,
    Validating,
    Committed,
    Rejected,
    Rewinding,
}

#[derive(Debug)]
pub enum StepOutcome {
    Accepted(Arc<ChainEntry>),
    /// The block broke a rule; its header is now marked invalid.
    Rejected(ConsensusError),
    /// The block lacked witness data; the source was asked for it and the
    /// same block will be offered again.
    Retry,
    Rewound(Arc<ChainEntry>),
    Cancelled,
}

#[derive(Clone, Copy, Debug)]
pub struct ConsensusLoopConfig {
    /// How far past the current block to prefetch coins. Zero disables it.
    pub lookahead: usize,
    pub flush_on_every_block: bool,
    pub max_pending_prefetch: usize,
    pub capabilities: Capabilities,
}

impl Default for ConsensusLoopConfig {
    fn default() -> Self {
        Self {
            lookahead: 1,
            flush_on_every_block: false,
            max_pending_prefetch: 4,
            capabilities: Capabilities::POS,
        }
    }
}

struct PrefetchJob {
    block_hash: Hash256,
    ids: Vec<Hash256>,
}

struct PrefetchResult {
    block_hash: Hash256,
    ids: Vec<Hash256>,
    fetched: Result<FetchedCoins, ChainStateError>,
}

/// Background reader for the coins of blocks not yet validated.
struct Prefetcher {
    jobs: Option<Sender<PrefetchJob>>,
    results: Receiver<PrefetchResult>,
    in_flight: HashSet<Hash256>,
    handle: Option<JoinHandle<()>>,
}

impl Prefetcher {
    fn spawn<C: CoinView + 'static>(coins: Arc<C>, capacity: usize) -> std::io::Result<Self> {
        let (job_tx, job_rx) = bounded::<PrefetchJob>(capacity.max(1));
        let (result_tx, result_rx) = unbounded::<PrefetchResult>();
        let handle = thread::Builder::new()
            .name("coin-prefetch".to_string())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    let fetched = coins.fetch_coins(&job.ids);
                    let _ = result_tx.send(PrefetchResult {
                        block_hash: job.block_hash,
                        ids: job.ids,
                        fetched,
                    });
                }
            })?;
        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            in_flight: HashSet::new(),
            handle: Some(handle),
        })
    }

    fn request(&mut self, block_hash: Hash256, ids: Vec<Hash256>) {
        if self.in_flight.contains(&block_hash) {
            return;
        }
        let Some(jobs) = &self.jobs else {
            return;
        };
        if jobs.try_send(PrefetchJob { block_hash, ids }).is_ok() {
            self.in_flight.insert(block_hash);
        }
    }

    /// Waits for the prefetch of `block_hash` if one was queued. Results for
    /// blocks that were never validated are discarded on the way.
    fn take(&mut self, block_hash: &Hash256) -> Option<PrefetchResult> {
        if !self.in_flight.remove(block_hash) {
            return None;
        }
        while let Ok(result) = self.results.recv() {
            if result.block_hash == *block_hash {
                return Some(result);
            }
            self.in_flight.remove(&result.block_hash);
        }
        None
    }
}

impl Drop for Prefetcher {
    fn drop(&mut self) {
        self.jobs = None;
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Coins written by the most recent commit, kept to refresh a prefetch that
/// read the view one block earlier.
struct LastCommit {
    prev_tip: Hash256,
    new_tip: Hash256,
    coins: Vec<UnspentOutputs>,
}

pub struct ConsensusLoop<C: CoinView + 'static, B: BlockSource> {
    params: ConsensusParams,
    checkpoints: Checkpoints,
    config: ConsensusLoopConfig,
    headers: Arc<RwLock<HeaderChain>>,
    coins: Arc<C>,
    stakes: Arc<dyn StakeStore>,
    scripts: Arc<dyn ScriptVerifier>,
    source: B,
    notifier: BlockNotifier,
    metrics: Arc<LoopMetrics>,
    tip: Arc<ChainEntry>,
    state: LoopState,
    last_commit: Option<LastCommit>,
    prefetch: Option<Prefetcher>,
}

impl<C: CoinView + 'static, B: BlockSource> ConsensusLoop<C, B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        params: ConsensusParams,
        checkpoints: Checkpoints,
        config: ConsensusLoopConfig,
        headers: Arc<RwLock<HeaderChain>>,
        coins: Arc<C>,
        stakes: Arc<dyn StakeStore>,
        scripts: Arc<dyn ScriptVerifier>,
        source: B,
    ) -> Result<Self, ChainStateError> {
        let tip = Arc::clone(
            headers
                .read()
                .map_err(|_| ChainStateError::Corrupt("header chain lock poisoned"))?
                .genesis(),
        );
        let prefetch = if config.lookahead > 0 {
            match Prefetcher::spawn(Arc::clone(&coins), config.max_pending_prefetch) {
                Ok(prefetcher) => Some(prefetcher),
                Err(err) => {
                    log_warn!("coin prefetch disabled: {err}");
                    None
                }
            }
        } else {
            None
        };
        Ok(Self {
            params,
            checkpoints,
            config,
            headers,
            coins,
            stakes,
            scripts,
            source,
            notifier: BlockNotifier::new(),
            metrics: Arc::new(LoopMetrics::default()),
            tip,
            state: LoopState::Idle,
            last_commit: None,
            prefetch,
        })
    }

    pub fn tip(&self) -> &Arc<ChainEntry> {
        &self.tip
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn metrics_snapshot(&self) -> LoopMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn subscribe(&mut self) -> Receiver<BlockAccepted> {
        self.notifier.subscribe()
    }

    pub fn source(&self) -> &B {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut B {
        &mut self.source
    }

    /// Resolves the tip from the coin view, rewinding the view while it
    /// reflects a block outside the active header chain.
    pub fn start(&mut self) -> Result<Arc<ChainEntry>, ChainStateError> {
        let (tip, rewound) = self.rewind_to_header_chain()?;
        if rewound > 0 {
            log_warn!(
                "coin view was {rewound} blocks off the header chain at startup"
            );
        }
        self.tip = Arc::clone(&tip);
        self.source.set_location(&tip);
        self.set_state(LoopState::Idle);
        log_info!(
            "consensus tip {} at height {}",
            hash256_to_hex(&tip.hash),
            tip.height
        );
        Ok(tip)
    }

    /// Pulls and handles one block. Consensus failures are recovered here;
    /// any other error is fatal to the loop.
    pub fn step(&mut self, cancel: &CancelToken) -> Result<StepOutcome, ChainStateError> {
        self.set_state(LoopState::Pulling);
        let block = match self.source.next_block(cancel) {
            Pulled::Block(block) => block,
            Pulled::Reorg => return self.handle_reorg().map(StepOutcome::Rewound),
            Pulled::Cancelled => {
                self.set_state(LoopState::Idle);
                return Ok(StepOutcome::Cancelled);
            }
        };

        self.set_state(LoopState::Validating);
        let started = Instant::now();
        let prev = Arc::clone(&self.tip);
        let offered = block.hash();
        if self.read_headers()?.is_invalid(&offered) {
            return self.handle_rejection(&offered, prev.height + 1, ConsensusError::KnownInvalid);
        }
        let mut ctx = ValidationContext::new(&block, Arc::clone(&prev), &self.params, adjusted_time());
        let block_hash = ctx.block_hash;
        let height = ctx.height();
        self.request_prefetch(height);
        self.load_coins(&mut ctx)?;

        let validator = BlockValidator::new(
            &self.params,
            &self.checkpoints,
            self.stakes.as_ref(),
            self.scripts.as_ref(),
            self.config.capabilities,
        );
        let result = validator
            .validate(&mut ctx)
            .and_then(|()| validator.commit_stake(&mut ctx));
        match result {
            Ok(()) => {}
            Err(ChainStateError::Consensus(rule)) => {
                return self.handle_rejection(&block_hash, height, rule);
            }
            Err(err) => return Err(err),
        }

        let coins = ctx.coins.into_coins();
        self.coins.save_changes(&coins, &prev.hash, &block_hash)?;
        let entry = self.write_headers()?.add_header(block.header.clone())?;
        self.last_commit = Some(LastCommit {
            prev_tip: prev.hash,
            new_tip: block_hash,
            coins,
        });
        self.tip = Arc::clone(&entry);
        self.metrics.record_validated(started.elapsed());
        self.set_state(LoopState::Committed);
        log_info!(
            "new tip {} at height {}",
            hash256_to_hex(&entry.hash),
            entry.height
        );

        self.notifier.notify(&BlockAccepted {
            entry: Arc::clone(&entry),
            block,
        });

        let caught_up = self.read_headers()?.tip().hash == entry.hash;
        if caught_up || self.config.flush_on_every_block {
            self.flush()?;
        }
        Ok(StepOutcome::Accepted(entry))
    }

    /// Runs until cancelled, then flushes.
    pub fn run(&mut self, cancel: &CancelToken) -> Result<(), ChainStateError> {
        self.start()?;
        while !cancel.is_cancelled() {
            if let StepOutcome::Cancelled = self.step(cancel)? {
                break;
            }
        }
        self.flush()?;
        log_info!("consensus loop stopped at height {}", self.tip.height);
        Ok(())
    }

    pub fn flush(&self) -> Result<(), ChainStateError> {
        let started = Instant::now();
        self.coins.flush()?;
        self.metrics.record_flush(started.elapsed());
        Ok(())
    }

    fn set_state(&mut self, state: LoopState) {
        if self.state != state {
            log_trace!("consensus loop {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn read_headers(&self) -> Result<RwLockReadGuard<'_, HeaderChain>, ChainStateError> {
        self.headers
            .read()
            .map_err(|_| ChainStateError::Corrupt("header chain lock poisoned"))
    }

    fn write_headers(&self) -> Result<RwLockWriteGuard<'_, HeaderChain>, ChainStateError> {
        self.headers
            .write()
            .map_err(|_| ChainStateError::Corrupt("header chain lock poisoned"))
    }

    fn handle_rejection(
        &mut self,
        block_hash: &Hash256,
        height: i32,
        rule: ConsensusError,
    ) -> Result<StepOutcome, ChainStateError> {
        self.metrics.record_rejected();
        self.set_state(LoopState::Rejected);
        log_warn!(
            "block {} at height {} rejected: {}",
            hash256_to_hex(block_hash),
            height,
            rule
        );
        self.source.set_location(&self.tip);

        if rule == ConsensusError::BadWitnessNonceSize {
            self.metrics.record_witness_retry();
            self.source.request_options(NODE_WITNESS);
            return Ok(StepOutcome::Retry);
        }

        let mut headers = self.write_headers()?;
        headers.mark_invalid(block_hash);
        headers.set_tip(&self.tip);
        Ok(StepOutcome::Rejected(rule))
    }

    fn handle_reorg(&mut self) -> Result<Arc<ChainEntry>, ChainStateError> {
        let old_tip = Arc::clone(&self.tip);
        let (tip, rewound) = self.rewind_to_header_chain()?;
        self.last_commit = None;
        let depth = old_tip.height - tip.height;
        if depth > self.params.max_reorg_length {
            log_error!(
                "reorg of {} blocks exceeds the limit of {} (from height {} to {})",
                depth,
                self.params.max_reorg_length,
                old_tip.height,
                tip.height
            );
        }
        log_warn!(
            "rewound {} blocks to {} at height {}",
            rewound,
            hash256_to_hex(&tip.hash),
            tip.height
        );
        self.tip = Arc::clone(&tip);
        self.source.set_location(&tip);
        Ok(tip)
    }

    fn rewind_to_header_chain(&mut self) -> Result<(Arc<ChainEntry>, usize), ChainStateError> {
        self.set_state(LoopState::Rewinding);
        let mut rewound = 0usize;
        loop {
            let hash = self.coins.block_hash()?;
            let found = {
                let headers = self.read_headers()?;
                headers
                    .get_by_hash(&hash)
                    .filter(|entry| headers.contains(entry))
                    .cloned()
            };
            if let Some(entry) = found {
                return Ok((entry, rewound));
            }
            self.coins.rewind()?;
            self.metrics.record_rewind();
            rewound += 1;
        }
    }

    fn request_prefetch(&mut self, height: i32) {
        let Some(prefetch) = self.prefetch.as_mut() else {
            return;
        };
        let Some(next) = self.source.try_get_lookahead(self.config.lookahead) else {
            return;
        };
        let next_height = height.saturating_add(self.config.lookahead as i32);
        let flags = DeploymentFlags::for_block(next_height, &self.params);
        prefetch.request(next.hash(), ids_to_fetch(&next, flags.enforce_bip30));
    }

    fn load_coins(&mut self, ctx: &mut ValidationContext<'_>) -> Result<(), ChainStateError> {
        let ids = ids_to_fetch(ctx.block, ctx.flags.enforce_bip30);
        let prefetched = self
            .prefetch
            .as_mut()
            .and_then(|prefetch| prefetch.take(&ctx.block_hash));

        let coins = match prefetched {
            Some(result) if result.ids == ids => match result.fetched {
                Ok(fetched) => match self.refresh_prefetched(fetched, &ids) {
                    Some(coins) => {
                        self.metrics.record_prefetch(true);
                        coins
                    }
                    None => {
                        self.metrics.record_prefetch(false);
                        self.coins.fetch_coins(&ids)?.coins
                    }
                },
                Err(err) => {
                    log_debug!("prefetch failed, fetching again: {err}");
                    self.coins.fetch_coins(&ids)?.coins
                }
            },
            Some(_) => {
                self.metrics.record_prefetch(false);
                self.coins.fetch_coins(&ids)?.coins
            }
            None => self.coins.fetch_coins(&ids)?.coins,
        };
        ctx.coins.set_coins(coins);
        Ok(())
    }

    /// A prefetch is usable if it read the view at the current tip, or one
    /// block earlier when the last commit's coins can be laid over it.
    fn refresh_prefetched(
        &self,
        fetched: FetchedCoins,
        ids: &[Hash256],
    ) -> Option<Vec<UnspentOutputs>> {
        if fetched.block_hash == self.tip.hash {
            return Some(fetched.coins);
        }
        let last = self.last_commit.as_ref()?;
        if fetched.block_hash != last.prev_tip || last.new_tip != self.tip.hash {
            return None;
        }
        let wanted: HashSet<&Hash256> = ids.iter().collect();
        let mut merged: HashMap<Hash256, UnspentOutputs> = fetched
            .coins
            .into_iter()
            .map(|entry| (entry.txid, entry))
            .collect();
        for entry in &last.coins {
            if wanted.contains(&entry.txid) {
                merged.insert(entry.txid, entry.clone());
            }
        }
        Some(merged.into_values().collect())
    }
}

impl<C: CoinView + 'static, B: BlockSource + 'static> ConsensusLoop<C, B> {
    /// Moves the loop onto its own thread. The handle yields the loop back
    /// once it stops.
    pub fn spawn(
        mut self,
        cancel: CancelToken,
    ) -> std::io::Result<JoinHandle<(Self, Result<(), ChainStateError>)>> {
        thread::Builder::new()
            .name("consensus".to_string())
            .spawn(move || {
                let result = self.run(&cancel);
                if let Err(err) = &result {
                    log_error!("consensus loop failed: {err}");
                }
                (self, result)
            })
    }
}

fn adjusted_time() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notifier_drops_closed_subscribers() {
        let mut notifier = BlockNotifier::new();
        let kept = notifier.subscribe();
        let dropped = notifier.subscribe();
        drop(dropped);

        let entry = ChainEntry::genesis(Default::default(), Default::default());
        notifier.notify(&BlockAccepted {
            entry: Arc::clone(&entry),
            block: Arc::new(Block::default()),
        });
        assert_eq!(notifier.subscriber_count(), 1);
        let event = kept.try_recv().expect("event");
        assert_eq!(event.entry.hash, entry.hash);
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());
        clone.cancel();
        assert!(token.is_cancelled());
    }
}
