//! Persistent and cached views of the unspent output set.
//!
//! A view records the hash of the block it reflects. Every `save_changes`
//! advances it by one block and leaves a rewind record, so `rewind` can step
//! back one block at a time after a reorg.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use stakd_consensus::Hash256;
use stakd_log::{log_debug, log_trace};
use stakd_primitives::coins::UnspentOutputs;
use stakd_primitives::encoding::{decode, encode, Decodable, DecodeError, Decoder, Encodable, Encoder};
use stakd_storage::{Column, KeyValueStore, WriteBatch};

use crate::error::ChainStateError;

const TIP_KEY: &[u8] = b"coins_tip";

/// Coins returned by a fetch, tagged with the block the view reflected.
#[derive(Clone, Debug, Default)]
pub struct FetchedCoins {
    pub block_hash: Hash256,
    pub coins: Vec<UnspentOutputs>,
}

pub trait CoinView: Send + Sync {
    fn block_hash(&self) -> Result<Hash256, ChainStateError>;

    /// Unspent entries for whichever of `txids` exist; missing ids are skipped.
    fn fetch_coins(&self, txids: &[Hash256]) -> Result<FetchedCoins, ChainStateError>;

    /// Advances the view from `old_tip` to `new_tip` by writing `coins`.
    /// Fully spent entries are removed.
    fn save_changes(
        &self,
        coins: &[UnspentOutputs],
        old_tip: &Hash256,
        new_tip: &Hash256,
    ) -> Result<(), ChainStateError>;

    /// Undoes the last saved block and returns the hash the view now reflects.
    fn rewind(&self) -> Result<Hash256, ChainStateError>;

    fn flush(&self) -> Result<(), ChainStateError> {
        Ok(())
    }
}

impl<T: CoinView + ?Sized> CoinView for Arc<T> {
    fn block_hash(&self) -> Result<Hash256, ChainStateError> {
        self.as_ref().block_hash()
    }

    fn fetch_coins(&self, txids: &[Hash256]) -> Result<FetchedCoins, ChainStateError> {
        self.as_ref().fetch_coins(txids)
    }

    fn save_changes(
        &self,
        coins: &[UnspentOutputs],
        old_tip: &Hash256,
        new_tip: &Hash256,
    ) -> Result<(), ChainStateError> {
        self.as_ref().save_changes(coins, old_tip, new_tip)
    }

    fn rewind(&self) -> Result<Hash256, ChainStateError> {
        self.as_ref().rewind()
    }

    fn flush(&self) -> Result<(), ChainStateError> {
        self.as_ref().flush()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct CoinTip {
    hash: Hash256,
    height: i32,
}

impl Encodable for CoinTip {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash_le(&self.hash);
        encoder.write_i32_le(self.height);
    }
}

impl Decodable for CoinTip {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        Ok(Self {
            hash: decoder.read_hash_le()?,
            height: decoder.read_i32_le()?,
        })
    }
}

/// Prior state of every entry a block touched.
#[derive(Clone, Debug, PartialEq, Eq)]
struct RewindRecord {
    prev_hash: Hash256,
    restore: Vec<(Hash256, Option<UnspentOutputs>)>,
}

impl Encodable for RewindRecord {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash_le(&self.prev_hash);
        encoder.write_varint(self.restore.len() as u64);
        for (txid, previous) in &self.restore {
            encoder.write_hash_le(txid);
            match previous {
                Some(entry) => {
                    encoder.write_bool(true);
                    entry.consensus_encode(encoder);
                }
                None => encoder.write_bool(false),
            }
        }
    }
}

impl Decodable for RewindRecord {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prev_hash = decoder.read_hash_le()?;
        let count = decoder.read_len()?;
        let mut restore = Vec::with_capacity(count.min(4096));
        for _ in 0..count {
            let txid = decoder.read_hash_le()?;
            let previous = if decoder.read_bool()? {
                Some(UnspentOutputs::consensus_decode(decoder)?)
            } else {
                None
            };
            restore.push((txid, previous));
        }
        Ok(Self { prev_hash, restore })
    }
}

fn rewind_key(height: i32) -> [u8; 4] {
    (height as u32).to_be_bytes()
}

/// Coin view persisted in a [`KeyValueStore`].
pub struct StoreCoinView<S> {
    store: S,
    tip: RwLock<CoinTip>,
}

impl<S: KeyValueStore> StoreCoinView<S> {
    /// Opens the view, initialising an empty store at the genesis block.
    pub fn open(store: S, genesis_hash: Hash256) -> Result<Self, ChainStateError> {
        let tip = match store.get(Column::Meta, TIP_KEY)? {
            Some(bytes) => decode::<CoinTip>(&bytes)?,
            None => {
                let tip = CoinTip {
                    hash: genesis_hash,
                    height: 0,
                };
                store.put(Column::Meta, TIP_KEY, &encode(&tip))?;
                tip
            }
        };
        Ok(Self {
            store,
            tip: RwLock::new(tip),
        })
    }

    pub fn tip_height(&self) -> Result<i32, ChainStateError> {
        Ok(self
            .tip
            .read()
            .map_err(|_| ChainStateError::Corrupt("coin view lock poisoned"))?
            .height)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn read_entry(&self, txid: &Hash256) -> Result<Option<UnspentOutputs>, ChainStateError> {
        match self.store.get(Column::Coins, txid)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<S: KeyValueStore> CoinView for StoreCoinView<S> {
    fn block_hash(&self) -> Result<Hash256, ChainStateError> {
        Ok(self
            .tip
            .read()
            .map_err(|_| ChainStateError::Corrupt("coin view lock poisoned"))?
            .hash)
    }

    fn fetch_coins(&self, txids: &[Hash256]) -> Result<FetchedCoins, ChainStateError> {
        let tip = self
            .tip
            .read()
            .map_err(|_| ChainStateError::Corrupt("coin view lock poisoned"))?;
        let mut coins = Vec::with_capacity(txids.len());
        for txid in txids {
            if let Some(entry) = self.read_entry(txid)? {
                if !entry.is_prunable() {
                    coins.push(entry);
                }
            }
        }
        Ok(FetchedCoins {
            block_hash: tip.hash,
            coins,
        })
    }

    fn save_changes(
        &self,
        coins: &[UnspentOutputs],
        old_tip: &Hash256,
        new_tip: &Hash256,
    ) -> Result<(), ChainStateError> {
        let mut tip = self
            .tip
            .write()
            .map_err(|_| ChainStateError::Corrupt("coin view lock poisoned"))?;
        if tip.hash != *old_tip {
            return Err(ChainStateError::Corrupt("coin view tip mismatch"));
        }
        let next = CoinTip {
            hash: *new_tip,
            height: tip.height + 1,
        };

        let mut batch = WriteBatch::new();
        let mut record = RewindRecord {
            prev_hash: *old_tip,
            restore: Vec::with_capacity(coins.len()),
        };
        for entry in coins {
            record.restore.push((entry.txid, self.read_entry(&entry.txid)?));
            if entry.is_prunable() {
                batch.delete(Column::Coins, entry.txid);
            } else {
                batch.put(Column::Coins, entry.txid, encode(entry));
            }
        }
        batch.put(Column::CoinRewind, rewind_key(next.height), encode(&record));
        batch.put(Column::Meta, TIP_KEY, encode(&next));
        self.store.write_batch(&batch)?;
        log_trace!(
            "coin view saved {} entries at height {}",
            coins.len(),
            next.height
        );
        *tip = next;
        Ok(())
    }

    fn rewind(&self) -> Result<Hash256, ChainStateError> {
        let mut tip = self
            .tip
            .write()
            .map_err(|_| ChainStateError::Corrupt("coin view lock poisoned"))?;
        if tip.height == 0 {
            return Err(ChainStateError::Corrupt("cannot rewind past genesis"));
        }
        let key = rewind_key(tip.height);
        let bytes = self
            .store
            .get(Column::CoinRewind, &key)?
            .ok_or(ChainStateError::Corrupt("missing rewind record"))?;
        let record: RewindRecord = decode(&bytes)?;

        let mut batch = WriteBatch::new();
        for (txid, previous) in &record.restore {
            match previous {
                Some(entry) => batch.put(Column::Coins, *txid, encode(entry)),
                None => batch.delete(Column::Coins, *txid),
            }
        }
        let prev = CoinTip {
            hash: record.prev_hash,
            height: tip.height - 1,
        };
        batch.delete(Column::CoinRewind, key);
        batch.put(Column::Meta, TIP_KEY, encode(&prev));
        self.store.write_batch(&batch)?;
        log_debug!("coin view rewound to height {}", prev.height);
        *tip = prev;
        Ok(prev.hash)
    }

    fn flush(&self) -> Result<(), ChainStateError> {
        self.store.persist()?;
        Ok(())
    }
}

struct PendingBlock {
    old_tip: Hash256,
    new_tip: Hash256,
    coins: Vec<UnspentOutputs>,
}

#[derive(Default)]
struct CacheState {
    pending: Vec<PendingBlock>,
    overlay: HashMap<Hash256, UnspentOutputs>,
}

impl CacheState {
    fn rebuild_overlay(&mut self) {
        self.overlay.clear();
        for block in &self.pending {
            for entry in &block.coins {
                self.overlay.insert(entry.txid, entry.clone());
            }
        }
    }
}

/// Write-back cache over another view. Saved blocks stay in memory until
/// [`CoinView::flush`] hands them to the inner view in order.
pub struct CachedCoinView<V> {
    inner: V,
    state: Mutex<CacheState>,
}

impl<V: CoinView> CachedCoinView<V> {
    pub fn new(inner: V) -> Self {
        Self {
            inner,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn inner(&self) -> &V {
        &self.inner
    }

    /// Blocks saved but not yet flushed.
    pub fn pending_blocks(&self) -> Result<usize, ChainStateError> {
        Ok(self.lock()?.pending.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, CacheState>, ChainStateError> {
        self.state
            .lock()
            .map_err(|_| ChainStateError::Corrupt("coin cache lock poisoned"))
    }

    fn current_tip(&self, state: &CacheState) -> Result<Hash256, ChainStateError> {
        match state.pending.last() {
            Some(block) => Ok(block.new_tip),
            None => self.inner.block_hash(),
        }
    }
}

impl<V: CoinView> CoinView for CachedCoinView<V> {
    fn block_hash(&self) -> Result<Hash256, ChainStateError> {
        let state = self.lock()?;
        self.current_tip(&state)
    }

    fn fetch_coins(&self, txids: &[Hash256]) -> Result<FetchedCoins, ChainStateError> {
        let state = self.lock()?;
        let mut coins = Vec::with_capacity(txids.len());
        let mut misses = Vec::new();
        for txid in txids {
            match state.overlay.get(txid) {
                Some(entry) if !entry.is_prunable() => coins.push(entry.clone()),
                Some(_) => {}
                None => misses.push(*txid),
            }
        }
        if !misses.is_empty() {
            coins.extend(self.inner.fetch_coins(&misses)?.coins);
        }
        Ok(FetchedCoins {
            block_hash: self.current_tip(&state)?,
            coins,
        })
    }

    fn save_changes(
        &self,
        coins: &[UnspentOutputs],
        old_tip: &Hash256,
        new_tip: &Hash256,
    ) -> Result<(), ChainStateError> {
        let mut state = self.lock()?;
        if self.current_tip(&state)? != *old_tip {
            return Err(ChainStateError::Corrupt("coin view tip mismatch"));
        }
        for entry in coins {
            state.overlay.insert(entry.txid, entry.clone());
        }
        state.pending.push(PendingBlock {
            old_tip: *old_tip,
            new_tip: *new_tip,
            coins: coins.to_vec(),
        });
        Ok(())
    }

    fn rewind(&self) -> Result<Hash256, ChainStateError> {
        let mut state = self.lock()?;
        match state.pending.pop() {
            Some(block) => {
                state.rebuild_overlay();
                Ok(block.old_tip)
            }
            None => self.inner.rewind(),
        }
    }

    fn flush(&self) -> Result<(), ChainStateError> {
        let mut state = self.lock()?;
        let count = state.pending.len();
        while !state.pending.is_empty() {
            let block = &state.pending[0];
            self.inner
                .save_changes(&block.coins, &block.old_tip, &block.new_tip)?;
            state.pending.remove(0);
        }
        state.overlay.clear();
        self.inner.flush()?;
        if count > 0 {
            log_debug!("coin cache flushed {count} blocks");
        }
        Ok(())
    }
}
