//! Block-scoped working set of unspent outputs.

use std::collections::HashMap;

use stakd_consensus::money::Amount;
use stakd_consensus::Hash256;
use stakd_pos::CoinLookup;
use stakd_primitives::coins::UnspentOutputs;
use stakd_primitives::transaction::{Transaction, TxIn, TxOut};

use crate::error::ChainStateError;

/// Unspent outputs loaded for one block, keyed by txid.
///
/// Entries whose outputs are all spent stay in the map, so the change can be
/// persisted, but every lookup treats them as absent.
#[derive(Clone, Debug, Default)]
pub struct UnspentOutputSet {
    entries: HashMap<Hash256, UnspentOutputs>,
}

impl UnspentOutputSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads `coins`, replacing anything already held for the same txid.
    pub fn set_coins(&mut self, coins: impl IntoIterator<Item = UnspentOutputs>) {
        for entry in coins {
            self.entries.insert(entry.txid, entry);
        }
    }

    /// Loads `coins`, keeping entries that are already present.
    pub fn try_set_coins(&mut self, coins: impl IntoIterator<Item = UnspentOutputs>) {
        for entry in coins {
            self.entries.entry(entry.txid).or_insert(entry);
        }
    }

    pub fn get(&self, txid: &Hash256) -> Option<&UnspentOutputs> {
        self.entries.get(txid).filter(|entry| !entry.is_prunable())
    }

    pub fn get_output_for(&self, input: &TxIn) -> Option<&TxOut> {
        self.get(&input.prevout.hash)?.output(input.prevout.index)
    }

    pub fn have_inputs(&self, tx: &Transaction) -> bool {
        tx.is_coinbase() || tx.vin.iter().all(|input| self.get_output_for(input).is_some())
    }

    /// Sum of the values of every input that resolves.
    pub fn get_value_in(&self, tx: &Transaction) -> Amount {
        if tx.is_coinbase() {
            return 0;
        }
        tx.vin
            .iter()
            .filter_map(|input| self.get_output_for(input))
            .fold(0, |total: Amount, out| total.saturating_add(out.value))
    }

    /// Spends `tx`'s inputs and adds its outputs at `height`.
    ///
    /// Inputs must already be loaded; a missing one means the caller skipped
    /// fetching and is reported as [`ChainStateError::MissingCoins`].
    pub fn update(&mut self, tx: &Transaction, txid: Hash256, height: i32) -> Result<(), ChainStateError> {
        if !tx.is_coinbase() {
            for input in &tx.vin {
                let prevout = &input.prevout;
                let entry = self
                    .entries
                    .get_mut(&prevout.hash)
                    .ok_or(ChainStateError::MissingCoins(prevout.hash))?;
                entry
                    .spend(prevout.index)
                    .ok_or(ChainStateError::MissingCoins(prevout.hash))?;
            }
        }
        self.entries
            .insert(txid, UnspentOutputs::from_transaction(txid, tx, height));
        Ok(())
    }

    /// Every held entry, spent-out ones included.
    pub fn get_coins(&self) -> impl Iterator<Item = &UnspentOutputs> {
        self.entries.values()
    }

    pub fn into_coins(self) -> Vec<UnspentOutputs> {
        self.entries.into_values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CoinLookup for UnspentOutputSet {
    fn unspent_outputs(&self, txid: &Hash256) -> Option<&UnspentOutputs> {
        self.get(txid)
    }
}
