//! Per-transaction unspent output entries.

use stakd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::transaction::{Transaction, TxOut};

/// The outputs of one transaction that are still unspent.
///
/// Spent slots are `None`; an entry whose slots are all `None` is prunable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnspentOutputs {
    pub txid: Hash256,
    pub height: i32,
    pub time: u32,
    pub is_coinbase: bool,
    pub is_coinstake: bool,
    pub outputs: Vec<Option<TxOut>>,
}

impl UnspentOutputs {
    pub fn from_transaction(txid: Hash256, tx: &Transaction, height: i32) -> Self {
        Self {
            txid,
            height,
            time: tx.time,
            is_coinbase: tx.is_coinbase(),
            is_coinstake: tx.is_coinstake(),
            outputs: tx.vout.iter().cloned().map(Some).collect(),
        }
    }

    pub fn output(&self, index: u32) -> Option<&TxOut> {
        self.outputs.get(index as usize)?.as_ref()
    }

    pub fn is_available(&self, index: u32) -> bool {
        self.output(index).is_some()
    }

    /// Marks `index` spent, returning the output it held.
    pub fn spend(&mut self, index: u32) -> Option<TxOut> {
        self.outputs.get_mut(index as usize)?.take()
    }

    pub fn is_prunable(&self) -> bool {
        self.outputs.iter().all(Option::is_none)
    }

    pub fn unspent_count(&self) -> usize {
        self.outputs.iter().filter(|out| out.is_some()).count()
    }
}

const FLAG_COINBASE: u8 = 1;
const FLAG_COINSTAKE: u8 = 2;

impl Encodable for UnspentOutputs {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_hash_le(&self.txid);
        encoder.write_i32_le(self.height);
        encoder.write_u32_le(self.time);
        let mut flags = 0u8;
        if self.is_coinbase {
            flags |= FLAG_COINBASE;
        }
        if self.is_coinstake {
            flags |= FLAG_COINSTAKE;
        }
        encoder.write_u8(flags);
        encoder.write_varint(self.outputs.len() as u64);
        for slot in &self.outputs {
            match slot {
                Some(out) => {
                    encoder.write_bool(true);
                    out.consensus_encode(encoder);
                }
                None => encoder.write_bool(false),
            }
        }
    }
}

impl Decodable for UnspentOutputs {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let txid = decoder.read_hash_le()?;
        let height = decoder.read_i32_le()?;
        let time = decoder.read_u32_le()?;
        let flags = decoder.read_u8()?;
        if flags & !(FLAG_COINBASE | FLAG_COINSTAKE) != 0 {
            return Err(DecodeError::InvalidData("unknown unspent output flags"));
        }
        let count = decoder.read_len()?;
        let mut outputs = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            outputs.push(if decoder.read_bool()? {
                Some(TxOut::consensus_decode(decoder)?)
            } else {
                None
            });
        }
        Ok(Self {
            txid,
            height,
            time,
            is_coinbase: flags & FLAG_COINBASE != 0,
            is_coinstake: flags & FLAG_COINSTAKE != 0,
            outputs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode, encode};
    use crate::outpoint::OutPoint;
    use crate::transaction::TxIn;

    fn coinstake() -> Transaction {
        Transaction {
            version: 1,
            time: 1_600_000_000,
            vin: vec![TxIn::new(OutPoint::new([4; 32], 1), Vec::new())],
            vout: vec![
                TxOut::empty(),
                TxOut::new(10, vec![0x51]),
                TxOut::new(20, vec![0x52]),
            ],
            lock_time: 0,
        }
    }

    #[test]
    fn spend_clears_only_one_slot() {
        let tx = coinstake();
        let mut entry = UnspentOutputs::from_transaction(tx.txid(), &tx, 12);
        assert!(entry.is_coinstake);
        assert_eq!(entry.time, tx.time);
        assert_eq!(entry.spend(1), Some(TxOut::new(10, vec![0x51])));
        assert!(!entry.is_available(1));
        assert!(entry.is_available(2));
        assert_eq!(entry.spend(1), None);
        assert_eq!(entry.spend(9), None);
        assert!(!entry.is_prunable());
        entry.spend(0);
        entry.spend(2);
        assert!(entry.is_prunable());
    }

    #[test]
    fn encoding_keeps_spent_slots() {
        let tx = coinstake();
        let mut entry = UnspentOutputs::from_transaction(tx.txid(), &tx, 99);
        entry.spend(1);
        let decoded: UnspentOutputs = decode(&encode(&entry)).expect("decode");
        assert_eq!(decoded, entry);
        assert_eq!(decoded.unspent_count(), 2);
    }

    #[test]
    fn unknown_flags_rejected() {
        let tx = coinstake();
        let entry = UnspentOutputs::from_transaction(tx.txid(), &tx, 1);
        let mut bytes = encode(&entry);
        bytes[40] = 0x80;
        assert!(decode::<UnspentOutputs>(&bytes).is_err());
    }
}
