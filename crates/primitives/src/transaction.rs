//! Timestamped transaction type with optional segregated witness data.

use stakd_consensus::money::Amount;
use stakd_consensus::Hash256;

use crate::encoding::{Decodable, DecodeError, Decoder, Encodable, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

const WITNESS_MARKER: u8 = 0x00;
const WITNESS_FLAG: u8 = 0x01;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    pub fn new(prevout: OutPoint, script_sig: Vec<u8>) -> Self {
        Self {
            prevout,
            script_sig,
            sequence: u32::MAX,
            witness: Vec::new(),
        }
    }
}

impl Encodable for TxIn {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        self.prevout.consensus_encode(encoder);
        encoder.write_var_bytes(&self.script_sig);
        encoder.write_u32_le(self.sequence);
    }
}

impl Decodable for TxIn {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let prevout = OutPoint::consensus_decode(decoder)?;
        let script_sig = decoder.read_var_bytes()?;
        let sequence = decoder.read_u32_le()?;
        Ok(Self {
            prevout,
            script_sig,
            sequence,
            witness: Vec::new(),
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxOut {
    pub value: Amount,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn new(value: Amount, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    /// The zero-value marker output that opens every coinstake.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.value == 0 && self.script_pubkey.is_empty()
    }
}

impl Encodable for TxOut {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_i64_le(self.value);
        encoder.write_var_bytes(&self.script_pubkey);
    }
}

impl Decodable for TxOut {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let value = decoder.read_i64_le()?;
        let script_pubkey = decoder.read_var_bytes()?;
        Ok(Self {
            value,
            script_pubkey,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub time: u32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    /// Spends a real output and opens with an empty marker output.
    pub fn is_coinstake(&self) -> bool {
        !self.vin.is_empty()
            && !self.vin[0].prevout.is_null()
            && self.vout.len() >= 2
            && self.vout[0].is_empty()
    }

    pub fn has_witness(&self) -> bool {
        self.vin.iter().any(|input| !input.witness.is_empty())
    }

    /// Sum of output values, `None` on overflow.
    pub fn total_out(&self) -> Option<Amount> {
        self.vout
            .iter()
            .try_fold(0 as Amount, |acc, out| acc.checked_add(out.value))
    }

    /// Serialization without witness data.
    pub fn encode_base(&self) -> Vec<u8> {
        self.encode_with(false)
    }

    pub fn encode_full(&self) -> Vec<u8> {
        self.encode_with(self.has_witness())
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.encode_base())
    }

    pub fn wtxid(&self) -> Hash256 {
        if self.is_coinbase() {
            return [0u8; 32];
        }
        sha256d(&self.encode_full())
    }

    pub fn base_size(&self) -> usize {
        self.encode_base().len()
    }

    pub fn total_size(&self) -> usize {
        self.encode_full().len()
    }

    fn encode_with(&self, witness: bool) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(128);
        encoder.write_i32_le(self.version);
        encoder.write_u32_le(self.time);
        if witness {
            encoder.write_u8(WITNESS_MARKER);
            encoder.write_u8(WITNESS_FLAG);
        }
        encoder.write_list(&self.vin);
        encoder.write_list(&self.vout);
        if witness {
            for input in &self.vin {
                encoder.write_varint(input.witness.len() as u64);
                for item in &input.witness {
                    encoder.write_var_bytes(item);
                }
            }
        }
        encoder.write_u32_le(self.lock_time);
        encoder.into_inner()
    }
}

impl Encodable for Transaction {
    fn consensus_encode(&self, encoder: &mut Encoder) {
        encoder.write_bytes(&self.encode_full());
    }
}

impl Decodable for Transaction {
    fn consensus_decode(decoder: &mut Decoder) -> Result<Self, DecodeError> {
        let version = decoder.read_i32_le()?;
        let time = decoder.read_u32_le()?;
        let mut witness = false;
        if decoder.peek_u8() == Some(WITNESS_MARKER) {
            decoder.read_u8()?;
            if decoder.read_u8()? != WITNESS_FLAG {
                return Err(DecodeError::InvalidData("unknown transaction flag"));
            }
            witness = true;
        }
        let mut vin: Vec<TxIn> = decoder.read_list()?;
        let vout: Vec<TxOut> = decoder.read_list()?;
        if witness {
            for input in vin.iter_mut() {
                let items = decoder.read_len()?;
                let mut stack = Vec::with_capacity(items.min(64));
                for _ in 0..items {
                    stack.push(decoder.read_var_bytes()?);
                }
                input.witness = stack;
            }
            if vin.iter().all(|input| input.witness.is_empty()) {
                return Err(DecodeError::InvalidData("superfluous witness record"));
            }
        }
        let lock_time = decoder.read_u32_le()?;
        Ok(Self {
            version,
            time,
            vin,
            vout,
            lock_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::{decode, encode};

    fn spend(hash: u8, index: u32) -> TxIn {
        TxIn::new(OutPoint::new([hash; 32], index), vec![0x51])
    }

    #[test]
    fn coinbase_and_coinstake_shapes() {
        let coinbase = Transaction {
            version: 1,
            time: 10,
            vin: vec![TxIn::new(OutPoint::null(), vec![0x01, 0x02])],
            vout: vec![TxOut::new(50, vec![0x51])],
            lock_time: 0,
        };
        assert!(coinbase.is_coinbase());
        assert!(!coinbase.is_coinstake());

        let coinstake = Transaction {
            version: 1,
            time: 10,
            vin: vec![spend(3, 0)],
            vout: vec![TxOut::empty(), TxOut::new(100, vec![0x51])],
            lock_time: 0,
        };
        assert!(coinstake.is_coinstake());
        assert!(!coinstake.is_coinbase());

        let mut plain = coinstake.clone();
        plain.vout[0].value = 1;
        assert!(!plain.is_coinstake());
    }

    #[test]
    fn witness_does_not_change_txid() {
        let mut tx = Transaction {
            version: 2,
            time: 1_500_000_000,
            vin: vec![spend(1, 2)],
            vout: vec![TxOut::new(7, vec![0x00, 0x14])],
            lock_time: 0,
        };
        let txid = tx.txid();
        tx.vin[0].witness = vec![vec![0xaa; 72], vec![0x02; 33]];
        assert_eq!(tx.txid(), txid);
        assert_ne!(tx.wtxid(), txid);
        assert!(tx.total_size() > tx.base_size());

        let decoded: Transaction = decode(&encode(&tx)).expect("decode witness tx");
        assert_eq!(decoded, tx);
    }

    #[test]
    fn time_field_is_serialized_after_version() {
        let tx = Transaction {
            version: 1,
            time: 0x0a0b0c0d,
            vin: Vec::new(),
            vout: Vec::new(),
            lock_time: 0,
        };
        let bytes = tx.encode_base();
        assert_eq!(&bytes[4..8], &0x0a0b0c0du32.to_le_bytes());
    }

    #[test]
    fn total_out_detects_overflow() {
        let tx = Transaction {
            vout: vec![TxOut::new(i64::MAX, Vec::new()), TxOut::new(1, Vec::new())],
            ..Transaction::default()
        };
        assert_eq!(tx.total_out(), None);
    }
}
