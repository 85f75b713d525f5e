//! Block signatures.
//!
//! A proof-of-stake block is signed by the key that owns the coinstake's
//! first paying output; proof-of-work blocks carry no signature.

use std::sync::OnceLock;

use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, VerifyOnly};
use stakd_consensus::protocol::is_protocol_v3;
use stakd_consensus::{ConsensusError, ConsensusParams};
use stakd_primitives::block::Block;
use stakd_primitives::script::{op_return_pubkey, p2pk_pubkey};

static SECP256K1_VERIFY: OnceLock<Secp256k1<VerifyOnly>> = OnceLock::new();

fn secp256k1_verify() -> &'static Secp256k1<VerifyOnly> {
    SECP256K1_VERIFY.get_or_init(Secp256k1::verification_only)
}

/// The pubkey expected to have signed a proof-of-stake block.
fn signer_pubkey<'a>(block: &'a Block, params: &ConsensusParams) -> Option<&'a [u8]> {
    let coinstake = block.transactions.get(1)?;
    let script = &coinstake.vout.get(1)?.script_pubkey;
    if let Some(key) = p2pk_pubkey(script) {
        return Some(key);
    }
    if is_protocol_v3(i64::from(coinstake.time), params) {
        return op_return_pubkey(script);
    }
    None
}

pub fn check_block_signature(block: &Block, params: &ConsensusParams) -> Result<(), ConsensusError> {
    if block.is_proof_of_work() {
        return if block.signature.is_empty() {
            Ok(())
        } else {
            Err(ConsensusError::BadBlockSignature)
        };
    }
    if block.signature.is_empty() {
        return Err(ConsensusError::BadBlockSignature);
    }

    let key_bytes = signer_pubkey(block, params).ok_or(ConsensusError::BadBlockSignature)?;
    let pubkey = PublicKey::from_slice(key_bytes).map_err(|_| ConsensusError::BadBlockSignature)?;
    // High-S encodings fail verification; only the low-S form is accepted.
    let sig =
        Signature::from_der(&block.signature).map_err(|_| ConsensusError::BadBlockSignature)?;
    let msg = Message::from_digest_slice(&block.hash())
        .map_err(|_| ConsensusError::BadBlockSignature)?;
    secp256k1_verify()
        .verify_ecdsa(&msg, &sig, &pubkey)
        .map_err(|_| ConsensusError::BadBlockSignature)
}
