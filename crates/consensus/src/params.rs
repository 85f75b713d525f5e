//! Consensus parameter definitions.

use crate::money::{Amount, COIN};
use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
    Devnet,
}

impl Network {
    pub fn as_str(self) -> &'static str {
        match self {
            Network::Mainnet => "main",
            Network::Testnet => "test",
            Network::Regtest => "regtest",
            Network::Devnet => "devnet",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Some(Network::Mainnet),
            "test" | "testnet" => Some(Network::Testnet),
            "regtest" => Some(Network::Regtest),
            "dev" | "devnet" => Some(Network::Devnet),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    pub network: Network,
    pub hash_genesis_block: Hash256,
    pub genesis_time: u32,
    pub pow_limit: Hash256,
    pub pos_limit_v2: Hash256,
    pub pow_no_retargeting: bool,
    pub target_spacing: i64,
    pub target_timespan: i64,
    pub last_pow_height: i32,
    pub coinbase_maturity: i32,
    pub stake_min_confirmations: i32,
    pub stake_min_age: i64,
    pub stake_modifier_interval: i64,
    pub stake_timestamp_mask: u32,
    pub premine_height: i32,
    pub premine_reward: Amount,
    pub proof_of_work_reward: Amount,
    pub proof_of_stake_reward: Amount,
    pub protocol_v1_retargeting_fixed_height: i32,
    pub protocol_v2_height: i32,
    pub protocol_v3_time: u32,
    pub drift_reduced_time: u32,
    pub max_reorg_length: i32,
    pub bip34_height: i32,
    pub segwit_height: i32,
    pub use_checkpoints: bool,
}

impl ConsensusParams {
    /// Number of spacing intervals averaged by the retarget.
    pub fn retarget_interval(&self) -> i64 {
        self.target_timespan / self.target_spacing
    }
}

#[derive(Debug)]
pub enum HexError {
    InvalidLength,
    InvalidHex,
}

impl std::fmt::Display for HexError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HexError::InvalidLength => write!(f, "invalid hex length"),
            HexError::InvalidHex => write!(f, "invalid hex digit"),
        }
    }
}

impl std::error::Error for HexError {}

/// Parses a display-order (big-endian) hex string into a little-endian hash.
pub fn hash256_from_hex(input: &str) -> Result<Hash256, HexError> {
    let mut hex = input.trim();
    if let Some(stripped) = hex.strip_prefix("0x").or_else(|| hex.strip_prefix("0X")) {
        hex = stripped;
    }
    if hex.is_empty() || hex.len() > 64 {
        return Err(HexError::InvalidLength);
    }

    let padded = format!("{hex:0>64}");
    let mut bytes = [0u8; 32];
    for (i, byte_out) in bytes.iter_mut().enumerate() {
        let start = i * 2;
        *byte_out = u8::from_str_radix(&padded[start..start + 2], 16)
            .map_err(|_| HexError::InvalidHex)?;
    }
    bytes.reverse();
    Ok(bytes)
}

/// Formats a little-endian hash in display order.
pub fn hash256_to_hex(hash: &Hash256) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(64);
    for byte in hash.iter().rev() {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

pub fn consensus_params(network: Network) -> ConsensusParams {
    match network {
        Network::Mainnet => mainnet_consensus_params(),
        Network::Testnet => testnet_consensus_params(),
        Network::Regtest => regtest_consensus_params(),
        Network::Devnet => devnet_consensus_params(),
    }
}

fn limit(hex: &str) -> Hash256 {
    hash256_from_hex(hex).unwrap_or([0xff; 32])
}

fn mainnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Mainnet,
        hash_genesis_block: limit(
            "0000066e91e46e5a264d42c89e1204963b2ee6be230b443e9159020539d972af",
        ),
        genesis_time: 1_470_467_000,
        pow_limit: limit("00000fffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
        pos_limit_v2: limit("000000000000ffffffffffffffffffffffffffffffffffffffffffffffffffff"),
        pow_no_retargeting: false,
        target_spacing: 64,
        target_timespan: 16 * 60,
        last_pow_height: 12_500,
        coinbase_maturity: 50,
        stake_min_confirmations: 50,
        stake_min_age: 60,
        stake_modifier_interval: 10 * 64,
        stake_timestamp_mask: 0x0000_000f,
        premine_height: 2,
        premine_reward: 98_000_000 * COIN,
        proof_of_work_reward: 4 * COIN,
        proof_of_stake_reward: COIN,
        protocol_v1_retargeting_fixed_height: 0,
        protocol_v2_height: 0,
        protocol_v3_time: 1_470_467_000,
        drift_reduced_time: 1_479_168_000,
        max_reorg_length: 500,
        bip34_height: 0,
        segwit_height: i32::MAX,
        use_checkpoints: true,
    }
}

fn testnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Testnet,
        hash_genesis_block: limit(
            "00000e246d7b73b88c9ab55f2e5e94d9e22d471def3df5ea448f5576b1d156b9",
        ),
        genesis_time: 1_470_467_000,
        pow_limit: limit("0000ffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
        pos_limit_v2: limit("000000000000ffffffffffffffffffffffffffffffffffffffffffffffffffff"),
        pow_no_retargeting: false,
        target_spacing: 64,
        target_timespan: 16 * 60,
        last_pow_height: 12_500,
        coinbase_maturity: 10,
        stake_min_confirmations: 10,
        stake_min_age: 60,
        stake_modifier_interval: 10 * 64,
        stake_timestamp_mask: 0x0000_000f,
        premine_height: 2,
        premine_reward: 98_000_000 * COIN,
        proof_of_work_reward: 4 * COIN,
        proof_of_stake_reward: COIN,
        protocol_v1_retargeting_fixed_height: 0,
        protocol_v2_height: 0,
        protocol_v3_time: 1_470_467_000,
        drift_reduced_time: 1_479_168_000,
        max_reorg_length: 500,
        bip34_height: 0,
        segwit_height: i32::MAX,
        use_checkpoints: true,
    }
}

fn regtest_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Regtest,
        hash_genesis_block: limit(
            "93925104d664314f581bc7ecb7b4bad07bcfabd1cfce4256dbd2faddcf53bd1f",
        ),
        genesis_time: 1_470_467_000,
        pow_limit: limit("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
        pos_limit_v2: limit("7fffffffffffffffffffffffffffffffffffffffffffffffffffffffffffffff"),
        pow_no_retargeting: true,
        target_spacing: 64,
        target_timespan: 16 * 60,
        last_pow_height: 12_500,
        coinbase_maturity: 10,
        stake_min_confirmations: 10,
        stake_min_age: 60,
        stake_modifier_interval: 10 * 64,
        stake_timestamp_mask: 0x0000_000f,
        premine_height: 2,
        premine_reward: 98_000_000 * COIN,
        proof_of_work_reward: 4 * COIN,
        proof_of_stake_reward: COIN,
        protocol_v1_retargeting_fixed_height: 0,
        protocol_v2_height: 0,
        protocol_v3_time: 0,
        drift_reduced_time: 0,
        max_reorg_length: 500,
        bip34_height: 0,
        segwit_height: 0,
        use_checkpoints: true,
    }
}

fn devnet_consensus_params() -> ConsensusParams {
    ConsensusParams {
        network: Network::Devnet,
        pow_no_retargeting: false,
        max_reorg_length: 100,
        ..regtest_consensus_params()
    }
}
