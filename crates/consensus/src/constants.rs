//! Consensus-wide constants shared across validation.

/// Highest block version accepted before protocol V3 and the floor under V2.
pub const CURRENT_BLOCK_VERSION: i32 = 7;
/// Last block version accepted before protocol V2.
pub const MAX_PRE_V2_BLOCK_VERSION: i32 = 6;
/// The maximum allowed size for a serialized block, in bytes (network rule).
pub const MAX_BLOCK_SERIALIZED_SIZE: usize = 4_000_000;
/// The maximum allowed size for a block excluding witness data (network rule).
pub const MAX_BLOCK_BASE_SIZE: usize = 1_000_000;
/// The maximum allowed number of signature check operations in a block (network rule).
pub const MAX_BLOCK_SIGOPS: u32 = 20_000;
/// The maximum size of a single transaction excluding witness data.
pub const MAX_TX_SIZE: usize = MAX_BLOCK_BASE_SIZE;
/// Number of ancestors sampled by median-time-past.
pub const MEDIAN_TIME_SPAN: usize = 11;
/// Lock times below this are block heights, above are unix timestamps.
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;
/// Allowed clock drift once the drift-reduction epoch is reached.
pub const FUTURE_DRIFT_REDUCED_SECS: i64 = 15;
/// Allowed clock drift under protocol V2 before the drift-reduction epoch.
pub const FUTURE_DRIFT_V2_SECS: i64 = 128 * 60 * 60;
/// Allowed clock drift under protocol V1.
pub const FUTURE_DRIFT_V1_SECS: i64 = 10 * 60;
/// Number of exponentially weighted sections in a stake modifier selection interval.
pub const MODIFIER_SELECTION_ROUNDS: usize = 64;
/// Ratio between the longest and shortest modifier selection section.
pub const MODIFIER_INTERVAL_RATIO: i64 = 3;
/// Coinbase script signature length bounds.
pub const MIN_COINBASE_SCRIPT_LEN: usize = 2;
pub const MAX_COINBASE_SCRIPT_LEN: usize = 100;
/// Witness commitment header inside a coinbase `OP_RETURN` output.
pub const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];
