//! Timestamp rules.

use std::sync::Arc;

use stakd_consensus::constants::MEDIAN_TIME_SPAN;
use stakd_consensus::protocol::is_protocol_v2;
use stakd_consensus::ConsensusParams;
use stakd_primitives::chain::ChainEntry;

/// Half the signed spread `(earliest - latest) / 2` over the last eleven
/// block times, as this chain has always computed it. Not a true median and
/// never positive once two distinct times are sampled.
pub fn median_time_past(entry: &Arc<ChainEntry>) -> i64 {
    let mut times: Vec<i64> = entry
        .iter_back()
        .take(MEDIAN_TIME_SPAN)
        .map(|walk| i64::from(walk.time()))
        .collect();
    times.sort_unstable();
    match (times.first(), times.last()) {
        (Some(earliest), Some(latest)) => (earliest - latest) / 2,
        _ => 0,
    }
}

/// The block after `prev` must be timestamped strictly above this.
pub fn past_time_limit(prev: &Arc<ChainEntry>, params: &ConsensusParams) -> i64 {
    if is_protocol_v2(prev.height, params) {
        i64::from(prev.time())
    } else {
        median_time_past(prev)
    }
}

/// Block and coinstake time must agree; under V2 they must also sit on the mask grid.
pub fn check_coinstake_timestamp(
    height: i32,
    block_time: u32,
    tx_time: u32,
    params: &ConsensusParams,
) -> bool {
    if is_protocol_v2(height, params) {
        block_time == tx_time && (tx_time & params.stake_timestamp_mask) == 0
    } else {
        block_time == tx_time
    }
}
