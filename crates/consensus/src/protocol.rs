//! Protocol era predicates and timestamp drift limits.

use crate::constants::{FUTURE_DRIFT_REDUCED_SECS, FUTURE_DRIFT_V1_SECS, FUTURE_DRIFT_V2_SECS};
use crate::params::ConsensusParams;

pub fn is_protocol_v2(height: i32, params: &ConsensusParams) -> bool {
    height > params.protocol_v2_height
}

pub fn is_protocol_v3(time: i64, params: &ConsensusParams) -> bool {
    time > i64::from(params.protocol_v3_time)
}

pub fn is_drift_reduced(time: i64, params: &ConsensusParams) -> bool {
    time > i64::from(params.drift_reduced_time)
}

pub fn is_v1_retargeting_fixed(height: i32, params: &ConsensusParams) -> bool {
    height > params.protocol_v1_retargeting_fixed_height
}

/// Furthest acceptable block time given a reference time, V2 rules.
pub fn future_drift_v2(time: i64, params: &ConsensusParams) -> i64 {
    if is_drift_reduced(time, params) {
        time + FUTURE_DRIFT_REDUCED_SECS
    } else {
        time + FUTURE_DRIFT_V2_SECS
    }
}

pub fn future_drift(time: i64, height: i32, params: &ConsensusParams) -> i64 {
    if is_protocol_v2(height, params) {
        future_drift_v2(time, params)
    } else {
        time + FUTURE_DRIFT_V1_SECS
    }
}
