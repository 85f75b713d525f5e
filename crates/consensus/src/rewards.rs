//! Block reward schedule.

use crate::money::Amount;
use crate::params::ConsensusParams;

pub fn is_premine(height: i32, params: &ConsensusParams) -> bool {
    params.premine_reward > 0 && height == params.premine_height
}

/// Reward a proof-of-work block at `height` may claim on top of fees.
pub fn proof_of_work_reward(height: i32, params: &ConsensusParams) -> Amount {
    if is_premine(height, params) {
        return params.premine_reward;
    }
    params.proof_of_work_reward
}

/// Reward a proof-of-stake block at `height` may claim on top of fees.
pub fn proof_of_stake_reward(height: i32, params: &ConsensusParams) -> Amount {
    if is_premine(height, params) {
        return params.premine_reward;
    }
    params.proof_of_stake_reward
}
