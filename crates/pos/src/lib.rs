//! Proof-of-stake validation: stake records, kernel hash, stake modifiers,
//! target retargeting, timestamp rules and block signatures.

pub mod error;
pub mod kernel;
pub mod modifier;
pub mod retarget;
pub mod signature;
pub mod stake;
pub mod timing;

pub use error::StakeError;
pub use kernel::{
    check_proof_of_stake, check_stake_kernel_hash, CoinLookup, KernelModifier, KernelProof,
    ScriptVerifier, StakeContext,
};
pub use modifier::{compute_next_stake_modifier, compute_stake_modifier_v2};
pub use retarget::get_next_target_required;
pub use stake::{BlockStake, MemoryStakeStore, StakeStore};
