//! Consensus constants, network parameters, checkpoints and rule errors.

pub mod checkpoints;
pub mod constants;
pub mod deployments;
pub mod errors;
pub mod money;
pub mod params;
pub mod protocol;
pub mod rewards;

pub type Hash256 = [u8; 32];

pub use checkpoints::{CheckpointInfo, Checkpoints};
pub use deployments::DeploymentFlags;
pub use errors::ConsensusError;
pub use params::{consensus_params, ConsensusParams, Network};
pub use rewards::{is_premine, proof_of_stake_reward, proof_of_work_reward};
