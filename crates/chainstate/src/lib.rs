//! Chain state: header chain, unspent-output views, stake history, the block
//! validation pipeline and the consensus loop that drives it.

pub mod chain;
pub mod coinview;
pub mod consensus_loop;
pub mod error;
pub mod metrics;
pub mod stakechain;
pub mod utxo;
pub mod validation;

pub use chain::HeaderChain;
pub use coinview::{CachedCoinView, CoinView, FetchedCoins, StoreCoinView};
pub use consensus_loop::{
    BlockAccepted, BlockNotifier, BlockSource, CancelToken, ConsensusLoop, ConsensusLoopConfig,
    LoopState, Pulled, StepOutcome, NODE_WITNESS,
};
pub use error::ChainStateError;
pub use metrics::{LoopMetrics, LoopMetricsSnapshot};
pub use stakechain::StoreStakeChain;
pub use utxo::UnspentOutputSet;
pub use validation::{ids_to_fetch, BlockValidator, Capabilities, Stage, ValidationContext};
