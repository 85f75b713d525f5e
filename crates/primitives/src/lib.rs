//! Core block, transaction and chain types with consensus serialization.

pub mod block;
pub mod chain;
pub mod coins;
pub mod encoding;
pub mod hash;
pub mod outpoint;
pub mod script;
pub mod transaction;

pub use block::{Block, BlockDecodeError, BlockHeader};
pub use chain::ChainEntry;
pub use coins::UnspentOutputs;
pub use hash::{sha256, sha256d};
pub use outpoint::OutPoint;
pub use transaction::{Transaction, TxIn, TxOut};
