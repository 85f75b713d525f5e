//! Soft-fork flags active for a block height.

use crate::params::ConsensusParams;

pub const SCRIPT_VERIFY_P2SH: u32 = 1 << 0;
pub const SCRIPT_VERIFY_DERSIG: u32 = 1 << 2;
pub const SCRIPT_VERIFY_CHECKLOCKTIMEVERIFY: u32 = 1 << 9;
pub const SCRIPT_VERIFY_CHECKSEQUENCEVERIFY: u32 = 1 << 10;
pub const SCRIPT_VERIFY_WITNESS: u32 = 1 << 11;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct DeploymentFlags {
    pub enforce_bip30: bool,
    pub enforce_bip34: bool,
    pub segwit: bool,
    pub script_flags: u32,
}

impl DeploymentFlags {
    pub fn for_block(height: i32, params: &ConsensusParams) -> Self {
        let enforce_bip34 = height >= params.bip34_height;
        let segwit = height >= params.segwit_height;
        let mut script_flags = SCRIPT_VERIFY_P2SH | SCRIPT_VERIFY_DERSIG;
        if enforce_bip34 {
            script_flags |= SCRIPT_VERIFY_CHECKLOCKTIMEVERIFY | SCRIPT_VERIFY_CHECKSEQUENCEVERIFY;
        }
        if segwit {
            script_flags |= SCRIPT_VERIFY_WITNESS;
        }
        Self {
            enforce_bip30: true,
            enforce_bip34,
            segwit,
            script_flags,
        }
    }
}
