//! Predefined per-chain configuration: VDF difficulty parameters and PBFT
//! timing/committee constants. Mirrors the deployed node's
//! `ChainConfig::predefined()` lookup table — one canonical entry per chain
//! id, no overlapping/alternate schema.

use serde::{Deserialize, Serialize};

use crate::constants::{CHAIN_ID_DEVNET, CHAIN_ID_MAINNET, CHAIN_ID_TESTNET, DEFAULT_LAMBDA_BOUND};
use crate::error::ChronxError;

/// VDF sortition parameters, bound into every DAG block's VDF proof.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct VdfConfig {
    pub difficulty_selection: u16,
    pub difficulty_min: u16,
    pub difficulty_max: u16,
    pub difficulty_stale: u16,
    pub lambda_bound: u16,
}

/// PBFT round/step timing and committee sizing.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct PbftConfig {
    pub lambda_ms_min: u32,
    pub committee_size: u32,
    pub dag_blocks_size: u32,
    pub ghost_path_move_back: u32,
}

/// Full per-chain configuration, selected at startup by `chain_id` and
/// overridable only for a `custom` chain (which must supply every field
/// explicitly or fail `ConfigInvalid`).
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub vdf: VdfConfig,
    pub pbft: PbftConfig,
}

impl ChainConfig {
    /// Look up the predefined configuration for a chain id. Returns
    /// `ConfigInvalid` for any id outside the three deployed chains — a
    /// `custom` chain must be constructed explicitly by the caller instead
    /// of going through this lookup.
    pub fn predefined(chain_id: u64) -> Result<Self, ChronxError> {
        match chain_id {
            CHAIN_ID_MAINNET => Ok(ChainConfig {
                chain_id,
                vdf: VdfConfig {
                    difficulty_selection: 5,
                    difficulty_min: 15,
                    difficulty_max: 20,
                    difficulty_stale: 20,
                    lambda_bound: DEFAULT_LAMBDA_BOUND,
                },
                pbft: PbftConfig {
                    lambda_ms_min: 2_000,
                    committee_size: 30,
                    dag_blocks_size: 100,
                    ghost_path_move_back: 3,
                },
            }),
            CHAIN_ID_TESTNET => Ok(ChainConfig {
                chain_id,
                vdf: VdfConfig {
                    difficulty_selection: 5,
                    difficulty_min: 10,
                    difficulty_max: 16,
                    difficulty_stale: 16,
                    lambda_bound: DEFAULT_LAMBDA_BOUND,
                },
                pbft: PbftConfig {
                    lambda_ms_min: 1_500,
                    committee_size: 17,
                    dag_blocks_size: 100,
                    ghost_path_move_back: 3,
                },
            }),
            CHAIN_ID_DEVNET => Ok(ChainConfig {
                chain_id,
                vdf: VdfConfig {
                    difficulty_selection: 255,
                    difficulty_min: 1,
                    difficulty_max: 3,
                    difficulty_stale: 3,
                    lambda_bound: DEFAULT_LAMBDA_BOUND,
                },
                pbft: PbftConfig {
                    lambda_ms_min: 500,
                    committee_size: 3,
                    dag_blocks_size: 50,
                    ghost_path_move_back: 1,
                },
            }),
            other => Err(ChronxError::ConfigInvalid(format!(
                "no predefined chain config for chain id {other}; supply an explicit custom chain config"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predefined_chains_resolve() {
        assert!(ChainConfig::predefined(CHAIN_ID_MAINNET).is_ok());
        assert!(ChainConfig::predefined(CHAIN_ID_TESTNET).is_ok());
        assert!(ChainConfig::predefined(CHAIN_ID_DEVNET).is_ok());
    }

    #[test]
    fn unknown_chain_id_rejected() {
        assert!(ChainConfig::predefined(999).is_err());
    }
}
