//! Genesis file format: SPEC_FULL.md §6.C. A plain JSON document naming the
//! chain id, initial account allocations, and the DPOS/VDF parameters that
//! are not already fixed by the chain's predefined configuration. Hardforks
//! are never taken from the file — they are always the built-in schedule for
//! the selected chain.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use chronx_core::chain_config::ChainConfig;
use chronx_core::types::{Address, Balance, Period};

/// One funded account at genesis.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GenesisAccount {
    pub address: Address,
    pub balance: Balance,
}

/// DPOS parameters not carried by `ChainConfig`: the delay before a stake
/// delegation takes effect, and the block-count used to annualize yield.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DposConfig {
    pub delegation_delay: Period,
    pub blocks_per_year: u64,
}

/// Hard-fork activation periods, keyed by name. Always replaced at load time
/// with the built-in defaults for the selected chain id — whatever a genesis
/// file supplies here is ignored, per §6.C.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hardforks {
    pub activations: BTreeMap<String, Period>,
}

/// The genesis file as loaded from disk: chain id, allocations, DPOS
/// parameters, and (for a non-predefined chain id) the explicit
/// `ChainConfig` that would otherwise come from `ChainConfig::predefined`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenesisParams {
    pub chain_id: u64,
    pub accounts: Vec<GenesisAccount>,
    pub dpos: DposConfig,
    /// Required only when `chain_id` has no predefined entry.
    pub chain_config: Option<ChainConfig>,
    /// Read but never trusted verbatim — see `Hardforks`.
    #[serde(default)]
    pub hardforks: Hardforks,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let params = GenesisParams {
            chain_id: 843,
            accounts: vec![GenesisAccount { address: Address::ZERO, balance: 1_000 }],
            dpos: DposConfig { delegation_delay: 5, blocks_per_year: 63_072_000 },
            chain_config: None,
            hardforks: Hardforks::default(),
        };
        let json = serde_json::to_string(&params).unwrap();
        let back: GenesisParams = serde_json::from_str(&json).unwrap();
        assert_eq!(back.chain_id, 843);
        assert_eq!(back.accounts.len(), 1);
    }
}
