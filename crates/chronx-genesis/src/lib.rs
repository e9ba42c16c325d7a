//! chronx-genesis
//!
//! Builds the ChronX genesis state from scratch, writing directly into a
//! fresh `StateDb` without going through the executor (genesis allocations
//! have no sender, no signature, no nonce — they are the founding document).
//!
//! A genesis file (§6.C) names the chain id, the initial account
//! allocations, and the DPOS parameters. The VDF/PBFT tuning for a
//! predefined chain always comes from `ChainConfig::predefined`; a custom
//! chain must supply its own `ChainConfig` explicitly. The hardfork schedule
//! is never read from the file — it is always the chain's built-in
//! schedule, overwriting whatever the file happens to contain.

pub mod params;

pub use params::{DposConfig, GenesisAccount, GenesisParams, Hardforks};

use std::collections::{BTreeMap, HashSet};

use chronx_core::chain_config::ChainConfig;
use chronx_core::constants::{CHAIN_ID_DEVNET, CHAIN_ID_MAINNET, CHAIN_ID_TESTNET};
use chronx_core::codec::Encodable;
use chronx_core::dag_block::{DagBlock, VdfProof};
use chronx_core::error::ChronxError;
use chronx_core::types::{Address, Signature, H256};
use chronx_state::{Account, DagBlockState, StateDb};
use tracing::info;

/// The built-in hardfork schedule for a chain id. DPOS is active from
/// period 0 on every deployed chain; a custom chain starts with no
/// hardforks scheduled until its operator defines one.
pub fn default_hardforks(chain_id: u64) -> Hardforks {
    let mut activations = BTreeMap::new();
    if matches!(chain_id, CHAIN_ID_MAINNET | CHAIN_ID_TESTNET | CHAIN_ID_DEVNET) {
        activations.insert("dpos".to_string(), 0);
    }
    Hardforks { activations }
}

/// Resolve the chain configuration for a genesis file: the predefined
/// lookup for a deployed chain, or the file's explicit override for a
/// custom one. Fails `ConfigInvalid` if neither is available.
pub fn resolve_chain_config(params: &GenesisParams) -> Result<ChainConfig, ChronxError> {
    match ChainConfig::predefined(params.chain_id) {
        Ok(cfg) => Ok(cfg),
        Err(_) => params.chain_config.ok_or_else(|| {
            ChronxError::ConfigInvalid(format!(
                "chain id {} has no predefined configuration; genesis file must supply chain_config explicitly",
                params.chain_id
            ))
        }),
    }
}

/// The single hand-placed DAG block at level 0: no pivot, no tips, no VDF
/// proof to verify. Every node on a given chain derives the same hash for
/// it from the genesis file alone.
pub fn genesis_dag_block() -> DagBlock {
    DagBlock {
        pivot: H256::ZERO,
        level: 0,
        tips: Vec::new(),
        trx_hashes: Vec::new(),
        vdf_proof: VdfProof { pk: [0u8; 32], vrf_proof: Vec::new(), difficulty: 0, y: Vec::new(), pi: Vec::new() },
        proposer: Address::ZERO,
        timestamp: 0,
        signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
    }
}

/// Apply a genesis file to a freshly opened `StateDb`: write every funded
/// account, plant the genesis DAG block, and return the resolved chain
/// configuration for the caller to carry forward. Idempotent to call twice
/// against the same allocations, but callers should only invoke this once
/// per fresh store — see `is_fresh`.
pub fn apply_genesis(db: &StateDb, params: &GenesisParams) -> Result<ChainConfig, ChronxError> {
    let chain_config = resolve_chain_config(params)?;

    let mut seen = HashSet::with_capacity(params.accounts.len());
    for account in &params.accounts {
        if !seen.insert(account.address) {
            return Err(ChronxError::ConfigInvalid(format!(
                "duplicate genesis allocation for address {}",
                account.address
            )));
        }
    }

    for alloc in &params.accounts {
        let account = Account { address: alloc.address, balance: alloc.balance, nonce: 0 };
        db.put_account(&account)?;
    }

    let genesis = genesis_dag_block();
    let hash = chronx_crypto::keccak256(&genesis.to_canonical_bytes());
    db.put_dag_block(&hash, genesis.level, &genesis.to_canonical_bytes())?;
    db.put_dag_block_state(&hash, DagBlockState::Verified)?;
    db.put_dag_block_period(&hash, 0, 0)?;

    info!(
        chain_id = params.chain_id,
        accounts = params.accounts.len(),
        genesis_hash = %hash,
        "applied genesis state"
    );

    Ok(chain_config)
}

/// `true` once any genesis-era state has already been written — callers use
/// this to skip `apply_genesis` on a restart against an existing store.
pub fn is_fresh(db: &StateDb) -> bool {
    db.count_accounts() == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use params::DposConfig;

    fn temp_db(name: &str) -> StateDb {
        let dir = std::env::temp_dir().join(format!("chronx_genesis_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        StateDb::open(&dir).expect("open temp db")
    }

    fn sample_params() -> GenesisParams {
        GenesisParams {
            chain_id: CHAIN_ID_DEVNET,
            accounts: vec![
                GenesisAccount { address: Address::from_bytes([1u8; 20]), balance: 1_000_000 },
                GenesisAccount { address: Address::from_bytes([2u8; 20]), balance: 500_000 },
            ],
            dpos: DposConfig { delegation_delay: 5, blocks_per_year: 63_072_000 },
            chain_config: None,
            hardforks: Hardforks::default(),
        }
    }

    #[test]
    fn resolves_predefined_chain_without_explicit_override() {
        let params = sample_params();
        let cfg = resolve_chain_config(&params).unwrap();
        assert_eq!(cfg.chain_id, CHAIN_ID_DEVNET);
    }

    #[test]
    fn custom_chain_without_override_is_rejected() {
        let mut params = sample_params();
        params.chain_id = 99_999;
        assert!(resolve_chain_config(&params).is_err());
    }

    #[test]
    fn apply_genesis_writes_every_allocation() {
        let db = temp_db("apply_genesis");
        let params = sample_params();
        apply_genesis(&db, &params).unwrap();

        assert_eq!(db.count_accounts(), 2);
        let acc = db.get_account(&Address::from_bytes([1u8; 20])).unwrap().unwrap();
        assert_eq!(acc.balance, 1_000_000);
        assert!(!is_fresh(&db));
    }

    #[test]
    fn rejects_duplicate_allocations() {
        let db = temp_db("rejects_duplicate");
        let mut params = sample_params();
        params.accounts.push(GenesisAccount { address: Address::from_bytes([1u8; 20]), balance: 7 });
        assert!(apply_genesis(&db, &params).is_err());
    }

    #[test]
    fn mainnet_and_testnet_activate_dpos_at_genesis() {
        assert_eq!(default_hardforks(CHAIN_ID_MAINNET).activations.get("dpos"), Some(&0));
        assert_eq!(default_hardforks(CHAIN_ID_TESTNET).activations.get("dpos"), Some(&0));
        assert!(default_hardforks(99_999).activations.is_empty());
    }
}
