//! Node configuration: SPEC_FULL.md §6.A. A single JSON document with
//! `network`/`db`/`logging`/`chain` sections plus a handful of top-level
//! scalars, overlaid with CLI flags for the options an operator adjusts
//! per run. Grounded on `examples/original_source/src/config.hpp`'s
//! `FullNodeConfig`/`NetworkConfig`/`RpcConfig`/`TestParamsConfig` field set.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use chronx_core::error::ChronxError;
use chronx_core::types::{Address, Period};

/// Minimum pool size accepted regardless of what an operator configures —
/// below this the verifier/packet-processor threads would starve on an
/// effectively empty pool.
pub const MIN_POOL_SIZE: usize = 100;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub listen_addr: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    #[serde(default = "default_packet_topic")]
    pub packet_topic: String,
    pub network_id: u64,
    #[serde(default = "default_ideal_peer_count")]
    pub ideal_peer_count: usize,
    #[serde(default = "default_max_peer_count")]
    pub max_peer_count: usize,
    #[serde(default = "default_deep_threshold")]
    pub deep_sync_threshold: Period,
    #[serde(default = "default_blacklist_timeout")]
    pub peer_blacklist_timeout_secs: u64,
}

fn default_protocol_version() -> String {
    "/chronx/1.0.0".to_string()
}
fn default_packet_topic() -> String {
    "chronx-packets".to_string()
}
fn default_ideal_peer_count() -> usize {
    16
}
fn default_max_peer_count() -> usize {
    64
}
fn default_deep_threshold() -> Period {
    chronx_core::constants::DEEP_SYNC_THRESHOLD_PERIODS
}
fn default_blacklist_timeout() -> u64 {
    chronx_core::constants::PEER_BLACKLIST_TIMEOUT_SECS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbConfig {
    pub path: PathBuf,
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_periods: Period,
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: usize,
    /// When set, the node reverts its live store to this period once at
    /// startup before doing anything else, then clears the field in memory.
    #[serde(default)]
    pub revert_to_period: Option<Period>,
}

fn default_snapshot_interval() -> Period {
    chronx_core::constants::DEFAULT_SNAPSHOT_INTERVAL_PERIODS
}
fn default_max_snapshots() -> usize {
    chronx_core::constants::DEFAULT_MAX_SNAPSHOTS
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Per-target verbosity overrides, e.g. `{"chronx_p2p": "debug"}`.
    #[serde(default)]
    pub targets: std::collections::BTreeMap<String, String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), targets: Default::default() }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    pub http_port: Option<u16>,
    pub ws_port: Option<u16>,
    #[serde(default = "default_rpc_threads")]
    pub threads_num: u8,
}

fn default_rpc_threads() -> u8 {
    4
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self { http_port: Some(8545), ws_port: None, threads_num: default_rpc_threads() }
    }
}

/// A validator's fixed sortition identity: its account address and the VRF
/// public key its votes must verify against. Stands in for a full DPOS
/// stake/registration ledger (see DESIGN.md) — the committee is read from
/// config/genesis rather than derived from on-chain delegations.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidatorConfig {
    pub address: Address,
    pub vrf_public_key: [u8; 32],
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChainSection {
    pub chain_id: u64,
    /// Required only when `chain_id` has no predefined entry.
    #[serde(default)]
    pub genesis_file: Option<PathBuf>,
    /// Number of periods ahead of the node's own `pbft_head` a vote is still
    /// accepted for. Validated against the genesis file's
    /// `dpos.delegation_delay` once genesis is loaded.
    #[serde(default = "default_vote_accepting_periods")]
    pub vote_accepting_periods: Period,
    #[serde(default = "default_packet_threads")]
    pub packets_processing_threads: usize,
    pub validators: Vec<ValidatorConfig>,
}

fn default_vote_accepting_periods() -> Period {
    chronx_core::constants::VOTE_ACCEPT_AHEAD_PERIODS
}
fn default_packet_threads() -> usize {
    4
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    pub network: NetworkConfig,
    pub db: DbConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub is_light_node: bool,
    #[serde(default)]
    pub light_node_history: Period,
    #[serde(default = "default_pool_size")]
    pub transactions_pool_size: usize,
    #[serde(default)]
    pub rpc: RpcConfig,
    pub chain: ChainSection,
    /// Path to the node's own wallet keyfile (SPEC_FULL.md §6.B).
    pub wallet_file: PathBuf,
}

fn default_pool_size() -> usize {
    chronx_core::constants::POOL_DROP_SIZE as usize
}

impl NodeConfig {
    /// Load and structurally validate a config file. Does not reach into
    /// genesis — `validate_against_delegation_delay` handles the one
    /// validation rule that needs the genesis file's DPOS parameters.
    pub fn load(path: &Path) -> Result<Self, ChronxError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ChronxError::ConfigInvalid(format!("reading {}: {e}", path.display())))?;
        let config: NodeConfig = serde_json::from_str(&text)
            .map_err(|e| ChronxError::ConfigInvalid(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChronxError> {
        if self.transactions_pool_size < MIN_POOL_SIZE {
            return Err(ChronxError::ConfigInvalid(format!(
                "transactions_pool_size {} below minimum {}",
                self.transactions_pool_size, MIN_POOL_SIZE
            )));
        }
        if !(3..=30).contains(&self.chain.packets_processing_threads) {
            return Err(ChronxError::ConfigInvalid(format!(
                "packets_processing_threads {} outside [3, 30]",
                self.chain.packets_processing_threads
            )));
        }
        if self.rpc.http_port.is_none() && self.rpc.ws_port.is_none() {
            return Err(ChronxError::ConfigInvalid(
                "rpc: at least one of http_port/ws_port must be set".into(),
            ));
        }
        if !(0 < self.rpc.threads_num && self.rpc.threads_num <= 10) {
            return Err(ChronxError::ConfigInvalid(format!(
                "rpc.threads_num {} outside (0, 10]",
                self.rpc.threads_num
            )));
        }
        if self.chain.validators.is_empty() {
            return Err(ChronxError::ConfigInvalid("chain.validators must not be empty".into()));
        }
        Ok(())
    }

    /// The one validation rule that depends on the genesis file, checked
    /// once genesis parameters are loaded (SPEC_FULL.md §6.A).
    pub fn validate_against_delegation_delay(&self, delegation_delay: Period) -> Result<(), ChronxError> {
        if self.chain.vote_accepting_periods > delegation_delay {
            return Err(ChronxError::ConfigInvalid(format!(
                "vote_accepting_periods {} exceeds delegation_delay {}",
                self.chain.vote_accepting_periods, delegation_delay
            )));
        }
        Ok(())
    }

    /// Apply the subset of fields an operator is expected to override
    /// per-run from the CLI, per SPEC_FULL.md §6.A.
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(addr) = &overrides.p2p_listen {
            self.network.listen_addr = addr.clone();
        }
        if !overrides.bootstrap.is_empty() {
            self.network.bootstrap_peers = overrides.bootstrap.clone();
        }
        if let Some(dir) = &overrides.data_dir {
            self.db.path = dir.clone();
        }
        if let Some(port) = overrides.rpc_http_port {
            self.rpc.http_port = Some(port);
        }
        if let Some(chain_id) = overrides.chain_id {
            self.chain.chain_id = chain_id;
        }
        if let Some(genesis) = &overrides.genesis_file {
            self.chain.genesis_file = Some(genesis.clone());
        }
        if let Some(wallet) = &overrides.wallet_file {
            self.wallet_file = wallet.clone();
        }
    }
}

/// CLI-sourced overlay values. Built from `clap::Args` in `main.rs` and
/// applied on top of whatever the config file specifies.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub data_dir: Option<PathBuf>,
    pub p2p_listen: Option<String>,
    pub bootstrap: Vec<String>,
    pub rpc_http_port: Option<u16>,
    pub chain_id: Option<u64>,
    pub genesis_file: Option<PathBuf>,
    pub wallet_file: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NodeConfig {
        NodeConfig {
            network: NetworkConfig {
                listen_addr: "/ip4/0.0.0.0/tcp/7777".into(),
                bootstrap_peers: vec![],
                protocol_version: default_protocol_version(),
                packet_topic: default_packet_topic(),
                network_id: 843,
                ideal_peer_count: default_ideal_peer_count(),
                max_peer_count: default_max_peer_count(),
                deep_sync_threshold: default_deep_threshold(),
                peer_blacklist_timeout_secs: default_blacklist_timeout(),
            },
            db: DbConfig {
                path: PathBuf::from("/tmp/chronx-devnet"),
                snapshot_interval_periods: default_snapshot_interval(),
                max_snapshots: default_max_snapshots(),
                revert_to_period: None,
            },
            logging: LoggingConfig::default(),
            is_light_node: false,
            light_node_history: 0,
            transactions_pool_size: default_pool_size(),
            rpc: RpcConfig::default(),
            chain: ChainSection {
                chain_id: 843,
                genesis_file: None,
                vote_accepting_periods: 1,
                packets_processing_threads: 4,
                validators: vec![ValidatorConfig { address: Address::ZERO, vrf_public_key: [0u8; 32] }],
            },
            wallet_file: PathBuf::from("/tmp/chronx-devnet/wallet.json"),
        }
    }

    #[test]
    fn round_trips_through_json() {
        let config = sample();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.network.network_id, 843);
        back.validate().unwrap();
    }

    #[test]
    fn rejects_undersized_pool() {
        let mut config = sample();
        config.transactions_pool_size = 1;
        assert!(matches!(config.validate(), Err(ChronxError::ConfigInvalid(_))));
    }

    #[test]
    fn rejects_packet_threads_out_of_range() {
        let mut config = sample();
        config.chain.packets_processing_threads = 1;
        assert!(config.validate().is_err());
        config.chain.packets_processing_threads = 31;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_rpc_with_no_ports() {
        let mut config = sample();
        config.rpc.http_port = None;
        config.rpc.ws_port = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_vote_accepting_periods_beyond_delegation_delay() {
        let config = sample();
        assert!(config.validate_against_delegation_delay(0).is_err());
        assert!(config.validate_against_delegation_delay(1).is_ok());
    }

    #[test]
    fn cli_overrides_apply_on_top_of_file_config() {
        let mut config = sample();
        let overrides = CliOverrides {
            data_dir: Some(PathBuf::from("/var/chronx")),
            rpc_http_port: Some(9000),
            ..Default::default()
        };
        config.apply_overrides(&overrides);
        assert_eq!(config.db.path, PathBuf::from("/var/chronx"));
        assert_eq!(config.rpc.http_port, Some(9000));
    }
}
