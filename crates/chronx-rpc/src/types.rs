use serde::{Deserialize, Serialize};

use chronx_core::chain_config::{PbftConfig, VdfConfig};

/// Account state returned by `chronx_getAccount`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcAccount {
    pub address: String,
    /// u128 as a decimal string — avoids precision loss in JSON number decoding.
    pub balance: String,
    pub nonce: u64,
}

/// A transaction and its pool/finality status, returned by `chronx_getTransaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcTransaction {
    pub hash: String,
    pub nonce: u64,
    pub gas_price: String,
    pub gas_limit: u64,
    pub to: Option<String>,
    pub value: String,
    pub data: String,
    pub chain_id: u64,
    pub status: String,
    pub period: Option<u64>,
}

/// A DAG block summary returned by `chronx_getDagBlock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcDagBlock {
    pub hash: String,
    pub pivot: String,
    pub level: u64,
    pub tips: Vec<String>,
    pub transactions: Vec<String>,
    pub proposer: String,
    pub timestamp: i64,
    pub state: String,
    pub period: Option<u64>,
}

/// Current PBFT chain position, returned by `chronx_getPbftHead`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcPbftHead {
    pub period: u64,
    pub anchor_dag_block_hash: String,
    pub beneficiary: String,
    pub timestamp: i64,
}

/// Resolved per-chain configuration, returned by `chronx_getChainInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcChainInfo {
    pub chain_id: u64,
    pub vdf: VdfConfig,
    pub pbft: PbftConfig,
}

/// Genesis summary returned by `chronx_getGenesisInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcGenesisInfo {
    pub chain_id: u64,
    pub genesis_hash: Option<String>,
    pub account_count: u64,
}

/// P2P network identity returned by `chronx_getNetworkInfo`. `peer_multiaddr`
/// is the full libp2p multiaddress (including `/p2p/<PeerId>`) other nodes
/// pass as a bootstrap peer to connect to this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcNetworkInfo {
    pub peer_id: String,
    pub peer_multiaddr: Option<String>,
    pub connected_peers: usize,
}

/// Node / protocol version information returned by `chronx_getVersion`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcVersionInfo {
    pub node_version: String,
    pub protocol_version: String,
}
