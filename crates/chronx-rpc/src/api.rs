use jsonrpsee::core::RpcResult;
use jsonrpsee::proc_macros::rpc;

use crate::types::{
    RpcAccount, RpcChainInfo, RpcDagBlock, RpcGenesisInfo, RpcNetworkInfo, RpcPbftHead,
    RpcTransaction, RpcVersionInfo,
};

/// ChronX JSON-RPC 2.0 API definition.
///
/// All method names are prefixed with "chronx_" via `namespace = "chronx"`.
/// This is a thin read/write adapter over the store and transaction pool —
/// no consensus logic runs on this path.
#[rpc(server, namespace = "chronx")]
pub trait ChronxApi {
    /// Get account balance and nonce by hex address.
    #[method(name = "getAccount")]
    async fn get_account(&self, address: String) -> RpcResult<Option<RpcAccount>>;

    /// Get balance (decimal string) by hex address.
    #[method(name = "getBalance")]
    async fn get_balance(&self, address: String) -> RpcResult<String>;

    /// Get the next nonce an account should use.
    #[method(name = "getNonce")]
    async fn get_nonce(&self, address: String) -> RpcResult<u64>;

    /// Submit a signed transaction. `tx_hex` is hex-encoded canonical bytes.
    /// Goes straight to the pool's insert path; returns the transaction hash
    /// hex on success, or a `QueueFull`/validation error.
    #[method(name = "sendTransaction")]
    async fn send_transaction(&self, tx_hex: String) -> RpcResult<String>;

    /// Look up a transaction by hash hex.
    #[method(name = "getTransaction")]
    async fn get_transaction(&self, hash: String) -> RpcResult<Option<RpcTransaction>>;

    /// Look up a DAG block by hash hex.
    #[method(name = "getDagBlock")]
    async fn get_dag_block(&self, hash: String) -> RpcResult<Option<RpcDagBlock>>;

    /// Current DAG tip hashes (blocks above the highest fully-anchored level).
    #[method(name = "getDagTips")]
    async fn get_dag_tips(&self) -> RpcResult<Vec<String>>;

    /// Current finalized PBFT chain size (highest committed period).
    #[method(name = "getPbftChainSize")]
    async fn get_pbft_chain_size(&self) -> RpcResult<u64>;

    /// Summary of the current PBFT head (most recently committed period).
    #[method(name = "getPbftHead")]
    async fn get_pbft_head(&self) -> RpcResult<Option<RpcPbftHead>>;

    /// Resolved chain configuration (VDF/PBFT parameters) for this node's chain.
    #[method(name = "getChainInfo")]
    async fn get_chain_info(&self) -> RpcResult<RpcChainInfo>;

    /// Genesis summary: chain id, genesis hash, funded account count.
    #[method(name = "getGenesisInfo")]
    async fn get_genesis_info(&self) -> RpcResult<RpcGenesisInfo>;

    /// This node's P2P identity: peer id, multiaddress, connected peer count.
    #[method(name = "getNetworkInfo")]
    async fn get_network_info(&self) -> RpcResult<RpcNetworkInfo>;

    /// Node and protocol version information.
    #[method(name = "getVersion")]
    async fn get_version(&self) -> RpcResult<RpcVersionInfo>;
}
