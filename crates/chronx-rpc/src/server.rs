use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use jsonrpsee::core::{async_trait, RpcResult};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObject;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use chronx_core::chain_config::ChainConfig;
use chronx_core::codec::{Decodable, Encodable};
use chronx_core::dag_block::DagBlock;
use chronx_core::transaction::Transaction;
use chronx_core::types::{Address, H256};
use chronx_dag::BlockManager;
use chronx_state::{DagBlockState, StateDb, TransactionStatus};
use chronx_txpool::{Insert, TxPool};

use crate::api::ChronxApiServer;
use crate::types::{
    RpcAccount, RpcChainInfo, RpcDagBlock, RpcGenesisInfo, RpcNetworkInfo, RpcPbftHead,
    RpcTransaction, RpcVersionInfo,
};

const ERR_INVALID_PARAMS: i32 = -32602;
const ERR_INTERNAL: i32 = -32603;
const ERR_QUEUE_FULL: i32 = -32000;

fn rpc_err(code: i32, msg: impl Into<String>) -> ErrorObject<'static> {
    ErrorObject::owned(code, msg.into(), None::<()>)
}

fn parse_address(s: &str) -> Result<Address, ErrorObject<'static>> {
    Address::from_hex(s).map_err(|e| rpc_err(ERR_INVALID_PARAMS, format!("invalid address: {e}")))
}

fn parse_hash(s: &str) -> Result<H256, ErrorObject<'static>> {
    H256::from_hex(s).map_err(|e| rpc_err(ERR_INVALID_PARAMS, format!("invalid hash: {e}")))
}

fn status_str(status: &TransactionStatus) -> (String, Option<u64>) {
    match status {
        TransactionStatus::InQueueUnverified => ("InQueueUnverified".to_string(), None),
        TransactionStatus::InQueueVerified => ("InQueueVerified".to_string(), None),
        TransactionStatus::InBlock => ("InBlock".to_string(), None),
        TransactionStatus::Finalized { period, .. } => ("Finalized".to_string(), Some(*period)),
    }
}

fn dag_state_str(state: DagBlockState) -> String {
    match state {
        DagBlockState::Unverified => "Unverified".to_string(),
        DagBlockState::Verified => "Verified".to_string(),
        DagBlockState::Invalid => "Invalid".to_string(),
    }
}

/// Shared state passed to the RPC server: the store, the transaction pool
/// (shared directly — `TxPool` is its own `Arc<Mutex<..>>`, no channel
/// needed for submission), the in-memory DAG frontier, and this node's
/// resolved chain configuration and network identity.
pub struct RpcServerState {
    pub db: Arc<StateDb>,
    pub pool: Arc<TxPool>,
    pub block_manager: Arc<BlockManager>,
    pub chain_config: ChainConfig,
    pub local_peer_id: String,
    pub peer_multiaddr: Option<String>,
    pub connected_peers: Arc<AtomicUsize>,
}

/// The RPC server implementation.
pub struct RpcServer {
    state: Arc<RpcServerState>,
}

impl RpcServer {
    pub fn new(state: Arc<RpcServerState>) -> Self {
        Self { state }
    }

    /// Start the JSON-RPC server on `addr` with permissive CORS headers. Returns a handle to stop it.
    pub async fn start(self, addr: SocketAddr) -> anyhow::Result<ServerHandle> {
        let cors = CorsLayer::new()
            .allow_methods(Any)
            .allow_origin(Any)
            .allow_headers(Any);

        let server = Server::builder()
            .set_http_middleware(tower::ServiceBuilder::new().layer(cors))
            .build(addr)
            .await?;

        let module = self.into_rpc();
        let handle = server.start(module);
        info!(%addr, "RPC server started");
        Ok(handle)
    }
}

#[async_trait]
impl ChronxApiServer for RpcServer {
    async fn get_account(&self, address: String) -> RpcResult<Option<RpcAccount>> {
        let addr = parse_address(&address)?;
        let acc = self.state.db.get_account(&addr).map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?;
        Ok(acc.map(|a| RpcAccount {
            address: a.address.to_hex(),
            balance: a.balance.to_string(),
            nonce: a.nonce,
        }))
    }

    async fn get_balance(&self, address: String) -> RpcResult<String> {
        let addr = parse_address(&address)?;
        let balance = self
            .state
            .db
            .get_account(&addr)
            .map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?
            .map(|a| a.balance)
            .unwrap_or(0);
        Ok(balance.to_string())
    }

    async fn get_nonce(&self, address: String) -> RpcResult<u64> {
        let addr = parse_address(&address)?;
        let nonce = self
            .state
            .db
            .get_account(&addr)
            .map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?
            .map(|a| a.nonce)
            .unwrap_or(0);
        Ok(nonce)
    }

    async fn send_transaction(&self, tx_hex: String) -> RpcResult<String> {
        let bytes = hex::decode(tx_hex.trim_start_matches("0x"))
            .map_err(|e| rpc_err(ERR_INVALID_PARAMS, format!("invalid hex: {e}")))?;
        let tx = Transaction::from_canonical_bytes(&bytes)
            .map_err(|e| rpc_err(ERR_INVALID_PARAMS, format!("invalid transaction encoding: {e}")))?;

        if tx.chain_id != self.state.chain_config.chain_id {
            return Err(rpc_err(
                ERR_INVALID_PARAMS,
                format!("wrong chain id: expected {}, got {}", self.state.chain_config.chain_id, tx.chain_id),
            )
            .into());
        }

        let hash = chronx_crypto::keccak256(&tx.to_canonical_bytes());
        match self.state.pool.insert(tx, false) {
            Ok(Insert::Accepted | Insert::Duplicate) => Ok(hash.to_hex()),
            Err(chronx_core::error::ChronxError::QueueFull) => {
                Err(rpc_err(ERR_QUEUE_FULL, "transaction pool is full").into())
            }
            Err(e) => Err(rpc_err(ERR_INTERNAL, e.to_string()).into()),
        }
    }

    async fn get_transaction(&self, hash: String) -> RpcResult<Option<RpcTransaction>> {
        let hash = parse_hash(&hash)?;
        let Some(bytes) = self.state.db.get_transaction(&hash).map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))? else {
            return Ok(None);
        };
        let tx = Transaction::from_canonical_bytes(&bytes).map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?;
        let status = self.state.db.get_transaction_status(&hash).map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?;
        let (status, period) = status.as_ref().map(status_str).unwrap_or(("Unknown".to_string(), None));

        Ok(Some(RpcTransaction {
            hash: hash.to_hex(),
            nonce: tx.nonce,
            gas_price: tx.gas_price.to_string(),
            gas_limit: tx.gas_limit,
            to: tx.to.map(|a| a.to_hex()),
            value: tx.value.to_string(),
            data: hex::encode(&tx.data),
            chain_id: tx.chain_id,
            status,
            period,
        }))
    }

    async fn get_dag_block(&self, hash: String) -> RpcResult<Option<RpcDagBlock>> {
        let hash = parse_hash(&hash)?;
        let Some(bytes) = self.state.db.get_dag_block(&hash).map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))? else {
            return Ok(None);
        };
        let block = DagBlock::from_canonical_bytes(&bytes).map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?;
        let state = self
            .state
            .db
            .get_dag_block_state(&hash)
            .map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?
            .map(dag_state_str)
            .unwrap_or_else(|| "Unknown".to_string());
        let period = self
            .state
            .db
            .get_dag_block_period(&hash)
            .map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?
            .map(|(period, _)| period);

        Ok(Some(RpcDagBlock {
            hash: hash.to_hex(),
            pivot: block.pivot.to_hex(),
            level: block.level,
            tips: block.tips.iter().map(H256::to_hex).collect(),
            transactions: block.trx_hashes.iter().map(H256::to_hex).collect(),
            proposer: block.proposer.to_hex(),
            timestamp: block.timestamp,
            state,
            period,
        }))
    }

    async fn get_dag_tips(&self) -> RpcResult<Vec<String>> {
        Ok(vec![self.state.block_manager.pivot_chain_tip().to_hex()])
    }

    async fn get_pbft_chain_size(&self) -> RpcResult<u64> {
        Ok(self.state.db.get_pbft_head().map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?.unwrap_or(0))
    }

    async fn get_pbft_head(&self) -> RpcResult<Option<RpcPbftHead>> {
        let Some(period) = self.state.db.get_pbft_head().map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))? else {
            return Ok(None);
        };
        let Some(bundle) = self.state.db.get_period_bundle(period).map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))? else {
            return Ok(None);
        };
        Ok(Some(RpcPbftHead {
            period,
            anchor_dag_block_hash: bundle.pbft_block.anchor_dag_block_hash.to_hex(),
            beneficiary: bundle.pbft_block.beneficiary.to_hex(),
            timestamp: bundle.pbft_block.timestamp,
        }))
    }

    async fn get_chain_info(&self) -> RpcResult<RpcChainInfo> {
        Ok(RpcChainInfo {
            chain_id: self.state.chain_config.chain_id,
            vdf: self.state.chain_config.vdf,
            pbft: self.state.chain_config.pbft,
        })
    }

    async fn get_genesis_info(&self) -> RpcResult<RpcGenesisInfo> {
        let genesis_hash = self
            .state
            .db
            .dag_blocks_at_level(0)
            .map_err(|e| rpc_err(ERR_INTERNAL, e.to_string()))?
            .into_iter()
            .next()
            .map(|h| h.to_hex());
        Ok(RpcGenesisInfo {
            chain_id: self.state.chain_config.chain_id,
            genesis_hash,
            account_count: self.state.db.count_accounts(),
        })
    }

    async fn get_network_info(&self) -> RpcResult<RpcNetworkInfo> {
        Ok(RpcNetworkInfo {
            peer_id: self.state.local_peer_id.clone(),
            peer_multiaddr: self.state.peer_multiaddr.clone(),
            connected_peers: self.state.connected_peers.load(Ordering::Relaxed),
        })
    }

    async fn get_version(&self) -> RpcResult<RpcVersionInfo> {
        Ok(RpcVersionInfo {
            node_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: "1".to_string(),
        })
    }
}
