//! chronx-rpc
//!
//! JSON-RPC 2.0 server for ChronX nodes (§6.E). Thin read/write adapter over
//! the store, the in-memory DAG frontier, and the transaction pool — no
//! consensus logic runs on this path.
//!
//! Namespace: "chronx"
//! Methods:
//!   chronx_getAccount        — balance + nonce by address
//!   chronx_getBalance        — balance only
//!   chronx_getNonce          — nonce only
//!   chronx_sendTransaction   — submit a signed transaction to the pool
//!   chronx_getTransaction    — look up a transaction by hash
//!   chronx_getDagBlock       — look up a DAG block by hash
//!   chronx_getDagTips        — current DAG frontier
//!   chronx_getPbftChainSize  — highest committed period
//!   chronx_getPbftHead       — summary of the most recently committed period
//!   chronx_getChainInfo      — resolved VDF/PBFT chain configuration
//!   chronx_getGenesisInfo    — chain id, genesis hash, funded account count
//!   chronx_getNetworkInfo    — peer id, multiaddress, connected peer count
//!   chronx_getVersion        — node/protocol version

pub mod api;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerState};
pub use types::{
    RpcAccount, RpcChainInfo, RpcDagBlock, RpcGenesisInfo, RpcNetworkInfo, RpcPbftHead,
    RpcTransaction, RpcVersionInfo,
};
