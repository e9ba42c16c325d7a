//! chronx-p2p
//!
//! libp2p networking layer for ChronX nodes.
//!
//! GossipSub broadcasts push packets (new DAG blocks, transactions, votes,
//! next-votes) to all connected peers. A request-response protocol carries
//! pull packets (DAG/PBFT sync requests) to one specific peer at a time.
//! Kademlia DHT handles peer discovery and bootstrap. Identify and Ping
//! maintain connection metadata and liveness.

pub mod config;
pub mod message;
pub mod network;
pub mod peer;
pub mod sync;

pub use config::P2pConfig;
pub use message::Packet;
pub use network::{Outbound, P2pHandle, P2pNetwork};
pub use peer::{PeerRegistry, PeerState, SyncPosition};
pub use sync::{Blacklist, SyncMode, SyncState};
