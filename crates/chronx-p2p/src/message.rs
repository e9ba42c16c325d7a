//! The wire packet vocabulary exchanged between ChronX nodes. Push packets
//! ride gossipsub; pull packets ride a request-response protocol — see
//! `network.rs`. Grounded on the original capability's packet table
//! (`taraxa_capability.hpp`'s `SubprotocolPacketType`), replacing this
//! crate's prior single-vertex `P2pMessage` enum.

use serde::{Deserialize, Serialize};

use chronx_core::dag_block::DagBlock;
use chronx_core::period::PeriodBundle;
use chronx_core::transaction::Transaction;
use chronx_core::types::{Period, H256};
use chronx_core::vote::Vote;

/// A peer's status: its network identity, genesis, and sync position. Every
/// other packet from a peer is ignored until this has been exchanged and
/// `net_id`/`genesis_hash` match the local node's.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Status {
    pub net_id: u64,
    pub genesis_hash: H256,
    pub protocol_version: String,
    pub dag_level: u64,
    pub pbft_size: Period,
    pub round: Period,
}

/// A freshly proposed DAG block, together with any transactions it
/// references that the receiver might not have seen yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBlock {
    pub dag_block: DagBlock,
    pub transactions: Vec<Transaction>,
}

/// Lightweight announcement of a DAG block's existence, used to avoid
/// re-sending the full block to peers who may already have it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewBlockHash {
    pub dag_block_hash: H256,
}

/// Request for the full body of a DAG block previously announced by hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetNewBlock {
    pub dag_block_hash: H256,
}

/// A contiguous run of DAG blocks at or above some level, requested during
/// light sync and also usable unsolicited as a push when serving a
/// known-stale peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DagSyncRequest {
    pub from_level: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DagSyncResponse {
    pub dag_blocks: Vec<DagBlock>,
}

/// A batch of raw transactions gossiped to the network, not yet known to be
/// included in any DAG block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TransactionBatch {
    pub transactions: Vec<Transaction>,
}

/// One PBFT vote (propose/soft/cert/next), gossiped as it is cast.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VotePacket {
    pub vote: Vote,
}

/// Request for period bundles starting at `from_period`, used during deep
/// sync to catch up on decided periods the requester is missing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetPbftSync {
    pub from_period: Period,
}

/// One or more period bundles in response to `GetPbftSync`. `is_final`
/// marks the last message in a sync response, telling the requester it has
/// caught up to what the responder had at request time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PbftSync {
    pub bundles: Vec<PeriodBundle>,
    pub is_final: bool,
}

/// Request for the current set of next-votes a peer holds for `round`, used
/// to recover from a stalled round without waiting out the full gossip
/// fanout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetNextVotes {
    pub round: Period,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NextVotes {
    pub round: Period,
    pub votes: Vec<Vote>,
}

/// The full packet vocabulary. `Status` gates all the others: a handler must
/// reject any non-`Status` packet from a peer whose `Status` has not been
/// recorded yet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Packet {
    Status(Status),
    NewBlock(NewBlock),
    NewBlockHash(NewBlockHash),
    GetNewBlock(GetNewBlock),
    DagSyncRequest(DagSyncRequest),
    DagSyncResponse(DagSyncResponse),
    Transaction(TransactionBatch),
    Vote(VotePacket),
    GetPbftSync(GetPbftSync),
    PbftSync(PbftSync),
    GetNextVotes(GetNextVotes),
    NextVotes(NextVotes),
}

impl Packet {
    /// Push packets are broadcast over gossipsub; everything else is a
    /// pull packet carried over the request-response protocol.
    pub fn is_push(&self) -> bool {
        matches!(
            self,
            Packet::NewBlock(_)
                | Packet::NewBlockHash(_)
                | Packet::Transaction(_)
                | Packet::Vote(_)
                | Packet::NextVotes(_)
        )
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("Packet serialization is infallible")
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, bincode::Error> {
        bincode::deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_status() -> Status {
        Status {
            net_id: 1,
            genesis_hash: H256::from_bytes([1u8; 32]),
            protocol_version: "/chronx/1.0.0".into(),
            dag_level: 10,
            pbft_size: 3,
            round: 1,
        }
    }

    fn sample_vote() -> Vote {
        use chronx_core::types::Signature;
        use chronx_core::vote::PbftVoteType;
        Vote {
            voter_pk: [1u8; 33],
            vrf_proof: vec![0u8; 80],
            vrf_output: [0u8; 64],
            block_hash: H256::from_bytes([2u8; 32]),
            vote_type: PbftVoteType::Soft,
            round: 1,
            step: 2,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        }
    }

    #[test]
    fn status_round_trips_through_bytes() {
        let packet = Packet::Status(sample_status());
        let bytes = packet.to_bytes();
        let decoded = Packet::from_bytes(&bytes).unwrap();
        assert_eq!(packet, decoded);
    }

    #[test]
    fn push_packets_are_classified_correctly() {
        assert!(Packet::Vote(VotePacket { vote: sample_vote() }).is_push());
        assert!(!Packet::Status(sample_status()).is_push());
        assert!(!Packet::GetPbftSync(GetPbftSync { from_period: 1 }).is_push());
    }
}
