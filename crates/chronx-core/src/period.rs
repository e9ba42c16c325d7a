//! The PBFT layer sitting above the DAG: a `PbftBlock` finalizes one DAG
//! anchor per period, and a `PeriodBundle` is the self-contained unit synced
//! between peers and replayed by the executor — the PBFT block, its
//! certifying votes, and every DAG block/transaction the anchor subsumes.

use serde::{Deserialize, Serialize};

use crate::codec::{decode_fixed, decode_u64, Decodable, Encodable, Rlp, RlpStream};
use crate::dag_block::DagBlock;
use crate::error::ChronxError;
use crate::transaction::Transaction;
use crate::types::{Address, Period, Signature, Timestamp, H256};
use crate::vote::Vote;

/// `(prev_pbft_hash, anchor_dag_block_hash, period, timestamp, beneficiary,
/// signature)`. The proposer is whichever committee member's turn it is for
/// this period, chosen by the same VRF sortition that gates votes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PbftBlock {
    pub prev_pbft_hash: H256,
    pub anchor_dag_block_hash: H256,
    pub period: Period,
    pub timestamp: Timestamp,
    pub beneficiary: Address,
    pub signature: Signature,
}

impl PbftBlock {
    pub fn signing_hash_preimage(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.append_bytes(self.prev_pbft_hash.as_bytes());
        s.append_bytes(self.anchor_dag_block_hash.as_bytes());
        s.append_u64(self.period);
        s.append_u64(self.timestamp as u64);
        s.append_bytes(self.beneficiary.as_bytes());
        s.out()
    }
}

impl Encodable for PbftBlock {
    fn to_rlp(&self) -> Rlp {
        let mut s = RlpStream::new();
        s.append_bytes(self.prev_pbft_hash.as_bytes());
        s.append_bytes(self.anchor_dag_block_hash.as_bytes());
        s.append_u64(self.period);
        s.append_u64(self.timestamp as u64);
        s.append_bytes(self.beneficiary.as_bytes());
        s.append_bytes(&[self.signature.v]);
        s.append_bytes(&self.signature.r);
        s.append_bytes(&self.signature.s);
        s.finish_rlp()
    }
}

impl Decodable for PbftBlock {
    fn from_rlp(rlp: &Rlp) -> Result<Self, ChronxError> {
        let items = rlp.as_list()?;
        if items.len() != 8 {
            return Err(ChronxError::MalformedEncoding(format!(
                "pbft block: expected 8 fields, got {}",
                items.len()
            )));
        }
        let prev_pbft_hash = H256::from_bytes(decode_fixed::<32>(&items[0])?);
        let anchor_dag_block_hash = H256::from_bytes(decode_fixed::<32>(&items[1])?);
        let period = decode_u64(&items[2])?;
        let timestamp = decode_u64(&items[3])? as i64;
        let beneficiary = Address::from_bytes(decode_fixed::<20>(&items[4])?);
        let v = *items[5].as_string()?.first().ok_or_else(|| ChronxError::MalformedEncoding("empty v field".into()))?;
        let r = decode_fixed::<32>(&items[6])?;
        let s_field = decode_fixed::<32>(&items[7])?;
        Ok(PbftBlock {
            prev_pbft_hash,
            anchor_dag_block_hash,
            period,
            timestamp,
            beneficiary,
            signature: Signature { v, r, s: s_field },
        })
    }
}

/// The full data committed at one period: the PBFT block, the cert votes
/// that certified its anchor, and the DAG blocks (in anchor-ordered,
/// deterministic order) and transactions the anchor subsumes. This is the
/// unit the executor replays and the unit peers exchange during sync.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeriodBundle {
    pub pbft_block: PbftBlock,
    pub cert_votes: Vec<Vote>,
    pub dag_blocks: Vec<DagBlock>,
    pub transactions: Vec<Transaction>,
}

impl Encodable for PeriodBundle {
    fn to_rlp(&self) -> Rlp {
        let mut s = RlpStream::new();
        s.append(&self.pbft_block);
        s.append_list_of(&self.cert_votes);
        s.append_list_of(&self.dag_blocks);
        s.append_list_of(&self.transactions);
        s.finish_rlp()
    }
}

impl Decodable for PeriodBundle {
    fn from_rlp(rlp: &Rlp) -> Result<Self, ChronxError> {
        let items = rlp.as_list()?;
        if items.len() != 4 {
            return Err(ChronxError::MalformedEncoding(format!(
                "period bundle: expected 4 fields, got {}",
                items.len()
            )));
        }
        let pbft_block = PbftBlock::from_rlp(&items[0])?;
        let cert_votes = items[1].as_list()?.iter().map(Vote::from_rlp).collect::<Result<Vec<_>, _>>()?;
        let dag_blocks = items[2].as_list()?.iter().map(DagBlock::from_rlp).collect::<Result<Vec<_>, _>>()?;
        let transactions = items[3].as_list()?.iter().map(Transaction::from_rlp).collect::<Result<Vec<_>, _>>()?;
        Ok(PeriodBundle { pbft_block, cert_votes, dag_blocks, transactions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vote::PbftVoteType;

    fn sample_pbft_block() -> PbftBlock {
        PbftBlock {
            prev_pbft_hash: H256::from_bytes([1u8; 32]),
            anchor_dag_block_hash: H256::from_bytes([2u8; 32]),
            period: 5,
            timestamp: 1_700_000_000,
            beneficiary: Address::from_bytes([3u8; 20]),
            signature: Signature { v: 1, r: [4u8; 32], s: [5u8; 32] },
        }
    }

    #[test]
    fn pbft_block_round_trips() {
        let block = sample_pbft_block();
        let bytes = block.to_canonical_bytes();
        assert_eq!(PbftBlock::from_canonical_bytes(&bytes).unwrap(), block);
    }

    #[test]
    fn period_bundle_round_trips_with_empty_sections() {
        let bundle = PeriodBundle {
            pbft_block: sample_pbft_block(),
            cert_votes: vec![],
            dag_blocks: vec![],
            transactions: vec![],
        };
        let bytes = bundle.to_canonical_bytes();
        assert_eq!(PeriodBundle::from_canonical_bytes(&bytes).unwrap(), bundle);
    }

    #[test]
    fn period_bundle_round_trips_with_cert_vote() {
        let vote = Vote {
            voter_pk: [9u8; 33],
            vrf_proof: vec![1, 2, 3],
            vrf_output: [8u8; 64],
            block_hash: H256::from_bytes([2u8; 32]),
            vote_type: PbftVoteType::Cert,
            round: 5,
            step: 2,
            signature: Signature { v: 0, r: [1u8; 32], s: [2u8; 32] },
        };
        let bundle = PeriodBundle {
            pbft_block: sample_pbft_block(),
            cert_votes: vec![vote],
            dag_blocks: vec![],
            transactions: vec![],
        };
        let bytes = bundle.to_canonical_bytes();
        assert_eq!(PeriodBundle::from_canonical_bytes(&bytes).unwrap(), bundle);
    }
}
