//! PBFT votes and the VRF message they bind to. A vote is eligible to count
//! towards a step's 2/3 threshold only if its VRF output, scaled by the
//! voter's stake weight, clears the step's sortition threshold — see
//! `chronx-crypto::sortition` for the inequality itself.

use serde::{Deserialize, Serialize};

use crate::codec::{decode_fixed, decode_u64, Decodable, Encodable, Rlp, RlpStream};
use crate::error::ChronxError;
use crate::types::{Period, Signature, H256};

/// The four PBFT vote kinds, in the order the original protocol numbers
/// them: a block proposal, a first (soft) vote, a second (cert) vote, and a
/// next-round/polling vote used to carry the chain forward when a round
/// fails to certify.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum PbftVoteType {
    Propose = 0,
    Soft = 1,
    Cert = 2,
    Next = 3,
}

impl PbftVoteType {
    pub fn from_u8(v: u8) -> Result<Self, ChronxError> {
        match v {
            0 => Ok(PbftVoteType::Propose),
            1 => Ok(PbftVoteType::Soft),
            2 => Ok(PbftVoteType::Cert),
            3 => Ok(PbftVoteType::Next),
            other => Err(ChronxError::MalformedEncoding(format!("unknown pbft vote type {other}"))),
        }
    }
}

/// The message a voter's VRF proof is computed over: binds the vote to one
/// block, one vote type, and one (round, step) coordinate so a VRF output
/// cannot be replayed across steps or repurposed for a different vote kind.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VrfPbftMessage {
    pub block_hash: H256,
    pub vote_type: PbftVoteType,
    pub round: u64,
    pub step: u32,
}

impl VrfPbftMessage {
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.append_bytes(self.block_hash.as_bytes());
        s.append_u64(self.vote_type as u64);
        s.append_u64(self.round);
        s.append_u64(self.step as u64);
        s.out()
    }
}

/// A cast vote: `(voter_pk, vrf_proof, vrf_output, block_hash, type, round,
/// step, signature)`. The signature covers every other field including the
/// VRF proof and output, so a vote cannot be detached from its eligibility
/// evidence.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vote {
    pub voter_pk: [u8; 33],
    pub vrf_proof: Vec<u8>,
    pub vrf_output: [u8; 64],
    pub block_hash: H256,
    pub vote_type: PbftVoteType,
    pub round: Period,
    pub step: u32,
    pub signature: Signature,
}

impl Vote {
    pub fn vrf_message(&self) -> VrfPbftMessage {
        VrfPbftMessage {
            block_hash: self.block_hash,
            vote_type: self.vote_type,
            round: self.round,
            step: self.step,
        }
    }

    pub fn signing_hash_preimage(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.append_bytes(&self.voter_pk);
        s.append_bytes(&self.vrf_proof);
        s.append_bytes(&self.vrf_output);
        s.append_bytes(self.block_hash.as_bytes());
        s.append_u64(self.vote_type as u64);
        s.append_u64(self.round);
        s.append_u64(self.step as u64);
        s.out()
    }
}

impl Encodable for Vote {
    fn to_rlp(&self) -> Rlp {
        let mut s = RlpStream::new();
        s.append_bytes(&self.voter_pk);
        s.append_bytes(&self.vrf_proof);
        s.append_bytes(&self.vrf_output);
        s.append_bytes(self.block_hash.as_bytes());
        s.append_u64(self.vote_type as u64);
        s.append_u64(self.round);
        s.append_u64(self.step as u64);
        s.append_bytes(&[self.signature.v]);
        s.append_bytes(&self.signature.r);
        s.append_bytes(&self.signature.s);
        s.finish_rlp()
    }
}

impl Decodable for Vote {
    fn from_rlp(rlp: &Rlp) -> Result<Self, ChronxError> {
        let items = rlp.as_list()?;
        if items.len() != 10 {
            return Err(ChronxError::MalformedEncoding(format!(
                "vote: expected 10 fields, got {}",
                items.len()
            )));
        }
        let voter_pk = decode_fixed::<33>(&items[0])?;
        let vrf_proof = items[1].as_string()?.to_vec();
        let vrf_output = decode_fixed::<64>(&items[2])?;
        let block_hash = H256::from_bytes(decode_fixed::<32>(&items[3])?);
        let vote_type = PbftVoteType::from_u8(decode_u64(&items[4])? as u8)?;
        let round = decode_u64(&items[5])?;
        let step = decode_u64(&items[6])? as u32;
        let v = *items[7].as_string()?.first().ok_or_else(|| ChronxError::MalformedEncoding("empty v field".into()))?;
        let r = decode_fixed::<32>(&items[8])?;
        let s_field = decode_fixed::<32>(&items[9])?;
        Ok(Vote {
            voter_pk,
            vrf_proof,
            vrf_output,
            block_hash,
            vote_type,
            round,
            step,
            signature: Signature { v, r, s: s_field },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vote {
        Vote {
            voter_pk: [1u8; 33],
            vrf_proof: vec![2u8; 80],
            vrf_output: [3u8; 64],
            block_hash: H256::from_bytes([4u8; 32]),
            vote_type: PbftVoteType::Cert,
            round: 10,
            step: 3,
            signature: Signature { v: 0, r: [5u8; 32], s: [6u8; 32] },
        }
    }

    #[test]
    fn round_trips_through_canonical_bytes() {
        let vote = sample();
        let bytes = vote.to_canonical_bytes();
        let decoded = Vote::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(vote, decoded);
    }

    #[test]
    fn vote_type_order_matches_protocol_numbering() {
        assert_eq!(PbftVoteType::Propose as u8, 0);
        assert_eq!(PbftVoteType::Soft as u8, 1);
        assert_eq!(PbftVoteType::Cert as u8, 2);
        assert_eq!(PbftVoteType::Next as u8, 3);
    }

    #[test]
    fn vrf_message_binds_round_and_step() {
        let vote = sample();
        let msg_a = vote.vrf_message();
        let mut vote_b = vote.clone();
        vote_b.step += 1;
        let msg_b = vote_b.vrf_message();
        assert_ne!(msg_a.to_bytes(), msg_b.to_bytes());
    }

    #[test]
    fn rejects_unknown_vote_type() {
        assert!(PbftVoteType::from_u8(9).is_err());
    }
}
