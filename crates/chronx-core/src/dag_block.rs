//! DAG vertices ("DAG blocks"): the block-lattice layer below PBFT periods.
//! Each block names one pivot parent plus zero or more tip parents, carries a
//! batch of transaction hashes, and is admissible only once its VDF proof
//! clears the sortition difficulty for the round.

use serde::{Deserialize, Serialize};

use crate::codec::{decode_fixed, decode_u64, Decodable, Encodable, Rlp, RlpStream};
use crate::error::ChronxError;
use crate::types::{Address, Signature, H256};

/// VRF-gated VDF sortition proof bound into a DAG block: the VRF public key
/// and proof that establish the proposer's eligibility and difficulty tier
/// for this round, plus the Wesolowski output `y` and proof `pi` for the VDF
/// the proposer had to actually grind at that difficulty.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct VdfProof {
    pub pk: [u8; 32],
    pub vrf_proof: Vec<u8>,
    pub y: Vec<u8>,
    pub pi: Vec<u8>,
    pub difficulty: u16,
}

impl Encodable for VdfProof {
    fn to_rlp(&self) -> Rlp {
        let mut s = RlpStream::new();
        s.append_bytes(&self.pk);
        s.append_bytes(&self.vrf_proof);
        s.append_bytes(&self.y);
        s.append_bytes(&self.pi);
        s.append_u64(self.difficulty as u64);
        s.finish_rlp()
    }
}

impl Decodable for VdfProof {
    fn from_rlp(rlp: &Rlp) -> Result<Self, ChronxError> {
        let items = rlp.as_list()?;
        if items.len() != 5 {
            return Err(ChronxError::MalformedEncoding("vdf proof: expected 5 fields".into()));
        }
        Ok(VdfProof {
            pk: decode_fixed::<32>(&items[0])?,
            vrf_proof: items[1].as_string()?.to_vec(),
            y: items[2].as_string()?.to_vec(),
            pi: items[3].as_string()?.to_vec(),
            difficulty: decode_u64(&items[4])? as u16,
        })
    }
}

/// A DAG block: `(pivot_hash, level, tips[], trx_hashes[], vdf_proof,
/// signature)`. `level` is derived, never chosen: `1 + max(level(pivot),
/// max(level(tip) for tip in tips))`. The genesis block is the sole exception,
/// with `pivot = H256::ZERO` and `level = 0`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct DagBlock {
    pub pivot: H256,
    pub level: u64,
    pub tips: Vec<H256>,
    pub trx_hashes: Vec<H256>,
    pub vdf_proof: VdfProof,
    pub proposer: Address,
    pub timestamp: i64,
    pub signature: Signature,
}

impl DagBlock {
    /// `true` for the single hand-placed genesis block: no pivot, no tips,
    /// level 0. Every other block must have level ≥ 1 and a real pivot.
    pub fn is_genesis(&self) -> bool {
        self.level == 0 && self.pivot.is_zero() && self.tips.is_empty()
    }

    /// The derived level given its parents' levels, per the `1 + max(...)`
    /// invariant. Callers validating an incoming block compare this against
    /// the claimed `level` field.
    pub fn derive_level(pivot_level: u64, tip_levels: &[u64]) -> u64 {
        let max_tip = tip_levels.iter().copied().max().unwrap_or(0);
        1 + pivot_level.max(max_tip)
    }

    /// Canonical encoding of every field except the signature — the preimage
    /// that the proposer signs and that verifiers recompute to recover the
    /// proposer's address.
    pub fn signing_hash_preimage(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.append_bytes(self.pivot.as_bytes());
        s.append_u64(self.level);
        s.append_list(Rlp::List(self.tips.iter().map(|t| Rlp::String(t.as_bytes().to_vec())).collect()));
        s.append_list(Rlp::List(self.trx_hashes.iter().map(|t| Rlp::String(t.as_bytes().to_vec())).collect()));
        s.append(&self.vdf_proof);
        s.append_bytes(self.proposer.as_bytes());
        s.append_u64(self.timestamp as u64);
        s.out()
    }
}

impl Encodable for DagBlock {
    fn to_rlp(&self) -> Rlp {
        let mut s = RlpStream::new();
        s.append_bytes(self.pivot.as_bytes());
        s.append_u64(self.level);
        s.append_list(Rlp::List(self.tips.iter().map(|t| Rlp::String(t.as_bytes().to_vec())).collect()));
        s.append_list(Rlp::List(self.trx_hashes.iter().map(|t| Rlp::String(t.as_bytes().to_vec())).collect()));
        s.append(&self.vdf_proof);
        s.append_bytes(self.proposer.as_bytes());
        s.append_u64(self.timestamp as u64);
        s.append_bytes(&[self.signature.v]);
        s.append_bytes(&self.signature.r);
        s.append_bytes(&self.signature.s);
        s.finish_rlp()
    }
}

impl Decodable for DagBlock {
    fn from_rlp(rlp: &Rlp) -> Result<Self, ChronxError> {
        let items = rlp.as_list()?;
        if items.len() != 10 {
            return Err(ChronxError::MalformedEncoding(format!(
                "dag block: expected 10 fields, got {}",
                items.len()
            )));
        }
        let pivot = H256::from_bytes(decode_fixed::<32>(&items[0])?);
        let level = decode_u64(&items[1])?;
        let tips = items[2]
            .as_list()?
            .iter()
            .map(|r| decode_fixed::<32>(r).map(H256::from_bytes))
            .collect::<Result<Vec<_>, _>>()?;
        let trx_hashes = items[3]
            .as_list()?
            .iter()
            .map(|r| decode_fixed::<32>(r).map(H256::from_bytes))
            .collect::<Result<Vec<_>, _>>()?;
        let vdf_proof = VdfProof::from_rlp(&items[4])?;
        let proposer = Address::from_bytes(decode_fixed::<20>(&items[5])?);
        let timestamp = decode_u64(&items[6])? as i64;
        let v = *items[7].as_string()?.first().ok_or_else(|| ChronxError::MalformedEncoding("empty v field".into()))?;
        let r = decode_fixed::<32>(&items[8])?;
        let s_field = decode_fixed::<32>(&items[9])?;
        Ok(DagBlock {
            pivot,
            level,
            tips,
            trx_hashes,
            vdf_proof,
            proposer,
            timestamp,
            signature: Signature { v, r, s: s_field },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DagBlock {
        DagBlock {
            pivot: H256::from_bytes([1u8; 32]),
            level: 4,
            tips: vec![H256::from_bytes([2u8; 32]), H256::from_bytes([3u8; 32])],
            trx_hashes: vec![H256::from_bytes([9u8; 32])],
            vdf_proof: VdfProof {
                pk: [5u8; 32],
                vrf_proof: vec![0xee; 80],
                y: vec![0xaa; 4],
                pi: vec![0xbb; 4],
                difficulty: 12,
            },
            proposer: Address::from_bytes([7u8; 20]),
            timestamp: 1_700_000_000,
            signature: Signature { v: 1, r: [0xcc; 32], s: [0xdd; 32] },
        }
    }

    #[test]
    fn round_trips_through_canonical_bytes() {
        let block = sample();
        let bytes = block.to_canonical_bytes();
        let decoded = DagBlock::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(block, decoded);
    }

    #[test]
    fn level_is_one_plus_max_of_parents() {
        assert_eq!(DagBlock::derive_level(4, &[2, 6, 1]), 7);
        assert_eq!(DagBlock::derive_level(0, &[]), 1);
    }

    #[test]
    fn genesis_has_zero_pivot_and_level() {
        let genesis = DagBlock {
            pivot: H256::ZERO,
            level: 0,
            tips: vec![],
            trx_hashes: vec![],
            vdf_proof: VdfProof { pk: [0u8; 32], vrf_proof: vec![], y: vec![], pi: vec![], difficulty: 0 },
            proposer: Address::ZERO,
            timestamp: 0,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        };
        assert!(genesis.is_genesis());
    }
}
