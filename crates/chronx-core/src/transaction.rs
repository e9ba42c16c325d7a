use serde::{Deserialize, Serialize};

use crate::codec::{decode_fixed, decode_u128, decode_u64, Decodable, Encodable, Rlp, RlpStream};
use crate::error::ChronxError;
use crate::types::{Address, Balance, Nonce, Signature, H256};

/// A signed transaction: `(nonce, gas_price, gas_limit, to?, value, data,
/// chain_id, v, r, s)`. The transaction hash (`H256`) is the Keccak of the
/// canonical encoding of every field (signature included) — unlike the DAG
/// block signature, the transaction's own identity covers the signature
/// because two distinct signatures over the same body are two distinct
/// transactions for pool/store bookkeeping purposes.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transaction {
    pub nonce: Nonce,
    pub gas_price: Balance,
    pub gas_limit: u64,
    pub to: Option<Address>,
    pub value: Balance,
    pub data: Vec<u8>,
    pub chain_id: u64,
    pub signature: Signature,
}

impl Transaction {
    /// The digest that is signed: the canonical encoding of every field
    /// except the signature itself, with the signature slots held at
    /// `(chain_id, 0, 0)` per EIP-155 convention so chain id is bound into
    /// the signed message without being a separate unsigned field.
    pub fn signing_hash_preimage(&self) -> Vec<u8> {
        let mut s = RlpStream::new();
        s.append_u64(self.nonce);
        s.append_u128(self.gas_price);
        s.append_u64(self.gas_limit);
        match &self.to {
            Some(addr) => s.append_bytes(addr.as_bytes()),
            None => s.append_bytes(&[]),
        };
        s.append_u128(self.value);
        s.append_bytes(&self.data);
        s.append_u64(self.chain_id);
        s.append_u64(0);
        s.append_u64(0);
        s.out()
    }
}

impl Encodable for Transaction {
    fn to_rlp(&self) -> Rlp {
        let mut s = RlpStream::new();
        s.append_u64(self.nonce);
        s.append_u128(self.gas_price);
        s.append_u64(self.gas_limit);
        match &self.to {
            Some(addr) => s.append_bytes(addr.as_bytes()),
            None => s.append_bytes(&[]),
        };
        s.append_u128(self.value);
        s.append_bytes(&self.data);
        s.append_u64(self.chain_id);
        s.append_bytes(&[self.signature.v]);
        s.append_bytes(&self.signature.r);
        s.append_bytes(&self.signature.s);
        s.finish_rlp()
    }
}

impl Decodable for Transaction {
    fn from_rlp(rlp: &Rlp) -> Result<Self, ChronxError> {
        let items = rlp.as_list()?;
        if items.len() != 10 {
            return Err(ChronxError::MalformedEncoding(format!(
                "transaction: expected 10 fields, got {}",
                items.len()
            )));
        }
        let nonce = decode_u64(&items[0])?;
        let gas_price = decode_u128(&items[1])?;
        let gas_limit = decode_u64(&items[2])?;
        let to_bytes = items[3].as_string()?;
        let to = if to_bytes.is_empty() {
            None
        } else {
            Some(Address::from_bytes(decode_fixed::<20>(&items[3])?))
        };
        let value = decode_u128(&items[4])?;
        let data = items[5].as_string()?.to_vec();
        let chain_id = decode_u64(&items[6])?;
        let v_bytes = items[7].as_string()?;
        let v = *v_bytes.first().ok_or_else(|| ChronxError::MalformedEncoding("empty v field".into()))?;
        let r = decode_fixed::<32>(&items[8])?;
        let s = decode_fixed::<32>(&items[9])?;
        Ok(Transaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
            chain_id,
            signature: Signature { v, r, s },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        Transaction {
            nonce: 7,
            gas_price: 1_000,
            gas_limit: 21_000,
            to: Some(Address::from_bytes([0x11; 20])),
            value: 42,
            data: vec![1, 2, 3],
            chain_id: 842,
            signature: Signature { v: 1, r: [0xaa; 32], s: [0xbb; 32] },
        }
    }

    #[test]
    fn round_trips_through_canonical_bytes() {
        let tx = sample();
        let bytes = tx.to_canonical_bytes();
        let decoded = Transaction::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(tx, decoded);
    }

    #[test]
    fn contract_creation_has_empty_to() {
        let mut tx = sample();
        tx.to = None;
        let bytes = tx.to_canonical_bytes();
        let decoded = Transaction::from_canonical_bytes(&bytes).unwrap();
        assert_eq!(decoded.to, None);
    }

    #[test]
    fn signing_preimage_zeroes_signature_slots_and_keeps_chain_id() {
        let tx = sample();
        let preimage = tx.signing_hash_preimage();
        // Changing only the signature must not change the signing preimage.
        let mut tx2 = tx.clone();
        tx2.signature = Signature { v: 0, r: [0u8; 32], s: [0u8; 32] };
        assert_eq!(preimage, tx2.signing_hash_preimage());
    }
}

/// Placeholder used by callers that need a zero hash before a transaction is
/// hashed by the crypto crate (which owns Keccak-256).
pub const UNHASHED: H256 = H256::ZERO;
