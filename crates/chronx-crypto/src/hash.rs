use chronx_core::types::{Address, H256};
use sha3::{Digest, Keccak256};

/// Keccak-256 of arbitrary bytes. The node's single hash function: used for
/// transaction ids, DAG block ids, vote ids, and address derivation.
pub fn keccak256(data: &[u8]) -> H256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let out = hasher.finalize();
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&out);
    H256::from_bytes(bytes)
}

/// Derive an address from an uncompressed secp256k1 public key (65 bytes,
/// leading `0x04` tag stripped before hashing): the low 20 bytes of
/// Keccak(pubkey).
pub fn address_from_uncompressed_pubkey(pubkey_65: &[u8]) -> Address {
    debug_assert_eq!(pubkey_65.len(), 65, "expected uncompressed secp256k1 public key");
    let digest = keccak256(&pubkey_65[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&digest.as_bytes()[12..]);
    Address::from_bytes(bytes)
}

/// Hash a transaction's canonical bytes into its identifying `H256`.
pub fn tx_hash(canonical_bytes: &[u8]) -> H256 {
    keccak256(canonical_bytes)
}

/// Derive an address from a SEC1-compressed secp256k1 public key (33 bytes,
/// as carried in a `Vote`), by decompressing it first.
pub fn address_from_compressed_pubkey(pubkey_33: &[u8; 33]) -> Result<Address, k256::ecdsa::Error> {
    use k256::ecdsa::VerifyingKey;
    use k256::elliptic_curve::sec1::ToEncodedPoint;

    let verifying_key = VerifyingKey::from_sec1_bytes(pubkey_33)?;
    let encoded = verifying_key.to_encoded_point(false);
    let mut uncompressed = [0u8; 65];
    uncompressed.copy_from_slice(encoded.as_bytes());
    Ok(address_from_uncompressed_pubkey(&uncompressed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_is_deterministic() {
        assert_eq!(keccak256(b"chronx"), keccak256(b"chronx"));
        assert_ne!(keccak256(b"chronx"), keccak256(b"chronx2"));
    }

    #[test]
    fn address_derivation_takes_low_20_bytes() {
        let pubkey = [0x04u8; 65];
        let addr = address_from_uncompressed_pubkey(&pubkey);
        let digest = keccak256(&pubkey[1..]);
        assert_eq!(addr.as_bytes(), &digest.as_bytes()[12..]);
    }
}
