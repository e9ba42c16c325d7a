use chronx_core::types::{Address, Signature};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::hash::address_from_uncompressed_pubkey;

/// A ChronX keypair: secp256k1 ECDSA signing key plus its derived address.
///
/// The secret scalar is held in a `Zeroizing<[u8; 32]>` so it is wiped from
/// memory on drop; only `secret_key_bytes()` exposes it, and only for wallet
/// persistence.
#[derive(Serialize, Deserialize)]
pub struct KeyPair {
    pub address: Address,
    #[serde(with = "serde_pubkey")]
    public_key: [u8; 65],
    secret_key: Zeroizing<[u8; 32]>,
}

impl KeyPair {
    /// Generate a fresh secp256k1 keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        Self::from_signing_key(signing_key)
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        let encoded = verifying_key.to_encoded_point(false);
        let mut public_key = [0u8; 65];
        public_key.copy_from_slice(encoded.as_bytes());
        let address = address_from_uncompressed_pubkey(&public_key);
        let secret_key = Zeroizing::new(signing_key.to_bytes().into());
        Self { address, public_key, secret_key }
    }

    /// Restore a KeyPair from a raw 32-byte secret scalar (e.g. loaded from
    /// a wallet file).
    pub fn from_raw_secret(secret: [u8; 32]) -> Result<Self, k256::ecdsa::Error> {
        let signing_key = SigningKey::from_bytes((&secret).into())?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn public_key_bytes(&self) -> &[u8; 65] {
        &self.public_key
    }

    /// SEC1-compressed form of the public key, as carried in a PBFT `Vote`.
    pub fn compressed_public_key(&self) -> [u8; 33] {
        let verifying_key = VerifyingKey::from_sec1_bytes(&self.public_key[..])
            .expect("stored public key is always a valid point");
        let encoded = verifying_key.to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(encoded.as_bytes());
        out
    }

    pub fn secret_key_bytes(&self) -> &[u8; 32] {
        &self.secret_key
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign_prehash(&self, digest: &[u8; 32]) -> Signature {
        let signing_key = SigningKey::from_bytes(self.secret_key.as_ref().into())
            .expect("stored secret key is always a valid scalar");
        let (sig, recid): (EcdsaSignature, RecoveryId) = signing_key
            .sign_prehash_recoverable(digest)
            .expect("ECDSA signing over a valid digest is infallible");
        let bytes = sig.to_bytes();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);
        Signature { v: recid.to_byte(), r, s }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyPair {{ address: {:?} }}", self.address)
    }
}

/// Recover the signer's uncompressed public key from a digest + signature.
pub fn recover_pubkey(digest: &[u8; 32], sig: &Signature) -> Result<[u8; 65], k256::ecdsa::Error> {
    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&sig.r);
    sig_bytes[32..].copy_from_slice(&sig.s);
    let ecdsa_sig = EcdsaSignature::from_bytes((&sig_bytes).into())?;
    let recid = RecoveryId::from_byte(sig.v).ok_or(k256::ecdsa::Error::new())?;
    let verifying_key = VerifyingKey::recover_from_prehash(digest, &ecdsa_sig, recid)?;
    let encoded = verifying_key.to_encoded_point(false);
    let mut out = [0u8; 65];
    out.copy_from_slice(encoded.as_bytes());
    Ok(out)
}

/// Verify that `sig` over `digest` recovers to `expected_address`.
pub fn verify_signature(digest: &[u8; 32], sig: &Signature, expected_address: Address) -> bool {
    match recover_pubkey(digest, sig) {
        Ok(pubkey) => address_from_uncompressed_pubkey(&pubkey) == expected_address,
        Err(_) => false,
    }
}

mod serde_pubkey {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 65], s: S) -> Result<S::Ok, S::Error> {
        bytes.to_vec().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 65], D::Error> {
        let v = Vec::<u8>::deserialize(d)?;
        v.try_into().map_err(|_| serde::de::Error::custom("expected 65-byte public key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_recover_round_trips_to_same_address() {
        let kp = KeyPair::generate();
        let digest = [7u8; 32];
        let sig = kp.sign_prehash(&digest);
        assert!(verify_signature(&digest, &sig, kp.address));
    }

    #[test]
    fn wrong_digest_fails_verification() {
        let kp = KeyPair::generate();
        let sig = kp.sign_prehash(&[1u8; 32]);
        assert!(!verify_signature(&[2u8; 32], &sig, kp.address));
    }

    #[test]
    fn from_raw_secret_reproduces_same_address() {
        let kp = KeyPair::generate();
        let secret = *kp.secret_key_bytes();
        let kp2 = KeyPair::from_raw_secret(secret).unwrap();
        assert_eq!(kp.address, kp2.address);
    }

    #[test]
    fn compressed_pubkey_decompresses_to_same_address() {
        let kp = KeyPair::generate();
        let compressed = kp.compressed_public_key();
        let addr = crate::hash::address_from_compressed_pubkey(&compressed).unwrap();
        assert_eq!(addr, kp.address);
    }
}
