//! Verifiable random function over ristretto25519, used for DAG block
//! proposal eligibility and PBFT vote/proposer sortition. Shaped like
//! ECVRF-EDWARDS25519-SHA512: a fixed-size 80-byte proof (one compressed
//! group element, a 16-byte challenge, a 32-byte response scalar) and a
//! 64-byte pseudorandom output derived from the proof.

use curve25519_dalek::constants::RISTRETTO_BASEPOINT_POINT;
use curve25519_dalek::ristretto::{CompressedRistretto, RistrettoPoint};
use curve25519_dalek::scalar::Scalar;
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

use chronx_core::error::ChronxError;

pub const PROOF_LEN: usize = 80;
pub const OUTPUT_LEN: usize = 64;

pub struct VrfKeyPair {
    pub public_key: [u8; 32],
    secret_scalar: Zeroizing<[u8; 32]>,
}

impl VrfKeyPair {
    pub fn generate() -> Self {
        let mut seed = [0u8; 32];
        use rand::RngCore;
        rand::rngs::OsRng.fill_bytes(&mut seed);
        Self::from_seed(seed)
    }

    pub fn from_seed(seed: [u8; 32]) -> Self {
        let scalar = Scalar::from_bytes_mod_order(hash_to_scalar_bytes(&seed));
        let public_point = RISTRETTO_BASEPOINT_POINT * scalar;
        Self {
            public_key: public_point.compress().to_bytes(),
            secret_scalar: Zeroizing::new(scalar.to_bytes()),
        }
    }

    /// The raw 32-byte scalar, for wallet-file persistence only.
    pub fn secret_scalar_bytes(&self) -> &[u8; 32] {
        &self.secret_scalar
    }

    /// Deterministically prove `alpha`, returning an 80-byte proof and its
    /// bound 64-byte output. Determinism (no RNG in the nonce) means the
    /// same key proving the same message always yields the same output,
    /// which is what makes VRF output usable as an eligibility coin-flip
    /// that every verifier can recompute.
    pub fn prove(&self, alpha: &[u8]) -> ([u8; PROOF_LEN], [u8; OUTPUT_LEN]) {
        let x = Scalar::from_bytes_mod_order(*self.secret_scalar);
        let h = hash_to_point(&self.public_key, alpha);
        let gamma = h * x;

        let k = nonce_scalar(&self.secret_scalar, &h);
        let g_k = RISTRETTO_BASEPOINT_POINT * k;
        let h_k = h * k;
        let c = challenge_scalar(&g_k, &h_k, &gamma, &h);
        let s = k - c * x;

        let mut proof = [0u8; PROOF_LEN];
        proof[..32].copy_from_slice(&gamma.compress().to_bytes());
        proof[32..48].copy_from_slice(&c.to_bytes()[..16]);
        proof[48..80].copy_from_slice(&s.to_bytes());

        let output = proof_to_output(&gamma);
        (proof, output)
    }
}

/// Verify `proof` against `public_key` and `alpha`, returning the bound
/// output on success.
pub fn verify(public_key: &[u8; 32], alpha: &[u8], proof: &[u8]) -> Result<[u8; OUTPUT_LEN], ChronxError> {
    if proof.len() != PROOF_LEN {
        return Err(ChronxError::InvalidProof(format!("vrf proof must be {PROOF_LEN} bytes, got {}", proof.len())));
    }
    let pk_point = CompressedRistretto::from_slice(public_key)
        .map_err(|_| ChronxError::InvalidProof("malformed vrf public key encoding".into()))?
        .decompress()
        .ok_or_else(|| ChronxError::InvalidProof("vrf public key is not a valid point".into()))?;

    let gamma = CompressedRistretto::from_slice(&proof[..32])
        .map_err(|_| ChronxError::InvalidProof("malformed gamma encoding".into()))?
        .decompress()
        .ok_or_else(|| ChronxError::InvalidProof("gamma is not a valid point".into()))?;

    let mut c_bytes = [0u8; 32];
    c_bytes[..16].copy_from_slice(&proof[32..48]);
    let c = Scalar::from_bytes_mod_order(c_bytes);

    let mut s_bytes = [0u8; 32];
    s_bytes.copy_from_slice(&proof[48..80]);
    let s = Scalar::from_bytes_mod_order(s_bytes);

    let h = hash_to_point(public_key, alpha);
    let u = RISTRETTO_BASEPOINT_POINT * s + pk_point * c;
    let v = h * s + gamma * c;
    let c_prime = challenge_scalar(&u, &v, &gamma, &h);

    if c_prime.to_bytes()[..16] != c.to_bytes()[..16] {
        return Err(ChronxError::InvalidProof("vrf proof failed verification".into()));
    }
    Ok(proof_to_output(&gamma))
}

fn hash_to_point(public_key: &[u8; 32], alpha: &[u8]) -> RistrettoPoint {
    let mut hasher = Sha512::new();
    hasher.update(b"chronx-vrf-h2c");
    hasher.update(public_key);
    hasher.update(alpha);
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    RistrettoPoint::from_uniform_bytes(&wide)
}

fn nonce_scalar(secret_scalar: &[u8; 32], h: &RistrettoPoint) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(b"chronx-vrf-nonce");
    hasher.update(secret_scalar);
    hasher.update(h.compress().as_bytes());
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}

fn challenge_scalar(a: &RistrettoPoint, b: &RistrettoPoint, gamma: &RistrettoPoint, h: &RistrettoPoint) -> Scalar {
    let mut hasher = Sha512::new();
    hasher.update(b"chronx-vrf-challenge");
    hasher.update(a.compress().as_bytes());
    hasher.update(b.compress().as_bytes());
    hasher.update(gamma.compress().as_bytes());
    hasher.update(h.compress().as_bytes());
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide)
}

fn proof_to_output(gamma: &RistrettoPoint) -> [u8; OUTPUT_LEN] {
    let mut hasher = Sha512::new();
    hasher.update(b"chronx-vrf-output");
    hasher.update(gamma.compress().as_bytes());
    let digest = hasher.finalize();
    let mut out = [0u8; OUTPUT_LEN];
    out.copy_from_slice(&digest);
    out
}

fn hash_to_scalar_bytes(seed: &[u8; 32]) -> [u8; 32] {
    let mut hasher = Sha512::new();
    hasher.update(b"chronx-vrf-seed");
    hasher.update(seed);
    let digest = hasher.finalize();
    let mut wide = [0u8; 64];
    wide.copy_from_slice(&digest);
    Scalar::from_bytes_mod_order_wide(&wide).to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prove_then_verify_recovers_same_output() {
        let kp = VrfKeyPair::generate();
        let (proof, output) = kp.prove(b"round=1,step=2");
        let verified = verify(&kp.public_key, b"round=1,step=2", &proof).unwrap();
        assert_eq!(verified, output);
    }

    #[test]
    fn different_alpha_changes_output() {
        let kp = VrfKeyPair::generate();
        let (_, out_a) = kp.prove(b"alpha-a");
        let (_, out_b) = kp.prove(b"alpha-b");
        assert_ne!(out_a, out_b);
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let kp = VrfKeyPair::generate();
        let (mut proof, _) = kp.prove(b"alpha");
        proof[50] ^= 0xff;
        assert!(verify(&kp.public_key, b"alpha", &proof).is_err());
    }

    #[test]
    fn prove_is_deterministic() {
        let kp = VrfKeyPair::generate();
        let (proof_a, out_a) = kp.prove(b"same-input");
        let (proof_b, out_b) = kp.prove(b"same-input");
        assert_eq!(proof_a, proof_b);
        assert_eq!(out_a, out_b);
    }
}
