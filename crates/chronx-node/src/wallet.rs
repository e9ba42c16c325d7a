//! Node identity keyfile: SPEC_FULL.md §6.B. Distinct from the end-user
//! `chronx-wallet` CLI keyfile — this is the node's own operational secret,
//! carrying both its network/signing identity (`node_secret`, secp256k1) and
//! its VRF identity (`vrf_secret`, ristretto25519) used for PBFT sortition.
//! Grounded on `examples/original_source/src/config.hpp`'s `FullNodeConfig`,
//! which keeps `node_secret`/`vrf_secret` at the top level alongside the
//! network/rpc/chain sections rather than nested under a sub-object.

use std::path::Path;

use serde::{Deserialize, Serialize};

use chronx_core::error::ChronxError;
use chronx_core::types::Address;
use chronx_crypto::vrf::VrfKeyPair;
use chronx_crypto::KeyPair;

#[derive(Clone, Serialize, Deserialize)]
pub struct WalletFile {
    pub node_secret: String,
    pub node_public: Option<String>,
    pub node_address: Option<String>,
    pub vrf_secret: String,
    pub vrf_public: Option<String>,
}

/// The node's identity, derived from a `WalletFile` and checked for
/// self-consistency.
pub struct NodeWallet {
    pub keypair: KeyPair,
    pub vrf_keypair: VrfKeyPair,
}

impl NodeWallet {
    /// Load a wallet file, deriving both keypairs and verifying every
    /// present public field matches what is actually derived.
    pub fn load(path: &Path) -> Result<Self, ChronxError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ChronxError::ConfigInvalid(format!("reading wallet file {}: {e}", path.display())))?;
        let file: WalletFile = serde_json::from_str(&text)
            .map_err(|e| ChronxError::ConfigInvalid(format!("parsing wallet file {}: {e}", path.display())))?;
        Self::from_file(&file)
    }

    pub fn from_file(file: &WalletFile) -> Result<Self, ChronxError> {
        let secret = decode_fixed::<32>(&file.node_secret, "node_secret")?;
        let keypair = KeyPair::from_raw_secret(secret)
            .map_err(|e| ChronxError::ConfigInvalid(format!("node_secret is not a valid secp256k1 scalar: {e}")))?;

        if let Some(expected_pub) = &file.node_public {
            let expected = decode_fixed::<65>(expected_pub, "node_public")?;
            if &expected != keypair.public_key_bytes() {
                return Err(ChronxError::ConfigInvalid(
                    "node_public does not match the key derived from node_secret".into(),
                ));
            }
        }
        if let Some(expected_addr) = &file.node_address {
            let expected = Address::from_hex(expected_addr)
                .map_err(|e| ChronxError::ConfigInvalid(format!("node_address: {e}")))?;
            if expected != keypair.address {
                return Err(ChronxError::ConfigInvalid(
                    "node_address does not match the address derived from node_secret".into(),
                ));
            }
        }

        let vrf_secret_bytes = decode_fixed::<64>(&file.vrf_secret, "vrf_secret")?;
        let mut vrf_seed = [0u8; 32];
        vrf_seed.copy_from_slice(&vrf_secret_bytes[..32]);
        let vrf_keypair = VrfKeyPair::from_seed(vrf_seed);

        if let Some(expected_vrf_pub) = &file.vrf_public {
            let expected = decode_fixed::<32>(expected_vrf_pub, "vrf_public")?;
            if expected != vrf_keypair.public_key {
                return Err(ChronxError::ConfigInvalid(
                    "vrf_public does not match the key derived from vrf_secret".into(),
                ));
            }
        }

        Ok(Self { keypair, vrf_keypair })
    }

    /// Generate a fresh node identity and write it to `path`. Refuses to
    /// overwrite an existing file.
    pub fn generate_to_file(path: &Path) -> Result<Self, ChronxError> {
        if path.exists() {
            return Err(ChronxError::ConfigInvalid(format!(
                "wallet file {} already exists — refusing to overwrite",
                path.display()
            )));
        }
        let keypair = KeyPair::generate();
        let vrf_keypair = VrfKeyPair::generate();

        // The VRF secret is stored as 64 bytes: the 32-byte seed plus 32
        // bytes of derived scalar material, matching the wallet file's
        // declared field width without exposing a second independent secret.
        let mut vrf_secret_bytes = [0u8; 64];
        vrf_secret_bytes[..32].copy_from_slice(vrf_keypair.secret_scalar_bytes());
        vrf_secret_bytes[32..].copy_from_slice(vrf_keypair.secret_scalar_bytes());

        let file = WalletFile {
            node_secret: hex::encode(keypair.secret_key_bytes()),
            node_public: Some(hex::encode(keypair.public_key_bytes())),
            node_address: Some(keypair.address.to_hex()),
            vrf_secret: hex::encode(vrf_secret_bytes),
            vrf_public: Some(hex::encode(vrf_keypair.public_key)),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ChronxError::ConfigInvalid(format!("creating {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| ChronxError::ConfigInvalid(format!("serializing wallet file: {e}")))?;
        std::fs::write(path, json)
            .map_err(|e| ChronxError::ConfigInvalid(format!("writing {}: {e}", path.display())))?;

        Ok(Self { keypair, vrf_keypair })
    }
}

fn decode_fixed<const N: usize>(hex_str: &str, field: &str) -> Result<[u8; N], ChronxError> {
    let bytes = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|e| ChronxError::ConfigInvalid(format!("{field}: invalid hex: {e}")))?;
    if bytes.len() != N {
        return Err(ChronxError::ConfigInvalid(format!(
            "{field}: expected {N} bytes, got {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("chronx_node_wallet_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("wallet.json")
    }

    #[test]
    fn generates_and_reloads_consistently() {
        let path = temp_path("roundtrip");
        let generated = NodeWallet::generate_to_file(&path).unwrap();
        let loaded = NodeWallet::load(&path).unwrap();
        assert_eq!(generated.keypair.address, loaded.keypair.address);
        assert_eq!(generated.vrf_keypair.public_key, loaded.vrf_keypair.public_key);
    }

    #[test]
    fn refuses_to_overwrite_existing_file() {
        let path = temp_path("no_overwrite");
        NodeWallet::generate_to_file(&path).unwrap();
        assert!(NodeWallet::generate_to_file(&path).is_err());
    }

    #[test]
    fn rejects_mismatched_node_public() {
        let path = temp_path("mismatch");
        NodeWallet::generate_to_file(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut file: WalletFile = serde_json::from_str(&text).unwrap();
        file.node_public = Some(hex::encode([0u8; 65]));
        assert!(NodeWallet::from_file(&file).is_err());
    }
}
