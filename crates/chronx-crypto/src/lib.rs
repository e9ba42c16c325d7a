pub mod hash;
pub mod keypair;
pub mod sortition;
pub mod vdf;
pub mod vrf;

pub use hash::{address_from_compressed_pubkey, address_from_uncompressed_pubkey, keccak256, tx_hash};
pub use keypair::{recover_pubkey, verify_signature, KeyPair};
pub use vdf::{select_difficulty, VdfProof};
pub use vrf::VrfKeyPair;
