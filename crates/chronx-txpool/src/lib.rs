pub mod pool;
pub mod verifier;

pub use pool::{sender_address, Insert, TxPool};
pub use verifier::VerifierPool;
