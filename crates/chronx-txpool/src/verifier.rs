//! A bounded pool of worker threads that drain the pool's `unverified` queue,
//! checking signature validity and chain id, then promote or reject each
//! transaction. Mirrors the DAG block manager's verifier-thread-pool shape,
//! applied to transactions instead of DAG blocks.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::pool::{sender_address, TxPool};

pub struct VerifierPool {
    handles: Vec<JoinHandle<()>>,
}

impl VerifierPool {
    /// Spawn `worker_count` threads, each pulling from `pool` until stopped.
    pub fn spawn(pool: Arc<TxPool>, worker_count: usize, expected_chain_id: u64) -> Self {
        let handles = (0..worker_count.max(1))
            .map(|idx| {
                let pool = Arc::clone(&pool);
                thread::Builder::new()
                    .name(format!("txpool-verifier-{idx}"))
                    .spawn(move || verify_loop(pool, expected_chain_id))
                    .expect("spawn verifier thread")
            })
            .collect();
        Self { handles }
    }

    /// Stop the pool's queue and join every worker thread.
    pub fn join(self, pool: &TxPool) {
        pool.stop();
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn verify_loop(pool: Arc<TxPool>, expected_chain_id: u64) {
    while let Some(tx) = pool.pop_unverified() {
        if tx.chain_id != expected_chain_id {
            tracing::debug!(chain_id = tx.chain_id, "rejecting transaction: wrong chain id");
            continue;
        }
        match sender_address(&tx) {
            Ok(_) => {
                if let Err(err) = pool.mark_verified(&tx) {
                    tracing::warn!(error = %err, "failed to promote verified transaction");
                }
            }
            Err(err) => {
                tracing::debug!(error = %err, "rejecting transaction: bad signature");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronx_core::types::{Address, Nonce, Signature};
    use chronx_core::transaction::Transaction;
    use chronx_crypto::KeyPair;
    use chronx_state::StateDb;

    fn temp_db(name: &str) -> Arc<StateDb> {
        let dir = std::env::temp_dir().join(format!("chronx_txpool_verifier_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(StateDb::open(&dir).expect("open temp db"))
    }

    fn signed_tx(kp: &KeyPair, nonce: Nonce, chain_id: u64) -> Transaction {
        let mut tx = Transaction {
            nonce,
            gas_price: 1,
            gas_limit: 21_000,
            to: Some(Address::ZERO),
            value: 0,
            data: vec![],
            chain_id,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        };
        let digest = chronx_crypto::keccak256(&tx.signing_hash_preimage());
        tx.signature = kp.sign_prehash(digest.as_bytes());
        tx
    }

    #[test]
    fn verifier_promotes_valid_transaction_to_verified_queue() {
        let pool = TxPool::new(temp_db("promote"), 1000, 2000);
        let kp = KeyPair::generate();
        let tx = signed_tx(&kp, 0, 841);
        pool.insert(tx, false).unwrap();

        let workers = VerifierPool::spawn(Arc::clone(&pool), 1, 841);
        let mut packed = Vec::new();
        for _ in 0..1000 {
            packed = pool.pack(10).unwrap();
            if !packed.is_empty() {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(1));
        }
        workers.join(&pool);
        assert_eq!(packed.len(), 1);
    }
}
