//! The transaction pool: an `unverified` FIFO queue awaiting signature
//! verification and a `verified` table keyed by sender then nonce, ready for
//! packing into a proposal. All state also persists to the `transactions`/
//! `transaction_status` columns so a restart doesn't lose queued work.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use chronx_core::codec::Encodable;
use chronx_core::error::ChronxError;
use chronx_core::transaction::Transaction;
use chronx_core::types::{Address, H256, Nonce, Period};
use chronx_state::{StateDb, TransactionStatus};

pub enum Insert {
    Accepted,
    Duplicate,
}

/// Recover the sending address from a transaction's signature.
pub fn sender_address(tx: &Transaction) -> Result<Address, ChronxError> {
    let digest = chronx_crypto::keccak256(&tx.signing_hash_preimage());
    let pubkey = chronx_crypto::recover_pubkey(digest.as_bytes(), &tx.signature)
        .map_err(|_| ChronxError::InvalidSignature)?;
    Ok(chronx_crypto::address_from_uncompressed_pubkey(&pubkey))
}

fn tx_hash(tx: &Transaction) -> H256 {
    chronx_crypto::keccak256(&tx.to_canonical_bytes())
}

struct Inner {
    unverified: VecDeque<H256>,
    verified: HashMap<Address, BTreeMap<Nonce, H256>>,
    in_block: HashSet<H256>,
    cache: HashMap<H256, Transaction>,
    stopped: bool,
}

impl Inner {
    fn total_len(&self) -> usize {
        self.unverified.len() + self.verified.values().map(|m| m.len()).sum::<usize>()
    }
}

pub struct TxPool {
    db: Arc<StateDb>,
    inner: Mutex<Inner>,
    cond_unverified: Condvar,
    warn_threshold: usize,
    drop_threshold: usize,
}

impl TxPool {
    pub fn new(db: Arc<StateDb>, warn_threshold: usize, drop_threshold: usize) -> Arc<Self> {
        Arc::new(Self {
            db,
            inner: Mutex::new(Inner {
                unverified: VecDeque::new(),
                verified: HashMap::new(),
                in_block: HashSet::new(),
                cache: HashMap::new(),
                stopped: false,
            }),
            cond_unverified: Condvar::new(),
            warn_threshold,
            drop_threshold,
        })
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("lock poisoned").total_len()
    }

    /// Admit a single transaction. `already_verified` lets callers that
    /// trust the source (e.g. a transaction embedded in an already-verified
    /// DAG block) skip straight to the verified table.
    pub fn insert(&self, tx: Transaction, already_verified: bool) -> Result<Insert, ChronxError> {
        let hash = tx_hash(&tx);
        if self.db.get_transaction_status(&hash)?.is_some() {
            return Ok(Insert::Duplicate);
        }

        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.total_len() >= self.drop_threshold {
            return Err(ChronxError::QueueFull);
        }
        if inner.total_len() >= self.warn_threshold {
            tracing::warn!(pool_size = inner.total_len(), "transaction pool above warn threshold");
        }

        self.db.put_transaction(&hash, &tx.to_canonical_bytes())?;
        let status = if already_verified {
            TransactionStatus::InQueueVerified
        } else {
            TransactionStatus::InQueueUnverified
        };
        self.db.put_transaction_status(&hash, &status)?;

        inner.cache.insert(hash, tx.clone());
        if already_verified {
            let sender = sender_address(&tx)?;
            inner.verified.entry(sender).or_default().insert(tx.nonce, hash);
        } else {
            inner.unverified.push_back(hash);
        }
        drop(inner);
        if !already_verified {
            self.cond_unverified.notify_one();
        }
        Ok(Insert::Accepted)
    }

    /// Admit a batch, skipping anything already known to `transaction_status`.
    /// Returns the count of newly admitted transactions.
    pub fn insert_broadcast(&self, batch: Vec<Transaction>) -> Result<usize, ChronxError> {
        let mut accepted = 0;
        for tx in batch {
            if let Insert::Accepted = self.insert(tx, false)? {
                accepted += 1;
            }
        }
        Ok(accepted)
    }

    /// Pop the next transaction awaiting verification, blocking until one is
    /// available or the pool is stopped.
    pub fn pop_unverified(&self) -> Option<Transaction> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        loop {
            if inner.stopped {
                return None;
            }
            if let Some(hash) = inner.unverified.pop_front() {
                return inner.cache.get(&hash).cloned();
            }
            inner = self.cond_unverified.wait(inner).expect("lock poisoned");
        }
    }

    /// Called by a verification worker once signature and chain id check out.
    pub fn mark_verified(&self, tx: &Transaction) -> Result<(), ChronxError> {
        let hash = tx_hash(tx);
        let sender = sender_address(tx)?;
        self.db.put_transaction_status(&hash, &TransactionStatus::InQueueVerified)?;
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.verified.entry(sender).or_default().insert(tx.nonce, hash);
        Ok(())
    }

    /// Called by a verification worker when signature or chain id fails;
    /// drops the transaction from the pool and its cache entirely.
    pub fn mark_invalid(&self, hash: &H256) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.cache.remove(hash);
    }

    /// Drain up to `max` verified transactions, grouped by sender and
    /// ordered by ascending nonce within each sender, transitioning them to
    /// `in_block`.
    pub fn pack(&self, max: usize) -> Result<Vec<Transaction>, ChronxError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let mut packed: Vec<(Address, Nonce, H256, Transaction)> = Vec::new();

        let senders: Vec<Address> = inner.verified.keys().copied().collect();
        'outer: for sender in senders {
            let Some(by_nonce) = inner.verified.get(&sender) else { continue };
            let hashes: Vec<H256> = by_nonce.values().copied().collect();
            for hash in hashes {
                if packed.len() >= max {
                    break 'outer;
                }
                let Some(tx) = inner.cache.get(&hash).cloned() else { continue };
                packed.push((sender, tx.nonce, hash, tx));
            }
        }

        for (sender, nonce, hash, _) in &packed {
            if let Some(by_nonce) = inner.verified.get_mut(sender) {
                by_nonce.remove(nonce);
                if by_nonce.is_empty() {
                    inner.verified.remove(sender);
                }
            }
            inner.in_block.insert(*hash);
        }
        drop(inner);

        for (_, _, hash, _) in &packed {
            self.db.put_transaction_status(hash, &TransactionStatus::InBlock)?;
        }
        Ok(packed.into_iter().map(|(_, _, _, tx)| tx).collect())
    }

    /// Called by the executor once a period containing `hashes` has
    /// committed: transitions each from `in_block` to `finalized` and drops
    /// the pool's in-memory cache entry.
    pub fn remove_finalized(&self, hashes: &[H256], period: Period) -> Result<(), ChronxError> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        for (position, hash) in hashes.iter().enumerate() {
            inner.in_block.remove(hash);
            inner.cache.remove(hash);
            self.db.put_transaction_status(hash, &TransactionStatus::Finalized {
                period,
                position: position as u32,
            })?;
        }
        Ok(())
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.stopped = true;
        drop(inner);
        self.cond_unverified.notify_all();
    }

    pub fn queue_sizes(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("lock poisoned");
        (inner.unverified.len(), inner.verified.values().map(|m| m.len()).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronx_core::types::Signature;
    use chronx_crypto::KeyPair;

    fn temp_db(name: &str) -> Arc<StateDb> {
        let dir = std::env::temp_dir().join(format!("chronx_txpool_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(StateDb::open(&dir).expect("open temp db"))
    }

    fn signed_tx(kp: &KeyPair, nonce: Nonce) -> Transaction {
        let mut tx = Transaction {
            nonce,
            gas_price: 1,
            gas_limit: 21_000,
            to: Some(Address::ZERO),
            value: 0,
            data: vec![],
            chain_id: 841,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        };
        let digest = chronx_crypto::keccak256(&tx.signing_hash_preimage());
        tx.signature = kp.sign_prehash(digest.as_bytes());
        tx
    }

    #[test]
    fn insert_then_pop_unverified_round_trips() {
        let pool = TxPool::new(temp_db("insert_pop"), 1000, 2000);
        let kp = KeyPair::generate();
        let t = signed_tx(&kp, 0);
        let hash_before = tx_hash(&t);
        pool.insert(t.clone(), false).unwrap();
        let popped = pool.pop_unverified().unwrap();
        assert_eq!(tx_hash(&popped), hash_before);
    }

    #[test]
    fn duplicate_insert_is_rejected() {
        let pool = TxPool::new(temp_db("duplicate"), 1000, 2000);
        let kp = KeyPair::generate();
        let t = signed_tx(&kp, 0);
        assert!(matches!(pool.insert(t.clone(), false).unwrap(), Insert::Accepted));
        assert!(matches!(pool.insert(t, false).unwrap(), Insert::Duplicate));
    }

    #[test]
    fn pack_orders_by_ascending_nonce() {
        let pool = TxPool::new(temp_db("pack_order"), 1000, 2000);
        let kp = KeyPair::generate();
        pool.insert(signed_tx(&kp, 2), true).unwrap();
        pool.insert(signed_tx(&kp, 0), true).unwrap();
        pool.insert(signed_tx(&kp, 1), true).unwrap();
        let packed = pool.pack(10).unwrap();
        let nonces: Vec<Nonce> = packed.iter().map(|t| t.nonce).collect();
        assert_eq!(nonces, vec![0, 1, 2]);
    }

    #[test]
    fn insert_above_drop_threshold_returns_queue_full() {
        let pool = TxPool::new(temp_db("drop_threshold"), 1, 1);
        let kp = KeyPair::generate();
        pool.insert(signed_tx(&kp, 0), false).unwrap();
        assert!(matches!(pool.insert(signed_tx(&kp, 1), false), Err(ChronxError::QueueFull)));
    }
}
