//! Admission pipeline for incoming DAG blocks: known-block filtering,
//! parent resolution with buffering, and level-keyed unverified/verified
//! queues feeding a bounded pool of verification workers.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use chronx_core::dag_block::DagBlock;
use chronx_core::error::ChronxError;
use chronx_core::types::H256;

use crate::anchor::BlockLookup;
use crate::pivot::PivotTree;

/// Outcome of `BlockManager::insert_block`.
#[derive(Debug, PartialEq, Eq)]
pub enum Admission {
    /// Already known; no-op.
    Duplicate,
    /// Missing one or more parents; buffered, re-driven once they arrive.
    Buffered,
    /// Queued for verification.
    Queued,
}

struct Queues {
    /// Keyed by level so a verifier can prioritize low levels first,
    /// mirroring the level-ordered admission the anchor ordering relies on.
    unverified: BTreeMap<u64, VecDeque<DagBlock>>,
    verified: BTreeMap<u64, VecDeque<DagBlock>>,
}

/// Blocks waiting on unresolved parents, keyed by the highest level among
/// their still-missing parents — once a block at that level is stored,
/// every buffered block keyed at or below it is re-driven.
struct PendingByParent {
    waiting: HashMap<u64, Vec<DagBlock>>,
}

pub struct BlockManager {
    inner: Mutex<Inner>,
    cond_unverified: Condvar,
    cond_verified: Condvar,
}

struct Inner {
    known: HashMap<H256, DagBlock>,
    invalid: HashSet<H256>,
    queues: Queues,
    pending: PendingByParent,
    pivot_tree: PivotTree,
    stopped: bool,
}

/// An owned point-in-time copy of the known-block table, used by the anchor
/// orderer (which needs a `BlockLookup` it can hold across a traversal
/// without keeping the manager's mutex locked).
pub struct KnownBlocksSnapshot(HashMap<H256, DagBlock>);

impl BlockLookup for KnownBlocksSnapshot {
    fn block(&self, hash: &H256) -> Option<&DagBlock> {
        self.0.get(hash)
    }
}

impl BlockManager {
    /// Clone the current known-block table for anchor ordering.
    pub fn snapshot(&self) -> KnownBlocksSnapshot {
        let inner = self.inner.lock().expect("lock poisoned");
        KnownBlocksSnapshot(inner.known.clone())
    }

    pub fn new(genesis: H256) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                known: HashMap::new(),
                invalid: HashSet::new(),
                queues: Queues { unverified: BTreeMap::new(), verified: BTreeMap::new() },
                pending: PendingByParent { waiting: HashMap::new() },
                pivot_tree: PivotTree::new(genesis),
                stopped: false,
            }),
            cond_unverified: Condvar::new(),
            cond_verified: Condvar::new(),
        })
    }

    pub fn is_known(&self, hash: &H256) -> bool {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.known.contains_key(hash) || inner.invalid.contains(hash)
    }

    /// Step 1-2 of admission: drop known blocks, buffer blocks with unknown
    /// parents, otherwise push to the unverified queue keyed by level.
    pub fn insert_block(&self, block: DagBlock, known_parents: impl Fn(&H256) -> bool) -> Result<Admission, ChronxError> {
        let hash = crate::block_hash(&block);
        let mut inner = self.inner.lock().expect("lock poisoned");
        if inner.known.contains_key(&hash) || inner.invalid.contains(&hash) {
            return Ok(Admission::Duplicate);
        }

        let mut missing_levels = Vec::new();
        if !block.is_genesis() && !known_parents(&block.pivot) {
            missing_levels.push(block.level.saturating_sub(1));
        }
        for tip in &block.tips {
            if !known_parents(tip) {
                missing_levels.push(block.level.saturating_sub(1));
            }
        }

        if let Some(&max_missing_level) = missing_levels.iter().max() {
            inner.pending.waiting.entry(max_missing_level).or_default().push(block);
            return Ok(Admission::Buffered);
        }

        inner.queues.unverified.entry(block.level).or_default().push_back(block);
        drop(inner);
        self.cond_unverified.notify_one();
        Ok(Admission::Queued)
    }

    /// Called whenever a block is stored, to re-drive anything buffered
    /// against it.
    pub fn redrive_pending(&self, stored_level: u64, known_parents: impl Fn(&H256) -> bool) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        let Some(candidates) = inner.pending.waiting.remove(&stored_level) else { return };
        for block in candidates {
            let still_missing = (!block.is_genesis() && !known_parents(&block.pivot))
                || block.tips.iter().any(|t| !known_parents(t));
            if still_missing {
                inner.pending.waiting.entry(stored_level).or_default().push(block);
            } else {
                inner.queues.unverified.entry(block.level).or_default().push_back(block);
            }
        }
        drop(inner);
        self.cond_unverified.notify_all();
    }

    /// Blocks until an unverified block is available, lowest level first,
    /// matching the original engine's level-ordered verification priority.
    pub fn pop_unverified(&self) -> Option<DagBlock> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        loop {
            if inner.stopped {
                return None;
            }
            if let Some((&level, queue)) = inner.queues.unverified.iter_mut().next() {
                let block = queue.pop_front();
                if queue.is_empty() {
                    inner.queues.unverified.remove(&level);
                }
                if let Some(block) = block {
                    return Some(block);
                }
            }
            inner = self.cond_unverified.wait(inner).expect("lock poisoned");
        }
    }

    /// Called by a verification worker once `block` passes level/signature/
    /// VDF checks: stores it, updates the pivot tree, and wakes consumers of
    /// the verified queue.
    pub fn mark_verified(&self, block: DagBlock) {
        let hash = crate::block_hash(&block);
        let mut inner = self.inner.lock().expect("lock poisoned");
        if !block.is_genesis() {
            inner.pivot_tree.add_edge(block.pivot, hash);
        }
        inner.queues.verified.entry(block.level).or_default().push_back(block.clone());
        inner.known.insert(hash, block);
        drop(inner);
        self.cond_verified.notify_all();
    }

    pub fn mark_invalid(&self, hash: H256) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.invalid.insert(hash);
    }

    pub fn pop_verified(&self) -> Option<DagBlock> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        loop {
            if inner.stopped {
                return None;
            }
            if let Some((&level, queue)) = inner.queues.verified.iter_mut().next() {
                let block = queue.pop_front();
                if queue.is_empty() {
                    inner.queues.verified.remove(&level);
                }
                if let Some(block) = block {
                    return Some(block);
                }
            }
            inner = self.cond_verified.wait(inner).expect("lock poisoned");
        }
    }

    pub fn pivot_chain_tip(&self) -> H256 {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.pivot_tree.tip()
    }

    /// Wake every worker blocked on either queue so they can observe
    /// `stopped` and exit.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.stopped = true;
        drop(inner);
        self.cond_unverified.notify_all();
        self.cond_verified.notify_all();
    }

    pub fn queue_sizes(&self) -> (usize, usize) {
        let inner = self.inner.lock().expect("lock poisoned");
        (
            inner.queues.unverified.values().map(|q| q.len()).sum(),
            inner.queues.verified.values().map(|q| q.len()).sum(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronx_core::dag_block::VdfProof;
    use chronx_core::types::{Address, Signature};

    fn h(byte: u8) -> H256 {
        H256::from_bytes([byte; 32])
    }

    fn block(pivot: H256, level: u64) -> DagBlock {
        DagBlock {
            pivot,
            level,
            tips: vec![],
            trx_hashes: vec![],
            vdf_proof: VdfProof { pk: [0u8; 32], vrf_proof: vec![], difficulty: 0, y: vec![], pi: vec![] },
            proposer: Address::ZERO,
            timestamp: 0,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        }
    }

    #[test]
    fn known_block_is_duplicate() {
        let mgr = BlockManager::new(h(0));
        let b = block(h(0), 1);
        let admission = mgr.insert_block(b.clone(), |_| true).unwrap();
        assert_eq!(admission, Admission::Queued);
        let verified = mgr.pop_unverified().unwrap();
        mgr.mark_verified(verified);
        let hash = crate::block_hash(&b);
        assert!(mgr.is_known(&hash));
        let again = mgr.insert_block(b, |_| true).unwrap();
        assert_eq!(again, Admission::Duplicate);
    }

    #[test]
    fn missing_parent_buffers_block() {
        let mgr = BlockManager::new(h(0));
        let b = block(h(9), 3);
        let admission = mgr.insert_block(b, |_| false).unwrap();
        assert_eq!(admission, Admission::Buffered);
        let (unverified, verified) = mgr.queue_sizes();
        assert_eq!(unverified, 0);
        assert_eq!(verified, 0);
    }

    #[test]
    fn known_parent_queues_for_verification() {
        let mgr = BlockManager::new(h(0));
        let b = block(h(0), 1);
        mgr.insert_block(b, |_| true).unwrap();
        let (unverified, _) = mgr.queue_sizes();
        assert_eq!(unverified, 1);
    }
}
