//! Per-peer state the network subsystem owns: known-item LRUs used to avoid
//! re-broadcasting what a peer has already seen, the peer's latest reported
//! sync position, and admission bookkeeping. Grounded on the per-peer
//! `PeerData`/known-set tracking in `taraxa_capability.hpp`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use libp2p::PeerId;
use lru::LruCache;

use chronx_core::types::{Period, H256};

const KNOWN_ITEM_CAPACITY: usize = 10_000;
const MAX_PROCESSING_BUDGET: Duration = Duration::from_millis(500);
const QUEUE_BOUND: usize = 1_024;

/// A peer's self-reported position, carried in its `Status` packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncPosition {
    pub dag_level: u64,
    pub pbft_chain_size: Period,
    pub round: Period,
}

/// Per-peer state: what it has already seen (to suppress redundant
/// broadcasts), where it last reported being in the chain, and a rolling
/// processing budget for admission control.
pub struct PeerState {
    pub known_blocks: LruCache<H256, ()>,
    pub known_transactions: LruCache<H256, ()>,
    pub known_votes: LruCache<H256, ()>,
    pub position: Option<SyncPosition>,
    pub is_syncing: bool,
    pub last_activity: Instant,
    queue_len: usize,
    window_start: Instant,
    window_spent: Duration,
    strikes: u32,
}

impl PeerState {
    fn new() -> Self {
        let cap = std::num::NonZeroUsize::new(KNOWN_ITEM_CAPACITY).expect("nonzero capacity");
        Self {
            known_blocks: LruCache::new(cap),
            known_transactions: LruCache::new(cap),
            known_votes: LruCache::new(cap),
            position: None,
            is_syncing: false,
            last_activity: Instant::now(),
            queue_len: 0,
            window_start: Instant::now(),
            window_spent: Duration::ZERO,
            strikes: 0,
        }
    }

    pub fn mark_block_known(&mut self, hash: H256) -> bool {
        self.known_blocks.put(hash, ()).is_none()
    }

    pub fn mark_transaction_known(&mut self, hash: H256) -> bool {
        self.known_transactions.put(hash, ()).is_none()
    }

    pub fn mark_vote_known(&mut self, hash: H256) -> bool {
        self.known_votes.put(hash, ()).is_none()
    }

    pub fn has_block(&mut self, hash: &H256) -> bool {
        self.known_blocks.contains(hash)
    }

    /// Admission control: record that processing one packet took `spent`,
    /// rolling the accounting window over every second. Returns `false`
    /// (packet should be dropped) once the peer's budget or queue bound is
    /// exceeded within the window; a peer that repeatedly exceeds it should
    /// be blacklisted by the caller.
    pub fn admit(&mut self, spent: Duration) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) > Duration::from_secs(1) {
            self.window_start = now;
            self.window_spent = Duration::ZERO;
        }
        self.window_spent += spent;
        self.last_activity = now;

        if self.window_spent > MAX_PROCESSING_BUDGET || self.queue_len >= QUEUE_BOUND {
            self.strikes += 1;
            return false;
        }
        true
    }

    pub fn enqueue(&mut self) {
        self.queue_len = self.queue_len.saturating_add(1);
    }

    pub fn dequeue(&mut self) {
        self.queue_len = self.queue_len.saturating_sub(1);
    }

    pub fn strikes(&self) -> u32 {
        self.strikes
    }
}

/// The set of currently-known peers, keyed by libp2p `PeerId`.
pub struct PeerRegistry {
    peers: HashMap<PeerId, PeerState>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self { peers: HashMap::new() }
    }

    pub fn on_connected(&mut self, peer: PeerId) {
        self.peers.entry(peer).or_insert_with(PeerState::new);
    }

    pub fn on_disconnected(&mut self, peer: &PeerId) {
        self.peers.remove(peer);
    }

    pub fn mark_seen(&mut self, peer: &PeerId) -> &mut PeerState {
        self.peers.entry(*peer).or_insert_with(PeerState::new).last_activity = Instant::now();
        self.peers.get_mut(peer).expect("just inserted")
    }

    pub fn get_mut(&mut self, peer: &PeerId) -> Option<&mut PeerState> {
        self.peers.get_mut(peer)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_peer() -> PeerId {
        PeerId::random()
    }

    #[test]
    fn mark_block_known_reports_first_sighting() {
        let mut state = PeerState::new();
        let hash = H256::from_bytes([1u8; 32]);
        assert!(state.mark_block_known(hash));
        assert!(!state.mark_block_known(hash));
    }

    #[test]
    fn admit_rejects_once_processing_budget_exceeded() {
        let mut state = PeerState::new();
        assert!(state.admit(Duration::from_millis(100)));
        assert!(!state.admit(Duration::from_millis(450)));
        assert_eq!(state.strikes(), 1);
    }

    #[test]
    fn registry_tracks_connect_and_disconnect() {
        let mut registry = PeerRegistry::new();
        let peer = fake_peer();
        registry.on_connected(peer);
        assert_eq!(registry.len(), 1);
        registry.on_disconnected(&peer);
        assert_eq!(registry.len(), 0);
    }
}
