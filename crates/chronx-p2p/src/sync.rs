//! Deep/light sync state machine and peer admission control. Grounded on
//! `SyncingHandler`/`SyncingState` from the original capability layer
//! (`network/tarcap/packets_handlers/common/syncing_handler.{hpp,cpp}`),
//! restructured as plain state owned by the core rather than a handler
//! object threaded through shared pointers.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use libp2p::PeerId;

use chronx_core::constants::{
    DEEP_SYNC_THRESHOLD_PERIODS, PEER_BLACKLIST_TIMEOUT_SECS, SYNC_STALL_SECS,
};
use chronx_core::types::Period;

/// No packet from the syncing peer for this long is treated as a stall.
const STALL_TIMEOUT: Duration = Duration::from_secs(SYNC_STALL_SECS);

const BLACKLIST_TIMEOUT: Duration = Duration::from_secs(PEER_BLACKLIST_TIMEOUT_SECS);
const BLACKLIST_STRIKES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Caught up, or within `deep_threshold` of the best peer: pull the few
    /// missing periods and begin pulling pending DAG blocks above
    /// `max_level`.
    Light,
    /// More than `deep_threshold` periods behind: disable snapshots,
    /// request consecutive periods from one chosen peer, apply them through
    /// the executor path in order.
    Deep,
}

/// Tracks whether the node is currently behind, and if so against which
/// peer and since when.
pub struct SyncState {
    deep_threshold: Period,
    syncing_peer: Option<PeerId>,
    mode: SyncMode,
    is_pbft_syncing: bool,
    is_dag_syncing: bool,
    last_packet_time: Instant,
    max_dag_level: u64,
}

impl SyncState {
    pub fn new(deep_threshold: Period) -> Self {
        Self {
            deep_threshold: deep_threshold.max(1),
            syncing_peer: None,
            mode: SyncMode::Light,
            is_pbft_syncing: false,
            is_dag_syncing: false,
            last_packet_time: Instant::now(),
            max_dag_level: 0,
        }
    }

    pub fn is_pbft_syncing(&self) -> bool {
        self.is_pbft_syncing
    }

    pub fn is_dag_syncing(&self) -> bool {
        self.is_dag_syncing
    }

    pub fn syncing_peer(&self) -> Option<PeerId> {
        self.syncing_peer
    }

    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    pub fn max_dag_level(&self) -> u64 {
        self.max_dag_level
    }

    pub fn record_dag_level(&mut self, level: u64) {
        self.max_dag_level = self.max_dag_level.max(level);
    }

    /// Evaluate the local period height against the best peer's reported
    /// height and decide which sync mode to enter (or to stop syncing
    /// entirely if already caught up).
    pub fn evaluate(&mut self, local_period: Period, best_peer: PeerId, best_peer_period: Period) {
        if best_peer_period <= local_period {
            self.stop();
            return;
        }
        let behind = best_peer_period - local_period;
        self.mode = if behind > self.deep_threshold { SyncMode::Deep } else { SyncMode::Light };
        self.is_pbft_syncing = true;
        self.is_dag_syncing = matches!(self.mode, SyncMode::Light);
        self.syncing_peer = Some(best_peer);
        self.last_packet_time = Instant::now();
    }

    pub fn stop(&mut self) {
        self.is_pbft_syncing = false;
        self.is_dag_syncing = false;
        self.syncing_peer = None;
    }

    pub fn on_packet_received(&mut self) {
        self.last_packet_time = Instant::now();
    }

    /// `true` once `STALL_TIMEOUT` has elapsed since the last packet from
    /// the syncing peer while a sync is in progress — the caller should
    /// reselect a peer.
    pub fn is_stalled(&self) -> bool {
        self.is_pbft_syncing && self.last_packet_time.elapsed() > STALL_TIMEOUT
    }
}

/// Tracks misbehaving peers under a rolling timeout, grounded on the
/// original capability's per-peer strike accounting before a `disconnect`.
pub struct Blacklist {
    blocked_until: std::collections::HashMap<PeerId, Instant>,
}

impl Blacklist {
    pub fn new() -> Self {
        Self { blocked_until: std::collections::HashMap::new() }
    }

    pub fn is_blocked(&self, peer: &PeerId) -> bool {
        self.blocked_until.get(peer).is_some_and(|until| Instant::now() < *until)
    }

    /// Block `peer` once it has accumulated `BLACKLIST_STRIKES` admission
    /// failures; the caller tracks strikes in `PeerState`.
    pub fn maybe_block(&mut self, peer: PeerId, strikes: u32) {
        if strikes >= BLACKLIST_STRIKES {
            self.blocked_until.insert(peer, Instant::now() + BLACKLIST_TIMEOUT);
        }
    }

    pub fn unblock_expired(&mut self) {
        let now = Instant::now();
        self.blocked_until.retain(|_, until| *until > now);
    }
}

impl Default for Blacklist {
    fn default() -> Self {
        Self::new()
    }
}

/// Chooses the best sync peer among candidates reporting `(peer,
/// pbft_chain_size)`, excluding blacklisted peers.
pub fn choose_sync_peer(
    candidates: &[(PeerId, Period)],
    blacklist: &Blacklist,
) -> Option<(PeerId, Period)> {
    candidates
        .iter()
        .filter(|(peer, _)| !blacklist.is_blocked(peer))
        .max_by_key(|(_, period)| *period)
        .copied()
}

/// Range of DAG levels still missing above the locally known set, used to
/// drive light sync's pending-block pulls.
pub fn missing_levels(known: &HashSet<u64>, max_known_level: u64, peer_level: u64) -> Vec<u64> {
    ((max_known_level + 1)..=peer_level).filter(|l| !known.contains(l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_enters_deep_sync_beyond_threshold() {
        let mut state = SyncState::new(5);
        state.evaluate(10, PeerId::random(), 30);
        assert_eq!(state.mode(), SyncMode::Deep);
        assert!(state.is_pbft_syncing());
        assert!(!state.is_dag_syncing());
    }

    #[test]
    fn evaluate_enters_light_sync_within_threshold() {
        let mut state = SyncState::new(20);
        state.evaluate(10, PeerId::random(), 15);
        assert_eq!(state.mode(), SyncMode::Light);
        assert!(state.is_dag_syncing());
    }

    #[test]
    fn evaluate_stops_when_caught_up() {
        let mut state = SyncState::new(5);
        state.evaluate(10, PeerId::random(), 30);
        state.evaluate(30, PeerId::random(), 30);
        assert!(!state.is_pbft_syncing());
    }

    #[test]
    fn blacklist_blocks_after_enough_strikes() {
        let mut blacklist = Blacklist::new();
        let peer = PeerId::random();
        blacklist.maybe_block(peer, 2);
        assert!(!blacklist.is_blocked(&peer));
        blacklist.maybe_block(peer, BLACKLIST_STRIKES);
        assert!(blacklist.is_blocked(&peer));
    }

    #[test]
    fn choose_sync_peer_picks_highest_reported_period() {
        let a = PeerId::random();
        let b = PeerId::random();
        let blacklist = Blacklist::new();
        let chosen = choose_sync_peer(&[(a, 5), (b, 12)], &blacklist);
        assert_eq!(chosen, Some((b, 12)));
    }
}

/// Default deep-sync threshold, exposed for callers wiring `SyncState`
/// without a configured override.
pub fn default_deep_threshold() -> Period {
    DEEP_SYNC_THRESHOLD_PERIODS
}
