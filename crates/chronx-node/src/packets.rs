//! Packet dispatch: bridges the tokio-resident p2p swarm to the plain OS
//! threads that own every other subsystem. `run_dispatcher` drains the
//! swarm's inbound channel into a priority queue; a small pool of worker
//! threads pops from that queue and applies each packet to the node's
//! state, mirroring `chronx_txpool::VerifierPool`'s thread-pool shape.
//!
//! Grounded on the original capability layer's per-packet handler table
//! (`taraxa_capability.hpp`'s dispatch over `SubprotocolPacketType`), with
//! `Status` gating every other packet exactly as there: a peer whose sync
//! position hasn't been recorded yet has its non-`Status` packets dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use libp2p::PeerId;
use tokio::sync::mpsc;

use chronx_core::codec::Decodable;
use chronx_core::dag_block::DagBlock;
use chronx_core::error::ChronxError;
use chronx_core::types::{Period, H256};
use chronx_core::vote::Vote;
use chronx_consensus::vote_manager::VoteManager;
use chronx_dag::{Admission, BlockLookup, BlockManager};
use chronx_executor::executor::Executor;
use chronx_p2p::message::{
    DagSyncRequest, DagSyncResponse, GetNewBlock, GetNextVotes, GetPbftSync, NextVotes, NewBlock,
    NewBlockHash, PbftSync, Status, TransactionBatch, VotePacket,
};
use chronx_p2p::{Outbound, Packet, PeerRegistry, SyncState};
use chronx_state::StateDb;
use chronx_txpool::TxPool;

use crate::config::ValidatorConfig;

/// A contiguous run of DAG levels served per `DagSyncRequest`, capping how
/// much one reply can cost a peer that asks for a huge range at once.
const DAG_SYNC_BATCH_LEVELS: u64 = 50;
/// Period bundles served per `GetPbftSync` reply.
const PBFT_SYNC_BATCH: u64 = 10;

fn is_high_priority(packet: &Packet) -> bool {
    matches!(packet, Packet::Status(_) | Packet::Vote(_))
}

struct QueueInner {
    high: VecDeque<(PeerId, Packet)>,
    low: VecDeque<(PeerId, Packet)>,
    stopped: bool,
}

/// Two-lane packet queue: `Status`/`Vote` packets drain ahead of everything
/// else so a node under sync load keeps making consensus progress instead of
/// stalling behind a backlog of block/transaction gossip.
pub struct PacketQueue {
    inner: Mutex<QueueInner>,
    cond: Condvar,
}

impl PacketQueue {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(QueueInner { high: VecDeque::new(), low: VecDeque::new(), stopped: false }),
            cond: Condvar::new(),
        })
    }

    pub fn push(&self, peer: PeerId, packet: Packet) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        if is_high_priority(&packet) {
            inner.high.push_back((peer, packet));
        } else {
            inner.low.push_back((peer, packet));
        }
        drop(inner);
        self.cond.notify_one();
    }

    pub fn pop(&self) -> Option<(PeerId, Packet)> {
        let mut inner = self.inner.lock().expect("lock poisoned");
        loop {
            if let Some(item) = inner.high.pop_front() {
                return Some(item);
            }
            if let Some(item) = inner.low.pop_front() {
                return Some(item);
            }
            if inner.stopped {
                return None;
            }
            inner = self.cond.wait(inner).expect("lock poisoned");
        }
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.stopped = true;
        drop(inner);
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.high.len() + inner.low.len()
    }
}

/// Bridges the tokio-owned swarm's inbound channel into the queue the
/// OS-thread worker pool reads from. The only code in this module that runs
/// on the tokio runtime; everything downstream is plain synchronous code.
pub async fn run_dispatcher(mut inbound_rx: mpsc::Receiver<(PeerId, Packet)>, queue: Arc<PacketQueue>) {
    while let Some((peer, packet)) = inbound_rx.recv().await {
        queue.push(peer, packet);
    }
    queue.stop();
}

/// Every handle a packet handler needs, cloned cheaply per worker thread.
#[derive(Clone)]
pub struct PacketContext {
    pub state: Arc<StateDb>,
    pub block_manager: Arc<BlockManager>,
    pub txpool: Arc<TxPool>,
    pub vote_manager: Arc<VoteManager>,
    pub executor: Arc<Executor>,
    pub validators: Arc<Vec<ValidatorConfig>>,
    pub committee_size: u32,
    pub direct_tx: mpsc::Sender<Outbound>,
    pub genesis_hash: H256,
    pub net_id: u64,
    pub peers: Arc<Mutex<PeerRegistry>>,
    pub sync: Arc<Mutex<SyncState>>,
    pub connected_peers: Arc<AtomicUsize>,
}

/// Spawn `worker_count` OS threads draining `queue`, named the same way
/// `VerifierPool` names its verification workers.
pub fn spawn_workers(queue: Arc<PacketQueue>, ctx: PacketContext, worker_count: usize) -> Vec<JoinHandle<()>> {
    (0..worker_count)
        .map(|idx| {
            let queue = Arc::clone(&queue);
            let ctx = ctx.clone();
            std::thread::Builder::new()
                .name(format!("packet-worker-{idx}"))
                .spawn(move || worker_loop(queue, ctx))
                .expect("spawning packet worker thread")
        })
        .collect()
}

fn worker_loop(queue: Arc<PacketQueue>, ctx: PacketContext) {
    while let Some((peer, packet)) = queue.pop() {
        let started = Instant::now();
        if let Err(err) = dispatch(&ctx, peer, packet) {
            tracing::warn!(error = %err, peer = %peer, "packet handler failed");
        }
        let _ = started.elapsed();
    }
}

fn peer_has_position(ctx: &PacketContext, peer: &PeerId) -> bool {
    let mut peers = ctx.peers.lock().expect("lock poisoned");
    peers.get_mut(peer).and_then(|p| p.position).is_some()
}

fn dispatch(ctx: &PacketContext, peer: PeerId, packet: Packet) -> Result<(), ChronxError> {
    if !matches!(packet, Packet::Status(_)) && !peer_has_position(ctx, &peer) {
        tracing::debug!(peer = %peer, "dropping packet from peer with no recorded status");
        return Ok(());
    }

    match packet {
        Packet::Status(status) => handle_status(ctx, peer, status),
        Packet::NewBlock(new_block) => handle_new_block(ctx, peer, new_block),
        Packet::NewBlockHash(hash) => handle_new_block_hash(ctx, peer, hash),
        Packet::GetNewBlock(req) => handle_get_new_block(ctx, peer, req),
        Packet::DagSyncRequest(req) => handle_dag_sync_request(ctx, peer, req),
        Packet::DagSyncResponse(resp) => handle_dag_sync_response(ctx, resp),
        Packet::Transaction(batch) => handle_transaction_batch(ctx, batch),
        Packet::Vote(vote) => handle_vote(ctx, vote),
        Packet::GetPbftSync(req) => handle_get_pbft_sync(ctx, peer, req),
        Packet::PbftSync(resp) => handle_pbft_sync(ctx, resp),
        Packet::GetNextVotes(req) => handle_get_next_votes(ctx, peer, req),
        Packet::NextVotes(resp) => handle_next_votes(ctx, resp),
    }
}

fn reply(ctx: &PacketContext, peer: PeerId, packet: Packet) -> Result<(), ChronxError> {
    ctx.direct_tx
        .blocking_send(Outbound::Reply { peer, packet })
        .map_err(|_| ChronxError::Other("p2p outbound channel closed".into()))
}

fn request(ctx: &PacketContext, peer: PeerId, packet: Packet) -> Result<(), ChronxError> {
    ctx.direct_tx
        .blocking_send(Outbound::Request { peer, packet })
        .map_err(|_| ChronxError::Other("p2p outbound channel closed".into()))
}

fn handle_status(ctx: &PacketContext, peer: PeerId, status: Status) -> Result<(), ChronxError> {
    if status.net_id != ctx.net_id || status.genesis_hash != ctx.genesis_hash {
        tracing::debug!(peer = %peer, "rejecting status from peer on a different chain");
        return Ok(());
    }

    let mut peers = ctx.peers.lock().expect("lock poisoned");
    let first_seen = peers.get_mut(&peer).is_none();
    peers.on_connected(peer);
    let state = peers.mark_seen(&peer);
    state.position = Some(chronx_p2p::SyncPosition {
        dag_level: status.dag_level,
        pbft_chain_size: status.pbft_size,
        round: status.round,
    });
    drop(peers);
    if first_seen {
        ctx.connected_peers.fetch_add(1, Ordering::SeqCst);
    }

    let local_period = ctx.state.get_pbft_head()?.unwrap_or(0);
    if status.pbft_size > local_period {
        let mut sync = ctx.sync.lock().expect("lock poisoned");
        sync.evaluate(local_period, peer, status.pbft_size);
    }
    Ok(())
}

fn block_is_known(ctx: &PacketContext, hash: &H256) -> bool {
    ctx.block_manager.is_known(hash) || ctx.state.dag_block_exists(hash)
}

fn handle_new_block(ctx: &PacketContext, peer: PeerId, new_block: NewBlock) -> Result<(), ChronxError> {
    for tx in new_block.transactions {
        if let Err(err) = ctx.txpool.insert(tx, false) {
            tracing::debug!(error = %err, "rejecting transaction carried in new-block packet");
        }
    }

    let hash = chronx_dag::block_hash(&new_block.dag_block);
    {
        let mut peers = ctx.peers.lock().expect("lock poisoned");
        if let Some(state) = peers.get_mut(&peer) {
            state.mark_block_known(hash);
        }
    }

    let admission = ctx.block_manager.insert_block(new_block.dag_block, |h| block_is_known(ctx, h))?;
    if admission == Admission::Buffered {
        tracing::debug!(hash = %hash, "buffering new block pending unresolved parents");
    }
    Ok(())
}

fn handle_new_block_hash(ctx: &PacketContext, peer: PeerId, hash: NewBlockHash) -> Result<(), ChronxError> {
    if !block_is_known(ctx, &hash.dag_block_hash) {
        request(ctx, peer, Packet::GetNewBlock(GetNewBlock { dag_block_hash: hash.dag_block_hash }))?;
    }
    Ok(())
}

fn handle_get_new_block(ctx: &PacketContext, peer: PeerId, req: GetNewBlock) -> Result<(), ChronxError> {
    let snapshot = ctx.block_manager.snapshot();
    let block = if let Some(block) = snapshot.block(&req.dag_block_hash) {
        Some(block.clone())
    } else {
        ctx.state
            .get_dag_block(&req.dag_block_hash)?
            .and_then(|bytes| DagBlock::from_canonical_bytes(&bytes).ok())
    };

    match block {
        Some(dag_block) => reply(ctx, peer, Packet::NewBlock(NewBlock { dag_block, transactions: vec![] })),
        None => {
            tracing::debug!(hash = %req.dag_block_hash, "asked for an unknown dag block");
            Ok(())
        }
    }
}

fn handle_dag_sync_request(ctx: &PacketContext, peer: PeerId, req: DagSyncRequest) -> Result<(), ChronxError> {
    let mut dag_blocks = Vec::new();
    for level in req.from_level..req.from_level.saturating_add(DAG_SYNC_BATCH_LEVELS) {
        for hash in ctx.state.dag_blocks_at_level(level)? {
            if let Some(bytes) = ctx.state.get_dag_block(&hash)? {
                if let Ok(block) = DagBlock::from_canonical_bytes(&bytes) {
                    dag_blocks.push(block);
                }
            }
        }
    }
    reply(ctx, peer, Packet::DagSyncResponse(DagSyncResponse { dag_blocks }))
}

fn handle_dag_sync_response(ctx: &PacketContext, resp: DagSyncResponse) -> Result<(), ChronxError> {
    for block in resp.dag_blocks {
        let admission = ctx.block_manager.insert_block(block, |h| block_is_known(ctx, h));
        if let Err(err) = admission {
            tracing::debug!(error = %err, "rejecting synced dag block");
        }
    }
    Ok(())
}

fn handle_transaction_batch(ctx: &PacketContext, batch: TransactionBatch) -> Result<(), ChronxError> {
    for tx in batch.transactions {
        if let Err(err) = ctx.txpool.insert(tx, false) {
            tracing::debug!(error = %err, "rejecting gossiped transaction");
        }
    }
    Ok(())
}

/// Signature -> validator lookup -> VRF -> sortition -> quorum bookkeeping.
/// Shared by both `handle_vote` (live gossip) and `handle_next_votes` (sync
/// replay), which verify exactly the same way.
fn verify_and_add_vote(ctx: &PacketContext, vote: Vote) -> Result<(), ChronxError> {
    let voter_address = chronx_crypto::address_from_compressed_pubkey(&vote.voter_pk)
        .map_err(|_| ChronxError::InvalidSignature)?;

    let digest = chronx_crypto::keccak256(&vote.signing_hash_preimage());
    if !chronx_crypto::verify_signature(digest.as_bytes(), &vote.signature, voter_address) {
        return Err(ChronxError::InvalidSignature);
    }

    let validator = ctx
        .validators
        .iter()
        .find(|v| v.address == voter_address)
        .ok_or(ChronxError::InvalidSignature)?;

    let vrf_message = vote.vrf_message().to_bytes();
    let output = chronx_crypto::vrf::verify(&validator.vrf_public_key, &vrf_message, &vote.vrf_proof)?;
    if output != vote.vrf_output {
        return Err(ChronxError::InvalidProof("vote's vrf output does not match its proof".into()));
    }

    let voters = ctx.validators.len() as u64;
    if !chronx_crypto::sortition::is_eligible(&vote.vrf_output, voters, ctx.committee_size as u64) {
        return Err(ChronxError::InvalidProof("vote's vrf output does not clear the sortition threshold".into()));
    }
    let weight = chronx_crypto::sortition::weight(&vote.vrf_output, voters, ctx.committee_size);

    ctx.vote_manager.add_verified_vote(&vote, voter_address, weight)
}

fn handle_vote(ctx: &PacketContext, packet: VotePacket) -> Result<(), ChronxError> {
    match verify_and_add_vote(ctx, packet.vote) {
        Ok(()) => Ok(()),
        Err(err) => {
            tracing::debug!(error = %err, "dropping vote");
            Ok(())
        }
    }
}

fn handle_get_pbft_sync(ctx: &PacketContext, peer: PeerId, req: GetPbftSync) -> Result<(), ChronxError> {
    let head = ctx.state.get_pbft_head()?.unwrap_or(0);
    let mut bundles = Vec::new();
    let mut period: Period = req.from_period;
    while period <= head && (bundles.len() as u64) < PBFT_SYNC_BATCH {
        if let Some(bundle) = ctx.state.get_period_bundle(period)? {
            bundles.push(bundle);
        }
        period += 1;
    }
    let is_final = period > head;
    reply(ctx, peer, Packet::PbftSync(PbftSync { bundles, is_final }))
}

fn handle_pbft_sync(ctx: &PacketContext, resp: PbftSync) -> Result<(), ChronxError> {
    for bundle in resp.bundles {
        let head = ctx.state.get_pbft_head()?.unwrap_or(0);
        let period = bundle.pbft_block.period;
        if period != head + 1 {
            tracing::debug!(period, head, "skipping out-of-order synced period bundle");
            continue;
        }
        ctx.executor.execute_period(period, &bundle)?;
    }
    if resp.is_final {
        let mut sync = ctx.sync.lock().expect("lock poisoned");
        sync.stop();
    }
    Ok(())
}

fn handle_get_next_votes(ctx: &PacketContext, peer: PeerId, req: GetNextVotes) -> Result<(), ChronxError> {
    let hashes = ctx.state.next_votes_for_round(req.round)?;
    let mut votes = Vec::new();
    for hash in hashes {
        if let Some(bytes) = ctx.state.get_verified_vote(&hash)? {
            if let Ok(vote) = bincode::deserialize::<Vote>(&bytes) {
                votes.push(vote);
            }
        }
    }
    reply(ctx, peer, Packet::NextVotes(NextVotes { round: req.round, votes }))
}

fn handle_next_votes(ctx: &PacketContext, resp: NextVotes) -> Result<(), ChronxError> {
    for vote in resp.votes {
        if let Err(err) = verify_and_add_vote(ctx, vote) {
            tracing::debug!(error = %err, "dropping next-vote from sync response");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronx_core::chain_config::ChainConfig;
    use chronx_core::constants::CHAIN_ID_DEVNET;

    fn temp_state(name: &str) -> Arc<StateDb> {
        let dir = std::env::temp_dir().join(format!("chronx_node_packets_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(StateDb::open(&dir).expect("open temp db"))
    }

    fn test_ctx(name: &str) -> (PacketContext, mpsc::Receiver<Outbound>) {
        let state = temp_state(name);
        let chain_config = ChainConfig::predefined(CHAIN_ID_DEVNET).unwrap();
        let (direct_tx, direct_rx) = mpsc::channel(32);
        let txpool = TxPool::new(Arc::clone(&state), 8_000, 10_000);
        let ctx = PacketContext {
            block_manager: BlockManager::new(H256::ZERO),
            txpool: Arc::clone(&txpool),
            vote_manager: Arc::new(VoteManager::new(Arc::clone(&state))),
            executor: Arc::new(Executor::new(Arc::clone(&state), txpool)),
            validators: Arc::new(Vec::new()),
            committee_size: chain_config.pbft.committee_size,
            direct_tx,
            genesis_hash: H256::ZERO,
            net_id: 1,
            peers: Arc::new(Mutex::new(PeerRegistry::new())),
            sync: Arc::new(Mutex::new(SyncState::new(5))),
            connected_peers: Arc::new(AtomicUsize::new(0)),
            state,
        };
        (ctx, direct_rx)
    }

    #[test]
    fn queue_drains_high_priority_packets_first() {
        let queue = PacketQueue::new();
        let peer = PeerId::random();
        let low = Packet::NewBlockHash(NewBlockHash { dag_block_hash: H256::ZERO });
        let high = Packet::Status(Status {
            net_id: 1,
            genesis_hash: H256::ZERO,
            protocol_version: "test".into(),
            dag_level: 0,
            pbft_size: 0,
            round: 0,
        });
        queue.push(peer, low);
        queue.push(peer, high.clone());
        let (_, first) = queue.pop().unwrap();
        assert_eq!(first, high);
    }

    #[test]
    fn stopped_queue_yields_none_once_drained() {
        let queue = PacketQueue::new();
        queue.stop();
        assert!(queue.pop().is_none());
    }

    #[test]
    fn status_from_wrong_chain_is_rejected_without_recording_position() {
        let (ctx, _rx) = test_ctx("wrong_chain");
        let peer = PeerId::random();
        let status = Status {
            net_id: 999,
            genesis_hash: H256::ZERO,
            protocol_version: "test".into(),
            dag_level: 1,
            pbft_size: 1,
            round: 1,
        };
        handle_status(&ctx, peer, status).unwrap();
        assert!(!peer_has_position(&ctx, &peer));
    }

    #[test]
    fn status_from_matching_chain_records_position_and_counts_peer() {
        let (ctx, _rx) = test_ctx("matching_chain");
        let peer = PeerId::random();
        let status = Status {
            net_id: 1,
            genesis_hash: H256::ZERO,
            protocol_version: "test".into(),
            dag_level: 4,
            pbft_size: 2,
            round: 1,
        };
        handle_status(&ctx, peer, status).unwrap();
        assert!(peer_has_position(&ctx, &peer));
        assert_eq!(ctx.connected_peers.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn non_status_packet_from_unknown_peer_is_dropped_before_dispatch() {
        let (ctx, _rx) = test_ctx("drop_unrecorded_peer");
        let peer = PeerId::random();
        let packet = Packet::NewBlockHash(NewBlockHash { dag_block_hash: H256::ZERO });
        assert!(dispatch(&ctx, peer, packet).is_ok());
        let (unverified, _) = ctx.block_manager.queue_sizes();
        assert_eq!(unverified, 0);
    }
}
