//! The periodic task thread: a single OS thread that wakes on a fixed tick
//! to do the housekeeping no packet or RPC call triggers on its own —
//! producing and broadcasting this node's own DAG blocks, advancing the
//! proposer, gossiping this node's own status, and trimming vote-manager
//! history. Grounded on the same "one thread, one cheap sleep loop" shape
//! `driver.rs`'s `PbftDriver::run_loop` uses, generalized to several
//! unrelated chores instead of one state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::sync::mpsc;

use chronx_consensus::VoteManager;
use chronx_core::chain_config::ChainConfig;
use chronx_core::codec::Decodable;
use chronx_core::types::H256;
use chronx_dag::{BlockLookup, BlockManager, ProposalPeriodLevelsMap};
use chronx_p2p::message::{NewBlock, NewBlockHash, Packet, Status};
use chronx_state::StateDb;
use chronx_txpool::TxPool;

use crate::producer;
use crate::proposer::Proposer;
use crate::wallet::NodeWallet;

const TICK: Duration = Duration::from_millis(250);

pub struct TaskHandle {
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TaskHandle {
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::too_many_arguments)]
pub fn spawn(
    proposer: Arc<Proposer>,
    state: Arc<StateDb>,
    block_manager: Arc<BlockManager>,
    vote_manager: Arc<VoteManager>,
    txpool: Arc<TxPool>,
    chain_config: ChainConfig,
    levels: Arc<Mutex<ProposalPeriodLevelsMap>>,
    wallet: Arc<NodeWallet>,
    broadcast_tx: mpsc::Sender<Packet>,
    net_id: u64,
    genesis_hash: H256,
) -> TaskHandle {
    let stopped = Arc::new(AtomicBool::new(false));
    let thread_stopped = Arc::clone(&stopped);

    let handle = thread::Builder::new()
        .name("node-tasks".into())
        .spawn(move || {
            let mut last_announced_tip = H256::ZERO;
            while !thread_stopped.load(Ordering::SeqCst) {
                proposer.tick();
                produce_and_broadcast(
                    &block_manager,
                    &state,
                    &txpool,
                    &chain_config,
                    &levels,
                    &wallet,
                    &broadcast_tx,
                );

                let tip = block_manager.pivot_chain_tip();
                if tip != last_announced_tip {
                    last_announced_tip = tip;
                    let _ = broadcast_tx.blocking_send(Packet::NewBlockHash(NewBlockHash { dag_block_hash: tip }));
                }

                let head = state.get_pbft_head().ok().flatten().unwrap_or(0);
                let status = Status {
                    net_id,
                    genesis_hash,
                    protocol_version: env!("CARGO_PKG_VERSION").to_string(),
                    dag_level: dag_level_hint(&block_manager),
                    pbft_size: head,
                    round: head,
                };
                let _ = broadcast_tx.try_send(Packet::Status(status));

                vote_manager.cleanup_votes(head.saturating_add(1));

                thread::sleep(TICK);
            }
        })
        .expect("spawn node task thread");

    TaskHandle { stopped, handle: Some(handle) }
}

/// Build a DAG block from whatever the pool has ready, hand it to the same
/// admission path a gossiped block takes (so it lands in the unverified
/// queue and gets checked by the verifier pool like any other), and
/// broadcast it to peers once queued.
fn produce_and_broadcast(
    block_manager: &BlockManager,
    state: &StateDb,
    txpool: &TxPool,
    chain_config: &ChainConfig,
    levels: &Mutex<ProposalPeriodLevelsMap>,
    wallet: &NodeWallet,
    broadcast_tx: &mpsc::Sender<Packet>,
) {
    let produced = match producer::produce_dag_block(block_manager, state, txpool, chain_config, levels, wallet) {
        Ok(block) => block,
        Err(err) => {
            tracing::warn!(error = %err, "failed to produce dag block");
            return;
        }
    };
    let Some(block) = produced else { return };

    let transactions: Vec<chronx_core::transaction::Transaction> = block
        .trx_hashes
        .iter()
        .filter_map(|hash| state.get_transaction(hash).ok().flatten())
        .filter_map(|bytes| Decodable::from_canonical_bytes(&bytes).ok())
        .collect();

    let bm = block_manager;
    let st = state;
    match block_manager.insert_block(block.clone(), move |h| bm.is_known(h) || st.dag_block_exists(h)) {
        Ok(_) => {
            let _ = broadcast_tx.try_send(Packet::NewBlock(NewBlock { dag_block: block, transactions }));
        }
        Err(err) => tracing::warn!(error = %err, "failed to admit own produced dag block"),
    }
}

fn dag_level_hint(block_manager: &BlockManager) -> u64 {
    let snapshot = block_manager.snapshot();
    let tip = block_manager.pivot_chain_tip();
    snapshot.block(&tip).map(|b| b.level).unwrap_or(0)
}
