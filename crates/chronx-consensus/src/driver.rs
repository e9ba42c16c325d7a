//! The PBFT driver thread: a single loop that computes the remaining time
//! to the current step's boundary (or the next signaled vote/block
//! arrival, whichever is sooner) and sleeps on a condition variable for
//! that duration, waking early on a signal. Grounded on the engine loop
//! shape around the original `PbftManager`/`pbft_chain.hpp`, restructured
//! around this system's explicit round/step state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chronx_core::codec::Encodable;
use chronx_core::period::PeriodBundle;
use chronx_core::types::{Period, H256};
use chronx_core::vote::PbftVoteType;
use chronx_dag::BlockManager;
use chronx_executor::Executor;
use chronx_state::StateDb;

use crate::state_machine::{step_for_elapsed, two_f_plus_one, PbftStateMachine, STEP_CERT, STEP_PROPOSE, STEP_SOFT};
use crate::vote_manager::VoteManager;

pub struct PbftDriver {
    signal: Arc<(Mutex<bool>, Condvar)>,
    stopped: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PbftDriver {
    /// Spawn the driver thread. `voters` is the period's sortition player
    /// count, used to compute the `2f+1` quorum threshold.
    pub fn spawn(
        state_machine: Arc<PbftStateMachine>,
        vote_manager: Arc<VoteManager>,
        dag: Arc<BlockManager>,
        state: Arc<StateDb>,
        executor: Arc<Executor>,
        voters: u64,
    ) -> Self {
        let signal = Arc::new((Mutex::new(false), Condvar::new()));
        let stopped = Arc::new(AtomicBool::new(false));

        let thread_signal = Arc::clone(&signal);
        let thread_stopped = Arc::clone(&stopped);
        let handle = thread::Builder::new()
            .name("pbft-driver".into())
            .spawn(move || {
                run_loop(state_machine, vote_manager, dag, state, executor, voters, thread_signal, thread_stopped)
            })
            .expect("spawn pbft driver thread");

        Self { signal, stopped, handle: Some(handle) }
    }

    /// Wake the driver early — called by packet processors when a new vote
    /// or block relevant to the current round arrives.
    pub fn notify(&self) {
        let (lock, cvar) = &*self.signal;
        let mut woken = lock.lock().expect("lock poisoned");
        *woken = true;
        cvar.notify_one();
    }

    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PbftDriver {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.stop();
        }
    }
}

fn run_loop(
    sm: Arc<PbftStateMachine>,
    vm: Arc<VoteManager>,
    dag: Arc<BlockManager>,
    state: Arc<StateDb>,
    executor: Arc<Executor>,
    voters: u64,
    signal: Arc<(Mutex<bool>, Condvar)>,
    stopped: Arc<AtomicBool>,
) {
    let quorum = two_f_plus_one(voters) as u32;
    let mut round_start = Instant::now();

    while !stopped.load(Ordering::SeqCst) {
        let snapshot = sm.snapshot();
        let elapsed_ms = round_start.elapsed().as_millis() as u64;
        let wanted_step = step_for_elapsed(elapsed_ms, snapshot.lambda_ms);
        if wanted_step != snapshot.step {
            sm.set_step(wanted_step);
        }

        drive_step(&sm, &vm, &dag, &state, &executor, wanted_step, quorum, &mut round_start);

        let window_ms = snapshot.lambda_ms.max(1) as u64;
        let (lock, cvar) = &*signal;
        let woken = lock.lock().expect("lock poisoned");
        let (mut woken, _) = cvar.wait_timeout_while(woken, Duration::from_millis(window_ms), |w| !*w).expect("lock poisoned");
        *woken = false;
    }
}

fn drive_step(
    sm: &PbftStateMachine,
    vm: &VoteManager,
    dag: &BlockManager,
    state: &StateDb,
    executor: &Executor,
    step: u64,
    quorum: u32,
    round_start: &mut Instant,
) {
    let last_finalized_anchor = state
        .get_pbft_head()
        .ok()
        .flatten()
        .and_then(|p| state.get_period_bundle(p).ok().flatten())
        .map(|b| chronx_crypto::keccak256(&b.pbft_block.to_canonical_bytes()))
        .unwrap_or(H256::ZERO);

    if step == STEP_PROPOSE {
        sm.select_own_starting_value(Some(dag.pivot_chain_tip()), last_finalized_anchor);
        return;
    }
    if step == STEP_SOFT {
        let snapshot = sm.snapshot();
        if let Some(v) = snapshot.own_starting_value {
            sm.try_soft_vote(Some(v));
        }
        return;
    }
    if step == STEP_CERT {
        let snapshot = sm.snapshot();
        if let Some(v) = snapshot.soft_voted_value {
            sm.try_cert_vote(vm, v, quorum);
        }
        return;
    }

    // Step >= 4: try to commit on cert quorum, else cast/check next votes.
    let snapshot = sm.snapshot();
    if let Some(v) = snapshot.cert_voted_value {
        if sm.try_commit(vm, v, quorum) {
            commit_period(sm, state, executor, v);
            *round_start = Instant::now();
            return;
        }
    }

    let prior_step_saw_null = step > STEP_CERT + 1
        && vm.has_quorum(snapshot.round, (step - 1) as u32, PbftVoteType::Next, H256::ZERO, quorum);
    sm.try_next_vote(prior_step_saw_null);

    if let Some(v) = snapshot.cert_voted_value {
        if vm.has_quorum(snapshot.round, step as u32, PbftVoteType::Next, v, quorum) {
            sm.advance_round(Some(v), false);
            *round_start = Instant::now();
        }
    } else if vm.has_quorum(snapshot.round, step as u32, PbftVoteType::Next, H256::ZERO, quorum) {
        sm.advance_round(None, false);
        *round_start = Instant::now();
    }
}

/// Commit the next undecided period once its cert quorum lands. The
/// proposer stages the bundle it proposed under `period_data` optimistically
/// as part of proposing; the driver re-reads it here once quorum confirms
/// it rather than carrying it through the vote path. A real packet layer
/// would instead hand the bundle straight from the proposal packet handler.
fn commit_period(sm: &PbftStateMachine, state: &StateDb, executor: &Executor, anchor_value: H256) {
    let Some(head) = state.get_pbft_head().ok().flatten() else {
        tracing::warn!(%anchor_value, "cannot commit period: no pbft_head recorded");
        return;
    };
    let next_period = head + 1;
    let Some(bundle): Option<PeriodBundle> = state.get_period_bundle(next_period).ok().flatten() else {
        tracing::warn!(period = next_period, "cert quorum reached but no pending bundle staged");
        return;
    };
    match executor.execute_period(next_period, &bundle) {
        Ok(result) => {
            tracing::info!(period = result.period, new_state_root = %result.new_state_root, "period committed by pbft driver");
            let lambda_ms = sm.snapshot().lambda_ms;
            sm.start_next_period(lambda_ms);
        }
        Err(err) => tracing::error!(period = next_period, error = %err, "period execution failed"),
    }
}
