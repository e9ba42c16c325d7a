//! Per-period PBFT round/step state: the propose/soft/cert/next voting
//! rounds a node walks through to certify one anchor per period. Grounded
//! on the round/step/value-tracking fields of the original PBFT engine
//! (`pbft_chain.hpp`'s `PbftBlock`/`PbftVoteTypes`) and the driver loop
//! sketched alongside it, replacing `chronx-consensus/src/finality.rs`'s
//! confirmation-counting tracker with real round/step PBFT.

use std::sync::Mutex;

use chronx_core::types::{Period, H256};
use chronx_core::vote::PbftVoteType;

use crate::vote_manager::VoteManager;

/// Step 1 proposes, step 2 soft-votes, step 3 cert-votes, step ≥4 repeats
/// next-votes until the round carries forward.
pub const STEP_PROPOSE: u64 = 1;
pub const STEP_SOFT: u64 = 2;
pub const STEP_CERT: u64 = 3;
pub const STEP_NEXT_START: u64 = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoundState {
    pub round: Period,
    pub step: u64,
    pub own_starting_value: Option<H256>,
    pub soft_voted_value: Option<H256>,
    pub cert_voted_value: Option<H256>,
    pub last_cert_voted_value: Option<H256>,
    pub soft_voted_in_round: bool,
    pub executed_in_round: bool,
    pub next_voted_soft: bool,
    pub next_voted_null: bool,
    pub lambda_ms: u32,
}

impl RoundState {
    pub fn initial(lambda_ms_min: u32) -> Self {
        Self {
            round: 1,
            step: STEP_PROPOSE,
            own_starting_value: None,
            soft_voted_value: None,
            cert_voted_value: None,
            last_cert_voted_value: None,
            soft_voted_in_round: false,
            executed_in_round: false,
            next_voted_soft: false,
            next_voted_null: false,
            lambda_ms: lambda_ms_min,
        }
    }
}

/// `f = ⌊(voters - 1) / 3⌋`, the max tolerated faulty/absent weight; quorum
/// is `2f + 1`.
pub fn two_f_plus_one(voters: u64) -> u64 {
    let f = voters.saturating_sub(1) / 3;
    2 * f + 1
}

/// The step the elapsed time since round start falls into: `[0, 2λ)` is
/// propose, `[2λ, 4λ)` soft, `[4λ, 6λ)` cert, everything after repeats next.
pub fn step_for_elapsed(elapsed_ms: u64, lambda_ms: u32) -> u64 {
    let lambda_ms = lambda_ms.max(1) as u64;
    1 + elapsed_ms / (2 * lambda_ms)
}

pub struct PbftStateMachine {
    state: Mutex<RoundState>,
    lambda_ms_max: u32,
}

impl PbftStateMachine {
    pub fn new(lambda_ms_min: u32, lambda_ms_max: u32) -> Self {
        Self { state: Mutex::new(RoundState::initial(lambda_ms_min)), lambda_ms_max }
    }

    pub fn snapshot(&self) -> RoundState {
        self.state.lock().expect("lock poisoned").clone()
    }

    /// Value selection for a fresh propose step: carry forward
    /// `last_cert_voted_value` if set, else the hash of a newly built block
    /// anchored at `pivot_tip` — unless that tip equals the previously
    /// finalized anchor, in which case propose NULL.
    pub fn select_own_starting_value(&self, pivot_tip_block_hash: Option<H256>, previously_finalized_anchor: H256) -> Option<H256> {
        let mut state = self.state.lock().expect("lock poisoned");
        let value = if let Some(carried) = state.last_cert_voted_value {
            Some(carried)
        } else {
            match pivot_tip_block_hash {
                Some(tip) if tip != previously_finalized_anchor => Some(tip),
                _ => None,
            }
        };
        state.own_starting_value = value;
        value
    }

    /// Step 2: soft-vote the highest-credential proposed value if it is
    /// non-null and consistent with any carried-forward cert vote.
    pub fn try_soft_vote(&self, highest_credential_value: Option<H256>) -> Option<H256> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.soft_voted_in_round {
            return None;
        }
        let Some(v) = highest_credential_value else { return None };
        let consistent = state.last_cert_voted_value.is_none() || state.last_cert_voted_value == Some(v);
        if !consistent {
            return None;
        }
        state.soft_voted_value = Some(v);
        state.soft_voted_in_round = true;
        Some(v)
    }

    /// Step 3: cert-vote `value` once the vote manager reports `≥2f+1` soft
    /// votes for it.
    pub fn try_cert_vote(&self, vote_manager: &VoteManager, value: H256, two_t_plus_one: u32) -> Option<H256> {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.cert_voted_value.is_some() {
            return None;
        }
        if !vote_manager.has_quorum(state.round, STEP_SOFT as u32, PbftVoteType::Soft, value, two_t_plus_one) {
            return None;
        }
        state.cert_voted_value = Some(value);
        Some(value)
    }

    /// `≥2f+1` cert votes for a non-null value commits the period. Resets
    /// round state to 1 for the next period on success.
    pub fn try_commit(&self, vote_manager: &VoteManager, value: H256, two_t_plus_one: u32) -> bool {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.executed_in_round {
            return false;
        }
        if !vote_manager.has_quorum(state.round, STEP_CERT as u32, PbftVoteType::Cert, value, two_t_plus_one) {
            return false;
        }
        state.executed_in_round = true;
        true
    }

    /// Step ≥4: emit `next(cert_voted_value)` if set, else
    /// `next(NULL)` once `≥2f+1` prior-step next-NULL votes were observed.
    /// At most one of each per round.
    pub fn try_next_vote(&self, saw_next_null_quorum: bool) -> (Option<H256>, bool) {
        let mut state = self.state.lock().expect("lock poisoned");
        let mut emitted_value = None;
        if let Some(v) = state.cert_voted_value {
            if !state.next_voted_soft {
                state.next_voted_soft = true;
                emitted_value = Some(v);
            }
        } else if saw_next_null_quorum && !state.next_voted_null {
            state.next_voted_null = true;
            return (None, true);
        }
        (emitted_value, false)
    }

    /// When `≥2f+1` next votes agree on the same value (NULL or otherwise),
    /// advance to the next round, carrying that value forward as
    /// `last_cert_voted_value` (unchanged if NULL).
    pub fn advance_round(&self, carried_value: Option<H256>, timed_out: bool) {
        let mut state = self.state.lock().expect("lock poisoned");
        let next_lambda = if timed_out {
            (state.lambda_ms.saturating_mul(2)).min(self.lambda_ms_max)
        } else {
            state.lambda_ms
        };
        let lambda_ms_min = state.lambda_ms;
        *state = RoundState {
            round: state.round + 1,
            step: STEP_PROPOSE,
            own_starting_value: None,
            soft_voted_value: None,
            cert_voted_value: None,
            last_cert_voted_value: carried_value.or(state.last_cert_voted_value),
            soft_voted_in_round: false,
            executed_in_round: false,
            next_voted_soft: false,
            next_voted_null: false,
            lambda_ms: if carried_value.is_some() { lambda_ms_min } else { next_lambda },
        };
    }

    /// Called when a period commits: resets round to 1 and clears the
    /// carried cert-voted value for the next period.
    pub fn start_next_period(&self, lambda_ms_min: u32) {
        let mut state = self.state.lock().expect("lock poisoned");
        *state = RoundState::initial(lambda_ms_min);
    }

    pub fn set_step(&self, step: u64) {
        self.state.lock().expect("lock poisoned").step = step;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn two_f_plus_one_matches_byzantine_formula() {
        assert_eq!(two_f_plus_one(1), 1);
        assert_eq!(two_f_plus_one(4), 1);
        assert_eq!(two_f_plus_one(7), 3);
        assert_eq!(two_f_plus_one(10), 5);
    }

    #[test]
    fn step_boundaries_follow_two_lambda_windows() {
        assert_eq!(step_for_elapsed(0, 100), 1);
        assert_eq!(step_for_elapsed(199, 100), 1);
        assert_eq!(step_for_elapsed(200, 100), 2);
        assert_eq!(step_for_elapsed(400, 100), 3);
        assert_eq!(step_for_elapsed(600, 100), 4);
    }

    #[test]
    fn own_starting_value_carries_forward_cert_voted_value() {
        let sm = PbftStateMachine::new(100, 60_000);
        {
            let mut state = sm.state.lock().unwrap();
            state.last_cert_voted_value = Some(H256::from_bytes([1u8; 32]));
        }
        let v = sm.select_own_starting_value(Some(H256::from_bytes([2u8; 32])), H256::ZERO);
        assert_eq!(v, Some(H256::from_bytes([1u8; 32])));
    }

    #[test]
    fn own_starting_value_proposes_null_when_tip_matches_finalized_anchor() {
        let sm = PbftStateMachine::new(100, 60_000);
        let anchor = H256::from_bytes([3u8; 32]);
        let v = sm.select_own_starting_value(Some(anchor), anchor);
        assert_eq!(v, None);
    }

    #[test]
    fn soft_vote_is_only_cast_once_per_round() {
        let sm = PbftStateMachine::new(100, 60_000);
        let value = H256::from_bytes([4u8; 32]);
        assert_eq!(sm.try_soft_vote(Some(value)), Some(value));
        assert_eq!(sm.try_soft_vote(Some(value)), None);
    }

    #[test]
    fn cert_vote_requires_soft_quorum() {
        let db_dir = std::env::temp_dir().join("chronx_state_machine_test_cert");
        let _ = std::fs::remove_dir_all(&db_dir);
        let db = std::sync::Arc::new(chronx_state::StateDb::open(&db_dir).unwrap());
        let vm = VoteManager::new(db);
        let sm = PbftStateMachine::new(100, 60_000);
        let value = H256::from_bytes([5u8; 32]);

        assert_eq!(sm.try_cert_vote(&vm, value, 2), None);

        let vote = chronx_core::vote::Vote {
            voter_pk: [1u8; 33],
            vrf_proof: vec![0u8; 80],
            vrf_output: [0u8; 64],
            block_hash: value,
            vote_type: PbftVoteType::Soft,
            round: 1,
            step: STEP_SOFT as u32,
            signature: chronx_core::types::Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        };
        vm.add_verified_vote(&vote, chronx_core::types::Address::from_bytes([1u8; 20]), 1).unwrap();
        vm.add_verified_vote(&vote, chronx_core::types::Address::from_bytes([2u8; 20]), 1).unwrap();

        assert_eq!(sm.try_cert_vote(&vm, value, 2), Some(value));
    }

    #[test]
    fn advance_round_doubles_lambda_on_timeout_without_carried_value() {
        let sm = PbftStateMachine::new(100, 60_000);
        sm.advance_round(None, true);
        assert_eq!(sm.snapshot().lambda_ms, 200);
        assert_eq!(sm.snapshot().round, 2);
    }
}
