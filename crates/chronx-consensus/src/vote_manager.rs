//! Vote bookkeeping: an `unverified` table keyed by round awaiting
//! signature/VRF-sortition verification, and a verified weight index keyed
//! by `(round, step, vote_type, block_hash)` that the state machine polls
//! for quorum. Grounded on the original `VoteManager` class's
//! `unverified_votes_` map-of-maps and `cleanupVotes`/
//! `pbftBlockHasEnoughValidCertVotes` shape, generalized from "count of
//! votes" to "sum of VRF-sortition weight" per this system's weighted
//! committee.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chronx_core::constants::VOTE_RETAIN_BACK_ROUNDS;
use chronx_core::error::ChronxError;
use chronx_core::types::{Address, H256, Period};
use chronx_core::vote::{PbftVoteType, Vote};
use chronx_state::StateDb;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct QuorumKey {
    round: Period,
    step: u32,
    vote_type: PbftVoteType,
    block_hash: H256,
}

fn quorum_key(vote: &Vote, step: u32) -> QuorumKey {
    QuorumKey { round: vote.round, step, vote_type: vote.vote_type, block_hash: vote.block_hash }
}

/// Dedup/double-vote key: `(round, type, voter)` only, per the protocol rule
/// that a second distinct vote from the same voter for the same
/// `(round, type)` is equivocation regardless of which block or step it
/// names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct VoterKey {
    round: Period,
    vote_type: PbftVoteType,
    voter: Address,
}

/// The first vote seen from a voter at a given `VoterKey`, kept around so a
/// later conflicting vote can locate and retract the weight/voter entry the
/// first vote had already earned.
#[derive(Clone, Copy)]
struct FirstVote {
    block_hash: H256,
    step: u32,
    vote_hash: H256,
    weight: u32,
}

struct Inner {
    unverified: BTreeMap<Period, HashMap<H256, Vote>>,
    verified_weight: HashMap<QuorumKey, u32>,
    verified_voters: HashMap<QuorumKey, Vec<Address>>,
    verified_vote_hashes: HashMap<QuorumKey, Vec<H256>>,
    first_vote: HashMap<VoterKey, FirstVote>,
    malicious: HashMap<Period, Vec<Address>>,
    evidence: HashMap<VoterKey, Vec<H256>>,
}

pub struct VoteManager {
    db: Arc<StateDb>,
    inner: Mutex<Inner>,
}

impl VoteManager {
    pub fn new(db: Arc<StateDb>) -> Self {
        Self {
            db,
            inner: Mutex::new(Inner {
                unverified: BTreeMap::new(),
                verified_weight: HashMap::new(),
                verified_voters: HashMap::new(),
                verified_vote_hashes: HashMap::new(),
                first_vote: HashMap::new(),
                malicious: HashMap::new(),
                evidence: HashMap::new(),
            }),
        }
    }

    fn vote_hash(vote: &Vote) -> H256 {
        chronx_crypto::keccak256(&vote.signing_hash_preimage())
    }

    /// Stage a vote awaiting verification. No-op if already staged.
    pub fn add_unverified_vote(&self, vote: Vote) -> Result<(), ChronxError> {
        let hash = Self::vote_hash(&vote);
        self.db.put_unverified_vote(&hash, &bincode::serialize(&vote)?)?;
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.unverified.entry(vote.round).or_default().insert(hash, vote);
        Ok(())
    }

    pub fn unverified_votes_for_round(&self, round: Period) -> Vec<Vote> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.unverified.get(&round).map(|m| m.values().cloned().collect()).unwrap_or_default()
    }

    pub fn unverified_count(&self) -> usize {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.unverified.values().map(|m| m.len()).sum()
    }

    /// Promote a vote once its signature and VRF sortition have checked
    /// out, recording `weight` towards its `(round, step, type, block)`
    /// quorum bucket. Persists to the appropriate round-indexed column so a
    /// restart doesn't lose quorum progress.
    ///
    /// Rejects double-votes by `(round, type, voter)`: if this voter already
    /// has a vote on file for this `(round, type)` naming a *different*
    /// block, both votes are kept on disk as evidence, neither counts toward
    /// any quorum (the first vote's earlier weight contribution, if any, is
    /// retracted), and the voter is marked malicious for the round.
    pub fn add_verified_vote(&self, vote: &Vote, voter: Address, weight: u32) -> Result<(), ChronxError> {
        let hash = Self::vote_hash(vote);
        let bytes = bincode::serialize(vote)?;
        self.db.put_verified_vote(&hash, &bytes)?;
        match vote.vote_type {
            PbftVoteType::Soft => self.db.put_soft_vote(vote.round, &voter, &hash)?,
            PbftVoteType::Next => self.db.put_next_vote(vote.round, &voter, &hash)?,
            PbftVoteType::Cert | PbftVoteType::Propose => {}
        }

        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.unverified.entry(vote.round).or_default().remove(&hash);
        self.db.remove_unverified_vote(&hash)?;

        let voter_key = VoterKey { round: vote.round, vote_type: vote.vote_type, voter };

        if inner.malicious.get(&vote.round).is_some_and(|voters| voters.contains(&voter)) {
            // Already flagged malicious this round; keep piling up evidence,
            // never count weight again.
            inner.evidence.entry(voter_key).or_default().push(hash);
            return Ok(());
        }

        if let Some(first) = inner.first_vote.get(&voter_key).copied() {
            if first.block_hash == vote.block_hash {
                // Same vote re-delivered (e.g. re-gossiped); already counted.
                return Ok(());
            }

            // Equivocation: retract the first vote's weight/voter entry and
            // exclude this one too.
            let first_key = QuorumKey { round: vote.round, step: first.step, vote_type: vote.vote_type, block_hash: first.block_hash };
            if let Some(voters) = inner.verified_voters.get_mut(&first_key) {
                voters.retain(|v| v != &voter);
            }
            if let Some(w) = inner.verified_weight.get_mut(&first_key) {
                *w = w.saturating_sub(first.weight);
            }
            if let Some(hashes) = inner.verified_vote_hashes.get_mut(&first_key) {
                hashes.retain(|h| h != &first.vote_hash);
            }

            inner.malicious.entry(vote.round).or_default().push(voter);
            inner.evidence.entry(voter_key).or_default().extend([first.vote_hash, hash]);
            return Ok(());
        }

        inner.first_vote.insert(
            voter_key,
            FirstVote { block_hash: vote.block_hash, step: vote.step, vote_hash: hash, weight },
        );

        let key = quorum_key(vote, vote.step);
        let voters = inner.verified_voters.entry(key).or_default();
        if voters.contains(&voter) {
            return Ok(());
        }
        voters.push(voter);
        *inner.verified_weight.entry(key).or_insert(0) += weight;
        inner.verified_vote_hashes.entry(key).or_default().push(hash);
        Ok(())
    }

    /// Voters flagged malicious for `round` via double-vote detection.
    pub fn malicious_voters(&self, round: Period) -> Vec<Address> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.malicious.get(&round).cloned().unwrap_or_default()
    }

    /// Evidence (both conflicting vote hashes) backing a malicious marking.
    pub fn equivocation_evidence(&self, round: Period, vote_type: PbftVoteType, voter: Address) -> Vec<H256> {
        let inner = self.inner.lock().expect("lock poisoned");
        inner.evidence.get(&VoterKey { round, vote_type, voter }).cloned().unwrap_or_default()
    }

    /// Resolve every verified vote backing a `(round, step, type, block)`
    /// bucket, for a proposer assembling a `PeriodBundle`'s `cert_votes`.
    /// Skips a hash silently if the persisted record is missing or
    /// undecodable — the weight/voter bookkeeping stays the source of truth
    /// for quorum, this is best-effort retrieval of the backing votes.
    pub fn votes_for(&self, round: Period, step: u32, vote_type: PbftVoteType, block_hash: H256) -> Vec<Vote> {
        let key = QuorumKey { round, step, vote_type, block_hash };
        let hashes = {
            let inner = self.inner.lock().expect("lock poisoned");
            inner.verified_vote_hashes.get(&key).cloned().unwrap_or_default()
        };
        hashes
            .into_iter()
            .filter_map(|hash| self.db.get_verified_vote(&hash).ok().flatten())
            .filter_map(|bytes| bincode::deserialize::<Vote>(&bytes).ok())
            .collect()
    }

    /// Summed weight of every distinct voter that has cast `vote_type` for
    /// `block_hash` at `(round, step)`.
    pub fn quorum_weight(&self, round: Period, step: u32, vote_type: PbftVoteType, block_hash: H256) -> u32 {
        let key = QuorumKey { round, step, vote_type, block_hash };
        let inner = self.inner.lock().expect("lock poisoned");
        inner.verified_weight.get(&key).copied().unwrap_or(0)
    }

    pub fn has_quorum(&self, round: Period, step: u32, vote_type: PbftVoteType, block_hash: H256, two_t_plus_one: u32) -> bool {
        self.quorum_weight(round, step, vote_type, block_hash) >= two_t_plus_one
    }

    /// Drop every round older than `current_round - VOTE_RETAIN_BACK_ROUNDS`
    /// from the in-memory tables (the persisted unverified/verified columns
    /// are bounded the same way by the driver's periodic sweep).
    pub fn cleanup_votes(&self, current_round: Period) {
        let floor = current_round.saturating_sub(VOTE_RETAIN_BACK_ROUNDS);
        let mut inner = self.inner.lock().expect("lock poisoned");
        inner.unverified.retain(|round, _| *round >= floor);
        inner.verified_weight.retain(|key, _| key.round >= floor);
        inner.verified_voters.retain(|key, _| key.round >= floor);
        inner.verified_vote_hashes.retain(|key, _| key.round >= floor);
        inner.first_vote.retain(|key, _| key.round >= floor);
        inner.malicious.retain(|round, _| *round >= floor);
        inner.evidence.retain(|key, _| key.round >= floor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronx_core::types::Signature;

    fn temp_db(name: &str) -> Arc<StateDb> {
        let dir = std::env::temp_dir().join(format!("chronx_vote_manager_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(StateDb::open(&dir).expect("open temp db"))
    }

    fn sample_vote(round: Period, step: u32, vote_type: PbftVoteType, block_hash: H256) -> Vote {
        Vote {
            voter_pk: [1u8; 33],
            vrf_proof: vec![2u8; 80],
            vrf_output: [3u8; 64],
            block_hash,
            vote_type,
            round,
            step,
            signature: Signature { v: 0, r: [5u8; 32], s: [6u8; 32] },
        }
    }

    #[test]
    fn unverified_vote_promotes_and_accumulates_weight() {
        let vm = VoteManager::new(temp_db("promote"));
        let block_hash = H256::from_bytes([9u8; 32]);
        let vote = sample_vote(10, 3, PbftVoteType::Soft, block_hash);
        vm.add_unverified_vote(vote.clone()).unwrap();
        assert_eq!(vm.unverified_count(), 1);

        let voter = Address::from_bytes([1u8; 20]);
        vm.add_verified_vote(&vote, voter, 5).unwrap();
        assert_eq!(vm.unverified_count(), 0);
        assert_eq!(vm.quorum_weight(10, 3, PbftVoteType::Soft, block_hash), 5);
    }

    #[test]
    fn duplicate_voter_does_not_double_count() {
        let vm = VoteManager::new(temp_db("dedupe"));
        let block_hash = H256::from_bytes([8u8; 32]);
        let vote = sample_vote(1, 0, PbftVoteType::Cert, block_hash);
        let voter = Address::from_bytes([2u8; 20]);
        vm.add_verified_vote(&vote, voter, 4).unwrap();
        vm.add_verified_vote(&vote, voter, 4).unwrap();
        assert_eq!(vm.quorum_weight(1, 0, PbftVoteType::Cert, block_hash), 4);
    }

    #[test]
    fn double_vote_is_excluded_from_quorum_and_marks_voter_malicious() {
        let vm = VoteManager::new(temp_db("equivocation"));
        let block_a = H256::from_bytes([21u8; 32]);
        let block_b = H256::from_bytes([22u8; 32]);
        let voter = Address::from_bytes([9u8; 20]);

        let vote_a = sample_vote(5, 0, PbftVoteType::Cert, block_a);
        let vote_b = sample_vote(5, 0, PbftVoteType::Cert, block_b);

        vm.add_verified_vote(&vote_a, voter, 6).unwrap();
        assert_eq!(vm.quorum_weight(5, 0, PbftVoteType::Cert, block_a), 6);

        vm.add_verified_vote(&vote_b, voter, 6).unwrap();

        assert_eq!(vm.quorum_weight(5, 0, PbftVoteType::Cert, block_a), 0);
        assert_eq!(vm.quorum_weight(5, 0, PbftVoteType::Cert, block_b), 0);
        assert_eq!(vm.malicious_voters(5), vec![voter]);
        assert_eq!(vm.equivocation_evidence(5, PbftVoteType::Cert, voter).len(), 2);
    }

    #[test]
    fn has_quorum_compares_against_threshold() {
        let vm = VoteManager::new(temp_db("quorum"));
        let block_hash = H256::from_bytes([7u8; 32]);
        let vote = sample_vote(1, 0, PbftVoteType::Cert, block_hash);
        vm.add_verified_vote(&vote, Address::from_bytes([3u8; 20]), 10).unwrap();
        assert!(!vm.has_quorum(1, 0, PbftVoteType::Cert, block_hash, 15));
        vm.add_verified_vote(&vote, Address::from_bytes([4u8; 20]), 10).unwrap();
        assert!(vm.has_quorum(1, 0, PbftVoteType::Cert, block_hash, 15));
    }

    #[test]
    fn votes_for_resolves_the_backing_vote() {
        let vm = VoteManager::new(temp_db("votes_for"));
        let block_hash = H256::from_bytes([11u8; 32]);
        let vote = sample_vote(2, 1, PbftVoteType::Cert, block_hash);
        vm.add_verified_vote(&vote, Address::from_bytes([5u8; 20]), 3).unwrap();
        let votes = vm.votes_for(2, 1, PbftVoteType::Cert, block_hash);
        assert_eq!(votes.len(), 1);
        assert_eq!(votes[0].round, 2);
    }

    #[test]
    fn cleanup_drops_rounds_older_than_retain_window() {
        let vm = VoteManager::new(temp_db("cleanup"));
        let vote = sample_vote(1, 0, PbftVoteType::Soft, H256::from_bytes([6u8; 32]));
        vm.add_unverified_vote(vote).unwrap();
        vm.cleanup_votes(1 + VOTE_RETAIN_BACK_ROUNDS + 1);
        assert_eq!(vm.unverified_count(), 0);
    }
}
