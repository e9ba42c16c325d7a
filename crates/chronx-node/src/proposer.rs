//! Bridges `PbftStateMachine`'s round/step decisions to the wire: casts and
//! broadcasts a real, VRF-sortition-eligible `Vote` the moment the state
//! machine records a fresh propose/soft/cert/next decision, and stages the
//! `PeriodBundle` a proposal anchors so `PbftDriver::commit_period` has
//! something to execute once cert quorum lands. Grounded on
//! `packets.rs::verify_and_add_vote`'s verification pipeline, run here in
//! reverse: prove sortition eligibility and self-register the result
//! through the exact same `VoteManager::add_verified_vote` path a remote
//! vote takes, so the local vote counts towards quorum the same way.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use chronx_core::codec::{Decodable, Encodable};
use chronx_core::error::ChronxError;
use chronx_core::period::{PbftBlock, PeriodBundle};
use chronx_core::transaction::Transaction;
use chronx_core::types::{Period, Signature, H256};
use chronx_core::vote::{PbftVoteType, Vote, VrfPbftMessage};
use chronx_core::chain_config::ChainConfig;
use chronx_dag::{BlockLookup, BlockManager};
use chronx_consensus::state_machine::STEP_CERT;
use chronx_consensus::{PbftStateMachine, VoteManager};
use chronx_p2p::message::{Packet, VotePacket};
use chronx_state::StateDb;
use tokio::sync::mpsc;

use crate::config::ValidatorConfig;
use crate::producer::ChainLookup;
use crate::wallet::NodeWallet;

#[derive(Default)]
struct CastMarkers {
    round: Period,
    proposed: bool,
    soft: bool,
    cert: bool,
    next_soft: bool,
    next_null: bool,
}

pub struct Proposer {
    wallet: Arc<NodeWallet>,
    state_machine: Arc<PbftStateMachine>,
    vote_manager: Arc<VoteManager>,
    block_manager: Arc<BlockManager>,
    state: Arc<StateDb>,
    chain_config: ChainConfig,
    validators: Arc<Vec<ValidatorConfig>>,
    broadcast_tx: mpsc::Sender<Packet>,
    cast: Mutex<CastMarkers>,
}

impl Proposer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        wallet: Arc<NodeWallet>,
        state_machine: Arc<PbftStateMachine>,
        vote_manager: Arc<VoteManager>,
        block_manager: Arc<BlockManager>,
        state: Arc<StateDb>,
        chain_config: ChainConfig,
        validators: Arc<Vec<ValidatorConfig>>,
        broadcast_tx: mpsc::Sender<Packet>,
    ) -> Self {
        Self {
            wallet,
            state_machine,
            vote_manager,
            block_manager,
            state,
            chain_config,
            validators,
            broadcast_tx,
            cast: Mutex::new(CastMarkers::default()),
        }
    }

    /// Observe the state machine's current round and emit whatever votes
    /// (and bundle staging) are newly due. Meant to be called frequently —
    /// on every periodic task tick — since it is purely idempotent
    /// bookkeeping against markers already set.
    pub fn tick(&self) {
        let snapshot = self.state_machine.snapshot();
        let mut cast = self.cast.lock().expect("lock poisoned");
        if cast.round != snapshot.round {
            *cast = CastMarkers { round: snapshot.round, ..CastMarkers::default() };
        }

        if let Some(v) = snapshot.own_starting_value {
            if !cast.proposed {
                cast.proposed = true;
                self.try_cast(PbftVoteType::Propose, v, snapshot.round, snapshot.step as u32);
                if let Err(err) = self.stage_period_bundle(v) {
                    tracing::warn!(error = %err, "failed to stage period bundle for own proposal");
                }
            }
        }
        if let Some(v) = snapshot.soft_voted_value {
            if !cast.soft {
                cast.soft = true;
                self.try_cast(PbftVoteType::Soft, v, snapshot.round, snapshot.step as u32);
            }
        }
        if let Some(v) = snapshot.cert_voted_value {
            if !cast.cert {
                cast.cert = true;
                self.try_cast(PbftVoteType::Cert, v, snapshot.round, STEP_CERT as u32);
            }
            if let Err(err) = self.refresh_cert_votes(v, snapshot.round) {
                tracing::warn!(error = %err, "failed to attach cert votes to staged bundle");
            }
        }
        if snapshot.next_voted_soft && !cast.next_soft {
            cast.next_soft = true;
            if let Some(v) = snapshot.cert_voted_value {
                self.try_cast(PbftVoteType::Next, v, snapshot.round, snapshot.step as u32);
            }
        }
        if snapshot.next_voted_null && !cast.next_null {
            cast.next_null = true;
            self.try_cast(PbftVoteType::Next, H256::ZERO, snapshot.round, snapshot.step as u32);
        }
    }

    /// Prove sortition for `(round, step, vote_type, block_hash)`; if this
    /// node's VRF output doesn't clear the committee threshold, it simply
    /// has nothing to cast this round — not an error, just bad luck of the
    /// draw.
    fn try_cast(&self, vote_type: PbftVoteType, block_hash: H256, round: Period, step: u32) {
        if let Err(err) = self.cast_vote(vote_type, block_hash, round, step) {
            tracing::debug!(?vote_type, error = %err, "not casting vote this round");
        }
    }

    fn cast_vote(&self, vote_type: PbftVoteType, block_hash: H256, round: Period, step: u32) -> Result<(), ChronxError> {
        let message = VrfPbftMessage { block_hash, vote_type, round, step }.to_bytes();
        let (proof, output) = self.wallet.vrf_keypair.prove(&message);

        let voters = self.validators.len() as u64;
        let committee_size = self.chain_config.pbft.committee_size;
        if !chronx_crypto::sortition::is_eligible(&output, voters, committee_size as u64) {
            return Err(ChronxError::InvalidProof("not elected into this round's committee".into()));
        }
        let weight = chronx_crypto::sortition::weight(&output, voters, committee_size);

        let mut vote = Vote {
            voter_pk: self.wallet.keypair.compressed_public_key(),
            vrf_proof: proof.to_vec(),
            vrf_output: output,
            block_hash,
            vote_type,
            round,
            step,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        };
        let digest = chronx_crypto::keccak256(&vote.signing_hash_preimage());
        vote.signature = self.wallet.keypair.sign_prehash(digest.as_bytes());

        self.vote_manager.add_verified_vote(&vote, self.wallet.keypair.address, weight)?;
        if self.broadcast_tx.blocking_send(Packet::Vote(VotePacket { vote })).is_err() {
            tracing::debug!("dropping cast vote: p2p broadcast channel closed");
        }
        Ok(())
    }

    /// Stage the bundle `anchor` would commit as the next period, so the
    /// driver's `commit_period` has something to execute the instant cert
    /// quorum lands. A no-op if a bundle for that period is already staged
    /// (e.g. a previous round already proposed the same anchor).
    fn stage_period_bundle(&self, anchor: H256) -> Result<(), ChronxError> {
        let head = self.state.get_pbft_head()?.unwrap_or(0);
        let next_period = head + 1;
        if self.state.get_period_bundle(next_period)?.is_some() {
            return Ok(());
        }

        let prev_bundle = if head == 0 { None } else { self.state.get_period_bundle(head)? };
        let prev_pbft_hash = prev_bundle
            .as_ref()
            .map(|b| chronx_crypto::keccak256(&b.pbft_block.to_canonical_bytes()))
            .unwrap_or(H256::ZERO);
        let prev_anchor = prev_bundle.as_ref().map(|b| b.pbft_block.anchor_dag_block_hash).unwrap_or(H256::ZERO);

        let snapshot = self.block_manager.snapshot();
        let lookup = ChainLookup::new(snapshot, &self.state);
        let ordered = chronx_dag::order_past_cone(&lookup, anchor, prev_anchor, &HashSet::new());

        let mut dag_blocks = Vec::with_capacity(ordered.len());
        let mut transactions = Vec::new();
        for hash in &ordered {
            let block = lookup.block(hash).cloned().ok_or_else(|| ChronxError::UnknownParent(hash.to_hex()))?;
            for tx_hash in &block.trx_hashes {
                if let Some(bytes) = self.state.get_transaction(tx_hash)? {
                    transactions.push(Transaction::from_canonical_bytes(&bytes)?);
                }
            }
            dag_blocks.push(block);
        }

        let timestamp = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64;
        let mut pbft_block = PbftBlock {
            prev_pbft_hash,
            anchor_dag_block_hash: anchor,
            period: next_period,
            timestamp,
            beneficiary: self.wallet.keypair.address,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        };
        let digest = chronx_crypto::keccak256(&pbft_block.signing_hash_preimage());
        pbft_block.signature = self.wallet.keypair.sign_prehash(digest.as_bytes());

        let bundle = PeriodBundle { pbft_block, cert_votes: Vec::new(), dag_blocks, transactions };
        self.state.put_period_bundle(next_period, &bundle)?;
        Ok(())
    }

    /// Once cert quorum for `anchor` is visible, attach the backing votes
    /// to the staged bundle so a synced peer (`handle_get_pbft_sync`) has
    /// proof of finality, not just the committed contents.
    fn refresh_cert_votes(&self, anchor: H256, round: Period) -> Result<(), ChronxError> {
        let head = self.state.get_pbft_head()?.unwrap_or(0);
        let next_period = head + 1;
        let Some(mut bundle) = self.state.get_period_bundle(next_period)? else { return Ok(()) };
        if !bundle.cert_votes.is_empty() || bundle.pbft_block.anchor_dag_block_hash != anchor {
            return Ok(());
        }
        let votes = self.vote_manager.votes_for(round, STEP_CERT as u32, PbftVoteType::Cert, anchor);
        if votes.is_empty() {
            return Ok(());
        }
        bundle.cert_votes = votes;
        self.state.put_period_bundle(next_period, &bundle)
    }
}
