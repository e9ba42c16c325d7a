//! Single-threaded period application: decode a committed bundle, run the
//! deterministic value-transfer transition over its transactions, and
//! persist the result in one atomic commit. Generalizes the staged-mutation
//! + atomic-commit shape the state crate used to carry for its claims
//! dispatch, narrowed to this system's one transition.

use std::sync::Arc;

use chronx_core::codec::Encodable;
use chronx_core::error::ChronxError;
use chronx_core::period::PeriodBundle;
use chronx_core::transaction::Transaction;
use chronx_core::types::{Address, Balance, Period, H256};
use chronx_state::{Account, StateDb};
use chronx_txpool::{sender_address, TxPool};

const EXECUTED_HEAD_KEY: &str = "executed_head";
const PBFT_CHAIN_SIZE_KEY: &str = "pbft_chain_size";

/// Outcome of applying one transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub tx_hash: H256,
    pub success: bool,
    pub gas_used: u64,
}

/// Outcome of applying one full period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeriodExecutionResult {
    pub period: Period,
    pub new_state_root: H256,
    pub receipts: Vec<Receipt>,
}

pub struct Executor {
    state: Arc<StateDb>,
    txpool: Arc<TxPool>,
}

impl Executor {
    pub fn new(state: Arc<StateDb>, txpool: Arc<TxPool>) -> Self {
        Self { state, txpool }
    }

    /// Apply one already-decided period bundle: run the transition, commit
    /// it atomically, then notify the pool so finalized transactions leave
    /// the `in_block` set.
    pub fn execute_period(&self, period: Period, bundle: &PeriodBundle) -> Result<PeriodExecutionResult, ChronxError> {
        for tx in &bundle.transactions {
            let hash = tx_hash(tx);
            if let Some(chronx_state::TransactionStatus::Finalized { .. }) =
                self.state.get_transaction_status(&hash)?
            {
                return Err(ChronxError::StateMismatch(format!(
                    "transaction {hash} already finalized before period {period}"
                )));
            }
        }

        let mut receipts = Vec::with_capacity(bundle.transactions.len());
        let mut touched: Vec<Address> = Vec::new();
        for tx in &bundle.transactions {
            let receipt = self.apply_transaction(tx, &mut touched)?;
            receipts.push(receipt);
        }

        let new_state_root = self.state_root_over(&touched)?;

        let dag_block_hashes: Vec<H256> =
            bundle.dag_blocks.iter().map(chronx_dag::block_hash).collect();
        let transaction_hashes: Vec<H256> = bundle.transactions.iter().map(tx_hash).collect();

        self.state.commit_period(period, bundle, &dag_block_hashes, &transaction_hashes)?;
        self.state.put_status(EXECUTED_HEAD_KEY, &period.to_be_bytes())?;
        self.txpool.remove_finalized(&transaction_hashes, period)?;

        tracing::info!(period, txs = receipts.len(), %new_state_root, "executed period");
        Ok(PeriodExecutionResult { period, new_state_root, receipts })
    }

    /// Debit `value` plus a flat `gas_price * gas_limit` fee from the
    /// sender, credit `to`, and bump the sender's nonce. A transaction whose
    /// nonce or balance check fails produces a failed receipt without
    /// mutating any account.
    fn apply_transaction(&self, tx: &Transaction, touched: &mut Vec<Address>) -> Result<Receipt, ChronxError> {
        let hash = tx_hash(tx);
        let sender_addr = sender_address(tx)?;
        let mut sender = self.state.get_account(&sender_addr)?.unwrap_or(Account::new(sender_addr));

        let fee: Balance = tx.gas_price.saturating_mul(tx.gas_limit as u128);
        let total_debit = tx.value.saturating_add(fee);

        if tx.nonce != sender.nonce || sender.balance < total_debit {
            return Ok(Receipt { tx_hash: hash, success: false, gas_used: 0 });
        }

        sender.balance -= total_debit;
        sender.nonce += 1;
        self.state.put_account(&sender)?;
        note_touched(touched, sender_addr);

        if let Some(to_addr) = tx.to {
            let mut to = self.state.get_account(&to_addr)?.unwrap_or(Account::new(to_addr));
            to.balance = to.balance.saturating_add(tx.value);
            self.state.put_account(&to)?;
            note_touched(touched, to_addr);
        }

        Ok(Receipt { tx_hash: hash, success: true, gas_used: tx.gas_limit })
    }

    /// Keccak of the canonical, address-sorted encoding of every account
    /// touched this period.
    fn state_root_over(&self, touched: &[Address]) -> Result<H256, ChronxError> {
        let mut addrs: Vec<Address> = touched.to_vec();
        addrs.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        addrs.dedup();

        let mut accounts = Vec::with_capacity(addrs.len());
        for addr in addrs {
            if let Some(acc) = self.state.get_account(&addr)? {
                accounts.push(acc);
            }
        }
        let bytes = bincode::serialize(&accounts)?;
        Ok(chronx_crypto::keccak256(&bytes))
    }

    /// On startup, catch the executor up to whatever the consensus layer
    /// has recorded as decided (`pbft_chain_size`) but this executor has
    /// not yet applied (`executed_head`), replaying bundles from
    /// `period_data` in order.
    pub fn recover(&self) -> Result<(), ChronxError> {
        let executed_head = self.read_counter(EXECUTED_HEAD_KEY)?;
        let chain_size = self.read_counter(PBFT_CHAIN_SIZE_KEY)?;

        for period in (executed_head + 1)..=chain_size {
            let Some(bundle) = self.state.get_period_bundle(period)? else {
                return Err(ChronxError::StateMismatch(format!(
                    "missing period_data for period {period} during recovery"
                )));
            };
            tracing::warn!(period, "replaying period during crash recovery");
            self.execute_period(period, &bundle)?;
        }
        Ok(())
    }

    fn read_counter(&self, key: &str) -> Result<Period, ChronxError> {
        match self.state.get_status(key)? {
            Some(bytes) if bytes.len() == 8 => {
                let mut buf = [0u8; 8];
                buf.copy_from_slice(&bytes);
                Ok(Period::from_be_bytes(buf))
            }
            Some(_) => Err(ChronxError::DbCorruption(format!("malformed status counter {key}"))),
            None => Ok(0),
        }
    }
}

fn tx_hash(tx: &Transaction) -> H256 {
    chronx_crypto::keccak256(&tx.to_canonical_bytes())
}

fn note_touched(touched: &mut Vec<Address>, addr: Address) {
    if !touched.contains(&addr) {
        touched.push(addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronx_core::period::PbftBlock;
    use chronx_core::types::Signature;
    use chronx_crypto::KeyPair;

    fn temp_state(name: &str) -> Arc<StateDb> {
        let dir = std::env::temp_dir().join(format!("chronx_executor_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(StateDb::open(&dir).expect("open temp db"))
    }

    fn signed_tx(kp: &KeyPair, nonce: u64, to: Address, value: Balance) -> Transaction {
        let mut tx = Transaction {
            nonce,
            gas_price: 1,
            gas_limit: 21_000,
            to: Some(to),
            value,
            data: vec![],
            chain_id: 841,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        };
        let digest = chronx_crypto::keccak256(&tx.signing_hash_preimage());
        tx.signature = kp.sign_prehash(digest.as_bytes());
        tx
    }

    fn empty_pbft_block(period: Period) -> PbftBlock {
        PbftBlock {
            prev_pbft_hash: H256::ZERO,
            anchor_dag_block_hash: H256::ZERO,
            period,
            timestamp: 0,
            beneficiary: Address::ZERO,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        }
    }

    #[test]
    fn successful_transfer_debits_sender_and_credits_recipient() {
        let state = temp_state("transfer");
        let txpool = TxPool::new(Arc::clone(&state), 1000, 2000);
        let executor = Executor::new(Arc::clone(&state), Arc::clone(&txpool));

        let kp = KeyPair::generate();
        let recipient = Address::from_bytes([7u8; 20]);
        state.put_account(&Account { address: kp.address, balance: 100_000, nonce: 0 }).unwrap();

        let tx = signed_tx(&kp, 0, recipient, 1_000);
        let bundle = PeriodBundle {
            pbft_block: empty_pbft_block(1),
            cert_votes: vec![],
            dag_blocks: vec![],
            transactions: vec![tx],
        };

        let result = executor.execute_period(1, &bundle).unwrap();
        assert_eq!(result.receipts.len(), 1);
        assert!(result.receipts[0].success);

        let sender = state.get_account(&kp.address).unwrap().unwrap();
        assert_eq!(sender.nonce, 1);
        assert_eq!(sender.balance, 100_000 - 1_000 - 21_000);

        let recipient_acc = state.get_account(&recipient).unwrap().unwrap();
        assert_eq!(recipient_acc.balance, 1_000);
    }

    #[test]
    fn insufficient_balance_produces_failed_receipt_without_mutation() {
        let state = temp_state("insufficient");
        let txpool = TxPool::new(Arc::clone(&state), 1000, 2000);
        let executor = Executor::new(Arc::clone(&state), Arc::clone(&txpool));

        let kp = KeyPair::generate();
        let recipient = Address::from_bytes([8u8; 20]);
        state.put_account(&Account { address: kp.address, balance: 10, nonce: 0 }).unwrap();

        let tx = signed_tx(&kp, 0, recipient, 1_000);
        let bundle = PeriodBundle {
            pbft_block: empty_pbft_block(1),
            cert_votes: vec![],
            dag_blocks: vec![],
            transactions: vec![tx],
        };

        let result = executor.execute_period(1, &bundle).unwrap();
        assert!(!result.receipts[0].success);

        let sender = state.get_account(&kp.address).unwrap().unwrap();
        assert_eq!(sender.nonce, 0);
        assert_eq!(sender.balance, 10);
    }

    #[test]
    fn recover_replays_decided_but_unexecuted_periods() {
        let state = temp_state("recover");
        let txpool = TxPool::new(Arc::clone(&state), 1000, 2000);
        let executor = Executor::new(Arc::clone(&state), Arc::clone(&txpool));

        let kp = KeyPair::generate();
        let recipient = Address::from_bytes([9u8; 20]);
        state.put_account(&Account { address: kp.address, balance: 100_000, nonce: 0 }).unwrap();

        let tx = signed_tx(&kp, 0, recipient, 500);
        let bundle = PeriodBundle {
            pbft_block: empty_pbft_block(1),
            cert_votes: vec![],
            dag_blocks: vec![],
            transactions: vec![tx],
        };
        state.put_period_bundle(1, &bundle).unwrap();
        state.put_status(PBFT_CHAIN_SIZE_KEY, &1u64.to_be_bytes()).unwrap();

        executor.recover().unwrap();

        let recipient_acc = state.get_account(&recipient).unwrap().unwrap();
        assert_eq!(recipient_acc.balance, 500);
    }
}
