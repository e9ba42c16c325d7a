use std::path::Path;

use sled::Transactional;

use chronx_core::codec::Encodable;
use chronx_core::error::ChronxError;
use chronx_core::period::PeriodBundle;
use chronx_core::types::{Address, H256, Period};

use crate::account::Account;

/// Persistent, column-partitioned store backed by sled.
///
/// Named trees (one per SPEC_FULL.md §4.C column):
///   period_data            — Period be bytes        → bincode(PeriodBundle)
///   dag_blocks              — H256 bytes              → raw canonical DAG block bytes
///   dag_blocks_by_level     — level be bytes || hash   → [] (membership set)
///   dag_block_state         — H256 bytes              → 1 byte tag (unverified/verified/invalid)
///   dag_block_period        — H256 bytes              → Period be || u32 be position
///   transactions            — H256 bytes              → raw canonical transaction bytes
///   transaction_status      — H256 bytes              → 1 byte tag + optional (Period, pos)
///   pbft_head               — fixed key "head"        → Period be bytes
///   pbft_block_period       — H256 bytes              → Period be bytes
///   pbft_round_state        — fixed key "round"        → bincode(round state snapshot)
///   pbft_voted_values       — Period be || round be     → H256 bytes
///   pbft_cert_voted_block   — Period be || round be     → H256 bytes
///   unverified_votes        — H256 bytes (vote hash)    → raw canonical vote bytes
///   verified_votes          — H256 bytes (vote hash)    → raw canonical vote bytes
///   soft_votes_by_round     — round be || voter bytes    → H256 bytes
///   next_votes_by_round     — round be || voter bytes    → H256 bytes
///   proposal_period_levels  — Period be bytes          → (level_start, level_end) be pair
///   status                  — utf8 key bytes            → raw bytes (db_major, db_minor, counters)
///   accounts                — Address bytes             → bincode(Account)
///   final_chain_meta        — utf8 key bytes            → raw bytes
pub struct StateDb {
    db: sled::Db,
    period_data: sled::Tree,
    dag_blocks: sled::Tree,
    dag_blocks_by_level: sled::Tree,
    dag_block_state: sled::Tree,
    dag_block_period: sled::Tree,
    transactions: sled::Tree,
    transaction_status: sled::Tree,
    pbft_head: sled::Tree,
    pbft_block_period: sled::Tree,
    pbft_round_state: sled::Tree,
    pbft_voted_values: sled::Tree,
    pbft_cert_voted_block: sled::Tree,
    unverified_votes: sled::Tree,
    verified_votes: sled::Tree,
    soft_votes_by_round: sled::Tree,
    next_votes_by_round: sled::Tree,
    proposal_period_levels: sled::Tree,
    status: sled::Tree,
    accounts: sled::Tree,
    final_chain_meta: sled::Tree,
}

/// Tag byte stored in `dag_block_state`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DagBlockState {
    Unverified = 0,
    Verified = 1,
    Invalid = 2,
}

impl DagBlockState {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Unverified),
            1 => Some(Self::Verified),
            2 => Some(Self::Invalid),
            _ => None,
        }
    }
}

/// Tag byte stored in `transaction_status`, plus the `(period, position)`
/// that `Finalized` carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransactionStatus {
    InQueueUnverified,
    InQueueVerified,
    InBlock,
    Finalized { period: Period, position: u32 },
}

impl TransactionStatus {
    fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::InQueueUnverified => vec![0],
            Self::InQueueVerified => vec![1],
            Self::InBlock => vec![2],
            Self::Finalized { period, position } => {
                let mut bytes = vec![3];
                bytes.extend_from_slice(&period.to_be_bytes());
                bytes.extend_from_slice(&position.to_be_bytes());
                bytes
            }
        }
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, ChronxError> {
        match bytes.first() {
            Some(0) => Ok(Self::InQueueUnverified),
            Some(1) => Ok(Self::InQueueVerified),
            Some(2) => Ok(Self::InBlock),
            Some(3) => {
                if bytes.len() != 13 {
                    return Err(ChronxError::DbCorruption("malformed transaction_status entry".into()));
                }
                let mut period_buf = [0u8; 8];
                period_buf.copy_from_slice(&bytes[1..9]);
                let mut pos_buf = [0u8; 4];
                pos_buf.copy_from_slice(&bytes[9..13]);
                Ok(Self::Finalized {
                    period: Period::from_be_bytes(period_buf),
                    position: u32::from_be_bytes(pos_buf),
                })
            }
            _ => Err(ChronxError::DbCorruption("unknown transaction_status tag".into())),
        }
    }
}

fn storage_err(e: sled::Error) -> ChronxError {
    ChronxError::Storage(e.to_string())
}

fn storage_txn_err(e: sled::transaction::TransactionError<()>) -> ChronxError {
    ChronxError::Storage(e.to_string())
}

impl StateDb {
    /// Open or create the store at `path`, stamping schema version on first
    /// open and refusing to open a store from an incompatible major version.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ChronxError> {
        let db = sled::open(path).map_err(storage_err)?;

        let period_data = db.open_tree("period_data").map_err(storage_err)?;
        let dag_blocks = db.open_tree("dag_blocks").map_err(storage_err)?;
        let dag_blocks_by_level = db.open_tree("dag_blocks_by_level").map_err(storage_err)?;
        let dag_block_state = db.open_tree("dag_block_state").map_err(storage_err)?;
        let dag_block_period = db.open_tree("dag_block_period").map_err(storage_err)?;
        let transactions = db.open_tree("transactions").map_err(storage_err)?;
        let transaction_status = db.open_tree("transaction_status").map_err(storage_err)?;
        let pbft_head = db.open_tree("pbft_head").map_err(storage_err)?;
        let pbft_block_period = db.open_tree("pbft_block_period").map_err(storage_err)?;
        let pbft_round_state = db.open_tree("pbft_round_state").map_err(storage_err)?;
        let pbft_voted_values = db.open_tree("pbft_voted_values").map_err(storage_err)?;
        let pbft_cert_voted_block = db.open_tree("pbft_cert_voted_block").map_err(storage_err)?;
        let unverified_votes = db.open_tree("unverified_votes").map_err(storage_err)?;
        let verified_votes = db.open_tree("verified_votes").map_err(storage_err)?;
        let soft_votes_by_round = db.open_tree("soft_votes_by_round").map_err(storage_err)?;
        let next_votes_by_round = db.open_tree("next_votes_by_round").map_err(storage_err)?;
        let proposal_period_levels = db.open_tree("proposal_period_levels").map_err(storage_err)?;
        let status = db.open_tree("status").map_err(storage_err)?;
        let accounts = db.open_tree("accounts").map_err(storage_err)?;
        let final_chain_meta = db.open_tree("final_chain_meta").map_err(storage_err)?;

        let store = Self {
            db, period_data, dag_blocks, dag_blocks_by_level, dag_block_state,
            dag_block_period, transactions, transaction_status, pbft_head,
            pbft_block_period, pbft_round_state, pbft_voted_values,
            pbft_cert_voted_block, unverified_votes, verified_votes,
            soft_votes_by_round, next_votes_by_round, proposal_period_levels,
            status, accounts, final_chain_meta,
        };
        store.check_or_stamp_schema_version()?;
        Ok(store)
    }

    fn check_or_stamp_schema_version(&self) -> Result<(), ChronxError> {
        const DB_MAJOR: u32 = chronx_core::constants::DB_MAJOR_VERSION;
        const DB_MINOR: u32 = chronx_core::constants::DB_MINOR_VERSION;

        match self.status.get(b"db_major").map_err(storage_err)? {
            None => {
                self.status.insert(b"db_major", &DB_MAJOR.to_be_bytes()).map_err(storage_err)?;
                self.status.insert(b"db_minor", &DB_MINOR.to_be_bytes()).map_err(storage_err)?;
                Ok(())
            }
            Some(bytes) => {
                let found = u32::from_be_bytes(bytes.as_ref().try_into().map_err(|_| {
                    ChronxError::DbCorruption("db_major entry is not 4 bytes".into())
                })?);
                if found != DB_MAJOR {
                    return Err(ChronxError::VersionMismatch {
                        column: "status.db_major".into(),
                        expected: DB_MAJOR,
                        found,
                    });
                }
                Ok(())
            }
        }
    }

    pub fn flush(&self) -> Result<(), ChronxError> {
        self.db.flush().map_err(storage_err)?;
        Ok(())
    }

    // ── Accounts ─────────────────────────────────────────────────────────────

    pub fn get_account(&self, address: &Address) -> Result<Option<Account>, ChronxError> {
        match self.accounts.get(address.0).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_account(&self, account: &Account) -> Result<(), ChronxError> {
        let bytes = bincode::serialize(account)?;
        self.accounts.insert(account.address.0, bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn count_accounts(&self) -> u64 {
        self.accounts.len() as u64
    }

    // ── Transactions ─────────────────────────────────────────────────────────

    pub fn put_transaction(&self, hash: &H256, canonical_bytes: &[u8]) -> Result<(), ChronxError> {
        self.transactions.insert(hash.as_bytes(), canonical_bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_transaction(&self, hash: &H256) -> Result<Option<Vec<u8>>, ChronxError> {
        Ok(self.transactions.get(hash.as_bytes()).map_err(storage_err)?.map(|v| v.to_vec()))
    }

    pub fn get_transaction_status(&self, hash: &H256) -> Result<Option<TransactionStatus>, ChronxError> {
        match self.transaction_status.get(hash.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(TransactionStatus::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_transaction_status(&self, hash: &H256, status: &TransactionStatus) -> Result<(), ChronxError> {
        self.transaction_status.insert(hash.as_bytes(), status.to_bytes()).map_err(storage_err)?;
        Ok(())
    }

    // ── DAG blocks ───────────────────────────────────────────────────────────

    pub fn put_dag_block(&self, hash: &H256, level: u64, canonical_bytes: &[u8]) -> Result<(), ChronxError> {
        self.dag_blocks.insert(hash.as_bytes(), canonical_bytes).map_err(storage_err)?;
        let mut level_key = level.to_be_bytes().to_vec();
        level_key.extend_from_slice(hash.as_bytes());
        self.dag_blocks_by_level.insert(level_key, b"".as_ref()).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_dag_block(&self, hash: &H256) -> Result<Option<Vec<u8>>, ChronxError> {
        Ok(self.dag_blocks.get(hash.as_bytes()).map_err(storage_err)?.map(|v| v.to_vec()))
    }

    pub fn dag_block_exists(&self, hash: &H256) -> bool {
        self.dag_blocks.contains_key(hash.as_bytes()).unwrap_or(false)
    }

    /// Hashes of every DAG block at `level`, in insertion order.
    pub fn dag_blocks_at_level(&self, level: u64) -> Result<Vec<H256>, ChronxError> {
        let mut out = Vec::new();
        for item in self.dag_blocks_by_level.scan_prefix(level.to_be_bytes()) {
            let (key, _) = item.map_err(storage_err)?;
            let hash_bytes: [u8; 32] = key[8..].try_into().map_err(|_| {
                ChronxError::DbCorruption("malformed dag_blocks_by_level key".into())
            })?;
            out.push(H256::from_bytes(hash_bytes));
        }
        Ok(out)
    }

    pub fn put_dag_block_state(&self, hash: &H256, state: DagBlockState) -> Result<(), ChronxError> {
        self.dag_block_state.insert(hash.as_bytes(), &[state as u8]).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_dag_block_state(&self, hash: &H256) -> Result<Option<DagBlockState>, ChronxError> {
        match self.dag_block_state.get(hash.as_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(DagBlockState::from_byte(bytes.first().copied().unwrap_or(255))),
            None => Ok(None),
        }
    }

    pub fn put_dag_block_period(&self, hash: &H256, period: Period, position: u32) -> Result<(), ChronxError> {
        let mut value = period.to_be_bytes().to_vec();
        value.extend_from_slice(&position.to_be_bytes());
        self.dag_block_period.insert(hash.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_dag_block_period(&self, hash: &H256) -> Result<Option<(Period, u32)>, ChronxError> {
        match self.dag_block_period.get(hash.as_bytes()).map_err(storage_err)? {
            Some(bytes) if bytes.len() == 12 => {
                let mut period_buf = [0u8; 8];
                period_buf.copy_from_slice(&bytes[..8]);
                let mut pos_buf = [0u8; 4];
                pos_buf.copy_from_slice(&bytes[8..]);
                Ok(Some((Period::from_be_bytes(period_buf), u32::from_be_bytes(pos_buf))))
            }
            Some(_) => Err(ChronxError::DbCorruption("malformed dag_block_period entry".into())),
            None => Ok(None),
        }
    }

    // ── PBFT head / period data ──────────────────────────────────────────────

    pub fn get_pbft_head(&self) -> Result<Option<Period>, ChronxError> {
        match self.pbft_head.get(b"head").map_err(storage_err)? {
            Some(bytes) => {
                let buf: [u8; 8] = bytes.as_ref().try_into().map_err(|_| {
                    ChronxError::DbCorruption("malformed pbft_head entry".into())
                })?;
                Ok(Some(Period::from_be_bytes(buf)))
            }
            None => Ok(None),
        }
    }

    pub fn put_period_bundle(&self, period: Period, bundle: &PeriodBundle) -> Result<(), ChronxError> {
        let bytes = bincode::serialize(bundle)?;
        self.period_data.insert(period.to_be_bytes(), bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_period_bundle(&self, period: Period) -> Result<Option<PeriodBundle>, ChronxError> {
        match self.period_data.get(period.to_be_bytes()).map_err(storage_err)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_pbft_block_period(&self, anchor_hash: &H256, period: Period) -> Result<(), ChronxError> {
        self.pbft_block_period.insert(anchor_hash.as_bytes(), period.to_be_bytes()).map_err(storage_err)?;
        Ok(())
    }

    /// Commit a finalized period atomically: the period bundle, every
    /// touched index, and the new head, in a single sled batch so no reader
    /// ever observes a partial commit.
    /// Applies every write a period commit touches — `period_data`,
    /// `pbft_block_period`, `dag_block_period`, `transaction_status`, and
    /// `pbft_head` — as a single sled transaction across all five trees, so
    /// a crash mid-commit can never leave readers observing, say, an
    /// advanced `pbft_head` with transactions not yet marked finalized.
    pub fn commit_period(
        &self,
        period: Period,
        bundle: &PeriodBundle,
        dag_block_hashes: &[H256],
        transaction_hashes: &[H256],
    ) -> Result<(), ChronxError> {
        let anchor_hash = chronx_crypto::keccak256(&bundle.pbft_block.to_canonical_bytes());
        let bundle_bytes = bincode::serialize(bundle)?;
        let period_be = period.to_be_bytes();

        let trees = (
            &self.period_data,
            &self.pbft_block_period,
            &self.dag_block_period,
            &self.transaction_status,
            &self.pbft_head,
        );
        trees
            .transaction(|(period_data, pbft_block_period, dag_block_period, transaction_status, pbft_head)| {
                period_data.insert(period_be.as_ref(), bundle_bytes.clone())?;
                pbft_block_period.insert(anchor_hash.as_bytes(), period_be.as_ref())?;
                for (pos, hash) in dag_block_hashes.iter().enumerate() {
                    let mut value = period_be.to_vec();
                    value.extend_from_slice(&(pos as u32).to_be_bytes());
                    dag_block_period.insert(hash.as_bytes(), value)?;
                }
                for (pos, hash) in transaction_hashes.iter().enumerate() {
                    let status = TransactionStatus::Finalized { period, position: pos as u32 };
                    transaction_status.insert(hash.as_bytes(), status.to_bytes())?;
                }
                pbft_head.insert(b"head".as_ref(), period_be.as_ref())?;
                Ok(())
            })
            .map_err(storage_txn_err)?;

        self.db.flush().map_err(storage_err)?;
        tracing::info!(period, dag_blocks = dag_block_hashes.len(), transactions = transaction_hashes.len(), "committed period");
        Ok(())
    }

    // ── PBFT round state / votes ─────────────────────────────────────────────

    pub fn put_round_state(&self, bytes: &[u8]) -> Result<(), ChronxError> {
        self.pbft_round_state.insert(b"round", bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_round_state(&self) -> Result<Option<Vec<u8>>, ChronxError> {
        Ok(self.pbft_round_state.get(b"round").map_err(storage_err)?.map(|v| v.to_vec()))
    }

    fn period_round_key(period: Period, round: u64) -> Vec<u8> {
        let mut key = period.to_be_bytes().to_vec();
        key.extend_from_slice(&round.to_be_bytes());
        key
    }

    pub fn put_voted_value(&self, period: Period, round: u64, value: H256) -> Result<(), ChronxError> {
        self.pbft_voted_values
            .insert(Self::period_round_key(period, round), value.as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_voted_value(&self, period: Period, round: u64) -> Result<Option<H256>, ChronxError> {
        Self::get_h256(&self.pbft_voted_values, &Self::period_round_key(period, round))
    }

    pub fn put_cert_voted_block(&self, period: Period, round: u64, value: H256) -> Result<(), ChronxError> {
        self.pbft_cert_voted_block
            .insert(Self::period_round_key(period, round), value.as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn get_cert_voted_block(&self, period: Period, round: u64) -> Result<Option<H256>, ChronxError> {
        Self::get_h256(&self.pbft_cert_voted_block, &Self::period_round_key(period, round))
    }

    fn get_h256(tree: &sled::Tree, key: &[u8]) -> Result<Option<H256>, ChronxError> {
        match tree.get(key).map_err(storage_err)? {
            Some(bytes) => {
                let buf: [u8; 32] = bytes.as_ref().try_into().map_err(|_| {
                    ChronxError::DbCorruption("expected 32-byte hash entry".into())
                })?;
                Ok(Some(H256::from_bytes(buf)))
            }
            None => Ok(None),
        }
    }

    pub fn put_unverified_vote(&self, vote_hash: &H256, canonical_bytes: &[u8]) -> Result<(), ChronxError> {
        self.unverified_votes.insert(vote_hash.as_bytes(), canonical_bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn remove_unverified_vote(&self, vote_hash: &H256) -> Result<(), ChronxError> {
        self.unverified_votes.remove(vote_hash.as_bytes()).map_err(storage_err)?;
        Ok(())
    }

    pub fn put_verified_vote(&self, vote_hash: &H256, canonical_bytes: &[u8]) -> Result<(), ChronxError> {
        self.verified_votes.insert(vote_hash.as_bytes(), canonical_bytes).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_verified_vote(&self, vote_hash: &H256) -> Result<Option<Vec<u8>>, ChronxError> {
        Ok(self.verified_votes.get(vote_hash.as_bytes()).map_err(storage_err)?.map(|v| v.to_vec()))
    }

    fn round_voter_key(round: u64, voter: &Address) -> Vec<u8> {
        let mut key = round.to_be_bytes().to_vec();
        key.extend_from_slice(&voter.0);
        key
    }

    pub fn put_soft_vote(&self, round: u64, voter: &Address, vote_hash: &H256) -> Result<(), ChronxError> {
        self.soft_votes_by_round
            .insert(Self::round_voter_key(round, voter), vote_hash.as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn soft_votes_for_round(&self, round: u64) -> Result<Vec<H256>, ChronxError> {
        Self::scan_round_hashes(&self.soft_votes_by_round, round)
    }

    pub fn put_next_vote(&self, round: u64, voter: &Address, vote_hash: &H256) -> Result<(), ChronxError> {
        self.next_votes_by_round
            .insert(Self::round_voter_key(round, voter), vote_hash.as_bytes())
            .map_err(storage_err)?;
        Ok(())
    }

    pub fn next_votes_for_round(&self, round: u64) -> Result<Vec<H256>, ChronxError> {
        Self::scan_round_hashes(&self.next_votes_by_round, round)
    }

    fn scan_round_hashes(tree: &sled::Tree, round: u64) -> Result<Vec<H256>, ChronxError> {
        let mut out = Vec::new();
        for item in tree.scan_prefix(round.to_be_bytes()) {
            let (_, bytes) = item.map_err(storage_err)?;
            let buf: [u8; 32] = bytes.as_ref().try_into().map_err(|_| {
                ChronxError::DbCorruption("expected 32-byte hash entry".into())
            })?;
            out.push(H256::from_bytes(buf));
        }
        Ok(out)
    }

    // ── Proposal period levels ───────────────────────────────────────────────

    pub fn put_proposal_period_levels(&self, period: Period, level_start: u64, level_end: u64) -> Result<(), ChronxError> {
        let mut value = level_start.to_be_bytes().to_vec();
        value.extend_from_slice(&level_end.to_be_bytes());
        self.proposal_period_levels.insert(period.to_be_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn iter_proposal_period_levels(&self) -> Result<Vec<(Period, u64, u64)>, ChronxError> {
        let mut out = Vec::new();
        for item in self.proposal_period_levels.iter() {
            let (key, value) = item.map_err(storage_err)?;
            let period = Period::from_be_bytes(key.as_ref().try_into().map_err(|_| {
                ChronxError::DbCorruption("malformed proposal_period_levels key".into())
            })?);
            let level_start = u64::from_be_bytes(value[..8].try_into().map_err(|_| {
                ChronxError::DbCorruption("malformed proposal_period_levels value".into())
            })?);
            let level_end = u64::from_be_bytes(value[8..].try_into().map_err(|_| {
                ChronxError::DbCorruption("malformed proposal_period_levels value".into())
            })?);
            out.push((period, level_start, level_end));
        }
        Ok(out)
    }

    // ── Status / final-chain meta ────────────────────────────────────────────

    pub fn put_status(&self, key: &str, value: &[u8]) -> Result<(), ChronxError> {
        self.status.insert(key.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_status(&self, key: &str) -> Result<Option<Vec<u8>>, ChronxError> {
        Ok(self.status.get(key.as_bytes()).map_err(storage_err)?.map(|v| v.to_vec()))
    }

    pub fn put_final_chain_meta(&self, key: &str, value: &[u8]) -> Result<(), ChronxError> {
        self.final_chain_meta.insert(key.as_bytes(), value).map_err(storage_err)?;
        Ok(())
    }

    pub fn get_final_chain_meta(&self, key: &str) -> Result<Option<Vec<u8>>, ChronxError> {
        Ok(self.final_chain_meta.get(key.as_bytes()).map_err(storage_err)?.map(|v| v.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db(name: &str) -> StateDb {
        let dir = std::env::temp_dir().join(format!("chronx_state_db_test_{}", name));
        let _ = std::fs::remove_dir_all(&dir);
        StateDb::open(&dir).expect("open temp db")
    }

    #[test]
    fn account_round_trips() {
        let db = temp_db("account_round_trip");
        let acc = Account { address: Address([7u8; 20]), balance: 42, nonce: 3 };
        db.put_account(&acc).unwrap();
        let loaded = db.get_account(&acc.address).unwrap().unwrap();
        assert_eq!(loaded, acc);
    }

    #[test]
    fn schema_version_is_stamped_on_first_open_and_checked_on_reopen() {
        let dir = std::env::temp_dir().join("chronx_state_db_test_schema_version");
        let _ = std::fs::remove_dir_all(&dir);
        {
            let db = StateDb::open(&dir).unwrap();
            assert_eq!(
                db.get_status("db_major").unwrap(),
                Some(chronx_core::constants::DB_MAJOR_VERSION.to_be_bytes().to_vec())
            );
        }
        // Reopening with the same major version must succeed.
        StateDb::open(&dir).unwrap();
    }

    #[test]
    fn dag_blocks_at_level_returns_inserted_hashes() {
        let db = temp_db("dag_blocks_at_level");
        let h1 = H256::from_bytes([1u8; 32]);
        let h2 = H256::from_bytes([2u8; 32]);
        db.put_dag_block(&h1, 5, b"block-a").unwrap();
        db.put_dag_block(&h2, 5, b"block-b").unwrap();
        let mut hashes = db.dag_blocks_at_level(5).unwrap();
        hashes.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        let mut expected = vec![h1, h2];
        expected.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        assert_eq!(hashes, expected);
    }

    #[test]
    fn soft_votes_for_round_collects_every_voter() {
        let db = temp_db("soft_votes");
        let v1 = H256::from_bytes([1u8; 32]);
        let v2 = H256::from_bytes([2u8; 32]);
        db.put_soft_vote(10, &Address([1u8; 20]), &v1).unwrap();
        db.put_soft_vote(10, &Address([2u8; 20]), &v2).unwrap();
        db.put_soft_vote(11, &Address([3u8; 20]), &v1).unwrap();
        let mut votes = db.soft_votes_for_round(10).unwrap();
        votes.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        let mut expected = vec![v1, v2];
        expected.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        assert_eq!(votes, expected);
    }
}
