pub mod account;
pub mod db;
pub mod snapshot;

pub use account::Account;
pub use db::{DagBlockState, StateDb, TransactionStatus};
