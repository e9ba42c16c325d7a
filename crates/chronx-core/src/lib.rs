pub mod chain_config;
pub mod codec;
pub mod constants;
pub mod dag_block;
pub mod error;
pub mod period;
pub mod transaction;
pub mod types;
pub mod vote;

pub use chain_config::{ChainConfig, PbftConfig, VdfConfig};
pub use codec::{Decodable, Encodable, Rlp, RlpStream};
pub use constants::*;
pub use error::ChronxError;
pub use dag_block::DagBlock;
pub use period::{PbftBlock, PeriodBundle};
pub use transaction::Transaction;
pub use types::*;
pub use vote::{PbftVoteType, Vote, VrfPbftMessage};
