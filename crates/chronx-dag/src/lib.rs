pub mod anchor;
pub mod block_manager;
pub mod pivot;
pub mod proposal_period_levels;

use chronx_core::codec::Encodable;
use chronx_core::dag_block::DagBlock;
use chronx_core::types::H256;

pub use anchor::{order_past_cone, BlockLookup};
pub use block_manager::{Admission, BlockManager, KnownBlocksSnapshot};
pub use pivot::PivotTree;
pub use proposal_period_levels::{LevelRange, ProposalPeriodLevelsMap};

/// Canonical identity of a DAG block: Keccak-256 of its full encoding
/// (signature included, matching how the node's store keys blocks).
pub fn block_hash(block: &DagBlock) -> H256 {
    chronx_crypto::keccak256(&block.to_canonical_bytes())
}
