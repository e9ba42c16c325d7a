//! Anchor ordering: turns a chosen pivot-chain tip into the deterministic,
//! total order of DAG blocks that make up one period's block list.

use std::collections::{HashSet, VecDeque};

use chronx_core::dag_block::DagBlock;
use chronx_core::types::H256;

/// A read-only view the anchor orderer needs of the admitted DAG: parents of
/// a block and the block's own level, both already known from admission.
pub trait BlockLookup {
    fn block(&self, hash: &H256) -> Option<&DagBlock>;
}

/// Compute the ordered past cone of `anchor` relative to `prev_anchor`:
/// every block reachable from `anchor` via pivot-or-tip edges that is not
/// reachable from `prev_anchor` and not already finalized, sorted by
/// ascending `(level, hash)`. The returned list ends with `anchor` itself.
pub fn order_past_cone<L: BlockLookup>(
    lookup: &L,
    anchor: H256,
    prev_anchor: H256,
    finalized: &HashSet<H256>,
) -> Vec<H256> {
    let excluded = reachable_from(lookup, prev_anchor, finalized);

    let mut seen = HashSet::new();
    let mut frontier = VecDeque::from([anchor]);
    let mut collected = Vec::new();

    while let Some(hash) = frontier.pop_front() {
        if !seen.insert(hash) {
            continue;
        }
        if excluded.contains(&hash) || finalized.contains(&hash) {
            continue;
        }
        let Some(block) = lookup.block(&hash) else { continue };
        collected.push(hash);
        if !block.is_genesis() {
            frontier.push_back(block.pivot);
        }
        for tip in &block.tips {
            frontier.push_back(*tip);
        }
    }

    collected.sort_by(|a, b| {
        let level_a = lookup.block(a).map(|b| b.level).unwrap_or(0);
        let level_b = lookup.block(b).map(|b| b.level).unwrap_or(0);
        level_a.cmp(&level_b).then_with(|| a.as_bytes().cmp(b.as_bytes()))
    });

    // The anchor always sorts last: it is strictly the highest-level block
    // in its own past cone by construction (every ancestor has a lower
    // level), so the ordering above already places it at the end.
    collected
}

fn reachable_from<L: BlockLookup>(lookup: &L, start: H256, finalized: &HashSet<H256>) -> HashSet<H256> {
    let mut seen = HashSet::new();
    let mut frontier = VecDeque::from([start]);
    while let Some(hash) = frontier.pop_front() {
        if !seen.insert(hash) {
            continue;
        }
        if finalized.contains(&hash) {
            continue;
        }
        let Some(block) = lookup.block(&hash) else { continue };
        if !block.is_genesis() {
            frontier.push_back(block.pivot);
        }
        for tip in &block.tips {
            frontier.push_back(*tip);
        }
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronx_core::dag_block::VdfProof;
    use chronx_core::types::{Address, Signature};
    use std::collections::HashMap;

    struct MapLookup(HashMap<H256, DagBlock>);

    impl BlockLookup for MapLookup {
        fn block(&self, hash: &H256) -> Option<&DagBlock> {
            self.0.get(hash)
        }
    }

    fn block(pivot: H256, level: u64, tips: Vec<H256>) -> DagBlock {
        DagBlock {
            pivot,
            level,
            tips,
            trx_hashes: vec![],
            vdf_proof: VdfProof { pk: [0u8; 32], vrf_proof: vec![], difficulty: 0, y: vec![], pi: vec![] },
            proposer: Address::ZERO,
            timestamp: 0,
            signature: Signature { v: 0, r: [0u8; 32], s: [0u8; 32] },
        }
    }

    fn h(byte: u8) -> H256 {
        H256::from_bytes([byte; 32])
    }

    #[test]
    fn orders_linear_chain_by_ascending_level() {
        let genesis = h(0);
        let b1 = h(1);
        let b2 = h(2);
        let mut map = HashMap::new();
        map.insert(genesis, block(H256::ZERO, 0, vec![]));
        map.insert(b1, block(genesis, 1, vec![]));
        map.insert(b2, block(b1, 2, vec![]));
        let lookup = MapLookup(map);

        let order = order_past_cone(&lookup, b2, genesis, &HashSet::new());
        assert_eq!(order, vec![b1, b2]);
    }

    #[test]
    fn excludes_previously_finalized_blocks() {
        let genesis = h(0);
        let b1 = h(1);
        let b2 = h(2);
        let mut map = HashMap::new();
        map.insert(genesis, block(H256::ZERO, 0, vec![]));
        map.insert(b1, block(genesis, 1, vec![]));
        map.insert(b2, block(b1, 2, vec![]));
        let lookup = MapLookup(map);

        let mut finalized = HashSet::new();
        finalized.insert(b1);
        let order = order_past_cone(&lookup, b2, b1, &finalized);
        assert_eq!(order, vec![b2]);
    }

    #[test]
    fn tips_are_included_alongside_pivot_ancestors() {
        let genesis = h(0);
        let pivot_parent = h(1);
        let tip_parent = h(2);
        let anchor = h(3);
        let mut map = HashMap::new();
        map.insert(genesis, block(H256::ZERO, 0, vec![]));
        map.insert(pivot_parent, block(genesis, 1, vec![]));
        map.insert(tip_parent, block(genesis, 1, vec![]));
        map.insert(anchor, block(pivot_parent, 2, vec![tip_parent]));
        let lookup = MapLookup(map);

        let order = order_past_cone(&lookup, anchor, genesis, &HashSet::new());
        assert!(order.contains(&pivot_parent));
        assert!(order.contains(&tip_parent));
        assert_eq!(order.last(), Some(&anchor));
    }
}
