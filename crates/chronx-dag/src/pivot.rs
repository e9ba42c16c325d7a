//! The pivot tree: the GHOST-selected spanning tree over the DAG used to
//! choose each period's anchor candidate. Every admitted block names exactly
//! one pivot parent, so the pivot edges alone form a tree rooted at genesis.

use std::collections::HashMap;

use chronx_core::types::H256;

#[derive(Default)]
struct Node {
    parent: Option<H256>,
    children: Vec<H256>,
    subtree_size: u64,
}

/// In-memory pivot tree, rebuilt from persisted blocks at startup and kept
/// live as new blocks are admitted. Guarded externally by the DAG manager's
/// lock (see `block_manager::BlockManager`); this type itself assumes
/// single-writer access.
pub struct PivotTree {
    nodes: HashMap<H256, Node>,
    genesis: H256,
}

impl PivotTree {
    pub fn new(genesis: H256) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(genesis, Node { parent: None, children: Vec::new(), subtree_size: 1 });
        Self { nodes, genesis }
    }

    /// Record `child`'s pivot edge to `parent`. Parent must already be
    /// known; subtree sizes are updated from `child` up to genesis.
    pub fn add_edge(&mut self, parent: H256, child: H256) {
        self.nodes.entry(child).or_insert_with(|| Node { parent: Some(parent), children: Vec::new(), subtree_size: 1 });
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(child);
        }
        self.propagate_size_increase(parent);
    }

    fn propagate_size_increase(&mut self, mut current: H256) {
        loop {
            let Some(node) = self.nodes.get_mut(&current) else { break };
            node.subtree_size += 1;
            match node.parent {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }

    /// Walk from genesis, at each step choosing the child with the largest
    /// subtree (lexicographically smallest hash breaks ties), returning the
    /// resulting chain from genesis to the current tip.
    pub fn pivot_chain(&self) -> Vec<H256> {
        let mut chain = vec![self.genesis];
        let mut current = self.genesis;
        loop {
            let Some(node) = self.nodes.get(&current) else { break };
            if node.children.is_empty() {
                break;
            }
            let next = node
                .children
                .iter()
                .copied()
                .max_by(|a, b| {
                    let size_a = self.nodes.get(a).map(|n| n.subtree_size).unwrap_or(0);
                    let size_b = self.nodes.get(b).map(|n| n.subtree_size).unwrap_or(0);
                    size_a.cmp(&size_b).then_with(|| b.as_bytes().cmp(a.as_bytes()))
                })
                .expect("children is non-empty");
            chain.push(next);
            current = next;
        }
        chain
    }

    /// The current anchor candidate: the tip of the pivot chain.
    pub fn tip(&self) -> H256 {
        *self.pivot_chain().last().expect("pivot chain always contains at least genesis")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(byte: u8) -> H256 {
        H256::from_bytes([byte; 32])
    }

    #[test]
    fn single_chain_tip_follows_heaviest_subtree() {
        let mut tree = PivotTree::new(h(0));
        tree.add_edge(h(0), h(1));
        tree.add_edge(h(1), h(2));
        tree.add_edge(h(1), h(3));
        tree.add_edge(h(2), h(4));
        // h(2)'s subtree (h(2), h(4)) is heavier than h(3)'s (just h(3)).
        assert_eq!(tree.tip(), h(4));
    }

    #[test]
    fn ties_break_on_lexicographically_smallest_hash() {
        let mut tree = PivotTree::new(h(0));
        tree.add_edge(h(0), h(5));
        tree.add_edge(h(0), h(9));
        // Equal subtree sizes (1 each); h(5) < h(9) bytewise.
        assert_eq!(tree.pivot_chain(), vec![h(0), h(5)]);
    }

    #[test]
    fn empty_tree_tip_is_genesis() {
        let tree = PivotTree::new(h(0));
        assert_eq!(tree.tip(), h(0));
    }
}
