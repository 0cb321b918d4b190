//! Commitment tree: a binary keccak256 hash tree rebuilt over the full log.
//!
//! Inner nodes hash the two children in ascending byte order, so verification does not
//! need to know whether a sibling sits on the left or on the right. An odd trailing node is
//! promoted to the next level unchanged, which means some levels contribute no proof element.
//!
//! The tree is rebuilt from scratch on every change: O(n) hashes per build and O(n^2) over
//! n appends. That is fine for hundreds to low thousands of leaves per publish cycle; an
//! incremental structure would have to stay bit-compatible with the destination verifier.

use alloy_primitives::keccak256;

use crate::{event::MigrationEvent, Hash};

/// All levels of the tree, leaves first, root level last
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommitmentTree {
    levels: Vec<Vec<Hash>>,
}

/// Hash two nodes using the sorted-pair rule: `keccak256(min(a, b) || max(a, b))`
pub fn hash_pair(a: &Hash, b: &Hash) -> Hash {
    let (left, right) = if a <= b { (a, b) } else { (b, a) };
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_slice());
    data[32..].copy_from_slice(right.as_slice());
    keccak256(data)
}

impl CommitmentTree {
    /// Build the tree over the leaves of `events`, in the given order
    pub fn build(events: &[MigrationEvent]) -> Self {
        Self::from_leaves(events.iter().map(MigrationEvent::leaf).collect())
    }

    /// Build the tree over raw leaves, in the given order
    pub fn from_leaves(leaves: Vec<Hash>) -> Self {
        if leaves.is_empty() {
            return Self::default();
        }

        let mut levels = vec![leaves];
        while levels.last().is_some_and(|level| level.len() > 1) {
            let current = &levels[levels.len() - 1];
            let next: Vec<Hash> = current
                .chunks(2)
                .map(|chunk| match chunk {
                    [left, right] => hash_pair(left, right),
                    [single] => *single,
                    _ => unreachable!("Chunk size is at most 2"),
                })
                .collect();
            levels.push(next);
        }

        Self { levels }
    }

    /// Root of the tree, `None` when there are no leaves
    pub fn root(&self) -> Option<Hash> {
        self.levels.last().and_then(|level| level.first()).copied()
    }

    pub fn leaves(&self) -> &[Hash] {
        self.levels.first().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves().len()
    }

    /// Number of levels including the leaves and the root
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Sibling path from the leaf at `leaf_index` to the root.
    ///
    /// Levels where the node was promoted without a sibling add nothing to the path.
    pub fn proof_path(&self, leaf_index: usize) -> Option<Vec<Hash>> {
        if leaf_index >= self.leaf_count() {
            return None;
        }

        let mut path = Vec::with_capacity(self.depth());
        let mut index = leaf_index;
        for level in &self.levels[..self.levels.len() - 1] {
            if let Some(sibling) = level.get(index ^ 1) {
                path.push(*sibling);
            }
            index /= 2;
        }
        Some(path)
    }
}
