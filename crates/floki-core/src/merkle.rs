//! Bitcoin-style merkle root construction (C2, §4.2).
//!
//! Leaves are transaction ids (or witness ids, for the segwit commitment
//! tree); an odd level duplicates its last element rather than padding with
//! a zero hash. [`MerkleTree`] keeps every intermediate layer so proofs can
//! be extracted; [`merkle_root`] and [`StreamingMerkleRoot`] skip that and
//! compute only the root, the latter in bounded (`O(log n)`) memory.

use crate::types::Hash256;

fn pair_hash(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    crate::hash::double_sha256(&buf)
}

fn next_layer(layer: &[Hash256]) -> Vec<Hash256> {
    let mut next = Vec::with_capacity(layer.len().div_ceil(2));
    let mut i = 0;
    while i < layer.len() {
        let left = &layer[i];
        let right = if i + 1 < layer.len() { &layer[i + 1] } else { left };
        next.push(pair_hash(left, right));
        i += 2;
    }
    next
}

/// Compute the merkle root over `leaves` (already-hashed txids/wtxids).
/// Returns [`Hash256::ZERO`] for an empty input.
pub fn merkle_root(leaves: &[Hash256]) -> Hash256 {
    if leaves.is_empty() {
        return Hash256::ZERO;
    }
    let mut current = leaves.to_vec();
    while current.len() > 1 {
        current = next_layer(&current);
    }
    current[0]
}

/// The non-witness (stripped) merkle root of a block's transactions.
pub fn block_merkle_root(txids: &[Hash256]) -> Hash256 {
    merkle_root(txids)
}

/// The segwit witness-merkle root (§4.2): built over wtxids with the
/// coinbase wtxid replaced by 32 zero bytes (the caller is expected to have
/// already produced `wtxids` via [`crate::types::Block::wtxids`], which
/// already zeroes the coinbase entry).
pub fn witness_merkle_root(wtxids: &[Hash256]) -> Hash256 {
    merkle_root(wtxids)
}

/// Full merkle tree retaining every layer, for inclusion-proof extraction.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    layers: Vec<Vec<Hash256>>,
}

impl MerkleTree {
    /// Build a tree over `leaves`. An empty input produces a tree whose
    /// only layer is `[Hash256::ZERO]`.
    pub fn build(leaves: &[Hash256]) -> Self {
        if leaves.is_empty() {
            return Self { layers: vec![vec![Hash256::ZERO]] };
        }
        let mut layers = vec![leaves.to_vec()];
        while layers.last().unwrap().len() > 1 {
            let next = next_layer(layers.last().unwrap());
            layers.push(next);
        }
        Self { layers }
    }

    pub fn root(&self) -> Hash256 {
        self.layers.last().unwrap()[0]
    }

    pub fn leaf_count(&self) -> usize {
        self.layers[0].len()
    }

    /// Sibling hashes and the side-mask connecting leaf `index` to the root,
    /// as a [`crate::types::MerkleBranch`] — the same shape AuxPoW branches use.
    pub fn branch(&self, index: usize) -> Option<crate::types::MerkleBranch> {
        if index >= self.leaf_count() {
            return None;
        }
        let mut hashes = Vec::new();
        let mut side_mask = 0u32;
        let mut idx = index;
        for (level, layer) in self.layers.iter().enumerate() {
            if level + 1 == self.layers.len() {
                break;
            }
            let sibling_idx = if idx % 2 == 0 {
                (idx + 1).min(layer.len() - 1)
            } else {
                idx - 1
            };
            hashes.push(layer[sibling_idx]);
            if idx % 2 == 1 {
                side_mask |= 1 << level;
            }
            idx /= 2;
        }
        Some(crate::types::MerkleBranch { hashes, side_mask })
    }
}

/// Streaming/rolling merkle root builder (§4.2): accepts leaves one at a
/// time and keeps only one partially-filled hash per level
/// (`O(log n)` memory) rather than materializing every layer.
///
/// Mirrors the classic rolling-accumulator construction: a leaf entering
/// level 0 with no pending sibling is buffered; a second leaf at the same
/// level combines with the buffered one and promotes the result to the next
/// level, recursively.
#[derive(Clone, Debug, Default)]
pub struct StreamingMerkleRoot {
    /// `pending[level]` is `Some(hash)` when that level holds one
    /// half-combined value waiting for its pair.
    pending: Vec<Option<Hash256>>,
    count: u64,
}

impl StreamingMerkleRoot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, leaf: Hash256) {
        self.count += 1;
        let mut level = 0usize;
        let mut carry = leaf;
        loop {
            if level == self.pending.len() {
                self.pending.push(None);
            }
            match self.pending[level].take() {
                None => {
                    self.pending[level] = Some(carry);
                    break;
                }
                Some(left) => {
                    carry = pair_hash(&left, &carry);
                    level += 1;
                }
            }
        }
    }

    /// Finalize the root seen so far. Matches [`merkle_root`] exactly,
    /// including last-element duplication at odd levels: a pending value
    /// with no partner at its own level is combined with itself before
    /// being promoted, exactly as [`next_layer`] duplicates a layer's
    /// trailing element, unless it is already the lone top-level value (the
    /// root itself needs no further pairing).
    pub fn finalize(&self) -> Hash256 {
        if self.count == 0 {
            return Hash256::ZERO;
        }
        // Smallest level at which the real (batch) layer has shrunk to one
        // entry: the number of leading zero bits above `count - 1`'s
        // highest set bit, i.e. `ceil(log2(count))`.
        let height = (u64::BITS - (self.count - 1).leading_zeros()) as usize;
        let mut carry: Option<Hash256> = None;
        for level in 0..=height {
            let slot = self.pending.get(level).copied().flatten();
            let is_real_pair = slot.is_some() && carry.is_some();
            let combined = match (slot, carry) {
                (None, None) => None,
                (Some(s), None) => Some(s),
                (None, Some(c)) => Some(c),
                (Some(s), Some(c)) => Some(pair_hash(&s, &c)),
            };
            carry = if !is_real_pair && level < height {
                combined.map(|h| pair_hash(&h, &h))
            } else {
                combined
            };
        }
        carry.expect("height is sized so the loop always leaves a value behind")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Hash256> {
        (0..n).map(|i| Hash256([i as u8; 32])).collect()
    }

    #[test]
    fn empty_root_is_zero() {
        assert_eq!(merkle_root(&[]), Hash256::ZERO);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaves(1);
        assert_eq!(merkle_root(&l), l[0]);
    }

    #[test]
    fn odd_level_duplicates_last() {
        let l = leaves(3);
        let expected = pair_hash(
            &pair_hash(&l[0], &l[1]),
            &pair_hash(&l[2], &l[2]),
        );
        assert_eq!(merkle_root(&l), expected);
    }

    #[test]
    fn four_leaves_balanced_tree() {
        let l = leaves(4);
        let expected = pair_hash(&pair_hash(&l[0], &l[1]), &pair_hash(&l[2], &l[3]));
        assert_eq!(merkle_root(&l), expected);
    }

    #[test]
    fn order_sensitivity() {
        let mut l = leaves(4);
        let root1 = merkle_root(&l);
        l.swap(0, 1);
        assert_ne!(merkle_root(&l), root1);
    }

    #[test]
    fn tree_root_matches_fast_path_for_various_sizes() {
        for n in 1..=9 {
            let l = leaves(n);
            let tree = MerkleTree::build(&l);
            assert_eq!(tree.root(), merkle_root(&l), "mismatch at n={n}");
        }
    }

    #[test]
    fn branch_reconstructs_root_for_every_leaf() {
        for n in 1..=9 {
            let l = leaves(n);
            let tree = MerkleTree::build(&l);
            let root = tree.root();
            for i in 0..n {
                let branch = tree.branch(i).unwrap();
                assert_eq!(branch.apply(l[i]), root, "leaf {i} of {n} failed to reconstruct root");
            }
        }
    }

    #[test]
    fn branch_out_of_range_is_none() {
        let tree = MerkleTree::build(&leaves(3));
        assert!(tree.branch(3).is_none());
    }

    #[test]
    fn streaming_matches_batch_for_various_sizes() {
        for n in 0..=13 {
            let l = leaves(n);
            let mut streaming = StreamingMerkleRoot::new();
            for leaf in &l {
                streaming.push(*leaf);
            }
            assert_eq!(streaming.finalize(), merkle_root(&l), "mismatch at n={n}");
        }
    }

    #[test]
    fn witness_merkle_root_is_zero_when_only_coinbase() {
        // A lone coinbase's wtxid is conventionally the zero hash.
        assert_eq!(witness_merkle_root(&[Hash256::ZERO]), Hash256::ZERO);
    }
}
