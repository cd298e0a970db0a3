//! The block index (§3, §4.5): an append-only DAG of everything ever seen
//! as a header, whether or not it is on the best chain.
//!
//! Nodes live in a flat arena ([`Vec<BlockIndexNode>`]) addressed by a
//! stable [`NodeId`] rather than linked via `Rc`/`Arc`, since the index is
//! a DAG that only ever grows and nodes need a parent *and* a children
//! list — a direct object-graph would need weak references in one
//! direction or the other for no benefit.

use std::collections::HashMap;

use floki_core::error::{ChainError, ConsensusError};
use floki_core::types::{BlockHeader, Hash256};
use floki_core::work::Work;

/// A stable index into [`BlockIndex`]'s arena. Never reused or invalidated
/// once issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

/// Header-level validity: seen, with a stored header.
pub const VALID_HEADER: u8 = 0b0000_0001;
/// The full block body is stored (not just the header).
pub const DATA_STORED: u8 = 0b0000_0010;
/// The block passed contextual validation and connected cleanly.
pub const VALID_BLOCK: u8 = 0b0000_0100;
/// This node itself failed validation.
pub const VALIDATE_FAILED: u8 = 0b0000_1000;
/// An ancestor of this node failed validation.
pub const INVALID_ANCESTOR: u8 = 0b0001_0000;

/// Mask covering [`VALIDATE_FAILED`] and [`INVALID_ANCESTOR`]: a node with
/// any of these bits set can never become (or remain) the chain tip.
pub const FAILED_MASK: u8 = VALIDATE_FAILED | INVALID_ANCESTOR;

/// One node in the block index (§3 `BlockIndexNode`).
#[derive(Clone, Debug)]
pub struct BlockIndexNode {
    pub hash: Hash256,
    pub header: BlockHeader,
    pub height: u32,
    pub parent: Option<NodeId>,
    /// Work accumulated by this block and every ancestor back to genesis.
    pub chain_work: Work,
    pub status: u8,
    /// Median of this block's own and its ten most recent ancestors'
    /// timestamps (BIP0113), cached at insertion since ancestor headers
    /// never change afterwards.
    pub median_time_past: u32,
}

impl BlockIndexNode {
    pub fn is_valid_block(&self) -> bool {
        self.status & VALID_BLOCK != 0 && self.status & FAILED_MASK == 0
    }

    pub fn has_failed(&self) -> bool {
        self.status & FAILED_MASK != 0
    }
}

/// The block index: an arena of [`BlockIndexNode`]s plus the lookup and
/// child-tracking structures needed to insert headers, walk ancestry, and
/// propagate invalidity to descendants.
#[derive(Default)]
pub struct BlockIndex {
    nodes: Vec<BlockIndexNode>,
    by_hash: HashMap<Hash256, NodeId>,
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl BlockIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> &BlockIndexNode {
        &self.nodes[id.0 as usize]
    }

    fn get_mut(&mut self, id: NodeId) -> &mut BlockIndexNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn get_by_hash(&self, hash: &Hash256) -> Option<NodeId> {
        self.by_hash.get(hash).copied()
    }

    pub fn contains(&self, hash: &Hash256) -> bool {
        self.by_hash.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn median_time_past_of(&self, parent: Option<NodeId>, own_timestamp: u32) -> u32 {
        let mut samples = vec![own_timestamp];
        let mut cursor = parent;
        while samples.len() < floki_core::constants::MEDIAN_TIME_SPAN {
            let Some(id) = cursor else { break };
            let node = self.get(id);
            samples.push(node.header.timestamp);
            cursor = node.parent;
        }
        samples.sort_unstable();
        samples[samples.len() / 2]
    }

    /// Insert the genesis header: the one node allowed to have no parent.
    pub fn insert_genesis(&mut self, header: BlockHeader) -> NodeId {
        let hash = header.hash();
        let chain_work = floki_core::work::work_from_bits(header.bits);
        let mtp = header.timestamp;
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(BlockIndexNode {
            hash,
            header,
            height: 0,
            parent: None,
            chain_work,
            status: VALID_HEADER,
            median_time_past: mtp,
        });
        self.by_hash.insert(hash, id);
        id
    }

    /// Insert a header whose parent must already be indexed (§4.5
    /// `insertHeader`). Returns the new node's id with [`VALID_HEADER`] set
    /// and work/height/median-time-past derived from the parent; body- and
    /// block-level status are layered on by [`Self::mark_data_stored`] and
    /// [`Self::mark_valid_block`].
    pub fn insert_header(&mut self, header: BlockHeader) -> Result<NodeId, ConsensusError> {
        let hash = header.hash();
        if let Some(existing) = self.by_hash.get(&hash) {
            return Ok(*existing);
        }
        let parent_id = self
            .by_hash
            .get(&header.prev_hash)
            .copied()
            .ok_or_else(|| ChainError::UnknownParent(header.prev_hash.to_string()))?;
        let parent = self.get(parent_id);
        let height = parent.height + 1;
        let chain_work = floki_core::work::accumulate(
            parent.chain_work,
            floki_core::work::work_from_bits(header.bits),
        )
        .ok_or_else(|| ConsensusError::Internal("chain work overflow".into()))?;
        let mtp = self.median_time_past_of(Some(parent_id), header.timestamp);
        let mut status = VALID_HEADER;
        if self.get(parent_id).has_failed() {
            status |= INVALID_ANCESTOR;
        }

        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(BlockIndexNode {
            hash,
            header,
            height,
            parent: Some(parent_id),
            chain_work,
            status,
            median_time_past: mtp,
        });
        self.by_hash.insert(hash, id);
        self.children.entry(parent_id).or_default().push(id);
        Ok(id)
    }

    pub fn mark_data_stored(&mut self, id: NodeId) {
        self.get_mut(id).status |= DATA_STORED;
    }

    pub fn mark_valid_block(&mut self, id: NodeId) {
        self.get_mut(id).status |= VALID_BLOCK;
    }

    /// Mark `id` as having failed validation and propagate
    /// [`INVALID_ANCESTOR`] to every descendant (§4.5 status diagram).
    pub fn mark_validate_failed(&mut self, id: NodeId) {
        self.get_mut(id).status |= VALIDATE_FAILED;
        let mut queue: Vec<NodeId> = self.children.get(&id).cloned().unwrap_or_default();
        while let Some(child) = queue.pop() {
            let node = self.get_mut(child);
            if node.status & INVALID_ANCESTOR != 0 {
                continue;
            }
            node.status |= INVALID_ANCESTOR;
            if let Some(grandchildren) = self.children.get(&child) {
                queue.extend(grandchildren.iter().copied());
            }
        }
    }

    /// Clear failure marks from `id` and its entire descendant subtree
    /// (§4.12 `ReconsiderBlock`), allowing the best-chain selector to
    /// re-evaluate them as candidates again.
    pub fn reconsider(&mut self, id: NodeId) {
        self.get_mut(id).status &= !FAILED_MASK;
        let mut queue: Vec<NodeId> = self.children.get(&id).cloned().unwrap_or_default();
        while let Some(child) = queue.pop() {
            let node = self.get_mut(child);
            node.status &= !INVALID_ANCESTOR;
            if let Some(grandchildren) = self.children.get(&child) {
                queue.extend(grandchildren.iter().copied());
            }
        }
    }

    /// Walk parent pointers from `id` back to the ancestor at `height`.
    pub fn ancestor_at_height(&self, id: NodeId, height: u32) -> Option<NodeId> {
        let mut current = id;
        loop {
            let node = self.get(current);
            if node.height == height {
                return Some(current);
            }
            if node.height < height {
                return None;
            }
            current = node.parent?;
        }
    }

    /// The lowest common ancestor of two nodes, walking both up to equal
    /// height and then together (§4.6 reorg algorithm).
    pub fn find_fork(&self, a: NodeId, b: NodeId) -> NodeId {
        let (mut a, mut b) = (a, b);
        let (height_a, height_b) = (self.get(a).height, self.get(b).height);
        if height_a > height_b {
            a = self.ancestor_at_height(a, height_b).unwrap();
        } else if height_b > height_a {
            b = self.ancestor_at_height(b, height_a).unwrap();
        }
        while a != b {
            a = self.get(a).parent.expect("genesis is common to all chains");
            b = self.get(b).parent.expect("genesis is common to all chains");
        }
        a
    }

    /// The chain of node ids from (excluding) `from` down to (including)
    /// `to`, in root-to-tip order, where `from` is an ancestor of `to`.
    pub fn path_from(&self, from: NodeId, to: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = to;
        while current != from {
            path.push(current);
            current = self.get(current).parent.expect("from must be an ancestor of to");
        }
        path.reverse();
        path
    }

    /// Every node id currently in the arena, in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(|i| NodeId(i as u32))
    }

    /// All tips of the index: nodes with no recorded children.
    pub fn tips(&self) -> Vec<NodeId> {
        (0..self.nodes.len())
            .map(|i| NodeId(i as u32))
            .filter(|id| self.children.get(id).map(|c| c.is_empty()).unwrap_or(true))
            .collect()
    }

    /// A standard exponentially-spaced block locator starting at `id`:
    /// the ten most recent hashes, then doubling the step each subsequent
    /// entry, terminating at genesis.
    pub fn locator(&self, id: NodeId) -> Vec<Hash256> {
        let mut hashes = Vec::new();
        let mut current = id;
        let mut step = 1u32;
        loop {
            let node = self.get(current);
            hashes.push(node.hash);
            if node.height == 0 {
                break;
            }
            if hashes.len() >= 10 {
                step *= 2;
            }
            let target_height = node.height.saturating_sub(step);
            match self.ancestor_at_height(current, target_height) {
                Some(next) => current = next,
                None => {
                    let genesis = self.ancestor_at_height(current, 0).unwrap();
                    if genesis != current {
                        hashes.push(self.get(genesis).hash);
                    }
                    break;
                }
            }
        }
        hashes
    }

    /// Headers along `tip`'s chain strictly after the highest locator hash
    /// found in the index, up to `limit` entries or `stop_hash`.
    pub fn locate_headers(
        &self,
        tip: NodeId,
        locator_hashes: &[Hash256],
        stop_hash: Option<Hash256>,
        limit: usize,
    ) -> Vec<BlockHeader> {
        let start = locator_hashes
            .iter()
            .find_map(|h| self.by_hash.get(h).copied())
            .filter(|id| self.is_ancestor(*id, tip));
        let mut chain = self.path_from(start.unwrap_or_else(|| self.ancestor_at_height(tip, 0).unwrap()), tip);
        if start.is_none() {
            // path_from excludes `from`; when starting from genesis itself
            // with no locator match, include it.
            let genesis = self.ancestor_at_height(tip, 0).unwrap();
            chain.insert(0, genesis);
        }
        let mut out = Vec::new();
        for id in chain {
            let node = self.get(id);
            out.push(node.header.clone());
            if out.len() >= limit {
                break;
            }
            if stop_hash == Some(node.hash) {
                break;
            }
        }
        out
    }

    fn is_ancestor(&self, ancestor: NodeId, of: NodeId) -> bool {
        self.ancestor_at_height(of, self.get(ancestor).height) == Some(ancestor)
    }

    /// Hashes along `tip`'s chain strictly after the highest locator hash
    /// found in the index, up to `limit` entries or `stop_hash` (§4.5
    /// `locateBlocks`) — the hash-only counterpart of
    /// [`Self::locate_headers`], used by block-body sync instead of header
    /// sync.
    pub fn locate_blocks(
        &self,
        tip: NodeId,
        locator_hashes: &[Hash256],
        stop_hash: Option<Hash256>,
        limit: usize,
    ) -> Vec<Hash256> {
        self.locate_headers(tip, locator_hashes, stop_hash, limit)
            .into_iter()
            .map(|header| header.hash())
            .collect()
    }

    /// Hashes at every `interval`'th height from `start` to `end`
    /// (inclusive) along `tip`'s chain (§4.5 `intervalBlockHashes`). Every
    /// node visited along the path must carry [`VALID_BLOCK`]; the first
    /// one that does not fails the whole call with `Unvalidated`.
    pub fn interval_block_hashes(
        &self,
        tip: NodeId,
        start: u32,
        end: u32,
        interval: u32,
    ) -> Result<Vec<Hash256>, ConsensusError> {
        let mut out = Vec::new();
        let mut height = start;
        while height <= end {
            if let Some(id) = self.ancestor_at_height(tip, height) {
                let node = self.get(id);
                if !node.is_valid_block() {
                    return Err(ChainError::Unvalidated.into());
                }
                out.push(node.hash);
            }
            height = match height.checked_add(interval) {
                Some(h) if interval > 0 => h,
                _ => break,
            };
        }
        Ok(out)
    }

    /// Hashes for every height in `start..=end` along `tip`'s chain
    /// (§4.5 `heightToHashRange`). Same VALID_BLOCK requirement as
    /// [`Self::interval_block_hashes`].
    pub fn height_to_hash_range(
        &self,
        tip: NodeId,
        start: u32,
        end: u32,
    ) -> Result<Vec<Hash256>, ConsensusError> {
        self.interval_block_hashes(tip, start, end, 1)
    }
}
