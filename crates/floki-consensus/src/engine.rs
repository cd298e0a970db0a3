//! The chain façade (§4.12): the single entry point that ties the block
//! index, UTXO view, and deployment cache together into best-chain
//! selection, turning [`crate::connect::connect_block`] into a full
//! `ProcessBlock`/reorg engine.
//!
//! Built as a collaborator-holding struct (`Arc<dyn Trait>` fields, a `new`
//! that seeds genesis, `#[cfg(any(test, feature = "testing"))]`-gated
//! internals for the integration suite), generalized from block-template
//! mining to best-chain selection: disconnect down to the fork point,
//! connect forward along the challenger, and roll back to the previous tip
//! the instant a block along the way fails to connect (§4.6 reorg
//! algorithm). Operational events (reorgs, invalidation, reconsideration)
//! are logged with `tracing`; rule violations are never logged here, only
//! returned, per [`floki_core::error`]'s documented convention.

use std::collections::HashMap;
use std::sync::Arc;

use floki_core::error::{ChainError, ConsensusError};
use floki_core::params::{ChainParams, Deployment};
use floki_core::traits::{ScriptEngine, TimeSource};
use floki_core::types::{Block, BlockHeader, Hash256, OutPoint, SpentTxOut, Transaction, UtxoEntry};
use floki_core::work::Work;

use crate::checkpoint;
use crate::connect;
use crate::deployment::DeploymentCache;
use crate::difficulty;
use crate::header;
use crate::index::{BlockIndex, NodeId, DATA_STORED};
use crate::txvalidate::{self, SequenceLock};
use crate::utxo::UtxoView;

/// A point-in-time summary of the active chain's tip (§4.12 `BestSnapshot`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BestSnapshot {
    pub hash: Hash256,
    pub height: u32,
    pub chain_work: Work,
}

/// Where a chain tip stands relative to the active chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TipStatus {
    /// This tip is the current active chain.
    Active,
    /// Header-valid, body-stored, and fully connect-validated, but not the
    /// most-work chain.
    ValidFork,
    /// This tip or one of its ancestors failed validation.
    Invalid,
    /// Headers-only, or a stored body not yet connect-validated.
    Unknown,
}

/// One entry of [`ConsensusEngine::chain_tips`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainTip {
    pub hash: Hash256,
    pub height: u32,
    pub chain_work: Work,
    pub status: TipStatus,
}

/// The stateful consensus engine: block index, UTXO view, and deployment
/// cache behind best-chain selection.
///
/// Block bodies and undo journals are held directly rather than behind the
/// [`floki_core::traits::BlockStore`] boundary — that trait models the
/// persistence *write* path (a node drains a connected block's delta into a
/// [`floki_core::traits::WriteBatch`] after the fact), not the random-access
/// read/undo pattern a reorg needs while it is still deciding which chain
/// wins.
pub struct ConsensusEngine {
    index: BlockIndex,
    view: UtxoView,
    undo: HashMap<Hash256, Vec<SpentTxOut>>,
    blocks: HashMap<Hash256, Block>,
    deployment_cache: DeploymentCache,
    active_tip: NodeId,
    params: ChainParams,
    script_engine: Arc<dyn ScriptEngine>,
    time_source: Arc<dyn TimeSource>,
}

impl ConsensusEngine {
    /// Build a fresh engine seeded with `params.network`'s genesis block,
    /// already connected as the active chain's one and only block.
    pub fn new(params: ChainParams, script_engine: Arc<dyn ScriptEngine>, time_source: Arc<dyn TimeSource>) -> Self {
        let genesis_block = floki_core::genesis::genesis_block(params.network);
        let genesis_hash = genesis_block.header.hash();

        let mut index = BlockIndex::new();
        let genesis_id = index.insert_genesis(genesis_block.header.clone());
        index.mark_data_stored(genesis_id);
        index.mark_valid_block(genesis_id);

        let mut view = UtxoView::new(genesis_hash);
        let mut journal = Vec::new();
        view.connect_transaction(&genesis_block.transactions[0], 0, &mut journal);

        let mut blocks = HashMap::new();
        blocks.insert(genesis_hash, genesis_block);

        Self {
            index,
            view,
            undo: HashMap::new(),
            blocks,
            deployment_cache: DeploymentCache::new(),
            active_tip: genesis_id,
            params,
            script_engine,
            time_source,
        }
    }

    /// Accept a full block (§4.12 `ProcessBlock`): header and body sanity,
    /// contextual header checks, then re-run best-chain selection. Returns
    /// whether the active tip changed as a result.
    pub fn process_block(&mut self, block: Block) -> Result<bool, ConsensusError> {
        header::check_block_header_sanity(&block, &self.params, self.time_source.as_ref())?;
        connect::check_block_sanity(&block)?;

        let hash = block.header.hash();
        let node_id = self.index.insert_header(block.header.clone())?;
        if self.index.get(node_id).has_failed() {
            return Err(ChainError::MarkedInvalid.into());
        }
        self.index.mark_data_stored(node_id);
        self.blocks.insert(hash, block);

        let height = self.index.get(node_id).height;
        if let Err(e) = checkpoint::verify_checkpoint(&self.params, height, hash) {
            self.index.mark_validate_failed(node_id);
            return Err(e);
        }

        let parent_id = self
            .index
            .get(node_id)
            .parent
            .ok_or_else(|| ConsensusError::Internal("process_block called on the genesis header".into()))?;
        let candidate_header = self.index.get(node_id).header.clone();
        if let Err(e) = difficulty::check_header_context(&candidate_header, &self.index, parent_id, &self.params) {
            self.index.mark_validate_failed(node_id);
            return Err(e);
        }

        self.try_activate_best_chain()
    }

    /// Accept headers with no bodies yet (§4.12 `ProcessBlockHeaders`):
    /// inserted and contextually checked, but never made active-chain
    /// candidates until their bodies arrive via [`Self::process_block`].
    /// A header carrying the AuxPoW bit cannot have its proof of work
    /// checked without the merged-mining payload, which only a full block
    /// carries, so that check is deferred to `process_block`.
    pub fn process_block_headers(&mut self, headers: &[BlockHeader]) -> Result<Vec<NodeId>, ConsensusError> {
        let mut inserted = Vec::with_capacity(headers.len());
        for header in headers {
            if !header.has_aux_pow() {
                crate::header::check_header_sanity(header, None, &self.params, self.time_source.as_ref())?;
            }
            let node_id = self.index.insert_header(header.clone())?;
            if self.index.get(node_id).has_failed() {
                return Err(ChainError::MarkedInvalid.into());
            }
            let height = self.index.get(node_id).height;
            if let Err(e) = checkpoint::verify_checkpoint(&self.params, height, header.hash()) {
                self.index.mark_validate_failed(node_id);
                return Err(e);
            }
            let parent_id = self
                .index
                .get(node_id)
                .parent
                .ok_or_else(|| ConsensusError::Internal("process_block_headers called on the genesis header".into()))?;
            if let Err(e) = difficulty::check_header_context(header, &self.index, parent_id, &self.params) {
                self.index.mark_validate_failed(node_id);
                return Err(e);
            }
            inserted.push(node_id);
        }
        Ok(inserted)
    }

    /// Mark a block permanently invalid (§4.12 `InvalidateBlock`) and
    /// reselect the best chain, which rolls the active tip back if `hash`
    /// was one of its ancestors.
    pub fn invalidate_block(&mut self, hash: Hash256) -> Result<(), ConsensusError> {
        let node_id = self.index.get_by_hash(&hash).ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
        self.index.mark_validate_failed(node_id);
        tracing::info!(hash = %hash, "block invalidated");
        self.try_activate_best_chain()?;
        Ok(())
    }

    /// Clear a previously invalidated block's failure marks (§4.12
    /// `ReconsiderBlock`) and reselect the best chain, which may restore it
    /// (or a descendant) as the active tip.
    pub fn reconsider_block(&mut self, hash: Hash256) -> Result<(), ConsensusError> {
        let node_id = self.index.get_by_hash(&hash).ok_or_else(|| ChainError::BlockNotFound(hash.to_string()))?;
        self.index.reconsider(node_id);
        tracing::info!(hash = %hash, "block reconsidered");
        self.try_activate_best_chain()?;
        Ok(())
    }

    /// The `bits` a block built on `prev_hash` must carry (§4.12
    /// `CalcNextRequiredDifficulty`).
    pub fn calc_next_required_difficulty(&self, prev_hash: Hash256, candidate_timestamp: u32) -> Result<u32, ConsensusError> {
        let parent_id = self.index.get_by_hash(&prev_hash).ok_or_else(|| ChainError::BlockNotFound(prev_hash.to_string()))?;
        Ok(difficulty::next_required_bits(&self.index, parent_id, candidate_timestamp, &self.params))
    }

    /// The BIP0068 relative lock `tx` would be subject to if spent at the
    /// current active tip (§4.12 `CalcSequenceLock`).
    pub fn calc_sequence_lock(&self, tx: &Transaction) -> SequenceLock {
        txvalidate::calc_sequence_lock_for_block(tx, &self.view, &self.index, self.active_tip)
    }

    /// The active chain's current tip (§4.12 `BestSnapshot`).
    pub fn best_snapshot(&self) -> BestSnapshot {
        let node = self.index.get(self.active_tip);
        BestSnapshot { hash: node.hash, height: node.height, chain_work: node.chain_work }
    }

    /// Every leaf of the block index, annotated with its relationship to
    /// the active chain.
    pub fn chain_tips(&self) -> Vec<ChainTip> {
        self.index
            .tips()
            .into_iter()
            .map(|id| {
                let node = self.index.get(id);
                let status = if id == self.active_tip {
                    TipStatus::Active
                } else if node.has_failed() {
                    TipStatus::Invalid
                } else if node.is_valid_block() {
                    TipStatus::ValidFork
                } else {
                    TipStatus::Unknown
                };
                ChainTip { hash: node.hash, height: node.height, chain_work: node.chain_work, status }
            })
            .collect()
    }

    pub fn get_block(&self, hash: &Hash256) -> Option<&Block> {
        self.blocks.get(hash)
    }

    /// The hash of the active chain's block at `height` (§4.12
    /// `BlockByHeight`), or `None` if the active chain is not yet that
    /// tall.
    pub fn block_by_height(&self, height: u32) -> Option<Hash256> {
        self.index.ancestor_at_height(self.active_tip, height).map(|id| self.index.get(id).hash)
    }

    /// Headers along the active chain strictly after the highest hash in
    /// `locator_hashes` that the index recognizes on that chain, up to
    /// `limit` entries or `stop_hash` (§4.12/§4.5 `LocateHeaders`).
    pub fn locate_headers(&self, locator_hashes: &[Hash256], stop_hash: Option<Hash256>, limit: usize) -> Vec<BlockHeader> {
        self.index.locate_headers(self.active_tip, locator_hashes, stop_hash, limit)
    }

    /// The hash-only counterpart of [`Self::locate_headers`] (§4.5
    /// `locateBlocks`).
    pub fn locate_blocks(&self, locator_hashes: &[Hash256], stop_hash: Option<Hash256>, limit: usize) -> Vec<Hash256> {
        self.index.locate_blocks(self.active_tip, locator_hashes, stop_hash, limit)
    }

    /// A sparse block locator anchored at the active tip (§4.5 `locator`),
    /// for driving header/block sync against a peer.
    pub fn locator(&self) -> Vec<Hash256> {
        self.index.locator(self.active_tip)
    }

    pub fn utxo(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.view.lookup(outpoint)
    }

    pub fn params(&self) -> &ChainParams {
        &self.params
    }

    /// Re-run best-chain selection: repeatedly pick the most-work
    /// not-yet-failed candidate and attempt to reorganize onto it,
    /// retrying against the next-best candidate if it fails to connect.
    /// Returns whether the active tip actually changed.
    fn try_activate_best_chain(&mut self) -> Result<bool, ConsensusError> {
        let start = self.active_tip;
        loop {
            let candidate = self.most_work_candidate();
            if candidate == self.active_tip {
                return Ok(self.active_tip != start);
            }
            match self.reorganize_to(candidate) {
                Ok(()) => {
                    tracing::info!(
                        hash = %self.index.get(self.active_tip).hash,
                        height = self.index.get(self.active_tip).height,
                        "active chain advanced"
                    );
                }
                Err(e) => {
                    tracing::debug!(error = %e, "candidate chain failed to connect, retrying with next-best");
                }
            }
        }
    }

    /// The highest-`chain_work` node that has a stored body and has not
    /// failed validation (directly or through an ancestor). Not restricted
    /// to leaf tips: an interior node can out-rank every current leaf if
    /// its only child just failed.
    ///
    /// Ties are broken by lowest hash, then by earliest insertion (§4.6):
    /// the scan only replaces `best` on strictly greater work, or on equal
    /// work with a strictly lower hash, so a later-seen node can never
    /// displace an equally-ranked earlier one.
    fn most_work_candidate(&self) -> NodeId {
        let mut best: Option<NodeId> = None;
        let mut best_work = None;
        let mut best_hash = None;

        for id in self.index.node_ids() {
            let node = self.index.get(id);
            if node.status & DATA_STORED == 0 || node.has_failed() {
                continue;
            }
            let better = match (best_work, best_hash) {
                (None, _) => true,
                (Some(w), Some(h)) => node.chain_work > w || (node.chain_work == w && node.hash < h),
                (Some(_), None) => unreachable!("best_work and best_hash are always set together"),
            };
            if better {
                best = Some(id);
                best_work = Some(node.chain_work);
                best_hash = Some(node.hash);
            }
        }
        best.unwrap_or(self.active_tip)
    }

    fn resolve_flags(&mut self, node_id: NodeId) -> (bool, bool, bool) {
        let segwit = crate::deployment::is_active(&mut self.deployment_cache, &self.index, node_id, Deployment::Segwit, &self.params);
        let csv = crate::deployment::is_active(&mut self.deployment_cache, &self.index, node_id, Deployment::Csv, &self.params);
        let taproot = crate::deployment::is_active(&mut self.deployment_cache, &self.index, node_id, Deployment::Taproot, &self.params);
        (segwit, csv, taproot)
    }

    fn connect_node(&mut self, node_id: NodeId, block: &Block) -> Result<(), ConsensusError> {
        let (segwit_active, csv_active, taproot_active) = self.resolve_flags(node_id);
        let height = self.index.get(node_id).height;
        let past_last_checkpoint = checkpoint::is_past_checkpoint(&self.index, self.active_tip, height, &self.params);
        let mut journal = Vec::new();
        connect::connect_block(
            &self.index,
            node_id,
            block,
            &mut self.view,
            &mut journal,
            &self.params,
            self.script_engine.as_ref(),
            segwit_active,
            csv_active,
            taproot_active,
            past_last_checkpoint,
        )?;
        self.index.mark_valid_block(node_id);
        self.undo.insert(self.index.get(node_id).hash, journal);
        self.active_tip = node_id;
        Ok(())
    }

    /// Walk the active chain from its current tip down to `target`'s fork
    /// point, then forward along `target`'s own chain (§4.6 reorg
    /// algorithm). If any block along the forward walk fails to connect —
    /// or its body is simply missing, e.g. a header-only candidate — the
    /// view is rolled back to exactly where it stood before this call and
    /// the triggering error (if any) is returned.
    fn reorganize_to(&mut self, target: NodeId) -> Result<(), ConsensusError> {
        let fork = self.index.find_fork(self.active_tip, target);
        checkpoint::check_fork_against_checkpoint(&self.index, self.active_tip, fork, &self.params)?;

        let mut disconnected = Vec::new();
        while self.active_tip != fork {
            let node_id = self.active_tip;
            let hash = self.index.get(node_id).hash;
            let block = self
                .blocks
                .get(&hash)
                .cloned()
                .ok_or_else(|| ConsensusError::Internal("active chain block body missing from the engine".into()))?;
            let mut journal = self.undo.remove(&hash).unwrap_or_default();
            connect::disconnect_block(&block, &mut self.view, &mut journal);
            disconnected.push(node_id);
            self.active_tip = self.index.get(node_id).parent.expect("fork is an ancestor of the active tip");
        }

        for node_id in self.index.path_from(fork, target) {
            let hash = self.index.get(node_id).hash;
            let Some(block) = self.blocks.get(&hash).cloned() else {
                // Header-only candidate: stop advancing here without
                // treating the gap as a validation failure.
                self.restore_previous_tip(&disconnected);
                return Ok(());
            };
            match self.connect_node(node_id, &block) {
                Ok(()) => {}
                Err(e) => {
                    self.index.mark_validate_failed(node_id);
                    self.restore_previous_tip(&disconnected);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Reconnect `disconnected` (collected tip-to-fork during
    /// [`Self::reorganize_to`]) in reverse order, restoring the view to
    /// exactly the state it held before that reorg attempt began.
    fn restore_previous_tip(&mut self, disconnected: &[NodeId]) {
        for &node_id in disconnected.iter().rev() {
            let hash = self.index.get(node_id).hash;
            let block = self.blocks.get(&hash).cloned().expect("previously active block body must still be present");
            self.connect_node(node_id, &block)
                .expect("reconnecting a block that was already valid on the previous active chain must not fail");
        }
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn view(&self) -> &UtxoView {
        &self.view
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn node_id_of(&self, hash: &Hash256) -> Option<NodeId> {
        self.index.get_by_hash(hash)
    }
}
