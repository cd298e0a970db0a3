//! Checkpoint gating (§4.11): hard-coded `(height, hash)` pins that reject
//! both a misbehaving block claiming a pinned height and a fork whose
//! common ancestor with the active chain falls below the last checkpoint
//! already reached.
//!
//! Compiled-in checkpoints ([`floki_core::params::ChainParams::checkpoints`])
//! pin known-good history so that a reorg cannot unwind past it. Answered
//! against the block index rather than a flat height list so "already
//! reached" can be read from the active tip's own ancestry instead of
//! assuming every configured checkpoint has been passed.

use floki_core::error::{ChainError, ConsensusError};
use floki_core::params::ChainParams;
use floki_core::types::Hash256;

use crate::index::{BlockIndex, NodeId};

/// Verify a block at `height` matches the checkpoint pinned there, if any
/// (§4.11 `verifyCheckpoint`). A height with no configured checkpoint
/// always passes.
pub fn verify_checkpoint(params: &ChainParams, height: u32, hash: Hash256) -> Result<(), ConsensusError> {
    for cp in &params.checkpoints {
        if cp.height == height {
            if cp.hash != hash {
                return Err(ChainError::BadCheckpoint { height: height as u64 }.into());
            }
            return Ok(());
        }
    }
    Ok(())
}

/// The highest configured checkpoint that `active_tip`'s own chain
/// actually reaches with a matching hash (§4.11 `findPreviousCheckpoint`).
/// `None` if no configured checkpoint has been reached yet.
pub fn find_previous_checkpoint(index: &BlockIndex, active_tip: NodeId, params: &ChainParams) -> Option<NodeId> {
    params
        .checkpoints
        .iter()
        .filter_map(|cp| {
            let id = index.ancestor_at_height(active_tip, cp.height)?;
            (index.get(id).hash == cp.hash).then_some((cp.height, id))
        })
        .max_by_key(|(height, _)| *height)
        .map(|(_, id)| id)
}

/// Reject a fork whose lowest common ancestor with `active_tip` is older
/// than the last checkpoint `active_tip` has already reached (§4.11: a
/// reorg may never unwind below a pinned height).
pub fn check_fork_against_checkpoint(
    index: &BlockIndex,
    active_tip: NodeId,
    fork_point: NodeId,
    params: &ChainParams,
) -> Result<(), ConsensusError> {
    if let Some(cp_id) = find_previous_checkpoint(index, active_tip, params) {
        let checkpoint_height = index.get(cp_id).height;
        let fork_height = index.get(fork_point).height;
        if fork_height < checkpoint_height {
            return Err(ChainError::ForkTooOld {
                height: fork_height as u64,
                checkpoint_height: checkpoint_height as u64,
            }
            .into());
        }
    }
    Ok(())
}

/// Whether `height` sits strictly past the last checkpoint `active_tip` has
/// reached — the gate [`crate::connect::connect_block`] uses to skip
/// re-verifying scripts buried under a checkpoint.
pub fn is_past_checkpoint(index: &BlockIndex, active_tip: NodeId, height: u32, params: &ChainParams) -> bool {
    match find_previous_checkpoint(index, active_tip, params) {
        Some(cp_id) => height > index.get(cp_id).height,
        None => true,
    }
}
