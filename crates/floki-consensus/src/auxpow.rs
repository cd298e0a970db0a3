//! Merged-mining (AuxPoW) proof verification.
//!
//! A merge-mined header carries no PoW of its own; instead its coinbase
//! transaction on the parent chain commits to this chain's header hash
//! through two merkle branches, and the actual proof of work is the parent
//! header's scrypt hash. [`check`] walks both branches and re-derives the
//! expected merge-mining slot so that a parent block can only satisfy one
//! merged chain's slot per side-mask value.

use floki_core::error::{AuxPowError, ConsensusError, PowError};
use floki_core::hash;
use floki_core::types::{AuxPowHeader, BlockHeader, Hash256};
use floki_core::work::Target;
use primitive_types::U256;

const AUXPOW_MAGIC: [u8; 4] = floki_core::constants::AUXPOW_MAGIC;
const SEARCH_WINDOW: usize = floki_core::constants::AUXPOW_CHAIN_MERKLE_SEARCH_WINDOW;
const MAX_BRANCH_DEPTH: usize = floki_core::constants::AUXPOW_MAX_BRANCH_DEPTH;
const LCG_MULTIPLIER: u32 = floki_core::constants::AUXPOW_LCG_MULTIPLIER;
const LCG_INCREMENT: u32 = floki_core::constants::AUXPOW_LCG_INCREMENT;

fn hash_le_u256(hash: &Hash256) -> U256 {
    U256::from_little_endian(hash.as_bytes())
}

fn find_all(haystack: &[u8], needle: &[u8]) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    (0..=haystack.len() - needle.len())
        .filter(|&i| &haystack[i..i + needle.len()] == needle)
        .collect()
}

/// The deterministic merge-mining slot for `nonce`/`chain_id` within a
/// blockchain-merkle tree of height `height` (so slots range `0..2^height`).
///
/// Two rounds of the classic `r := r*1103515245 + 12345` LCG, matching the
/// scheme merged-mining reference implementations use to scatter multiple
/// auxiliary chains' roots across one blockchain merkle tree without
/// collision.
fn expected_slot(nonce: u32, chain_id: i32, height: u32) -> Option<u32> {
    let modulus = 1u32.checked_shl(height)?;
    let mut r = nonce;
    r = r.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT);
    r = r.wrapping_add(chain_id as u32);
    r = r.wrapping_mul(LCG_MULTIPLIER).wrapping_add(LCG_INCREMENT);
    Some(r % modulus)
}

/// Verify an AuxPoW payload against the merge-mined child header's hash,
/// chain id, and required target (from the child header's compact bits).
pub fn check(
    header: &BlockHeader,
    aux: &AuxPowHeader,
    chain_id: i32,
    target: Target,
) -> Result<(), ConsensusError> {
    if aux.parent_hash != aux.parent_header.hash() {
        return Err(AuxPowError::AuxpowMalformedCoinbase.into());
    }

    let height = aux.blockchain_branch.hashes.len();
    if height > MAX_BRANCH_DEPTH {
        return Err(AuxPowError::AuxpowWrongSize.into());
    }

    let child_hash = header.hash();
    let aux_root = aux.blockchain_branch.apply(child_hash);

    let coinbase_txid = aux.coinbase_tx.txid();
    if aux.coinbase_branch.apply(coinbase_txid) != aux.parent_header.merkle_root {
        return Err(AuxPowError::AuxpowCoinbaseHashNotFound.into());
    }

    let first_input = aux
        .coinbase_tx
        .inputs
        .first()
        .ok_or(AuxPowError::AuxpowMalformedCoinbase)?;
    let script = first_input.signature_script.as_bytes();

    let needle = aux_root.reversed();
    let needle = needle.as_bytes();

    let magic_positions = find_all(script, &AUXPOW_MAGIC);
    if magic_positions.len() > 1 {
        return Err(AuxPowError::AuxpowMultipleHeaders.into());
    }

    let root_pos = if magic_positions.len() == 1 {
        let pos = magic_positions[0] + AUXPOW_MAGIC.len();
        if script.get(pos..pos + 32) != Some(needle) {
            return Err(AuxPowError::AuxpowBadHashPosition.into());
        }
        pos
    } else {
        find_all(script, needle)
            .into_iter()
            .find(|&pos| pos < SEARCH_WINDOW)
            .ok_or(AuxPowError::AuxpowBadHashPosition)?
    };

    let size_bytes = script
        .get(root_pos + 32..root_pos + 36)
        .ok_or(AuxPowError::AuxpowMalformedCoinbase)?;
    let nonce_bytes = script
        .get(root_pos + 36..root_pos + 40)
        .ok_or(AuxPowError::AuxpowMalformedCoinbase)?;
    let size = u32::from_le_bytes(size_bytes.try_into().unwrap());
    let nonce = u32::from_le_bytes(nonce_bytes.try_into().unwrap());

    let expected_size = 1u32
        .checked_shl(height as u32)
        .ok_or(AuxPowError::AuxpowWrongSize)?;
    if size != expected_size {
        return Err(AuxPowError::AuxpowWrongSize.into());
    }

    let expected_index = expected_slot(nonce, chain_id, height as u32)
        .ok_or(AuxPowError::AuxpowWrongSize)?;
    if aux.blockchain_branch.side_mask != expected_index {
        return Err(AuxPowError::AuxpowWrongIndex.into());
    }

    let parent_pow = hash::scrypt_pow_hash(&aux.parent_header.serialize_base());
    if hash_le_u256(&parent_pow) > target {
        return Err(PowError::HighHash.into());
    }

    Ok(())
}
