//! Context-free header validation (§4.3): everything checkable from a
//! header in isolation, with no reference to the block index or chain tip.

use floki_core::error::{AuxPowError, ConsensusError, PowError, TimeError};
use floki_core::traits::TimeSource;
use floki_core::types::{Block, BlockHeader};
use floki_core::work;
use primitive_types::U256;

use crate::auxpow;

/// Maximum permitted clock skew ahead of the adjusted time source, seconds.
const MAX_FUTURE_BLOCK_TIME: u32 = floki_core::constants::MAX_FUTURE_BLOCK_TIME as u32;

fn hash_le_u256(hash: &floki_core::types::Hash256) -> U256 {
    U256::from_little_endian(hash.as_bytes())
}

/// Context-free checks applied to a header before it is ever linked into
/// the index: the compact-bits target is in range, the timestamp is sane,
/// and the proof of work (direct scrypt hash or AuxPoW payload) is valid.
///
/// `aux_pow` is `None` for a header with no merged-mining payload and
/// `Some` when one is attached; the caller is responsible for pairing a
/// [`BlockHeader`] with whatever `Block::aux_pow` carried it.
pub fn check_header_sanity(
    header: &BlockHeader,
    aux_pow: Option<&floki_core::types::AuxPowHeader>,
    params: &floki_core::params::ChainParams,
    time_source: &dyn TimeSource,
) -> Result<(), ConsensusError> {
    let target = work::target_from_bits(header.bits);
    if target.is_zero() || target > params.pow_limit {
        return Err(PowError::UnexpectedDifficulty {
            got: header.bits,
            expected: params.pow_limit_bits,
        }
        .into());
    }

    // `timestamp` is a u32 of whole seconds on the wire, so InvalidTime
    // (sub-second precision) has no representable violation here.

    let now = time_source.adjusted_time();
    if header.timestamp > now.saturating_add(MAX_FUTURE_BLOCK_TIME) {
        return Err(TimeError::TimeTooNew.into());
    }

    if params.no_pow_check {
        return Ok(());
    }

    if header.has_aux_pow() {
        let aux = aux_pow.ok_or(AuxPowError::AuxpowNoHeader)?;
        auxpow::check(header, aux, header.chain_id(), target)
    } else {
        if aux_pow.is_some() {
            return Err(AuxPowError::AuxpowNoVersion.into());
        }
        let pow_hash = floki_core::hash::scrypt_pow_hash(&header.serialize_base());
        if hash_le_u256(&pow_hash) > target {
            return Err(PowError::HighHash.into());
        }
        Ok(())
    }
}

/// Convenience wrapper over [`check_header_sanity`] for a full [`Block`].
pub fn check_block_header_sanity(
    block: &Block,
    params: &floki_core::params::ChainParams,
    time_source: &dyn TimeSource,
) -> Result<(), ConsensusError> {
    check_header_sanity(&block.header, block.aux_pow.as_ref(), params, time_source)
}
