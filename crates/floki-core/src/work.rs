//! Compact↔big-integer difficulty target conversion and work accounting (C1).
//!
//! Targets and accumulated work are both 256-bit unsigned integers;
//! `Target` and `Work` are aliases over [`primitive_types::U256`] so that
//! callers can tell the two uses apart without a distinct newtype pair.

use primitive_types::{U256, U512};

pub type Target = U256;
pub type Work = U256;

/// Sign bit of the 23-bit mantissa (bit 23 of the 32-bit compact value).
const SIGN_BIT: u32 = 0x0080_0000;
/// Mask over the 23-bit mantissa.
const MANTISSA_MASK: u32 = 0x007f_ffff;

/// Decode a compact 32-bit difficulty target into its 256-bit form.
///
/// `N = mantissa * 256^(exponent - 3)`. A negative-signed encoding or a
/// zero mantissa both decode to zero, matching Bitcoin's historical
/// `CompactToBig` behavior (a zero target is never a valid PoW target and
/// is rejected by [`crate::error::PowError::UnexpectedDifficulty`] upstream).
pub fn target_from_bits(bits: u32) -> Target {
    let exponent = bits >> 24;
    let mantissa = (bits & MANTISSA_MASK) as u64;
    let is_negative = bits & SIGN_BIT != 0;

    if is_negative || mantissa == 0 {
        return Target::zero();
    }

    if exponent <= 3 {
        let shift = 8 * (3 - exponent);
        Target::from(mantissa >> shift)
    } else {
        let shift = 8 * (exponent - 3);
        if shift >= 256 {
            Target::zero()
        } else {
            Target::from(mantissa) << shift
        }
    }
}

/// Encode a 256-bit target into its canonical compact 32-bit form.
///
/// Never sets the sign bit: callers are expected to only pass non-negative
/// targets (all valid PoW targets are non-negative by construction).
pub fn bits_from_target(target: &Target) -> u32 {
    if target.is_zero() {
        return 0;
    }

    let num_bits = target.bits();
    let mut size = num_bits.div_ceil(8) as u32;

    let mut compact: u32 = if size <= 3 {
        let low = target.low_u64();
        (low as u32) << (8 * (3 - size))
    } else {
        let shifted = target >> (8 * (size - 3));
        shifted.low_u64() as u32
    };

    // If the would-be mantissa's top bit is set it would be misread as the
    // sign bit; shift one more byte into the exponent to avoid that.
    if compact & SIGN_BIT != 0 {
        compact >>= 8;
        size += 1;
    }

    compact | (size << 24)
}

/// Work contributed by a single header whose target is `target`: the
/// expected number of hashes needed to find a block at this difficulty,
/// `floor(2^256 / (target + 1))`.
///
/// A zero target (which should never reach this function in a validated
/// chain) is treated as saturating to [`Work::max_value`] rather than
/// dividing by `2^256`, which would overflow the 256-bit result.
pub fn work_from_target(target: &Target) -> Work {
    if target.is_zero() {
        return Work::max_value();
    }

    let wide_target = U512::from(*target);
    let denominator = wide_target + U512::one();
    let numerator = U512::one() << 256;
    let wide_work = numerator / denominator;

    narrow(wide_work)
}

/// Work contributed by a header given its compact `bits` field.
pub fn work_from_bits(bits: u32) -> Work {
    work_from_target(&target_from_bits(bits))
}

/// Add a block's work to an accumulated total, returning `None` on overflow.
///
/// Ordering on the chain is strictly by cumulative work (§4.1); callers
/// should treat an overflow here as unreachable under any realistic
/// parameter set and surface it as [`crate::error::ConsensusError::Internal`]
/// if it is ever observed.
pub fn accumulate(total: Work, block_work: Work) -> Option<Work> {
    total.checked_add(block_work)
}

fn narrow(wide: U512) -> U256 {
    if wide > U512::from(U256::max_value()) {
        return U256::max_value();
    }
    let mut bytes = [0u8; 64];
    wide.to_little_endian(&mut bytes);
    U256::from_little_endian(&bytes[..32])
}
