//! Block subsidy schedule (§4.9): `subsidy(h) = max(stableSubsidy, baseSubsidy
//! >> (h / subsidyReductionInterval))`.
//!
//! Unlike a pure Bitcoin-style halving (which eventually reaches zero),
//! Flokicoin's subsidy floors at `stable_subsidy` once the right-shift would
//! otherwise drop below it, so mining never goes unrewarded.

use crate::params::ChainParams;

/// The block subsidy (in base units) at `height`, per `params`.
///
/// `baseSubsidy >> (height / subsidy_reduction_interval)` halves every
/// `subsidy_reduction_interval` blocks; once that value would fall to or
/// below `stable_subsidy`, the subsidy is clamped to `stable_subsidy`
/// instead (§4.9). The shift count is capped at 63 to avoid undefined
/// shift-overflow on `u64` for pathologically large heights.
pub fn subsidy(height: u64, params: &ChainParams) -> u64 {
    let interval = params.subsidy_reduction_interval as u64;
    let halvings = if interval == 0 { 0 } else { height / interval };
    let reduced = if halvings >= 64 {
        0
    } else {
        params.base_subsidy >> halvings
    };
    reduced.max(params.stable_subsidy)
}

/// The halving epoch a height falls in: `height / subsidy_reduction_interval`.
pub fn subsidy_epoch(height: u64, params: &ChainParams) -> u64 {
    let interval = params.subsidy_reduction_interval as u64;
    if interval == 0 { 0 } else { height / interval }
}
