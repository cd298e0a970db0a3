//! BIP0009 versionbits deployment state machine (§4.10): per-deployment
//! signalling state, cached per retarget window rather than recomputed
//! from genesis on every query.

use std::collections::HashMap;

use floki_core::constants::{VERSIONBITS_TOP_BITS, VERSIONBITS_TOP_MASK};
use floki_core::params::{ChainParams, Deployment, DeploymentParams};

use crate::index::{BlockIndex, NodeId};

/// A deployment's signalling lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ThresholdState {
    Defined,
    Started,
    LockedIn,
    Active,
    Failed,
}

/// Cache key: one state per (deployment, window-start block hash).
#[derive(Default)]
pub struct DeploymentCache {
    states: HashMap<(Deployment, floki_core::types::Hash256), ThresholdState>,
}

impl DeploymentCache {
    pub fn new() -> Self {
        Self::default()
    }
}

fn window_start_height(height: u32, window: u32) -> u32 {
    if window == 0 { 0 } else { (height / window) * window }
}

fn signals(header_version: i32, deployment: &DeploymentParams) -> bool {
    if header_version & VERSIONBITS_TOP_MASK != VERSIONBITS_TOP_BITS {
        return false;
    }
    header_version & (1 << deployment.bit) != 0
}

/// Count of blocks within `window_start`'s confirmation window (the
/// `window_start` node itself through `window` blocks along its own
/// chain) that signal `deployment`.
fn count_signalling(index: &BlockIndex, window_start: NodeId, deployment: &DeploymentParams, window: u32) -> u32 {
    let mut count = 0;
    let mut current = Some(window_start);
    for _ in 0..window {
        let Some(id) = current else { break };
        let node = index.get(id);
        if signals(node.header.version, deployment) {
            count += 1;
        }
        current = node.parent;
    }
    count
}

/// Resolve the threshold state of `deployment` at `tip` (§4.10), walking
/// backward one confirmation window at a time from genesis and caching
/// each window-start's resolved state so repeated queries at nearby tips
/// are cheap.
pub fn state_at(
    cache: &mut DeploymentCache,
    index: &BlockIndex,
    tip: NodeId,
    deployment_params: &DeploymentParams,
    params: &ChainParams,
) -> ThresholdState {
    let window = params.miner_confirmation_window;
    let tip_height = index.get(tip).height;
    let this_window_start_height = window_start_height(tip_height, window);

    // Collect the chain of window-start heights from genesis up through
    // the tip's own window, then fold forward.
    let mut window_starts = Vec::new();
    let mut h = this_window_start_height;
    loop {
        window_starts.push(h);
        if h == 0 {
            break;
        }
        h -= window;
    }
    window_starts.reverse();

    let mut prev_state = ThresholdState::Defined;
    for &height in &window_starts {
        let Some(window_start_id) = index.ancestor_at_height(tip, height) else {
            continue;
        };
        let node = index.get(window_start_id);
        let key = (deployment_params.deployment, node.hash);
        if let Some(cached) = cache.states.get(&key) {
            prev_state = *cached;
            continue;
        }

        let mtp = node.median_time_past;
        let next_state = match prev_state {
            ThresholdState::Defined => {
                if mtp >= deployment_params.timeout {
                    ThresholdState::Failed
                } else if mtp >= deployment_params.start_time {
                    ThresholdState::Started
                } else {
                    ThresholdState::Defined
                }
            }
            ThresholdState::Started => {
                if mtp >= deployment_params.timeout {
                    ThresholdState::Failed
                } else {
                    let signalling = count_signalling(index, window_start_id, deployment_params, window);
                    if signalling >= params.rule_change_activation_threshold {
                        ThresholdState::LockedIn
                    } else {
                        ThresholdState::Started
                    }
                }
            }
            ThresholdState::LockedIn => ThresholdState::Active,
            ThresholdState::Active => ThresholdState::Active,
            ThresholdState::Failed => ThresholdState::Failed,
        };

        cache.states.insert(key, next_state);
        prev_state = next_state;
    }

    prev_state
}

/// Convenience: is `deployment` active at `tip`?
pub fn is_active(
    cache: &mut DeploymentCache,
    index: &BlockIndex,
    tip: NodeId,
    deployment: Deployment,
    params: &ChainParams,
) -> bool {
    match params.deployment(deployment) {
        Some(dp) => state_at(cache, index, tip, dp, params) == ThresholdState::Active,
        None => false,
    }
}
