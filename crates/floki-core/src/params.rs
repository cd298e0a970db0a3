//! Chain parameters (§6): the configuration record every consensus rule in
//! `floki-consensus` reads from rather than hard-coding. Mirrors the
//! foundation crate's existing plain-struct-with-named-constructors
//! convention (one constructor per network) rather than a file-driven
//! config loader — there is no node data directory or on-disk format at
//! this layer (§1 Non-goals).

use serde::{Deserialize, Serialize};

use crate::types::{Checkpoint, Hash256};
use crate::work::Target;

/// Which network a [`ChainParams`] describes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

/// A BIP0009-style versionbits soft-fork deployment this chain gates on.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Deployment {
    Segwit,
    Csv,
    Taproot,
}

/// Per-deployment threshold parameters (§3, §4.10).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeploymentParams {
    pub deployment: Deployment,
    /// Signalling bit within `BlockHeader::version`, 0..28.
    pub bit: u8,
    /// Median-time-past at or after which the deployment may start signalling.
    pub start_time: u32,
    /// Median-time-past at or after which an un-locked-in deployment fails.
    pub timeout: u32,
}

/// Chain-wide consensus configuration (§6). One value per network, produced
/// by a named constructor rather than deserialized from a file.
#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,

    pub genesis_hash: Hash256,

    /// Maximum permitted PoW target (minimum difficulty).
    pub pow_limit: Target,
    /// Compact encoding of `pow_limit`.
    pub pow_limit_bits: u32,
    /// Disables all retargeting (regtest): every block uses `pow_limit_bits`.
    pub pow_no_retargeting: bool,
    /// Disables the PoW hash≤target check entirely (test fixtures only).
    pub no_pow_check: bool,
    /// Dogecoin-style "allow minimum difficulty blocks" escape hatch.
    pub reduce_min_difficulty: bool,

    /// Target interval between blocks, in seconds ("T" in §4.4).
    pub target_time_per_block: u32,
    /// Legacy retarget window length, in seconds.
    pub target_timespan: u32,
    /// Legacy retarget clamp factor (`timespan / factor` .. `timespan * factor`).
    pub retarget_adjustment_factor: u32,
    /// Threshold (seconds since parent) past which `reduce_min_difficulty`
    /// returns `pow_limit_bits` unconditionally; conventionally `60 * T`.
    pub min_diff_reduction_time: u32,
    /// Height at/after which Digishield (per-block) retargeting replaces
    /// the legacy per-block-with-generic-clamps algorithm.
    pub digishield_activation_height: u32,

    pub subsidy_reduction_interval: u32,
    pub coinbase_maturity: u32,
    /// Subsidy at height 0 before any reduction (§4.9 `baseSubsidy`).
    pub base_subsidy: u64,
    /// Floor the per-block subsidy never drops below once
    /// `baseSubsidy >> (height / subsidy_reduction_interval)` would
    /// otherwise reach it (§4.9 `stableSubsidy`).
    pub stable_subsidy: u64,

    pub bip0034_height: u32,
    pub bip0065_height: u32,
    pub bip0066_height: u32,

    /// BIP94 timewarp guard (checked at the first block of each retarget window).
    pub enforce_bip94: bool,

    pub auxpow_chain_id: i32,
    /// Height at/after which AuxPoW is the only accepted proof form.
    pub auxpow_height_effective: u32,

    pub miner_confirmation_window: u32,
    pub rule_change_activation_threshold: u32,
    pub deployments: Vec<DeploymentParams>,

    pub checkpoints: Vec<Checkpoint>,
}

impl ChainParams {
    pub fn deployment(&self, which: Deployment) -> Option<&DeploymentParams> {
        self.deployments.iter().find(|d| d.deployment == which)
    }

    /// Lower clamp bound for the legacy per-block retarget: `timespan / factor`.
    pub fn min_retarget_timespan(&self) -> u32 {
        self.target_timespan / self.retarget_adjustment_factor
    }

    /// Upper clamp bound for the legacy per-block retarget: `timespan * factor`.
    pub fn max_retarget_timespan(&self) -> u32 {
        self.target_timespan * self.retarget_adjustment_factor
    }

    pub fn mainnet() -> Self {
        Self {
            network: Network::Mainnet,
            genesis_hash: crate::genesis::genesis_hash(Network::Mainnet),
            pow_limit: Target::from(2u8).pow(Target::from(224u8)) - Target::from(1u8),
            pow_limit_bits: 0x1e0f_ffff,
            pow_no_retargeting: false,
            no_pow_check: false,
            reduce_min_difficulty: false,
            target_time_per_block: 60,
            target_timespan: 4 * 60 * 60,
            retarget_adjustment_factor: 4,
            min_diff_reduction_time: 60 * 60,
            digishield_activation_height: 145_000,
            subsidy_reduction_interval: 600_000,
            coinbase_maturity: 100,
            base_subsidy: 50 * crate::constants::COIN,
            stable_subsidy: crate::constants::COIN,
            bip0034_height: 1,
            bip0065_height: 1,
            bip0066_height: 1,
            enforce_bip94: true,
            auxpow_chain_id: 0x0062,
            auxpow_height_effective: 371_337,
            miner_confirmation_window: 2016,
            rule_change_activation_threshold: 1916,
            deployments: vec![
                DeploymentParams { deployment: Deployment::Csv, bit: 0, start_time: 1_462_060_800, timeout: 1_493_596_800 },
                DeploymentParams { deployment: Deployment::Segwit, bit: 1, start_time: 1_479_168_000, timeout: 1_510_704_000 },
                DeploymentParams { deployment: Deployment::Taproot, bit: 2, start_time: 1_619_222_400, timeout: 1_628_640_000 },
            ],
            checkpoints: vec![],
        }
    }

    pub fn testnet() -> Self {
        let mut p = Self::mainnet();
        p.network = Network::Testnet;
        p.genesis_hash = crate::genesis::genesis_hash(Network::Testnet);
        p.digishield_activation_height = 0;
        p.reduce_min_difficulty = true;
        p.bip0034_height = 0;
        p.bip0065_height = 0;
        p.bip0066_height = 0;
        p.auxpow_height_effective = 0;
        p.checkpoints = vec![];
        p
    }

    /// Parameters used throughout the test scenarios in §8: digishield
    /// active from genesis, no retargeting, maximal `pow_limit` so real
    /// scrypt hashing still runs in tests but essentially never fails
    /// (§9 design notes).
    pub fn regtest() -> Self {
        let pow_limit = Target::from(2u16).pow(Target::from(255u8)) - Target::from(1u8);
        Self {
            network: Network::Regtest,
            genesis_hash: crate::genesis::genesis_hash(Network::Regtest),
            pow_limit,
            pow_limit_bits: 0x207f_ffff,
            pow_no_retargeting: true,
            no_pow_check: false,
            reduce_min_difficulty: true,
            target_time_per_block: 60,
            target_timespan: 4 * 60 * 60,
            retarget_adjustment_factor: 4,
            min_diff_reduction_time: 60 * 60,
            digishield_activation_height: 0,
            subsidy_reduction_interval: 150,
            coinbase_maturity: 100,
            base_subsidy: 50 * crate::constants::COIN,
            stable_subsidy: crate::constants::COIN,
            bip0034_height: 0,
            bip0065_height: 0,
            bip0066_height: 0,
            enforce_bip94: false,
            auxpow_chain_id: 0x0062,
            auxpow_height_effective: 0,
            miner_confirmation_window: 144,
            rule_change_activation_threshold: 108,
            deployments: vec![
                DeploymentParams { deployment: Deployment::Csv, bit: 0, start_time: 0, timeout: u32::MAX },
                DeploymentParams { deployment: Deployment::Segwit, bit: 1, start_time: 0, timeout: u32::MAX },
                DeploymentParams { deployment: Deployment::Taproot, bit: 2, start_time: 0, timeout: u32::MAX },
            ],
            checkpoints: vec![],
        }
    }
}
