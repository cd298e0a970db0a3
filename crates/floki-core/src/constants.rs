//! Protocol-wide constants that do not vary per network.
//!
//! Per-network tunables (genesis, pow limit, retarget parameters,
//! checkpoints, deployments) live in [`crate::params::ChainParams`] instead,
//! since those differ between mainnet/testnet/regtest.

/// Coin denomination: 1 FLC = 10^8 base units.
pub const COIN: u64 = 100_000_000;

/// Absolute monetary ceiling; no output or running sum may exceed this.
pub const MAX_SUPPLY: u64 = 21_000_000_000 * COIN;

/// `OP_RETURN` witness commitment header bytes (BIP0141): `OP_RETURN`
/// (0x6a), push-36 (0x24), then the 4-byte magic `aa 21 a9 ed`.
pub const WITNESS_COMMITMENT_HEADER: [u8; 6] = [0x6a, 0x24, 0xaa, 0x21, 0xa9, 0xed];

/// Merged-mining tag placed immediately before the aux-root in the parent
/// coinbase script: `FA BE 'm' 'm'`.
pub const AUXPOW_MAGIC: [u8; 4] = [0xfa, 0xbe, b'm', b'm'];

/// Number of bytes from the start of the coinbase script within which the
/// aux-root may appear without an immediately preceding [`AUXPOW_MAGIC`].
pub const AUXPOW_CHAIN_MERKLE_SEARCH_WINDOW: usize = 20;

/// Maximum merkle branch depth for AuxPoW coinbase/blockchain branches.
pub const AUXPOW_MAX_BRANCH_DEPTH: usize = 30;

/// Multiplier and increment for the twice-applied LCG used to compute the
/// expected AuxPoW side-mask index.
pub const AUXPOW_LCG_MULTIPLIER: u32 = 1_103_515_245;
pub const AUXPOW_LCG_INCREMENT: u32 = 12_345;

/// BIP0141 weight scale factor: witness bytes count for 1, non-witness for 4.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// Legacy + P2SH + witness signature operation budget per block, scaled by
/// [`WITNESS_SCALE_FACTOR`].
pub const MAX_BLOCK_SIGOPS_COST: u64 = 80_000;

/// Maximum serialized block weight (BIP0141): `3 * stripped_size + total_size`.
pub const MAX_BLOCK_WEIGHT: u64 = 4_000_000;

/// Maximum stripped (non-witness) block serialization size.
pub const MAX_BLOCK_BASE_SIZE: usize = 1_000_000;

/// Window over which median-time-past is computed (BIP0113).
pub const MEDIAN_TIME_SPAN: usize = 11;

/// Maximum permitted clock skew for `TimeTooNew` (seconds).
pub const MAX_FUTURE_BLOCK_TIME: u64 = 2 * 60 * 60;

/// Coinbase signature-script length bounds (bytes).
pub const MIN_COINBASE_SCRIPT_LEN: usize = 2;
pub const MAX_COINBASE_SCRIPT_LEN: usize = 100;

/// Relative-locktime disable bit (BIP0068).
pub const SEQUENCE_LOCKTIME_DISABLE_FLAG: u32 = 1 << 31;
/// Relative-locktime type flag: set means the field is a time span in units
/// of 512 seconds, clear means a block-height span.
pub const SEQUENCE_LOCKTIME_TYPE_FLAG: u32 = 1 << 22;
/// Mask over the low bits carrying the height or time span.
pub const SEQUENCE_LOCKTIME_MASK: u32 = 0x0000_ffff;
/// Granularity of the relative-time lock, in seconds.
pub const SEQUENCE_LOCKTIME_GRANULARITY: u32 = 9; // 512 seconds == 1 << 9

/// Header version bit marking AuxPoW presence (bit 8).
pub const VERSION_AUXPOW_BIT: i32 = 1 << 8;
/// Mask over the chain-id bits (16..21) of the header version.
pub const VERSION_CHAIN_ID_MASK: i32 = 0x003f_0000;
pub const VERSION_CHAIN_ID_SHIFT: u32 = 16;

/// BIP0009/versionbits top bits marking a signalling bit as a deployment bit.
pub const VERSIONBITS_TOP_BITS: i32 = 0x2000_0000;
pub const VERSIONBITS_TOP_MASK: i32 = 0xe000_0000u32 as i32;
pub const VERSIONBITS_NUM_BITS: u32 = 29;

/// nLockTime threshold distinguishing block-height locktimes from unix-time
/// locktimes (BIP0065).
pub const LOCKTIME_THRESHOLD: u32 = 500_000_000;

/// The two blocks grandfathered out of the BIP0030 duplicate-transaction
/// check (mainnet heights with genuine historical hash collisions).
pub const BIP30_EXEMPT_HEIGHTS: [u64; 2] = [91_842, 91_880];
