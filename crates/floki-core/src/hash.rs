//! Hash primitives (C2): double-SHA256 and the scrypt proof-of-work hash.
//!
//! Merkle-tree hashing lives in [`crate::merkle`]; this module holds the two
//! primitives every header and transaction hash is built from.

use scrypt::Params as ScryptParams;
use sha2::{Digest, Sha256};

use crate::types::Hash256;

/// Double-SHA256 of an arbitrary byte string: `SHA256(SHA256(data))`.
///
/// Bitcoin-family chains use this for txids, header hashes, and the
/// non-witness merkle leaves.
pub fn double_sha256(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    Hash256(second.into())
}

/// Scrypt parameters used for the PoW hash: `N=1024, r=1, p=1`, matching the
/// Litecoin/Dogecoin-family scrypt(1024,1,1) proof-of-work function.
fn pow_params() -> ScryptParams {
    ScryptParams::new(10, 1, 1, 32).expect("static scrypt params are valid")
}

/// Compute the scrypt proof-of-work hash of an 80-byte block header.
///
/// This is the hash compared against the header's target, distinct from the
/// double-SHA256 identity hash used for `prev_hash` linkage and the block
/// index lookup key.
pub fn scrypt_pow_hash(header_bytes: &[u8]) -> Hash256 {
    let mut out = [0u8; 32];
    scrypt::scrypt(header_bytes, header_bytes, &pow_params(), &mut out)
        .expect("scrypt output buffer has the requested length");
    // scrypt's digest is produced little-endian relative to how PoW targets
    // are compared (as a big integer read from a little-endian byte string),
    // so no additional reversal is needed: callers compare via
    // `U256::from_little_endian(&hash.0)`.
    Hash256(out)
}
