//! Core wire/data-model types (§3): outpoints, scripts, transactions,
//! headers, blocks, and the UTXO/spend-journal entries the consensus core
//! reads and writes.
//!
//! Monetary values are `i64` satoshi-equivalent subunits, matching the
//! signed-value convention of the Bitcoin family so that fee arithmetic
//! (`inputs - outputs`) never needs an unsigned-subtraction guard at the
//! call site; range checks against [`crate::constants::MAX_SUPPLY`] still
//! reject negative values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{SEQUENCE_LOCKTIME_DISABLE_FLAG, SEQUENCE_LOCKTIME_TYPE_FLAG};
use crate::hash::double_sha256;

/// A 32-byte hash value: txids, header hashes, merkle roots.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Byte-reversed copy, matching the convention of displaying Bitcoin-family
    /// hashes most-significant-byte-first even though they are computed and
    /// compared as little-endian integers internally.
    pub fn reversed(&self) -> Self {
        let mut out = self.0;
        out.reverse();
        Self(out)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.reversed().0))
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for Hash256 {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// An opaque, un-interpreted script (signature script or script-pubkey).
///
/// The consensus core never executes scripts itself (§6: delegated to the
/// external [`crate::traits::ScriptEngine`]); it only inspects bytes for the
/// structural checks in §4.8/§4.9 (coarse sig-op counting, BIP0034 coinbase
/// height, the witness-commitment prefix).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if this script is exactly the BIP0141 witness-commitment output
    /// script: `OP_RETURN push-36 <4-byte magic> <32-byte hash>`.
    pub fn is_witness_commitment(&self) -> bool {
        self.0.len() == 38 && self.0[0..6] == crate::constants::WITNESS_COMMITMENT_HEADER
    }

    /// Extract the 32-byte commitment hash from a witness-commitment script,
    /// if this script is one (see [`Self::is_witness_commitment`]).
    pub fn witness_commitment_hash(&self) -> Option<Hash256> {
        if !self.is_witness_commitment() {
            return None;
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&self.0[6..38]);
        Some(Hash256(bytes))
    }

    /// True if this is a P2SH script-pubkey: `OP_HASH160 push-20 <20 bytes> OP_EQUAL`.
    pub fn is_p2sh(&self) -> bool {
        self.0.len() == 23 && self.0[0] == 0xa9 && self.0[1] == 0x14 && self.0[22] == 0x87
    }

    /// True if this is a P2WSH/P2WPKH-style segwit output script: a single
    /// push of the witness version followed by a 2-to-40-byte push.
    pub fn is_witness_program(&self) -> bool {
        matches!(self.0.first(), Some(0x00..=0x60))
            && self.0.len() >= 4
            && self.0.len() <= 42
            && (self.0[1] as usize) == self.0.len() - 2
    }
}

/// Reference to a specific output of a previous transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash,
    bincode::Encode, bincode::Decode,
)]
pub struct OutPoint {
    pub txid: Hash256,
    pub vout: u32,
}

impl OutPoint {
    /// The null outpoint used by coinbase inputs: all-zero hash, index 2^32-1.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            vout: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid.is_zero() && self.vout == u32::MAX
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// A transaction input.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub signature_script: Script,
    /// BIP0068 relative-locktime / RBF sequence number.
    pub sequence: u32,
    /// Segwit witness stack; empty for a non-witness input. Never included
    /// in the stripped (txid) serialization, only in the wtxid one.
    pub witness: Vec<Vec<u8>>,
}

impl TxIn {
    /// True if the BIP0068 disable bit (bit 31) is set: this input's
    /// sequence number carries no relative-locktime meaning.
    pub fn sequence_lock_disabled(&self) -> bool {
        self.sequence & SEQUENCE_LOCKTIME_DISABLE_FLAG != 0
    }

    /// True if the relative lock is denominated in 512-second units rather
    /// than blocks (BIP0068 bit 22).
    pub fn sequence_lock_is_time(&self) -> bool {
        self.sequence & SEQUENCE_LOCKTIME_TYPE_FLAG != 0
    }
}

/// A transaction output.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct TxOut {
    /// Value in the smallest unit; signed so fee arithmetic never underflows.
    pub value: i64,
    pub script_pubkey: Script,
}

/// A transaction transferring value between outpoints.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// True if this is a coinbase: exactly one input with the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// True if any input carries a non-empty witness stack.
    pub fn has_witness(&self) -> bool {
        self.inputs.iter().any(|i| !i.witness.is_empty())
    }

    /// Stripped (non-witness) wire serialization, used for the txid hash,
    /// merkle leaves, and `SerializeSizeStripped`.
    pub fn serialize_stripped(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(input.previous_output.txid.as_bytes());
            out.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_varint(&mut out, input.signature_script.len() as u64);
            out.extend_from_slice(input.signature_script.as_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut out, output.script_pubkey.len() as u64);
            out.extend_from_slice(output.script_pubkey.as_bytes());
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Full wire serialization including the witness stacks, used for the
    /// wtxid hash and total (non-stripped) size.
    pub fn serialize_full(&self) -> Vec<u8> {
        if !self.has_witness() {
            return self.serialize_stripped();
        }
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.push(0x00); // segwit marker
        out.push(0x01); // segwit flag
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(input.previous_output.txid.as_bytes());
            out.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_varint(&mut out, input.signature_script.len() as u64);
            out.extend_from_slice(input.signature_script.as_bytes());
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            write_varint(&mut out, output.script_pubkey.len() as u64);
            out.extend_from_slice(output.script_pubkey.as_bytes());
        }
        for input in &self.inputs {
            write_varint(&mut out, input.witness.len() as u64);
            for item in &input.witness {
                write_varint(&mut out, item.len() as u64);
                out.extend_from_slice(item);
            }
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Transaction id: double-SHA256 of the stripped serialization.
    pub fn txid(&self) -> Hash256 {
        double_sha256(&self.serialize_stripped())
    }

    /// Witness transaction id: double-SHA256 of the full serialization. By
    /// convention (§4.2) the coinbase's wtxid is always the zero hash.
    pub fn wtxid(&self) -> Hash256 {
        if self.is_coinbase() {
            return Hash256::ZERO;
        }
        double_sha256(&self.serialize_full())
    }

    /// Sum of output values; `None` on overflow.
    pub fn total_output_value(&self) -> Option<i64> {
        self.outputs
            .iter()
            .try_fold(0i64, |acc, out| acc.checked_add(out.value))
    }

    /// Legacy (coarse) signature-operation count over this transaction's
    /// input signature scripts and output scripts, per §4.8's opcode-level
    /// rule: `OP_CHECKSIG`/`OP_CHECKSIGVERIFY` count 1, and
    /// `OP_CHECKMULTISIG`/`OP_CHECKMULTISIGVERIFY` count 20 unless
    /// immediately preceded by a small-integer push (`OP_1`..`OP_16`), in
    /// which case that count is used instead.
    pub fn legacy_sig_op_count(&self) -> u64 {
        let mut total = 0u64;
        for input in &self.inputs {
            total += count_sig_ops(input.signature_script.as_bytes());
        }
        for output in &self.outputs {
            total += count_sig_ops(output.script_pubkey.as_bytes());
        }
        total
    }
}

const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSIGVERIFY: u8 = 0xad;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
const OP_1: u8 = 0x51;
const OP_16: u8 = 0x60;

fn count_sig_ops(script: &[u8]) -> u64 {
    let mut total = 0u64;
    let mut last_small_int: Option<u64> = None;
    let mut i = 0usize;
    while i < script.len() {
        let op = script[i];
        match op {
            OP_CHECKSIG | OP_CHECKSIGVERIFY => {
                total += 1;
                last_small_int = None;
                i += 1;
            }
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => {
                total += last_small_int.unwrap_or(20);
                last_small_int = None;
                i += 1;
            }
            OP_1..=OP_16 => {
                last_small_int = Some((op - OP_1 + 1) as u64);
                i += 1;
            }
            0x01..=0x4b => {
                // Direct push of 1..75 bytes: skip the payload.
                last_small_int = None;
                i += 1 + op as usize;
            }
            _ => {
                last_small_int = None;
                i += 1;
            }
        }
    }
    total
}

/// 80-byte base block header. The high bits of `version` carry the AuxPoW
/// presence flag and chain-id (§3); the optional [`AuxPowHeader`] payload is
/// appended out-of-band rather than embedded in this struct so that the
/// 80-byte base can always be serialized/hashed independently of it.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_hash: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    /// Fixed wire size of the base header.
    pub const SIZE: usize = 80;

    /// Serialize the 80-byte base header (version, prev-hash, merkle-root,
    /// timestamp, bits, nonce, all little-endian).
    pub fn serialize_base(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(self.prev_hash.as_bytes());
        out[36..68].copy_from_slice(self.merkle_root.as_bytes());
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// The header's identity hash: double-SHA256 of the 80-byte base,
    /// independent of any AuxPoW payload.
    pub fn hash(&self) -> Hash256 {
        double_sha256(&self.serialize_base())
    }

    /// True if the AuxPoW presence bit (bit 8 of `version`) is set.
    pub fn has_aux_pow(&self) -> bool {
        self.version & crate::constants::VERSION_AUXPOW_BIT != 0
    }

    /// The merged-mining chain-id carried in bits 16..21 of `version`.
    pub fn chain_id(&self) -> i32 {
        (self.version & crate::constants::VERSION_CHAIN_ID_MASK)
            >> crate::constants::VERSION_CHAIN_ID_SHIFT
    }
}

/// A merkle branch: sibling hashes from a leaf up to a root, paired with a
/// side-mask whose bit `i` says whether sibling `i` sits to the left (1) or
/// right (0) of the running hash at that level.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct MerkleBranch {
    pub hashes: Vec<Hash256>,
    pub side_mask: u32,
}

impl MerkleBranch {
    /// Walk this branch from `leaf` to the implied root.
    pub fn apply(&self, leaf: Hash256) -> Hash256 {
        let mut current = leaf;
        for (i, sibling) in self.hashes.iter().enumerate() {
            let bit = (self.side_mask >> i) & 1;
            current = if bit == 1 {
                merkle_pair(sibling, &current)
            } else {
                merkle_pair(&current, sibling)
            };
        }
        current
    }
}

fn merkle_pair(left: &Hash256, right: &Hash256) -> Hash256 {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(left.as_bytes());
    buf.extend_from_slice(right.as_bytes());
    double_sha256(&buf)
}

/// Merged-mining proof (§3, §4.3, §6): a parent-chain block that commits to
/// this chain's header via its coinbase transaction.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct AuxPowHeader {
    pub coinbase_tx: Transaction,
    pub parent_hash: Hash256,
    pub coinbase_branch: MerkleBranch,
    pub blockchain_branch: MerkleBranch,
    pub parent_header: BlockHeader,
}

/// A complete block: header, optional AuxPoW proof, and transactions.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Block {
    pub header: BlockHeader,
    pub aux_pow: Option<AuxPowHeader>,
    pub transactions: Vec<Transaction>,
}

impl Block {
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Stripped (non-witness) transaction ids, in block order.
    pub fn txids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::txid).collect()
    }

    /// Full witness transaction ids, in block order, coinbase forced to zero.
    pub fn wtxids(&self) -> Vec<Hash256> {
        self.transactions.iter().map(Transaction::wtxid).collect()
    }

    /// Size of the block if witness data were stripped from every
    /// transaction: sum of each `serialize_stripped` length plus the base
    /// header and a transaction-count varint.
    pub fn serialize_size_stripped(&self) -> usize {
        let mut size = BlockHeader::SIZE;
        size += varint_size(self.transactions.len() as u64);
        for tx in &self.transactions {
            size += tx.serialize_stripped().len();
        }
        size
    }

    /// Full serialized size including witness data.
    pub fn serialize_size_full(&self) -> usize {
        let mut size = BlockHeader::SIZE;
        size += varint_size(self.transactions.len() as u64);
        for tx in &self.transactions {
            size += tx.serialize_full().len();
        }
        size
    }

    /// BIP0141 block weight: `3 * stripped_size + full_size`.
    pub fn weight(&self) -> u64 {
        3 * self.serialize_size_stripped() as u64 + self.serialize_size_full() as u64
    }
}

fn write_varint(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

fn varint_size(n: u64) -> usize {
    if n < 0xfd {
        1
    } else if n <= 0xffff {
        3
    } else if n <= 0xffff_ffff {
        5
    } else {
        9
    }
}

/// Minimal bitflags-style newtype generator, avoiding a dependency on the
/// `bitflags` crate for the handful of status bitsets this crate needs
/// ([`UtxoFlags`] here; an equivalent bitset lives in
/// `floki-consensus::index` for block-index node status).
macro_rules! bitflags_like {
    (
        $(#[$meta:meta])*
        pub struct $name:ident: $ty:ty {
            $(const $variant:ident = $value:expr;)*
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
            bincode::Encode, bincode::Decode,
        )]
        pub struct $name(pub $ty);

        impl $name {
            $(pub const $variant: Self = Self($value);)*

            pub const NONE: Self = Self(0);

            pub fn contains(&self, other: Self) -> bool {
                self.0 & other.0 == other.0
            }

            pub fn insert(&mut self, other: Self) {
                self.0 |= other.0;
            }

            pub fn remove(&mut self, other: Self) {
                self.0 &= !other.0;
            }
        }

        impl std::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }
    };
}

bitflags_like! {
    /// Status bits for a [`UtxoEntry`] (§3).
    pub struct UtxoFlags: u8 {
        const IS_COINBASE = 0b0001;
        const IS_SPENT    = 0b0010;
        const DIRTY       = 0b0100;
        const FRESH       = 0b1000;
    }
}

/// An unspent output as tracked by [`crate::traits::BlockStore`] / the UTXO
/// view (§3, §4.7).
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct UtxoEntry {
    pub value: i64,
    pub script_pubkey: Script,
    pub height: u32,
    pub flags: UtxoFlags,
}

impl UtxoEntry {
    pub fn is_coinbase(&self) -> bool {
        self.flags.contains(UtxoFlags::IS_COINBASE)
    }

    pub fn is_spent(&self) -> bool {
        self.flags.contains(UtxoFlags::IS_SPENT)
    }

    pub fn is_mature(&self, spend_height: u32, coinbase_maturity: u32) -> bool {
        if !self.is_coinbase() {
            return true;
        }
        spend_height.saturating_sub(self.height) >= coinbase_maturity
    }
}

/// A spend-journal entry (§3, §4.7): enough to reconstruct the [`UtxoEntry`]
/// that a `disconnectTransaction` call restores.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SpentTxOut {
    pub value: i64,
    pub script_pubkey: Script,
    pub height: u32,
    pub is_coinbase: bool,
}

impl From<&UtxoEntry> for SpentTxOut {
    fn from(entry: &UtxoEntry) -> Self {
        Self {
            value: entry.value,
            script_pubkey: entry.script_pubkey.clone(),
            height: entry.height,
            is_coinbase: entry.is_coinbase(),
        }
    }
}

/// A hard-coded (height, hash) checkpoint (§3, §4.11).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: Hash256,
}
