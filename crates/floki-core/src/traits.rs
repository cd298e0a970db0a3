//! Collaborator trait boundaries (§6).
//!
//! The consensus core treats four subsystems as pure-interface
//! collaborators it never implements itself: the script interpreter, the
//! block/header database, the wall-clock/adjusted-time source, and (for
//! tests) a source of scrypt PoW hashes that can be swapped for a
//! stub so unit tests are not paying real scrypt CPU cost (§9 design
//! notes). Each trait here is the seam; `floki-consensus` depends only on
//! these, never on a concrete backend.

use crate::error::{ConsensusError, TxRuleError};
use crate::types::{Block, BlockHeader, Hash256, Script};

/// Script verification flags (§4.8), derived by the caller from deployment
/// state and passed down per-input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScriptFlags {
    /// BIP0016: P2SH evaluation of the redeem script.
    pub bip16: bool,
    /// BIP0066: strict DER signature encoding.
    pub der_signatures: bool,
    /// BIP0065: `OP_CHECKLOCKTIMEVERIFY`.
    pub check_lock_time_verify: bool,
    /// BIP0112: `OP_CHECKSEQUENCEVERIFY`.
    pub check_sequence_verify: bool,
    /// BIP0141: witness program evaluation.
    pub witness: bool,
    /// Strict DER + low-S + non-null-dummy enforcement in multisig.
    pub strict_multisig: bool,
    /// BIP0341/0342: taproot / tapscript evaluation.
    pub taproot: bool,
}

/// The external script interpreter (§6): a pure function of its inputs,
/// safe to invoke concurrently across a worker pool (§5).
///
/// `floki-consensus` never executes scripts itself; every contextual
/// transaction check that needs script evaluation calls through this trait
/// so that implementations (the real interpreter, or a permissive stub in
/// tests) are interchangeable.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait ScriptEngine: Send + Sync {
    /// Verify one input's signature script against the script-pubkey of the
    /// output it spends, with its witness stack (empty for non-segwit
    /// inputs) and the amount being spent (needed for BIP0143 sighash).
    fn verify(
        &self,
        script_sig: &Script,
        script_pubkey: &Script,
        witness: &[Vec<u8>],
        amount: i64,
        flags: ScriptFlags,
    ) -> Result<(), TxRuleError>;
}

/// A permissive stand-in for [`ScriptEngine`] that accepts every input.
///
/// Used in consensus tests that are exercising chain-selection, difficulty,
/// or UTXO bookkeeping rather than script semantics — the real interpreter
/// is out of scope for this crate (§1) and is referenced only at this
/// boundary.
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptAllScriptEngine;

impl ScriptEngine for AcceptAllScriptEngine {
    fn verify(
        &self,
        _script_sig: &Script,
        _script_pubkey: &Script,
        _witness: &[Vec<u8>],
        _amount: i64,
        _flags: ScriptFlags,
    ) -> Result<(), TxRuleError> {
        Ok(())
    }
}

/// Source of the "adjusted time" used by the `TimeTooNew` check (§4.3):
/// the node's view of network time, typically the local clock offset by a
/// median of peer time samples. The consensus core only ever reads it.
pub trait TimeSource: Send + Sync {
    /// Current adjusted time, Unix seconds.
    fn adjusted_time(&self) -> u32;
}

/// [`TimeSource`] backed by the system clock, with no peer adjustment.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn adjusted_time(&self) -> u32 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0)
    }
}

/// A fixed clock for deterministic tests.
#[derive(Clone, Copy, Debug)]
pub struct FixedTimeSource(pub u32);

impl TimeSource for FixedTimeSource {
    fn adjusted_time(&self) -> u32 {
        self.0
    }
}

/// One atomic write grouping UTXO mutations with the best-hash update
/// (§6 Database: "atomic write batches grouping UTXO mutations and
/// best-hash update").
#[derive(Clone, Debug, Default)]
pub struct WriteBatch {
    pub puts: Vec<(crate::types::OutPoint, crate::types::UtxoEntry)>,
    pub deletes: Vec<crate::types::OutPoint>,
    pub new_best_hash: Option<Hash256>,
}

/// The block/header database collaborator (§6): stores block bodies by
/// hash, the latest committed best-hash, and commits UTXO write batches
/// atomically with that best-hash update.
///
/// Implementations are responsible for crash recovery: on restart, compare
/// the durable best-hash against the in-memory chain's expectation and
/// replay `connectBlock` from the last consistent snapshot if they differ
/// (§5, §6). The consensus core only requires that a committed `write`
/// call either fully lands or is fully absent after a crash.
pub trait BlockStore: Send + Sync {
    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ConsensusError>;

    fn put_block(&mut self, hash: Hash256, block: Block) -> Result<(), ConsensusError>;

    fn get_header(&self, hash: &Hash256) -> Result<Option<BlockHeader>, ConsensusError>;

    /// The best-hash last durably committed by [`Self::write_batch`].
    fn best_hash(&self) -> Hash256;

    /// Atomically apply a UTXO write batch and advance the durable
    /// best-hash, or neither.
    fn write_batch(&mut self, batch: WriteBatch) -> Result<(), ConsensusError>;
}

/// In-memory [`BlockStore`] for tests: no persistence, no crash recovery.
#[derive(Default)]
pub struct MemoryBlockStore {
    blocks: std::collections::HashMap<Hash256, Block>,
    utxos: std::collections::HashMap<crate::types::OutPoint, crate::types::UtxoEntry>,
    best_hash: Hash256,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_utxo(&self, outpoint: &crate::types::OutPoint) -> Option<&crate::types::UtxoEntry> {
        self.utxos.get(outpoint)
    }
}

impl BlockStore for MemoryBlockStore {
    fn get_block(&self, hash: &Hash256) -> Result<Option<Block>, ConsensusError> {
        Ok(self.blocks.get(hash).cloned())
    }

    fn put_block(&mut self, hash: Hash256, block: Block) -> Result<(), ConsensusError> {
        self.blocks.insert(hash, block);
        Ok(())
    }

    fn get_header(&self, hash: &Hash256) -> Result<Option<BlockHeader>, ConsensusError> {
        Ok(self.blocks.get(hash).map(|b| b.header.clone()))
    }

    fn best_hash(&self) -> Hash256 {
        self.best_hash
    }

    fn write_batch(&mut self, batch: WriteBatch) -> Result<(), ConsensusError> {
        for outpoint in batch.deletes {
            self.utxos.remove(&outpoint);
        }
        for (outpoint, entry) in batch.puts {
            self.utxos.insert(outpoint, entry);
        }
        if let Some(hash) = batch.new_best_hash {
            self.best_hash = hash;
        }
        Ok(())
    }
}
