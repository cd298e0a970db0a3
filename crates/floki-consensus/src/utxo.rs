//! The UTXO view and spend journal (§3, §4.7): an owned outpoint→entry map
//! anchored to a `bestHash`, plus the per-transaction undo journal that
//! makes [`UtxoView::connect_transaction`] reversible.
//!
//! An owned map plus a record of exactly what was removed, reversed in
//! [`UtxoView::disconnect_transaction`]. Persistence is a separate concern
//! (§6 Database) — the façade periodically drains a view into a
//! [`floki_core::traits::WriteBatch`] for a [`floki_core::traits::BlockStore`]
//! to commit; the view itself holds the working set in memory.

use std::collections::HashMap;

use floki_core::types::{Hash256, OutPoint, SpentTxOut, Transaction, UtxoEntry, UtxoFlags};

/// A provably-unspendable output (e.g. `OP_RETURN`) is never added to the
/// UTXO set, matching real nodes' bookkeeping shortcut of not tracking
/// outputs nobody could ever spend.
fn is_provably_unspendable(script: &floki_core::types::Script) -> bool {
    matches!(script.as_bytes().first(), Some(0x6a))
}

/// A working UTXO set: the set of currently-unspent outputs, anchored to
/// the hash of the block it was last advanced to.
#[derive(Default)]
pub struct UtxoView {
    entries: HashMap<OutPoint, UtxoEntry>,
    best_hash: Hash256,
}

impl UtxoView {
    pub fn new(best_hash: Hash256) -> Self {
        Self { entries: HashMap::new(), best_hash }
    }

    pub fn best_hash(&self) -> Hash256 {
        self.best_hash
    }

    pub fn set_best_hash(&mut self, hash: Hash256) {
        self.best_hash = hash;
    }

    pub fn lookup(&self, outpoint: &OutPoint) -> Option<&UtxoEntry> {
        self.entries.get(outpoint)
    }

    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.entries.contains_key(outpoint)
    }

    /// Seed an entry directly — used when loading the view from a
    /// persisted snapshot rather than building it up via
    /// [`Self::connect_transaction`].
    pub fn insert(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        self.entries.insert(outpoint, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn spend(&mut self, outpoint: &OutPoint) -> Option<UtxoEntry> {
        self.entries.remove(outpoint)
    }

    fn create(&mut self, outpoint: OutPoint, entry: UtxoEntry) {
        if !is_provably_unspendable(&entry.script_pubkey) {
            self.entries.insert(outpoint, entry);
        }
    }

    /// Apply one transaction's spends and outputs, appending every entry
    /// removed to `journal` in spend order so
    /// [`Self::disconnect_transaction`] can restore it later. Coinbase
    /// transactions have no real inputs to spend.
    pub fn connect_transaction(&mut self, tx: &Transaction, height: u32, journal: &mut Vec<SpentTxOut>) {
        if !tx.is_coinbase() {
            for input in &tx.inputs {
                if let Some(spent) = self.spend(&input.previous_output) {
                    journal.push(SpentTxOut::from(&spent));
                }
            }
        }

        let txid = tx.txid();
        let is_coinbase = tx.is_coinbase();
        for (vout, out) in tx.outputs.iter().enumerate() {
            let mut flags = UtxoFlags::NONE;
            if is_coinbase {
                flags.insert(UtxoFlags::IS_COINBASE);
            }
            let entry = UtxoEntry { value: out.value, script_pubkey: out.script_pubkey.clone(), height, flags };
            self.create(OutPoint { txid, vout: vout as u32 }, entry);
        }
    }

    /// Reverse [`Self::connect_transaction`]: drop this transaction's
    /// outputs and restore its spent inputs, popping `journal` in reverse
    /// (last-spent-first) order to match how it was pushed.
    pub fn disconnect_transaction(&mut self, tx: &Transaction, journal: &mut Vec<SpentTxOut>) {
        let txid = tx.txid();
        for vout in 0..tx.outputs.len() {
            self.entries.remove(&OutPoint { txid, vout: vout as u32 });
        }

        if !tx.is_coinbase() {
            for input in tx.inputs.iter().rev() {
                if let Some(spent) = journal.pop() {
                    let flags = if spent.is_coinbase { UtxoFlags::IS_COINBASE } else { UtxoFlags::NONE };
                    let entry = UtxoEntry {
                        value: spent.value,
                        script_pubkey: spent.script_pubkey,
                        height: spent.height,
                        flags,
                    };
                    self.entries.insert(input.previous_output.clone(), entry);
                }
            }
        }
    }

    /// Everything currently in the view, as puts for a
    /// [`floki_core::traits::WriteBatch`]. Intended for an initial full
    /// snapshot write; incremental commits should instead track per-block
    /// deltas at the call site so unrelated unspent outputs are not
    /// rewritten on every block.
    pub fn to_write_batch(&self) -> floki_core::traits::WriteBatch {
        floki_core::traits::WriteBatch {
            puts: self.entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            deletes: Vec::new(),
            new_best_hash: Some(self.best_hash),
        }
    }
}
