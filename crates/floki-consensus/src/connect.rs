//! Block structural sanity and the connect/disconnect pair (§4.6, §4.9): the
//! operations that take a fully-materialized [`Block`] from "known header,
//! unvalidated body" to "applied to the UTXO view" and back.
//!
//! [`check_block_sanity`] is context-free (no index, no view) and belongs
//! next to [`crate::header::check_header_sanity`] in spirit, checking the
//! block-wide structural invariants `checkTxSanity` cannot: exactly one
//! coinbase in position zero, no duplicate transaction ids, and a merkle
//! root that actually commits to the transaction list. [`connect_block`]
//! and [`disconnect_block`] are the contextual half, grounded on the
//! teacher's `ChainStore::connect_block`/`disconnect_tip` pattern of
//! spend-then-create plus an undo journal, generalized here to the full
//! rule set: BIP0030, sig-op budget, per-input script verification gated on
//! being past the last checkpoint, BIP0068 sequence locks, the coinbase
//! value ceiling, and the BIP0141 witness commitment.

use std::collections::HashSet;

use floki_core::constants::{BIP30_EXEMPT_HEIGHTS, MAX_BLOCK_BASE_SIZE, MAX_BLOCK_SIGOPS_COST, MAX_BLOCK_WEIGHT};
use floki_core::error::{BlockRuleError, ConsensusError, TxRuleError};
use floki_core::merkle;
use floki_core::params::ChainParams;
use floki_core::traits::ScriptEngine;
use floki_core::types::{Block, BlockHeader, SpentTxOut, Transaction};

use crate::index::{BlockIndex, NodeId};
use crate::txvalidate;
use crate::utxo::UtxoView;

/// Context-free block structure checks (§4.6): non-empty transaction list
/// with exactly one coinbase in position zero, no duplicate transaction
/// ids, a merkle root that commits to `block.txids()`, the stripped size
/// limit, and `checkTxSanity` on every transaction.
pub fn check_block_sanity(block: &Block) -> Result<(), ConsensusError> {
    if block.transactions.is_empty() {
        return Err(BlockRuleError::NoTransactions.into());
    }
    if !block.transactions[0].is_coinbase() {
        return Err(BlockRuleError::FirstTxNotCoinbase.into());
    }
    if block.transactions[1..].iter().any(Transaction::is_coinbase) {
        return Err(BlockRuleError::MultipleCoinbases.into());
    }

    let size = block.serialize_size_stripped();
    if size > MAX_BLOCK_BASE_SIZE {
        return Err(BlockRuleError::BlockTooBig { size, max: MAX_BLOCK_BASE_SIZE }.into());
    }

    let txids = block.txids();
    let mut seen = HashSet::with_capacity(txids.len());
    for txid in &txids {
        if !seen.insert(*txid) {
            return Err(BlockRuleError::DuplicateTx(txid.to_string()).into());
        }
    }

    if merkle::block_merkle_root(&txids) != block.header.merkle_root {
        return Err(BlockRuleError::BadMerkleRoot.into());
    }

    for (i, tx) in block.transactions.iter().enumerate() {
        txvalidate::check_tx_sanity(tx, i == 0).map_err(|e| BlockRuleError::Transaction { index: i, source: e })?;
    }
    Ok(())
}

/// BIP0034/0065/0066 version gating: a header claiming a height at or past
/// one of these activations must carry at least the version number that
/// activation requires. Lives here rather than in [`crate::difficulty`]
/// since it needs only the candidate's own height and version, not the
/// retarget machinery.
pub fn check_block_version(header: &BlockHeader, height: u32, params: &ChainParams) -> Result<(), ConsensusError> {
    if height >= params.bip0034_height && header.version < 2 {
        return Err(BlockRuleError::BlockVersionTooOld(header.version).into());
    }
    if height >= params.bip0066_height && header.version < 3 {
        return Err(BlockRuleError::BlockVersionTooOld(header.version).into());
    }
    if height >= params.bip0065_height && header.version < 4 {
        return Err(BlockRuleError::BlockVersionTooOld(header.version).into());
    }
    Ok(())
}

fn check_witness_commitment(block: &Block) -> Result<(), ConsensusError> {
    let coinbase = block.coinbase().ok_or(BlockRuleError::NoTransactions)?;
    let witness_root = merkle::witness_merkle_root(&block.wtxids());
    let reserved = coinbase.inputs.first().and_then(|i| i.witness.first().cloned()).unwrap_or_else(|| vec![0u8; 32]);
    let mut preimage = Vec::with_capacity(64);
    preimage.extend_from_slice(witness_root.as_bytes());
    preimage.extend_from_slice(&reserved);
    let expected = floki_core::hash::double_sha256(&preimage);

    let found = coinbase.outputs.iter().rev().find_map(|o| o.script_pubkey.witness_commitment_hash());
    match found {
        Some(h) if h == expected => Ok(()),
        _ => Err(BlockRuleError::BadWitnessCommitment.into()),
    }
}

/// Apply `block` (already indexed as `node`) to `view`, in place (§4.9
/// `connectBlock`).
///
/// `segwit_active`/`csv_active`/`taproot_active` are the caller's already
/// resolved [`crate::deployment`] states for `node`'s height;
/// `past_last_checkpoint` gates script verification the same way a real
/// node skips re-verifying signatures buried under a checkpoint (§4.11) —
/// every other rule in this function always applies.
#[allow(clippy::too_many_arguments)]
pub fn connect_block(
    index: &BlockIndex,
    node: NodeId,
    block: &Block,
    view: &mut UtxoView,
    journal: &mut Vec<SpentTxOut>,
    params: &ChainParams,
    script_engine: &dyn ScriptEngine,
    segwit_active: bool,
    csv_active: bool,
    taproot_active: bool,
    past_last_checkpoint: bool,
) -> Result<(), ConsensusError> {
    let this = index.get(node);
    let height = this.height;
    let parent_id = this
        .parent
        .ok_or_else(|| ConsensusError::Internal("connect_block called on the genesis node".into()))?;

    if view.best_hash() != this.header.prev_hash {
        return Err(floki_core::error::ChainError::PrevBlockNotBest.into());
    }

    if height < params.bip0034_height && !BIP30_EXEMPT_HEIGHTS.contains(&(height as u64)) {
        for tx in &block.transactions {
            let txid = tx.txid();
            for vout in 0..tx.outputs.len() {
                if view.contains(&floki_core::types::OutPoint { txid, vout: vout as u32 }) {
                    return Err(BlockRuleError::DuplicateTx(txid.to_string()).into());
                }
            }
        }
    }

    check_block_version(&this.header, height, params)?;
    txvalidate::check_coinbase_height(&block.transactions[0], height, params)
        .map_err(|e| BlockRuleError::Transaction { index: 0, source: e })?;

    let parent_mtp = index.get(parent_id).median_time_past;
    let mut total_fees: i64 = 0;
    let mut sig_ops: u64 = 0;

    for (i, tx) in block.transactions.iter().enumerate() {
        sig_ops += txvalidate::sig_op_cost(tx);

        if i != 0 {
            let fee = txvalidate::check_tx_inputs(tx, view, height, params.coinbase_maturity)
                .map_err(|e| BlockRuleError::Transaction { index: i, source: e })?;
            total_fees = total_fees
                .checked_add(fee)
                .ok_or_else(|| ConsensusError::Internal("total fee overflow".into()))?;

            if csv_active {
                let lock = txvalidate::calc_sequence_lock_for_block(tx, view, index, parent_id);
                if !txvalidate::sequence_lock_is_active(&lock, height, parent_mtp) {
                    return Err(BlockRuleError::Transaction { index: i, source: TxRuleError::UnfinalizedTx }.into());
                }
            }

            if past_last_checkpoint {
                let flags = txvalidate::derive_script_flags(height, params, csv_active, segwit_active, taproot_active);
                for input in &tx.inputs {
                    let entry = view.lookup(&input.previous_output).ok_or_else(|| {
                        ConsensusError::Internal("input vanished between checkTxInputs and script verification".into())
                    })?;
                    script_engine
                        .verify(&input.signature_script, &entry.script_pubkey, &input.witness, entry.value, flags)
                        .map_err(|e| BlockRuleError::Transaction { index: i, source: e })?;
                }
            }
        }

        view.connect_transaction(tx, height, journal);
    }

    if sig_ops > MAX_BLOCK_SIGOPS_COST {
        return Err(TxRuleError::TooManySigOps { got: sig_ops, max: MAX_BLOCK_SIGOPS_COST }.into());
    }

    let coinbase_total = block.transactions[0]
        .total_output_value()
        .ok_or_else(|| ConsensusError::Internal("coinbase output sum overflow should have failed sanity".into()))?;
    let allowed = floki_core::reward::subsidy(height as u64, params) as i64 + total_fees;
    if coinbase_total > allowed {
        return Err(BlockRuleError::Transaction {
            index: 0,
            source: TxRuleError::BadCoinbaseValue { value: coinbase_total as u64 },
        }
        .into());
    }

    if segwit_active {
        check_witness_commitment(block)?;
        let weight = block.weight();
        if weight > MAX_BLOCK_WEIGHT {
            return Err(BlockRuleError::BlockWeightTooHigh { got: weight, max: MAX_BLOCK_WEIGHT }.into());
        }
    }

    view.set_best_hash(this.hash);
    Ok(())
}

/// Reverse [`connect_block`]: disconnect every transaction in reverse
/// order and roll `view`'s best hash back to `block`'s parent.
pub fn disconnect_block(block: &Block, view: &mut UtxoView, journal: &mut Vec<SpentTxOut>) {
    for tx in block.transactions.iter().rev() {
        view.disconnect_transaction(tx, journal);
    }
    view.set_best_hash(block.header.prev_hash);
}

#[cfg(test)]
mod tests {
    use super::*;
    use floki_core::traits::AcceptAllScriptEngine;
    use floki_core::types::{Hash256, OutPoint, Script, TxIn, TxOut, UtxoEntry, UtxoFlags};

    fn header(prev: Hash256, nonce: u32, timestamp: u32, merkle_root: Hash256) -> BlockHeader {
        BlockHeader { version: 4, prev_hash: prev, merkle_root, timestamp, bits: 0x207f_ffff, nonce }
    }

    fn coinbase(value: i64, height: u32) -> Transaction {
        let mut script = vec![0x03, height as u8, (height >> 8) as u8, (height >> 16) as u8];
        script.truncate(4);
        Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint::null(),
                signature_script: Script(script),
                sequence: 0xffff_ffff,
                witness: vec![],
            }],
            outputs: vec![TxOut { value, script_pubkey: Script(vec![0x51]) }],
            lock_time: 0,
        }
    }

    fn block_with_coinbase(prev: Hash256, height: u32, value: i64) -> Block {
        let cb = coinbase(value, height);
        let merkle_root = merkle::block_merkle_root(&[cb.txid()]);
        Block { header: header(prev, height, 1_700_000_000 + height, merkle_root), aux_pow: None, transactions: vec![cb] }
    }

    #[test]
    fn sanity_rejects_block_with_no_coinbase() {
        let tx = Transaction {
            version: 1,
            inputs: vec![TxIn {
                previous_output: OutPoint { txid: Hash256([1; 32]), vout: 0 },
                signature_script: Script(vec![]),
                sequence: 0xffff_ffff,
                witness: vec![],
            }],
            outputs: vec![TxOut { value: 1, script_pubkey: Script(vec![0x51]) }],
            lock_time: 0,
        };
        let merkle_root = merkle::block_merkle_root(&[tx.txid()]);
        let block = Block { header: header(Hash256::ZERO, 0, 1, merkle_root), aux_pow: None, transactions: vec![tx] };
        assert!(matches!(check_block_sanity(&block).unwrap_err(), ConsensusError::Block(BlockRuleError::FirstTxNotCoinbase)));
    }

    #[test]
    fn sanity_rejects_bad_merkle_root() {
        let block = block_with_coinbase(Hash256::ZERO, 1, 100);
        let mut block = block;
        block.header.merkle_root = Hash256([0xff; 32]);
        assert!(matches!(check_block_sanity(&block).unwrap_err(), ConsensusError::Block(BlockRuleError::BadMerkleRoot)));
    }

    #[test]
    fn sanity_passes_a_well_formed_block() {
        let block = block_with_coinbase(Hash256::ZERO, 1, 100);
        assert!(check_block_sanity(&block).is_ok());
    }

    #[test]
    fn version_gate_rejects_low_version_past_activation() {
        let mut params = ChainParams::regtest();
        params.bip0034_height = 0;
        let header = header(Hash256::ZERO, 0, 1, Hash256::ZERO);
        let mut low = header.clone();
        low.version = 1;
        assert!(matches!(
            check_block_version(&low, 0, &params).unwrap_err(),
            ConsensusError::Block(BlockRuleError::BlockVersionTooOld(1))
        ));
        let mut high = header;
        high.version = 4;
        assert!(check_block_version(&high, 0, &params).is_ok());
    }

    fn setup_chain() -> (BlockIndex, NodeId, NodeId) {
        let mut index = BlockIndex::new();
        let genesis_header = header(Hash256::ZERO, 0, 1_700_000_000, Hash256::ZERO);
        let genesis = index.insert_genesis(genesis_header.clone());
        let block1 = block_with_coinbase(genesis_header.hash(), 1, 50 * floki_core::constants::COIN as i64);
        let node1 = index.insert_header(block1.header.clone()).unwrap();
        (index, genesis, node1)
    }

    #[test]
    fn connect_block_rejects_wrong_prev_best_hash() {
        let (index, _genesis, node1) = setup_chain();
        let block1_header = index.get(node1).header.clone();
        let cb = coinbase(50 * floki_core::constants::COIN as i64, 1);
        let block1 = Block { header: block1_header, aux_pow: None, transactions: vec![cb] };
        let mut view = UtxoView::new(Hash256([0xAB; 32])); // wrong best hash
        let mut journal = Vec::new();
        let params = ChainParams::regtest();
        let err = connect_block(
            &index, node1, &block1, &mut view, &mut journal, &params,
            &AcceptAllScriptEngine, false, false, false, true,
        )
        .unwrap_err();
        assert!(matches!(err, ConsensusError::Chain(floki_core::error::ChainError::PrevBlockNotBest)));
    }

    #[test]
    fn connect_then_disconnect_round_trips_the_view() {
        let (index, genesis, node1) = setup_chain();
        let genesis_hash = index.get(genesis).hash;
        let block1_header = index.get(node1).header.clone();
        let value = 50 * floki_core::constants::COIN as i64;
        let cb = coinbase(value, 1);
        let block1 = Block { header: block1_header, aux_pow: None, transactions: vec![cb] };

        let mut view = UtxoView::new(genesis_hash);
        let mut journal = Vec::new();
        let params = ChainParams::regtest();
        connect_block(
            &index, node1, &block1, &mut view, &mut journal, &params,
            &AcceptAllScriptEngine, false, false, false, true,
        )
        .unwrap();
        assert_eq!(view.best_hash(), index.get(node1).hash);
        assert_eq!(view.len(), 1);

        disconnect_block(&block1, &mut view, &mut journal);
        assert_eq!(view.best_hash(), genesis_hash);
        assert!(view.is_empty());
    }

    #[test]
    fn connect_block_rejects_coinbase_value_above_subsidy_plus_fees() {
        let (index, genesis, node1) = setup_chain();
        let genesis_hash = index.get(genesis).hash;
        let block1_header = index.get(node1).header.clone();
        let params = ChainParams::regtest();
        let too_much = floki_core::reward::subsidy(1, &params) as i64 + 1;
        let cb = coinbase(too_much, 1);
        let merkle_root = merkle::block_merkle_root(&[cb.txid()]);
        let mut header = block1_header;
        header.merkle_root = merkle_root;
        let block1 = Block { header, aux_pow: None, transactions: vec![cb] };
        // Re-derive node1 for the new header/hash.
        let mut index2 = BlockIndex::new();
        let genesis_header = header_at_genesis();
        index2.insert_genesis(genesis_header);
        let node1b = index2.insert_header(block1.header.clone()).unwrap();

        let mut view = UtxoView::new(genesis_hash);
        let mut journal = Vec::new();
        let err = connect_block(
            &index2, node1b, &block1, &mut view, &mut journal, &params,
            &AcceptAllScriptEngine, false, false, false, true,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Block(BlockRuleError::Transaction { index: 0, source: TxRuleError::BadCoinbaseValue { .. } })
        ));
    }

    fn header_at_genesis() -> BlockHeader {
        header(Hash256::ZERO, 0, 1_700_000_000, Hash256::ZERO)
    }

    #[test]
    fn bip30_rejects_recreating_an_unspent_outpoint() {
        let mut index = BlockIndex::new();
        let genesis_header = header_at_genesis();
        let genesis = index.insert_genesis(genesis_header.clone());
        let block1 = block_with_coinbase(genesis_header.hash(), 1, 50 * floki_core::constants::COIN as i64);
        let node1 = index.insert_header(block1.header.clone()).unwrap();
        let params = ChainParams::regtest();

        let mut view = UtxoView::new(genesis_header.hash());
        let mut journal = Vec::new();
        connect_block(
            &index, node1, &block1, &mut view, &mut journal, &params,
            &AcceptAllScriptEngine, false, false, false, true,
        )
        .unwrap();

        // A second block whose coinbase transaction is byte-identical (same
        // outputs, same implicit height encoding) recreates the same txid
        // and outpoint, which BIP0030 forbids while height is below
        // bip0034_height and the height is not a grandfathered exemption.
        let dup_cb = coinbase(50 * floki_core::constants::COIN as i64, 1);
        let merkle_root = merkle::block_merkle_root(&[dup_cb.txid()]);
        let dup_header = header(index.get(node1).hash, 2, 1_700_000_002, merkle_root);
        let dup_block = Block { header: dup_header.clone(), aux_pow: None, transactions: vec![dup_cb] };
        let dup_node = index.insert_header(dup_header).unwrap();

        let mut params_bip30 = params;
        params_bip30.bip0034_height = 1_000_000;
        let err = connect_block(
            &index, dup_node, &dup_block, &mut view, &mut journal, &params_bip30,
            &AcceptAllScriptEngine, false, false, false, true,
        )
        .unwrap_err();
        assert!(matches!(err, ConsensusError::Block(BlockRuleError::DuplicateTx(_))));
    }

    #[test]
    fn segwit_active_requires_witness_commitment() {
        let (index, genesis, node1) = setup_chain();
        let genesis_hash = index.get(genesis).hash;
        let block1_header = index.get(node1).header.clone();
        let cb = coinbase(50 * floki_core::constants::COIN as i64, 1);
        let block1 = Block { header: block1_header, aux_pow: None, transactions: vec![cb] };
        let mut view = UtxoView::new(genesis_hash);
        let mut journal = Vec::new();
        let params = ChainParams::regtest();
        let err = connect_block(
            &index, node1, &block1, &mut view, &mut journal, &params,
            &AcceptAllScriptEngine, true, false, false, true,
        )
        .unwrap_err();
        assert!(matches!(err, ConsensusError::Block(BlockRuleError::BadWitnessCommitment)));
    }

    fn setup_spend_chain(coinbase_maturity: u32) -> (BlockIndex, NodeId, NodeId, NodeId, ChainParams, Transaction) {
        let mut params = ChainParams::regtest();
        params.coinbase_maturity = coinbase_maturity;
        let mut index = BlockIndex::new();
        let genesis_header = header_at_genesis();
        let genesis = index.insert_genesis(genesis_header.clone());
        let block1 = block_with_coinbase(genesis_header.hash(), 1, floki_core::reward::subsidy(1, &params) as i64);
        let node1 = index.insert_header(block1.header.clone()).unwrap();

        let spend_tx = Transaction {
            version: 2,
            inputs: vec![TxIn {
                previous_output: OutPoint { txid: block1.transactions[0].txid(), vout: 0 },
                signature_script: Script(vec![0x01]),
                sequence: 0xffff_ffff,
                witness: vec![],
            }],
            outputs: vec![TxOut { value: 1, script_pubkey: Script(vec![0x51]) }],
            lock_time: 0,
        };
        let cb2 = coinbase(floki_core::reward::subsidy(2, &params) as i64, 2);
        let merkle_root = merkle::block_merkle_root(&[cb2.txid(), spend_tx.txid()]);
        let block2_header = header(index.get(node1).hash, 2, 1_700_000_120, merkle_root);
        let node2 = index.insert_header(block2_header).unwrap();

        (index, genesis, node1, node2, params, spend_tx)
    }

    #[test]
    fn connect_block_calls_the_script_engine_with_the_derived_flags() {
        let (index, genesis, node1, node2, params, spend_tx) = setup_spend_chain(0);
        let genesis_hash = index.get(genesis).hash;
        let block1 = Block {
            header: index.get(node1).header.clone(),
            aux_pow: None,
            transactions: vec![coinbase(floki_core::reward::subsidy(1, &params) as i64, 1)],
        };
        let cb2 = coinbase(floki_core::reward::subsidy(2, &params) as i64, 2);
        let block2 = Block { header: index.get(node2).header.clone(), aux_pow: None, transactions: vec![cb2, spend_tx.clone()] };

        let mut view = UtxoView::new(genesis_hash);
        let mut journal = Vec::new();
        connect_block(&index, node1, &block1, &mut view, &mut journal, &params, &AcceptAllScriptEngine, false, false, false, true)
            .unwrap();

        let expected_flags = txvalidate::derive_script_flags(2, &params, false, true, false);
        let mut mock = floki_core::traits::MockScriptEngine::new();
        mock.expect_verify()
            .withf(move |_sig, _pubkey, _witness, _amount, flags| *flags == expected_flags)
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        connect_block(&index, node2, &block2, &mut view, &mut journal, &params, &mock, true, false, false, true).unwrap();
    }

    #[test]
    fn connect_block_propagates_a_script_engine_rejection() {
        let (index, genesis, node1, node2, params, spend_tx) = setup_spend_chain(0);
        let genesis_hash = index.get(genesis).hash;
        let block1 = Block {
            header: index.get(node1).header.clone(),
            aux_pow: None,
            transactions: vec![coinbase(floki_core::reward::subsidy(1, &params) as i64, 1)],
        };
        let cb2 = coinbase(floki_core::reward::subsidy(2, &params) as i64, 2);
        let block2 = Block { header: index.get(node2).header.clone(), aux_pow: None, transactions: vec![cb2, spend_tx] };

        let mut view = UtxoView::new(genesis_hash);
        let mut journal = Vec::new();
        connect_block(&index, node1, &block1, &mut view, &mut journal, &params, &AcceptAllScriptEngine, false, false, false, true)
            .unwrap();

        let mut mock = floki_core::traits::MockScriptEngine::new();
        mock.expect_verify()
            .times(1)
            .returning(|_, _, _, _, _| Err(TxRuleError::ScriptVerificationFailed { index: 0, reason: "bad sig".into() }));

        let err = connect_block(&index, node2, &block2, &mut view, &mut journal, &params, &mock, false, false, false, true)
            .unwrap_err();
        assert!(matches!(
            err,
            ConsensusError::Block(BlockRuleError::Transaction { index: 1, source: TxRuleError::ScriptVerificationFailed { .. } })
        ));
    }
}
