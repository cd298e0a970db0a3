//! Transaction validation (§4.8): context-free sanity checks plus the
//! input/spend checks, sig-op accounting, and BIP0068 sequence locks that
//! need a UTXO view and block-index context.

use floki_core::constants::{
    MAX_BLOCK_BASE_SIZE, MAX_COINBASE_SCRIPT_LEN, MIN_COINBASE_SCRIPT_LEN, SEQUENCE_LOCKTIME_GRANULARITY,
    SEQUENCE_LOCKTIME_MASK, WITNESS_SCALE_FACTOR,
};
use floki_core::error::TxRuleError;
use floki_core::params::ChainParams;
use floki_core::traits::ScriptFlags;
use floki_core::types::Transaction;

use crate::index::{BlockIndex, NodeId};
use crate::utxo::UtxoView;

/// Context-free structural and value checks (§4.8 `checkTxSanity`):
/// non-empty inputs/outputs, serialized size, per-output and running-sum
/// value ranges, no duplicate input outpoints, and coinbase-specific
/// script-length bounds.
pub fn check_tx_sanity(tx: &Transaction, is_coinbase_position: bool) -> Result<(), TxRuleError> {
    if tx.inputs.is_empty() {
        return Err(TxRuleError::NoTxInputs);
    }
    if tx.outputs.is_empty() {
        return Err(TxRuleError::NoTxOutputs);
    }

    let size = tx.serialize_stripped().len();
    if size > MAX_BLOCK_BASE_SIZE {
        return Err(TxRuleError::TxTooBig { size, max: MAX_BLOCK_BASE_SIZE });
    }

    let mut running_sum: i64 = 0;
    for out in &tx.outputs {
        if out.value < 0 || out.value as u64 > floki_core::constants::MAX_SUPPLY {
            return Err(TxRuleError::BadTxOutValue { value: out.value as u64 });
        }
        running_sum = running_sum
            .checked_add(out.value)
            .filter(|&sum| sum as u64 <= floki_core::constants::MAX_SUPPLY)
            .ok_or(TxRuleError::BadFees)?;
    }

    let mut seen = std::collections::HashSet::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        if !seen.insert(&input.previous_output) {
            return Err(TxRuleError::DuplicateTxInputs(input.previous_output.to_string()));
        }
    }

    if tx.is_coinbase() {
        let len = tx.inputs[0].signature_script.len();
        if !(MIN_COINBASE_SCRIPT_LEN..=MAX_COINBASE_SCRIPT_LEN).contains(&len) {
            return Err(TxRuleError::BadCoinbaseScriptLen(len));
        }
    } else {
        for input in &tx.inputs {
            if input.previous_output.is_null() {
                return Err(TxRuleError::BadTxInput(input.previous_output.to_string()));
            }
        }
    }

    let _ = is_coinbase_position;
    Ok(())
}

/// Per-input and aggregate checks that need the UTXO view (§4.8
/// `checkTxInputs`): every spent entry must exist, not already be spent in
/// this view, and (if coinbase) be mature; the value-balance check
/// (`SpendTooHigh`) and fee computation round out the contract.
pub fn check_tx_inputs(
    tx: &Transaction,
    view: &UtxoView,
    spend_height: u32,
    coinbase_maturity: u32,
) -> Result<i64, TxRuleError> {
    let mut input_sum: i64 = 0;
    for input in &tx.inputs {
        let entry = view
            .lookup(&input.previous_output)
            .ok_or_else(|| TxRuleError::MissingTxOut(input.previous_output.to_string()))?;
        if !entry.is_mature(spend_height, coinbase_maturity) {
            return Err(TxRuleError::ImmatureSpend { created_height: entry.height as u64, spend_height: spend_height as u64 });
        }
        input_sum = input_sum
            .checked_add(entry.value)
            .filter(|&sum| sum as u64 <= floki_core::constants::MAX_SUPPLY)
            .ok_or(TxRuleError::BadFees)?;
    }

    let output_sum = tx.total_output_value().ok_or(TxRuleError::BadFees)?;
    if input_sum < output_sum {
        return Err(TxRuleError::SpendTooHigh);
    }
    Ok(input_sum - output_sum)
}

/// Combined legacy + witness-scaled signature-operation cost of one
/// transaction (§4.8): `legacy_sig_op_count * WITNESS_SCALE_FACTOR`, since
/// this crate does not execute P2SH redeem scripts or witness programs
/// itself (§1 Non-goals) and so cannot count sig-ops inside them; only the
/// coarse opcode scan available from the raw scripts is charged.
pub fn sig_op_cost(tx: &Transaction) -> u64 {
    tx.legacy_sig_op_count() * WITNESS_SCALE_FACTOR
}

/// A BIP0068 relative lock, in the two units it can be expressed in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SequenceLock {
    pub min_height: u32,
    pub min_time: u32,
}

/// The tightest (maximum) relative lock across every input whose sequence
/// number carries BIP0068 meaning (§4.8). `input_heights`/`input_mtp` give,
/// per input, the height and median-time-past at which the spent output
/// was created — the anchor a relative lock counts from.
pub fn calc_sequence_locks(
    tx: &Transaction,
    input_heights: &[u32],
    input_mtp: &[u32],
) -> SequenceLock {
    let mut lock = SequenceLock::default();
    if tx.version < 2 {
        return lock;
    }
    for (i, input) in tx.inputs.iter().enumerate() {
        if input.sequence_lock_disabled() {
            continue;
        }
        let span = input.sequence & SEQUENCE_LOCKTIME_MASK;
        if input.sequence_lock_is_time() {
            let seconds = (span << SEQUENCE_LOCKTIME_GRANULARITY) as u32;
            let anchor = input_mtp.get(i).copied().unwrap_or(0);
            lock.min_time = lock.min_time.max(anchor.saturating_add(seconds).saturating_sub(1));
        } else {
            let anchor = input_heights.get(i).copied().unwrap_or(0);
            lock.min_height = lock.min_height.max(anchor + span);
        }
    }
    lock
}

/// True if `lock` is satisfied by a block at `height` with the given
/// parent median-time-past (the finality test applied during
/// `connectBlock`).
pub fn sequence_lock_is_active(lock: &SequenceLock, height: u32, parent_mtp: u32) -> bool {
    height > lock.min_height && parent_mtp > lock.min_time
}

/// Derive the script verification flags active for a block at `height`,
/// from the deployment states the caller has already resolved (§4.8,
/// §4.10). BIP0016/0065/0066 key off height directly; CSV/segwit/taproot
/// each key off their own corresponding deployment state — BIP0112 (CSV)
/// activated independently of and before segwit historically, so it must
/// not be folded into `segwit_active`.
pub fn derive_script_flags(
    height: u32,
    params: &ChainParams,
    csv_active: bool,
    segwit_active: bool,
    taproot_active: bool,
) -> ScriptFlags {
    ScriptFlags {
        bip16: true,
        der_signatures: height >= params.bip0066_height,
        check_lock_time_verify: height >= params.bip0065_height,
        check_sequence_verify: csv_active,
        witness: segwit_active,
        strict_multisig: height >= params.bip0066_height,
        taproot: taproot_active,
    }
}

/// Resolve the BIP0034 coinbase height commitment from the signature
/// script's leading script-number push and compare it against the block
/// height it is supposed to claim. Only enforced at/after
/// [`ChainParams::bip0034_height`].
pub fn check_coinbase_height(tx: &Transaction, height: u32, params: &ChainParams) -> Result<(), TxRuleError> {
    if height < params.bip0034_height {
        return Ok(());
    }
    let script = &tx.inputs[0].signature_script;
    let bytes = script.as_bytes();
    let len = *bytes.first().ok_or(TxRuleError::MissingCoinbaseHeight)? as usize;
    if len == 0 || len > 8 || bytes.len() < 1 + len {
        return Err(TxRuleError::MissingCoinbaseHeight);
    }
    let mut value: i64 = 0;
    for (i, &b) in bytes[1..1 + len].iter().enumerate() {
        value |= (b as i64) << (8 * i);
    }
    if len > 0 && bytes[len] & 0x80 != 0 {
        value = -value;
    }
    if value != height as i64 {
        return Err(TxRuleError::BadCoinbaseHeight { got: value, expected: height as u64 });
    }
    Ok(())
}

/// Index-aware wrapper computing a [`SequenceLock`] by walking each
/// input's spent-output creation height up to its ancestor's
/// median-time-past (§4.8/§4.12 `CalcSequenceLock`).
pub fn calc_sequence_lock_for_block(
    tx: &Transaction,
    view: &UtxoView,
    index: &BlockIndex,
    parent: NodeId,
) -> SequenceLock {
    let mut heights = Vec::with_capacity(tx.inputs.len());
    let mut mtps = Vec::with_capacity(tx.inputs.len());
    for input in &tx.inputs {
        let created_height = view.lookup(&input.previous_output).map(|e| e.height).unwrap_or(0);
        let anchor_height = created_height.saturating_sub(1);
        let mtp = index
            .ancestor_at_height(parent, anchor_height)
            .map(|id| index.get(id).median_time_past)
            .unwrap_or(0);
        heights.push(created_height);
        mtps.push(mtp);
    }
    calc_sequence_locks(tx, &heights, &mtps)
}
