//! Error taxonomy for the Flokicoin consensus core.
use thiserror::Error;

/// Transaction-level rule violations: structural and value checks from
/// `checkTxSanity`, plus the input/spend checks from `checkTxInputs`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxRuleError {
    #[error("transaction has no inputs")] NoTxInputs,
    #[error("transaction has no outputs")] NoTxOutputs,
    #[error("transaction too big: {size} > {max}")] TxTooBig { size: usize, max: usize },
    #[error("duplicate input outpoint: {0}")] DuplicateTxInputs(String),
    #[error("malformed transaction input: {0}")] BadTxInput(String),
    #[error("output value out of range: {value}")] BadTxOutValue { value: u64 },
    #[error("coinbase value out of range: {value}")] BadCoinbaseValue { value: u64 },
    #[error("sum of outputs overflows or exceeds supply")] BadFees,
    #[error("sum of inputs less than sum of outputs")] SpendTooHigh,
    #[error("referenced output does not exist or is already spent: {0}")] MissingTxOut(String),
    #[error("spend of immature coinbase at height {spend_height}, created at {created_height}")]
    ImmatureSpend { created_height: u64, spend_height: u64 },
    #[error("attempt to overwrite an existing unspent transaction: {0}")] OverwriteTx(String),
    #[error("too many signature operations: {got} > {max}")] TooManySigOps { got: u64, max: u64 },
    #[error("coinbase signature script length out of range: {0}")] BadCoinbaseScriptLen(usize),
    #[error("coinbase signature script does not encode block height")] MissingCoinbaseHeight,
    #[error("coinbase height encoding does not match block height: got {got}, expected {expected}")]
    BadCoinbaseHeight { got: i64, expected: u64 },
    #[error("transaction is not final at this height/median-time-past")] UnfinalizedTx,
    #[error("script verification failed on input {index}: {reason}")]
    ScriptVerificationFailed { index: usize, reason: String },
}

/// Block-level structural rule violations from `validate_block_structure`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockRuleError {
    #[error("block serialized size too big: {size} > {max}")] BlockTooBig { size: usize, max: usize },
    #[error("block has no transactions")] NoTransactions,
    #[error("first transaction is not a coinbase")] FirstTxNotCoinbase,
    #[error("more than one coinbase transaction")] MultipleCoinbases,
    #[error("duplicate transaction id: {0}")] DuplicateTx(String),
    #[error("merkle root mismatch")] BadMerkleRoot,
    #[error("block version too old: {0}")] BlockVersionTooOld(i32),
    #[error("block weight too high: {got} > {max}")] BlockWeightTooHigh { got: u64, max: u64 },
    #[error("prev-block hash does not match the chain tip")] PrevBlockNotBest,
    #[error("witness commitment missing or mismatched")] BadWitnessCommitment,
    #[error("transaction error at index {index}: {source}")]
    Transaction { index: usize, source: TxRuleError },
}

/// Timestamp rule violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeError {
    #[error("timestamp has sub-second precision")] InvalidTime,
    #[error("timestamp too far in the future")] TimeTooNew,
    #[error("timestamp not after median-time-past of ancestors")] TimeTooOld,
    #[error("timestamp indicates a timewarp attack")] TimewarpAttack,
}

/// Proof-of-work / difficulty rule violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PowError {
    #[error("bits field does not encode the expected difficulty: got {got:#010x}, expected {expected:#010x}")]
    UnexpectedDifficulty { got: u32, expected: u32 },
    #[error("proof-of-work hash exceeds target")] HighHash,
}

/// Merged-mining (AuxPoW) rule violations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuxPowError {
    #[error("AuxPoW version bit not set")] AuxpowNoVersion,
    #[error("AuxPoW payload missing")] AuxpowNoHeader,
    #[error("merged-mining tag appears more than once in coinbase script")] AuxpowMultipleHeaders,
    #[error("aux-root bytes not found at an acceptable position in coinbase script")] AuxpowBadHashPosition,
    #[error("coinbase transaction is malformed")] AuxpowMalformedCoinbase,
    #[error("merkle branch size field does not match 2^height")] AuxpowWrongSize,
    #[error("merkle branch side-mask does not match expected index")] AuxpowWrongIndex,
    #[error("coinbase transaction not included in parent merkle root")] AuxpowCoinbaseHashNotFound,
}

/// Chain-level rule violations: checkpoints, linkage.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("block hash at height {height} does not match checkpoint")] BadCheckpoint { height: u64 },
    #[error("fork at height {height} is older than the last checkpoint at {checkpoint_height}")]
    ForkTooOld { height: u64, checkpoint_height: u64 },
    #[error("prev-block hash does not match the chain tip")] PrevBlockNotBest,
    #[error("header references an unknown parent: {0}")] UnknownParent(String),
    #[error("block not found: {0}")] BlockNotFound(String),
    #[error("path crosses a node that is not VALID_BLOCK")] Unvalidated,
    #[error("block is already marked invalid")] MarkedInvalid,
    #[error("chain is empty: no genesis connected")] EmptyChain,
}

/// Top-level aggregate error returned by the consensus façade.
///
/// Rule violations (everything below) are returned to callers and never
/// logged above `debug`/`warn` — see SPEC_FULL.md §6a. `Storage` carries an
/// I/O error surfaced unchanged from the database collaborator. `Internal`
/// is reserved for programmer-error assertions and must never be
/// constructed from a rule violation.
#[derive(Error, Debug)]
pub enum ConsensusError {
    #[error(transparent)] Tx(#[from] TxRuleError),
    #[error(transparent)] Block(#[from] BlockRuleError),
    #[error(transparent)] Time(#[from] TimeError),
    #[error(transparent)] Pow(#[from] PowError),
    #[error(transparent)] AuxPow(#[from] AuxPowError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error("storage: {0}")] Storage(String),
    #[error("internal invariant violated: {0}")] Internal(String),
}
