//! Property-based tests for the consensus invariants that matter most
//! under adversarial or merely unlucky input: clock-skew rejection, supply
//! conservation, lowest-hash tie-breaking in best-chain selection, and
//! idempotent re-processing of an already-known block.
//!
//! Mining uses regtest's trivial `pow_limit`, so every case in these
//! suites mines in O(1) attempts; none of this exercises real difficulty.

use proptest::prelude::*;

use floki_core::error::{ConsensusError, TimeError};
use floki_core::params::ChainParams;
use floki_tests::helpers::*;

fn regtest() -> ChainParams {
    ChainParams::regtest()
}

proptest! {
    /// No matter how far past the skew budget a candidate's timestamp sits,
    /// `process_block` rejects it as too new rather than accepting it or
    /// panicking.
    #[test]
    fn future_timestamp_is_always_rejected(excess_seconds in 1u32..100_000) {
        let params = regtest();
        let mut engine = new_engine(params.clone());
        let genesis = engine.best_snapshot();

        // new_engine's FixedTimeSource reports 4_000_000_000; anything past
        // its MAX_FUTURE_BLOCK_TIME budget must be refused regardless of
        // how far past.
        let now = 4_000_000_000u32;
        let timestamp = now + floki_core::constants::MAX_FUTURE_BLOCK_TIME as u32 + excess_seconds;
        let value = floki_core::reward::subsidy(1, &params) as i64;
        let cb = coinbase(1, value);
        let block = mine_block(&params, genesis.hash, timestamp, vec![cb]);

        let err = engine.process_block(block).unwrap_err();
        prop_assert!(matches!(err, ConsensusError::Time(TimeError::TimeTooNew)));
    }

    /// The total value held in the UTXO set after mining a chain of plain
    /// coinbase-only blocks always equals the sum of subsidies minted along
    /// the way: validation neither creates nor destroys value.
    #[test]
    fn supply_equals_sum_of_minted_subsidies(chain_len in 1u32..8) {
        let params = regtest();
        let mut engine = new_engine(params.clone());
        let genesis = engine.best_snapshot();
        let (_, _, _) = extend_chain(&mut engine, &params, genesis.hash, 0, 1_700_000_000, chain_len);

        let expected: u64 = (1..=chain_len as u64).map(|h| floki_core::reward::subsidy(h, &params)).sum();
        let actual: u64 = engine
            .view()
            .to_write_batch()
            .puts
            .iter()
            .map(|(_, entry)| entry.value as u64)
            .sum();
        prop_assert_eq!(actual, expected);
    }

    /// Two single-block forks off genesis with identical chain work resolve
    /// to whichever has the lower block hash, regardless of which one is
    /// fed to the engine first.
    #[test]
    fn equal_work_forks_resolve_to_the_lower_hash(first_ts in 1_700_000_060u32..1_700_000_900, second_ts in 1_700_000_060u32..1_700_000_900) {
        let params = regtest();
        let mut engine = new_engine(params.clone());
        let genesis = engine.best_snapshot();

        let value = floki_core::reward::subsidy(1, &params) as i64;
        let block_a = mine_block(&params, genesis.hash, first_ts, vec![coinbase(1, value)]);
        // A distinct sibling block (different timestamp keeps the hash
        // distinct) carrying identical chain work.
        let block_b = mine_block(&params, genesis.hash, second_ts.wrapping_add(1), vec![coinbase(1, value)]);

        if block_a.header.hash() != block_b.header.hash() {
            engine.process_block(block_a.clone()).unwrap();
            engine.process_block(block_b.clone()).unwrap();

            let expected = block_a.header.hash().min(block_b.header.hash());
            prop_assert_eq!(engine.best_snapshot().hash, expected);
        }
    }

    /// Feeding the engine a block it has already fully connected is a
    /// no-op: it neither errors nor changes the active tip or UTXO set a
    /// second time.
    #[test]
    fn reprocessing_a_connected_block_is_idempotent(height in 1u32..6) {
        let params = regtest();
        let mut engine = new_engine(params.clone());
        let genesis = engine.best_snapshot();
        let (_, _, blocks) = extend_chain(&mut engine, &params, genesis.hash, 0, 1_700_000_000, height);

        let tip_before = engine.best_snapshot();
        let utxo_count_before = engine.view().len();

        let changed = engine.process_block(blocks.last().unwrap().clone()).unwrap();
        prop_assert!(!changed);
        prop_assert_eq!(engine.best_snapshot().hash, tip_before.hash);
        prop_assert_eq!(engine.best_snapshot().height, tip_before.height);
        prop_assert_eq!(engine.view().len(), utxo_count_before);
    }
}
