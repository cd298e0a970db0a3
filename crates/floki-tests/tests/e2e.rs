//! End-to-end consensus scenarios: linear growth, reorgs,
//! invalidate/reconsider, BIP0030's duplicate-coinbase rejection, and a
//! spend chain through multiple blocks, all driven through
//! [`floki_consensus::engine::ConsensusEngine`] rather than individual rule
//! functions.

use floki_consensus::engine::TipStatus;
use floki_core::error::{BlockRuleError, ConsensusError};
use floki_core::params::ChainParams;
use floki_core::types::OutPoint;
use floki_tests::helpers::*;

fn regtest() -> ChainParams {
    ChainParams::regtest()
}

#[test]
fn linear_growth_advances_height_and_work() {
    let params = regtest();
    let mut engine = new_engine(params.clone());
    let genesis = engine.best_snapshot();
    assert_eq!(genesis.height, 0);

    let (tip_hash, tip_height, _blocks) = extend_chain(&mut engine, &params, genesis.hash, 0, 1_700_000_000, 10);
    let snapshot = engine.best_snapshot();
    assert_eq!(snapshot.height, 10);
    assert_eq!(snapshot.hash, tip_hash);
    assert_eq!(tip_height, 10);
    assert!(snapshot.chain_work > genesis.chain_work);
}

#[test]
fn a_longer_fork_reorgs_the_active_chain() {
    let params = regtest();
    let mut engine = new_engine(params.clone());
    let genesis = engine.best_snapshot();

    let (short_tip, _, _short_blocks) = extend_chain(&mut engine, &params, genesis.hash, 0, 1_700_000_000, 3);
    assert_eq!(engine.best_snapshot().hash, short_tip);

    // A competing fork off genesis, built independently and fed in after
    // the fact, one block longer than the current active chain.
    let mut fork_tip = genesis.hash;
    let mut fork_height = 0u32;
    let mut fork_ts = 1_700_000_500;
    for _ in 0..4 {
        fork_height += 1;
        fork_ts += 60;
        let value = floki_core::reward::subsidy(fork_height as u64, &params) as i64;
        let cb = coinbase(fork_height, value);
        let block = mine_block(&params, fork_tip, fork_ts, vec![cb]);
        engine.process_block(block.clone()).unwrap();
        fork_tip = block.header.hash();
    }

    let snapshot = engine.best_snapshot();
    assert_eq!(snapshot.hash, fork_tip);
    assert_eq!(snapshot.height, 4);
    assert_ne!(snapshot.hash, short_tip);
}

#[test]
fn invalidating_the_tip_falls_back_and_reconsidering_restores_it() {
    let params = regtest();
    let mut engine = new_engine(params.clone());
    let genesis = engine.best_snapshot();
    let (_, _, blocks) = extend_chain(&mut engine, &params, genesis.hash, 0, 1_700_000_000, 5);
    let tip_hash = blocks.last().unwrap().header.hash();
    let fallback_hash = blocks[3].header.hash();

    engine.invalidate_block(tip_hash).unwrap();
    assert_eq!(engine.best_snapshot().hash, fallback_hash);
    assert_eq!(engine.best_snapshot().height, 4);

    engine.reconsider_block(tip_hash).unwrap();
    assert_eq!(engine.best_snapshot().hash, tip_hash);
    assert_eq!(engine.best_snapshot().height, 5);
}

#[test]
fn chain_tips_reports_the_active_chain_and_dead_forks() {
    let params = regtest();
    let mut engine = new_engine(params.clone());
    let genesis = engine.best_snapshot();
    let (active_tip, _, _) = extend_chain(&mut engine, &params, genesis.hash, 0, 1_700_000_000, 2);

    // A losing fork off genesis, one block, strictly less work than the
    // two-block active chain.
    let cb = coinbase(1, floki_core::reward::subsidy(1, &params) as i64);
    let losing = mine_block(&params, genesis.hash, 1_700_000_900, vec![cb]);
    engine.process_block(losing.clone()).unwrap();

    let tips = engine.chain_tips();
    let active = tips.iter().find(|t| t.hash == active_tip).unwrap();
    assert_eq!(active.status, TipStatus::Active);
    let fork = tips.iter().find(|t| t.hash == losing.header.hash()).unwrap();
    assert_eq!(fork.status, TipStatus::ValidFork);
}

#[test]
fn a_spend_chain_moves_value_through_several_blocks() {
    let mut params = regtest();
    params.coinbase_maturity = 1;
    let mut engine = new_engine(params.clone());
    let genesis = engine.best_snapshot();

    let value0 = floki_core::reward::subsidy(1, &params) as i64;
    let cb = coinbase(1, value0);
    let cb_txid = cb.txid();
    let block1 = mine_block(&params, genesis.hash, 1_700_000_060, vec![cb]);
    engine.process_block(block1.clone()).unwrap();

    let spend_tx = spend(OutPoint { txid: cb_txid, vout: 0 }, value0 - 100, 0xffff_ffff);
    let cb2 = coinbase(2, floki_core::reward::subsidy(2, &params) as i64);
    let block2 = mine_block(&params, block1.header.hash(), 1_700_000_120, vec![cb2, spend_tx.clone()]);
    engine.process_block(block2.clone()).unwrap();

    assert_eq!(engine.best_snapshot().height, 2);
    assert!(engine.utxo(&OutPoint { txid: cb_txid, vout: 0 }).is_none());
    assert!(engine.utxo(&OutPoint { txid: spend_tx.txid(), vout: 0 }).is_some());
}

#[test]
fn bip30_rejects_recreating_an_unspent_coinbase_outpoint() {
    let mut params = regtest();
    params.bip0034_height = 1_000_000; // keep the BIP0034 height-push unenforced, BIP0030 enforced
    let mut engine = new_engine(params.clone());
    let genesis = engine.best_snapshot();

    let value = floki_core::reward::subsidy(1, &params) as i64;
    let cb = coinbase(1, value);
    let block_a = mine_block(&params, genesis.hash, 1_700_000_060, vec![cb.clone()]);
    engine.process_block(block_a).unwrap();

    // A second block carrying a byte-identical coinbase (same height push,
    // same value) recreates the exact same outpoint.
    let dup_cb = coinbase(1, value);
    assert_eq!(cb.txid(), dup_cb.txid());
    let dup_block = mine_block(&params, engine.best_snapshot().hash, 1_700_000_120, vec![dup_cb]);
    let err = engine.process_block(dup_block).unwrap_err();
    assert!(matches!(err, ConsensusError::Block(BlockRuleError::DuplicateTx(_))));
}
