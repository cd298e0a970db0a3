//! Cross-engine consistency: several independent [`ConsensusEngine`]
//! instances, fed the same blocks in different orders or over different
//! fork topologies, must converge on identical best-chain state.
//!
//! Stands in for multi-node sync without any networking: "another node"
//! here is just a second `ConsensusEngine` over the same params, and
//! "sending a block" is calling `process_block` on it directly.

use floki_consensus::engine::ConsensusEngine;
use floki_core::params::ChainParams;
use floki_tests::helpers::*;

fn regtest() -> ChainParams {
    ChainParams::regtest()
}

fn assert_same_tip(a: &ConsensusEngine, b: &ConsensusEngine) {
    let sa = a.best_snapshot();
    let sb = b.best_snapshot();
    assert_eq!(sa.hash, sb.hash);
    assert_eq!(sa.height, sb.height);
    assert_eq!(sa.chain_work, sb.chain_work);
}

#[test]
fn two_engines_converge_after_an_identical_linear_sequence() {
    let params = regtest();
    let mut node_a = new_engine(params.clone());
    let mut node_b = new_engine(params.clone());
    let genesis = node_a.best_snapshot();

    let (_, _, blocks) = extend_chain(&mut node_a, &params, genesis.hash, 0, 1_700_000_000, 8);
    for block in &blocks {
        node_b.process_block(block.clone()).unwrap();
    }

    assert_same_tip(&node_a, &node_b);
    assert_eq!(node_a.view().len(), node_b.view().len());
}

#[test]
fn a_node_that_syncs_the_longer_fork_reorgs_to_match_the_network() {
    let params = regtest();
    let mut miner = new_engine(params.clone());
    let mut follower = new_engine(params.clone());
    let genesis = miner.best_snapshot();

    // Both nodes see the same short chain first.
    let (_, _, short_blocks) = extend_chain(&mut miner, &params, genesis.hash, 0, 1_700_000_000, 2);
    for block in &short_blocks {
        follower.process_block(block.clone()).unwrap();
    }
    assert_same_tip(&miner, &follower);

    // A longer, independently mined fork off genesis reaches the follower
    // afterward; it must reorg onto it exactly as the miner eventually
    // would if it saw the same blocks.
    let mut fork_tip = genesis.hash;
    let mut fork_height = 0u32;
    let mut fork_ts = 1_700_000_500;
    let mut fork_blocks = Vec::new();
    for _ in 0..4 {
        fork_height += 1;
        fork_ts += 60;
        let value = floki_core::reward::subsidy(fork_height as u64, &params) as i64;
        let block = mine_block(&params, fork_tip, fork_ts, vec![coinbase(fork_height, value)]);
        fork_tip = block.header.hash();
        fork_blocks.push(block);
    }

    for block in &fork_blocks {
        follower.process_block(block.clone()).unwrap();
        miner.process_block(block.clone()).unwrap();
    }

    assert_same_tip(&miner, &follower);
    assert_eq!(follower.best_snapshot().hash, fork_tip);
}

#[test]
fn out_of_order_delivery_of_the_same_blocks_still_converges() {
    let params = regtest();
    let mut in_order = new_engine(params.clone());
    let mut reversed = new_engine(params.clone());
    let genesis = in_order.best_snapshot();

    let (_, _, blocks) = extend_chain(&mut in_order, &params, genesis.hash, 0, 1_700_000_000, 6);

    // A node that only receives later blocks first cannot connect them
    // (unknown parent) until the earlier ones arrive; process everything in
    // reverse order and confirm only the final, full delivery converges.
    for block in blocks.iter().rev() {
        let _ = reversed.process_block(block.clone());
    }
    assert_ne!(reversed.best_snapshot().hash, in_order.best_snapshot().hash);

    for block in &blocks {
        reversed.process_block(block.clone()).unwrap();
    }
    assert_same_tip(&in_order, &reversed);
}

#[test]
fn invalidating_a_block_on_one_node_does_not_affect_another() {
    let params = regtest();
    let mut node_a = new_engine(params.clone());
    let mut node_b = new_engine(params.clone());
    let genesis = node_a.best_snapshot();

    let (_, _, blocks) = extend_chain(&mut node_a, &params, genesis.hash, 0, 1_700_000_000, 4);
    for block in &blocks {
        node_b.process_block(block.clone()).unwrap();
    }

    let bad_hash = blocks[2].header.hash();
    node_a.invalidate_block(bad_hash).unwrap();

    assert_eq!(node_a.best_snapshot().height, 2);
    assert_eq!(node_b.best_snapshot().height, 4);
}
