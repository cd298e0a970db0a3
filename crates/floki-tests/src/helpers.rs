//! Shared test helpers for end-to-end and integration tests.

use std::sync::Arc;

use floki_consensus::engine::ConsensusEngine;
use floki_core::hash::scrypt_pow_hash;
use floki_core::merkle;
use floki_core::params::ChainParams;
use floki_core::traits::{AcceptAllScriptEngine, FixedTimeSource};
use floki_core::types::{Block, BlockHeader, Hash256, OutPoint, Script, Transaction, TxIn, TxOut};
use floki_core::work;

/// Pay-to-anyone output script, standing in for a real locking script in
/// tests that don't exercise script verification itself.
pub fn spendable_script() -> Script {
    Script(vec![0x51])
}

/// Minimal BIP0034 coinbase height push: a length-prefixed, sign-padded
/// little-endian minimal encoding, matching what
/// [`floki_consensus::txvalidate::check_coinbase_height`] decodes.
pub fn encode_height(height: u32) -> Vec<u8> {
    let mut bytes = height.to_le_bytes().to_vec();
    while bytes.len() > 1 && *bytes.last().unwrap() == 0 {
        bytes.pop();
    }
    if bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
        bytes.push(0);
    }
    let mut script = vec![bytes.len() as u8];
    script.extend(bytes);
    script
}

/// A coinbase transaction carrying `height`'s BIP0034 commitment and a
/// single spendable output of `value`.
pub fn coinbase(height: u32, value: i64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            signature_script: Script(encode_height(height)),
            sequence: 0xffff_ffff,
            witness: vec![],
        }],
        outputs: vec![TxOut { value, script_pubkey: spendable_script() }],
        lock_time: 0,
    }
}

/// A single-input, single-output spend of `previous`, unsigned (callers
/// only ever run these against [`floki_core::traits::AcceptAllScriptEngine`]).
pub fn spend(previous: OutPoint, value: i64, sequence: u32) -> Transaction {
    Transaction {
        version: 2,
        inputs: vec![TxIn { previous_output: previous, signature_script: Script(vec![]), sequence, witness: vec![] }],
        outputs: vec![TxOut { value, script_pubkey: spendable_script() }],
        lock_time: 0,
    }
}

/// Assemble and mine a block: correct merkle root over `transactions`,
/// proof of work satisfying `params.pow_limit`, version high enough to
/// clear BIP0034/0065/0066 at any height.
pub fn mine_block(params: &ChainParams, prev_hash: Hash256, timestamp: u32, transactions: Vec<Transaction>) -> Block {
    let txids: Vec<Hash256> = transactions.iter().map(Transaction::txid).collect();
    let merkle_root = merkle::block_merkle_root(&txids);
    let bits = params.pow_limit_bits;
    let target = work::target_from_bits(bits);
    let mut header = BlockHeader { version: 4, prev_hash, merkle_root, timestamp, bits, nonce: 0 };
    loop {
        let pow = scrypt_pow_hash(&header.serialize_base());
        if work::Target::from_little_endian(pow.as_bytes()) <= target {
            break;
        }
        header.nonce = header.nonce.wrapping_add(1);
    }
    Block { header, aux_pow: None, transactions }
}

/// A fresh engine over `params`, accepting every script (script execution
/// is out of scope here) and anchored to a fixed clock far enough in the
/// future that test timestamps are never rejected as "too new".
pub fn new_engine(params: ChainParams) -> ConsensusEngine {
    ConsensusEngine::new(params, Arc::new(AcceptAllScriptEngine), Arc::new(FixedTimeSource(4_000_000_000)))
}

/// Mine and append `count` blocks on top of `tip_hash`/`tip_height`, each
/// with a fresh coinbase paying exactly the block's subsidy, returning the
/// new tip's hash/height and the list of blocks produced (for callers that
/// want to re-feed them to other engines, e.g. reorg/multi-engine tests).
pub fn extend_chain(
    engine: &mut ConsensusEngine,
    params: &ChainParams,
    mut tip_hash: Hash256,
    mut tip_height: u32,
    mut timestamp: u32,
    count: u32,
) -> (Hash256, u32, Vec<Block>) {
    let mut blocks = Vec::with_capacity(count as usize);
    for _ in 0..count {
        tip_height += 1;
        timestamp += 60;
        let value = floki_core::reward::subsidy(tip_height as u64, params) as i64;
        let cb = coinbase(tip_height, value);
        let block = mine_block(params, tip_hash, timestamp, vec![cb]);
        engine.process_block(block.clone()).unwrap();
        tip_hash = block.header.hash();
        blocks.push(block);
    }
    (tip_hash, tip_height, blocks)
}
