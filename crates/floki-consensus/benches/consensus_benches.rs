//! Criterion benchmarks for floki-consensus's hot paths: full block
//! processing through [`ConsensusEngine`] and standalone difficulty
//! retargeting.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use floki_consensus::difficulty;
use floki_consensus::engine::ConsensusEngine;
use floki_consensus::index::BlockIndex;
use floki_core::hash::scrypt_pow_hash;
use floki_core::merkle;
use floki_core::params::ChainParams;
use floki_core::traits::{AcceptAllScriptEngine, FixedTimeSource};
use floki_core::types::{Block, BlockHeader, Hash256, OutPoint, Script, Transaction, TxIn, TxOut};
use floki_core::work;

fn encode_height(height: u32) -> Vec<u8> {
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

fn coinbase(height: u32, value: i64) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            signature_script: Script(encode_height(height)),
            sequence: 0xffff_ffff,
            witness: vec![],
        }],
        outputs: vec![TxOut { value, script_pubkey: Script(vec![0x51]) }],
        lock_time: 0,
    }
}

fn mine_block(params: &ChainParams, prev_hash: Hash256, timestamp: u32, transactions: Vec<Transaction>) -> Block {
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

fn new_engine(params: ChainParams) -> ConsensusEngine {
    ConsensusEngine::new(params, Arc::new(AcceptAllScriptEngine), Arc::new(FixedTimeSource(4_000_000_000)))
}

fn bench_process_block(c: &mut Criterion) {
    let params = ChainParams::regtest();

    c.bench_function("process_block", |b| {
        b.iter_batched(
            || {
                let engine = new_engine(params.clone());
                let genesis = engine.best_snapshot();
                let value = floki_core::reward::subsidy(1, &params) as i64;
                let block = mine_block(&params, genesis.hash, 1_700_000_060, vec![coinbase(1, value)]);
                (engine, block)
            },
            |(mut engine, block)| {
                engine.process_block(black_box(block)).unwrap();
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn bench_next_required_bits(c: &mut Criterion) {
    let mut params = ChainParams::regtest();
    params.pow_no_retargeting = false;

    let mut index = BlockIndex::new();
    let genesis_header = BlockHeader {
        version: 4,
        prev_hash: Hash256::ZERO,
        merkle_root: Hash256::ZERO,
        timestamp: 1_700_000_000,
        bits: params.pow_limit_bits,
        nonce: 0,
    };
    let mut parent = index.insert_genesis(genesis_header.clone());
    let mut timestamp = genesis_header.timestamp;
    for _ in 0..20 {
        timestamp += 60;
        let header = BlockHeader {
            version: 4,
            prev_hash: index.get(parent).hash,
            merkle_root: Hash256::ZERO,
            timestamp,
            bits: params.pow_limit_bits,
            nonce: 0,
        };
        parent = index.insert_header(header).unwrap();
    }

    c.bench_function("next_required_bits", |b| {
        b.iter(|| difficulty::next_required_bits(black_box(&index), parent, timestamp + 60, &params))
    });
}

criterion_group!(benches, bench_process_block, bench_next_required_bits);
criterion_main!(benches);
