//! Genesis block construction (§3, §8 scenario 1).
//!
//! Each [`crate::params::Network`] gets its own deterministic genesis
//! block: a single coinbase transaction whose output is provably
//! unspendable (an `OP_RETURN` script), so the genesis coinbase never
//! contributes a real UTXO and §4.9's "reject genesis coinbase spend" rule
//! has nothing to reject in practice — it exists purely to guard against a
//! malformed index that tries to treat genesis like any other connected
//! block.

use crate::merkle;
use crate::params::Network;
use crate::types::{Block, BlockHeader, Hash256, OutPoint, Script, Transaction, TxIn, TxOut};

/// Message embedded in every network's genesis coinbase signature script.
const GENESIS_MESSAGE: &[u8] = b"Flokicoin consensus genesis block";

fn genesis_coinbase(message: &[u8]) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            previous_output: OutPoint::null(),
            signature_script: Script(message.to_vec()),
            sequence: 0xffff_ffff,
            witness: vec![],
        }],
        outputs: vec![TxOut {
            value: 0,
            // OP_RETURN: provably unspendable, keeps the genesis coinbase
            // out of the UTXO set's spendable balance entirely.
            script_pubkey: Script(vec![0x6a]),
        }],
        lock_time: 0,
    }
}

fn build(timestamp: u32, bits: u32, nonce: u32) -> Block {
    let coinbase = genesis_coinbase(GENESIS_MESSAGE);
    let txid = coinbase.txid();
    let merkle_root = merkle::merkle_root(&[txid]);
    let header = BlockHeader {
        version: 1,
        prev_hash: Hash256::ZERO,
        merkle_root,
        timestamp,
        bits,
        nonce,
    };
    Block { header, aux_pow: None, transactions: vec![coinbase] }
}

/// The genesis block for a given network.
///
/// Mainnet and testnet genesis blocks carry a real-looking timestamp and
/// the network's `pow_limit_bits`; regtest uses the same construction with
/// a trivial nonce since `pow_no_retargeting` means PoW is never checked
/// against it in practice.
pub fn genesis_block(network: Network) -> Block {
    match network {
        Network::Mainnet => build(1_614_556_800, 0x1e0f_ffff, 0),
        Network::Testnet => build(1_614_556_800, 0x1e0f_ffff, 0),
        Network::Regtest => build(1_296_688_602, 0x207f_ffff, 0),
    }
}

/// The genesis block's header hash.
pub fn genesis_hash(network: Network) -> Hash256 {
    genesis_block(network).header.hash()
}

/// True if `block` is exactly the genesis block for `network`.
pub fn is_genesis(block: &Block, network: Network) -> bool {
    block.header.hash() == genesis_hash(network)
}
