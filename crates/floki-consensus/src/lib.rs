//! # floki-consensus — stateful chain validation and best-chain selection.
//!
//! `floki-core` supplies the wire types and pure data-model operations;
//! this crate adds everything that needs a running index of seen blocks —
//! header/body validation wired to a block index and UTXO view, BIP0009
//! deployment state, checkpoint gating, and the [`engine::ConsensusEngine`]
//! façade that ties them into `ProcessBlock`/reorg/`InvalidateBlock`.

pub mod auxpow;
pub mod checkpoint;
pub mod connect;
pub mod deployment;
pub mod difficulty;
pub mod engine;
pub mod header;
pub mod index;
pub mod txvalidate;
pub mod utxo;

pub use engine::{BestSnapshot, ChainTip, ConsensusEngine, TipStatus};
pub use index::{BlockIndex, BlockIndexNode, NodeId};
pub use utxo::UtxoView;
