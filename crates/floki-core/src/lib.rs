//! # floki-core
//!
//! Foundation types, the error taxonomy, and the collaborator trait
//! boundaries shared by `floki-consensus`: the wire/data model (§3), hash
//! and work-math primitives (C1/C2), chain parameters (§6), and the reward
//! schedule. Stateful consensus logic (the block index, UTXO view,
//! validators, façade) lives in `floki-consensus`.

pub mod constants;
pub mod error;
pub mod genesis;
pub mod hash;
pub mod merkle;
pub mod params;
pub mod reward;
pub mod traits;
pub mod types;
pub mod work;
