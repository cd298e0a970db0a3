//! End-to-end and adversarial scenario tests for the Flokicoin consensus core.
//!
//! Exercises [`floki_consensus::engine::ConsensusEngine`] the way a real
//! caller would: feeding it full blocks and observing best-chain selection,
//! reorgs, and invalidation, rather than unit-testing individual rule
//! functions (that coverage lives next to the rules themselves).

pub mod helpers;
