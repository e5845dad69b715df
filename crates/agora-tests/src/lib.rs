//! # agora-tests
//!
//! Cross-crate tests for the Agora kernel.
//!
//! - `tests/scenarios.rs`: worked scenarios from signal intake through
//!   promotion, proposal validation and round settlement
//! - `tests/invariants.rs`: property tests for the laws every pass must keep
//!   (zero-sum rounds, bounded Gini, idempotent promotion, deterministic
//!   clustering)

pub mod helpers;
