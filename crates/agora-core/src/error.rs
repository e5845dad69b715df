//! Error types for the Agora kernel.
//!
//! Two families surface to callers. An [`InvariantViolation`] rejects the
//! affected round wholesale; a [`MalformedInput`] rejects a call with a
//! specific reason. Degenerate inputs (empty, all-zero, single element) are
//! never errors: they resolve to neutral values.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InvariantViolation {
    #[error("zero-sum violated: imbalance {imbalance} exceeds epsilon {epsilon}")] ZeroSum { imbalance: f64, epsilon: f64 },
    #[error("negative value {value} at index {index}")] NegativeValue { index: usize, value: f64 },
    #[error("level {level} promotion needs {need} signals, grouping has {have}")] SignalFloor { level: u8, have: usize, need: usize },
    #[error("cluster {0} is not spatially adjacent to the rest of the grouping")] NonAdjacentMembers(String),
    #[error("level {level} promotion needs {need_children} child clusters or weight {need_weight}, grouping has {children} and {weight}")] InsufficientEvidence { level: u8, children: usize, need_children: usize, weight: f64, need_weight: f64 },
    #[error("balance of {participant} would become negative: {balance}")] NegativeBalance { participant: String, balance: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedInput {
    #[error("prediction {0} has no actual value")] UnresolvedPrediction(String),
    #[error("prediction {0} is already resolved")] AlreadyResolved(String),
    #[error("non-finite value for {field}: {value}")] NonFinite { field: &'static str, value: f64 },
    #[error("{field} must be non-negative, got {value}")] Negative { field: &'static str, value: f64 },
    #[error("{field} must lie in [0, 1], got {value}")] OutOfUnitRange { field: &'static str, value: f64 },
    #[error("unknown vote value {value:?} for validator {validator}")] UnknownVote { validator: String, value: String },
    #[error("duplicate id: {0}")] DuplicateId(String),
    #[error("unknown participant: {0}")] UnknownParticipant(String),
    #[error("{votes} votes cast but only {validators} validators")] VoteCountExceedsValidators { votes: usize, validators: usize },
    #[error("invalid transition {from} -> {to}")] InvalidTransition { from: String, to: String },
    #[error("invalid policy: {0}")] InvalidPolicy(String),
    #[error("level {0} out of range")] LevelOutOfRange(u8),
    #[error("grouping mixes categories or levels: {0}")] MixedGrouping(String),
    #[error("empty grouping")] EmptyGrouping,
    #[error("unknown cluster: {0}")] UnknownCluster(String),
    #[error("unknown category {0:?}")] UnknownCategory(String),
    #[error("proposal {0} carries no predictions")] NoPredictions(String),
    #[error("unknown prediction: {0}")] UnknownPrediction(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AuditError {
    #[error("entry {sequence}: expected sequence {expected}")] SequenceGap { sequence: u64, expected: u64 },
    #[error("entry {0}: previous hash does not match")] BrokenLink(u64),
    #[error("entry {0}: recomputed hash does not match")] HashMismatch(u64),
    #[error("serialization: {0}")] Serialization(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KernelError {
    #[error(transparent)] Invariant(#[from] InvariantViolation),
    #[error(transparent)] Malformed(#[from] MalformedInput),
    #[error(transparent)] Audit(#[from] AuditError),
}

impl KernelError {
    /// Whether this error rejects the whole round rather than a single input.
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, Self::Invariant(_))
    }
}

/// Reject NaN and infinities with the field name attached.
pub fn ensure_finite(field: &'static str, value: f64) -> Result<f64, MalformedInput> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(MalformedInput::NonFinite { field, value })
    }
}

/// Reject non-finite and negative values.
pub fn ensure_non_negative(field: &'static str, value: f64) -> Result<f64, MalformedInput> {
    let value = ensure_finite(field, value)?;
    if value < 0.0 {
        return Err(MalformedInput::Negative { field, value });
    }
    Ok(value)
}
