//! Byzantine supermajority gate.
//!
//! With `n` validators the threshold is `t = ceil(2n / 3)`:
//! - approved when `in_favor >= t`
//! - rejected when `in_favor + outstanding < t`, i.e. approval is out of reach
//! - pending otherwise
//!
//! Outstanding votes are validators that have not voted plus those whose
//! result is still pending. The gate never times a round out; that belongs
//! to the caller.

use std::fmt;

use agora_core::error::MalformedInput;
use agora_core::proposal::{Proposal, ProposalStatus, ValidationTally};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuorumOutcome {
    Approved,
    Rejected,
    Pending,
}

impl fmt::Display for QuorumOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Pending => "pending",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumDecision {
    pub outcome: QuorumOutcome,
    pub validators: usize,
    pub threshold: usize,
    pub in_favor: usize,
    pub against: usize,
    pub outstanding: usize,
}

/// `ceil(2n / 3)`.
pub fn threshold(validators: usize) -> usize {
    (2 * validators).div_ceil(3)
}

/// Decide a round from a vote tally over `validators` validators.
///
/// Zero validators can never reach a decision and stay pending.
pub fn evaluate(validators: usize, tally: &ValidationTally) -> Result<QuorumDecision, MalformedInput> {
    if tally.total() > validators {
        return Err(MalformedInput::VoteCountExceedsValidators { votes: tally.total(), validators });
    }
    let cast = tally.in_favor + tally.against;
    let t = threshold(validators);
    let outstanding = validators - cast;
    let outcome = if validators == 0 {
        QuorumOutcome::Pending
    } else if tally.in_favor >= t {
        QuorumOutcome::Approved
    } else if tally.in_favor + outstanding < t {
        QuorumOutcome::Rejected
    } else {
        QuorumOutcome::Pending
    };
    Ok(QuorumDecision {
        outcome,
        validators,
        threshold: t,
        in_favor: tally.in_favor,
        against: tally.against,
        outstanding,
    })
}

/// Evaluate a validating proposal and move it to active or rejected once
/// the round is decided. A pending round leaves the proposal untouched.
pub fn finalize(proposal: &mut Proposal, validators: usize) -> Result<QuorumDecision, MalformedInput> {
    let decision = evaluate(validators, &proposal.tally())?;
    let next = match decision.outcome {
        QuorumOutcome::Approved => Some(ProposalStatus::Active),
        QuorumOutcome::Rejected => Some(ProposalStatus::Rejected),
        QuorumOutcome::Pending => None,
    };
    if let Some(next) = next {
        proposal.transition(next)?;
        tracing::info!(proposal = %proposal.id, outcome = %decision.outcome, threshold = decision.threshold, "quorum reached");
    }
    Ok(decision)
}
