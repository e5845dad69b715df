//! # agora-consensus: Validator-side checks.
//!
//! Both components work over the validator vote stream, independently of
//! clustering and the influence economy.
//!
//! - **Quorum gate**: a round is approved once votes in favour reach
//!   `ceil(2n/3)`, rejected once that is out of reach, pending otherwise.
//! - **Collusion detector**: pairwise cosine similarity over encoded vote
//!   histories marks validators that move in lockstep with a large share of
//!   their peers, and raises a cartel flag only when those validators are
//!   themselves a large share of the population.

pub mod collusion;
pub mod quorum;

pub use collusion::{CollusionDetector, CollusionReport, cosine_similarity, encode_votes};
pub use quorum::{QuorumDecision, QuorumOutcome, evaluate, finalize, threshold};
