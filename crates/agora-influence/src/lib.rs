//! # agora-influence: Accuracy, influence and concentration control.
//!
//! Every function here is pure and deterministic over `f64`, with maps keyed
//! in sorted order so summation order never depends on input order.
//!
//! - **Accuracy**: a resolved prediction scores 1.0 inside its tolerance
//!   window, falling linearly to 0.0 at the penalty cap.
//! - **Influence delta**: `stake * accuracy * (vitality / supply) / ln(influence + 10)`.
//!   Larger holders gain less per unit stake.
//! - **Gini tax**: when inequality reaches the threshold, the top bracket of
//!   holders pays `(gini - threshold) * multiplier` of their balance to the treasury.
//! - **Settlement**: a resolution round combines gains, slashes and the tax,
//!   and is rejected wholesale unless participant deltas, the treasury delta
//!   and explicit burns sum to zero.

pub mod accuracy;
pub mod concentration;
pub mod engine;
pub mod settlement;

pub use accuracy::accuracy;
pub use concentration::{ConcentrationControl, TaxAssessment, gini};
pub use engine::InfluenceEngine;
pub use settlement::{Resolution, RoundInput, RoundSettlement, Settlement, SlashOrder, verify_zero_sum};
