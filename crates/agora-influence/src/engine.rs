//! Influence engine implementing the [`InfluenceCalculator`] trait.
//!
//! Wraps [`accuracy`](crate::accuracy::accuracy) and the diminishing-returns
//! delta with the policy's penalty cap and global supply.

use agora_core::constants::DIMINISHING_RETURNS_OFFSET;
use agora_core::error::{MalformedInput, ensure_finite, ensure_non_negative};
use agora_core::policy::InfluencePolicy;
use agora_core::traits::{InfluenceCalculator, SlashOutcome};

use crate::accuracy::accuracy;

fn ensure_unit(field: &'static str, value: f64) -> Result<f64, MalformedInput> {
    let value = ensure_finite(field, value)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(MalformedInput::OutOfUnitRange { field, value });
    }
    Ok(value)
}

/// The production influence calculator.
#[derive(Debug, Clone, Default)]
pub struct InfluenceEngine {
    policy: InfluencePolicy,
}

impl InfluenceEngine {
    pub fn new(policy: InfluencePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &InfluencePolicy {
        &self.policy
    }

    /// `1 / ln(current_influence + 10)`.
    pub fn diminishing_factor(current_influence: f64) -> f64 {
        1.0 / (current_influence + DIMINISHING_RETURNS_OFFSET).ln()
    }
}

impl InfluenceCalculator for InfluenceEngine {
    fn accuracy(&self, predicted: f64, actual: f64, tolerance: f64) -> Result<f64, MalformedInput> {
        accuracy(predicted, actual, tolerance, self.policy.max_penalty)
    }

    fn influence_delta(
        &self,
        accuracy: f64,
        stake: f64,
        current_influence: f64,
        global_vitality: f64,
    ) -> Result<f64, MalformedInput> {
        let accuracy = ensure_unit("accuracy", accuracy)?;
        let stake = ensure_non_negative("stake", stake)?;
        let current = ensure_non_negative("current_influence", current_influence)?;
        let vitality = ensure_non_negative("global_vitality", global_vitality)?;

        let delta = stake * accuracy * (vitality / self.policy.global_supply) * Self::diminishing_factor(current);
        ensure_finite("influence_delta", delta)
    }

    fn slash(&self, influence: f64, percent: f64) -> Result<SlashOutcome, MalformedInput> {
        let influence = ensure_non_negative("influence", influence)?;
        let percent = ensure_unit("percent", percent)?;
        let retained = influence * (1.0 - percent);
        // Derive the slashed part from the retained one so the two sum back exactly.
        Ok(SlashOutcome { retained, slashed: influence - retained })
    }
}
