//! Resolution-round settlement under the zero-sum law.
//!
//! A round moves influence three ways, all against pre-round balances:
//!
//! 1. **Gains.** Each resolved prediction earns an influence delta, funded
//!    from the treasury. If the treasury cannot cover every gain, all gains
//!    are scaled down by the same factor.
//! 2. **Slashes.** A slashed amount leaves the participant and either enters
//!    the treasury or is burned, per policy. Burns are reported explicitly.
//! 3. **Concentration tax.** Assessed on the projected balances after gains
//!    and slashes; revenue enters the treasury.
//!
//! The round is accepted only if `|sum(deltas) + treasury_delta + burned| < epsilon`
//! and no balance (treasury included) would go negative. Otherwise it is
//! rejected whole; nothing is partially applied.

use std::collections::{BTreeMap, BTreeSet};

use agora_core::error::{InvariantViolation, KernelError, MalformedInput, ensure_non_negative};
use agora_core::policy::{InfluencePolicy, KernelPolicy, SlashDestination};
use agora_core::proposal::Prediction;
use agora_core::traits::InfluenceCalculator;
use agora_core::types::{ParticipantId, ParticipantInfluenceRecord, PredictionId};
use serde::{Deserialize, Serialize};

use crate::concentration::{ConcentrationControl, TaxAssessment};
use crate::engine::InfluenceEngine;

const TREASURY: &str = "treasury";

/// A resolved prediction and the stake its author placed on it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Resolution {
    pub participant: ParticipantId,
    pub prediction: Prediction,
    pub stake: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SlashOrder {
    pub participant: ParticipantId,
    /// Fraction of the participant's projected balance to remove, in `[0, 1]`.
    pub percent: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Everything one round consumes.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RoundInput {
    pub participants: Vec<ParticipantInfluenceRecord>,
    pub treasury: f64,
    pub global_vitality: f64,
    #[serde(default)]
    pub resolutions: Vec<Resolution>,
    #[serde(default)]
    pub slashes: Vec<SlashOrder>,
}

/// An accepted round. Apply it with [`Settlement::apply`] or discard it.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Settlement {
    /// Net change per participant. Every participant in the round appears.
    pub deltas: BTreeMap<ParticipantId, f64>,
    pub treasury_delta: f64,
    /// Influence removed from supply by slashing with the burn destination.
    pub burned: f64,
    pub accuracies: BTreeMap<PredictionId, f64>,
    /// Gains after any funding scale-down.
    pub gains: BTreeMap<ParticipantId, f64>,
    pub slashed: BTreeMap<ParticipantId, f64>,
    /// 1.0 when the treasury covered every gain.
    pub funding_scale: f64,
    pub tax: TaxAssessment,
}

impl Settlement {
    /// `sum(deltas) + treasury_delta + burned`. Zero up to rounding.
    pub fn imbalance(&self) -> f64 {
        self.deltas.values().sum::<f64>() + self.treasury_delta + self.burned
    }

    /// Produce updated records and treasury balance. `participants` must be
    /// the snapshot the round was settled against.
    pub fn apply(
        &self,
        participants: &[ParticipantInfluenceRecord],
        treasury: f64,
    ) -> Result<(Vec<ParticipantInfluenceRecord>, f64), KernelError> {
        let known: BTreeSet<&ParticipantId> = participants.iter().map(|r| &r.participant).collect();
        if let Some(missing) = self.deltas.keys().find(|p| !known.contains(p)) {
            return Err(MalformedInput::UnknownParticipant(missing.to_string()).into());
        }
        let updated = participants
            .iter()
            .map(|r| {
                let delta = self.deltas.get(&r.participant).copied().unwrap_or(0.0);
                let mut next = r.clone();
                // Rounding residue below epsilon is clamped; the round already passed the check.
                next.influence = (r.influence + delta).max(0.0);
                next
            })
            .collect();
        Ok((updated, (treasury + self.treasury_delta).max(0.0)))
    }
}

/// Check the zero-sum law. Returns the imbalance on success.
pub fn verify_zero_sum(
    deltas: impl IntoIterator<Item = f64>,
    treasury_delta: f64,
    burned: f64,
    epsilon: f64,
) -> Result<f64, InvariantViolation> {
    let imbalance = deltas.into_iter().sum::<f64>() + treasury_delta + burned;
    if !imbalance.is_finite() || imbalance.abs() >= epsilon {
        return Err(InvariantViolation::ZeroSum { imbalance, epsilon });
    }
    Ok(imbalance)
}

/// Settles resolution rounds with a pluggable [`InfluenceCalculator`].
#[derive(Debug, Clone)]
pub struct RoundSettlement<C = InfluenceEngine> {
    calculator: C,
    policy: InfluencePolicy,
    concentration: ConcentrationControl,
}

impl RoundSettlement<InfluenceEngine> {
    pub fn new(policy: &KernelPolicy) -> Self {
        Self::with_calculator(InfluenceEngine::new(policy.influence.clone()), policy)
    }
}

impl Default for RoundSettlement<InfluenceEngine> {
    fn default() -> Self {
        Self::new(&KernelPolicy::default())
    }
}

impl<C: InfluenceCalculator> RoundSettlement<C> {
    pub fn with_calculator(calculator: C, policy: &KernelPolicy) -> Self {
        Self {
            calculator,
            policy: policy.influence.clone(),
            concentration: ConcentrationControl::new(policy.concentration.clone()),
        }
    }

    pub fn calculator(&self) -> &C {
        &self.calculator
    }

    /// Compute a round. Pure: the caller applies the result or discards it.
    pub fn settle(&self, input: &RoundInput) -> Result<Settlement, KernelError> {
        let treasury = ensure_non_negative("treasury", input.treasury)?;
        let vitality = ensure_non_negative("global_vitality", input.global_vitality)?;

        let mut balances: BTreeMap<ParticipantId, f64> = BTreeMap::new();
        for r in &input.participants {
            let influence = ensure_non_negative("influence", r.influence)?;
            if balances.insert(r.participant.clone(), influence).is_some() {
                return Err(MalformedInput::DuplicateId(r.participant.to_string()).into());
            }
        }
        let balance_of = |p: &ParticipantId| {
            balances
                .get(p)
                .copied()
                .ok_or_else(|| MalformedInput::UnknownParticipant(p.to_string()))
        };

        // Gains.
        let mut accuracies = BTreeMap::new();
        let mut gains: BTreeMap<ParticipantId, f64> = BTreeMap::new();
        for res in &input.resolutions {
            let current = balance_of(&res.participant)?;
            let acc = self.calculator.prediction_accuracy(&res.prediction)?;
            if accuracies.insert(res.prediction.id.clone(), acc).is_some() {
                return Err(MalformedInput::DuplicateId(res.prediction.id.to_string()).into());
            }
            let delta = self.calculator.influence_delta(acc, res.stake, current, vitality)?;
            *gains.entry(res.participant.clone()).or_insert(0.0) += delta;
        }

        let requested: f64 = gains.values().sum();
        let funding_scale = if requested > treasury && requested > 0.0 {
            let scale = treasury / requested;
            tracing::warn!(requested, treasury, scale, "treasury short, gains scaled down");
            for g in gains.values_mut() {
                *g *= scale;
            }
            scale
        } else {
            1.0
        };

        let mut deltas: BTreeMap<ParticipantId, f64> = balances.keys().map(|p| (p.clone(), 0.0)).collect();
        let mut treasury_delta = 0.0;
        for (p, g) in &gains {
            if let Some(d) = deltas.get_mut(p) {
                *d += g;
            }
            treasury_delta -= g;
        }

        // Slashes.
        let mut burned = 0.0;
        let mut slashed: BTreeMap<ParticipantId, f64> = BTreeMap::new();
        for order in &input.slashes {
            let base = balance_of(&order.participant)?;
            let Some(delta) = deltas.get_mut(&order.participant) else {
                return Err(MalformedInput::UnknownParticipant(order.participant.to_string()).into());
            };
            let outcome = self.calculator.slash(base + *delta, order.percent)?;
            *delta -= outcome.slashed;
            *slashed.entry(order.participant.clone()).or_insert(0.0) += outcome.slashed;
            match self.policy.slash_destination {
                SlashDestination::Treasury => treasury_delta += outcome.slashed,
                SlashDestination::Burn => burned += outcome.slashed,
            }
            tracing::debug!(participant = %order.participant, amount = outcome.slashed, reason = ?order.reason, "slashed");
        }

        // Concentration tax on projected balances.
        let projected: BTreeMap<ParticipantId, f64> = balances
            .iter()
            .map(|(p, b)| (p.clone(), (b + deltas.get(p).copied().unwrap_or(0.0)).max(0.0)))
            .collect();
        let tax = self.concentration.assess(&projected)?;
        for (p, levy) in &tax.levies {
            if let Some(d) = deltas.get_mut(p) {
                *d -= levy;
            }
        }
        treasury_delta += tax.revenue;

        let epsilon = self.policy.zero_sum_epsilon;
        if let Err(violation) = verify_zero_sum(deltas.values().copied(), treasury_delta, burned, epsilon) {
            tracing::warn!(%violation, "round rejected");
            return Err(violation.into());
        }
        for (p, d) in &deltas {
            let after = balances.get(p).copied().unwrap_or(0.0) + d;
            if after < -epsilon {
                return Err(InvariantViolation::NegativeBalance { participant: p.to_string(), balance: after }.into());
            }
        }
        if treasury + treasury_delta < -epsilon {
            return Err(InvariantViolation::NegativeBalance {
                participant: TREASURY.into(),
                balance: treasury + treasury_delta,
            }
            .into());
        }

        tracing::info!(
            participants = deltas.len(),
            resolutions = input.resolutions.len(),
            treasury_delta,
            burned,
            taxed = tax.levies.len(),
            "round settled"
        );
        Ok(Settlement { deltas, treasury_delta, burned, accuracies, gains, slashed, funding_scale, tax })
    }
}
