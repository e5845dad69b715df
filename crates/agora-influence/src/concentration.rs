//! Gini coefficient and the concentration tax.
//!
//! ```text
//! gini = (2 * sum(i * x_i)) / (n * sum(x)) - (n + 1) / n      (i = 1..n, ascending)
//!      = sum((2i - n - 1) * x_i) / (n * sum(x))
//! ```
//!
//! The centred second form is evaluated: for integer-valued inputs it is
//! exact, and a constant distribution yields exactly zero.

use std::collections::BTreeMap;

use agora_core::constants::BPS_PRECISION;
use agora_core::error::{InvariantViolation, KernelError, ensure_finite};
use agora_core::policy::ConcentrationPolicy;
use agora_core::types::ParticipantId;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// Gini coefficient in `[0, 1)` of a non-negative distribution.
///
/// Empty, single-element and all-zero inputs give 0. A negative value is an
/// invariant violation; NaN and infinities are malformed input.
pub fn gini(values: &[f64]) -> Result<f64, KernelError> {
    for (index, &value) in values.iter().enumerate() {
        ensure_finite("gini input", value)?;
        if value < 0.0 {
            return Err(InvariantViolation::NegativeValue { index, value }.into());
        }
    }
    let n = values.len();
    let total: f64 = values.iter().sum();
    if n < 2 || total == 0.0 {
        return Ok(0.0);
    }

    let mut sorted: Vec<OrderedFloat<f64>> = values.iter().copied().map(OrderedFloat).collect();
    sorted.sort();
    if sorted[0] == sorted[n - 1] {
        return Ok(0.0);
    }

    let n_f = n as f64;
    let weighted: f64 = sorted
        .iter()
        .enumerate()
        .map(|(i, x)| (2.0 * (i as f64 + 1.0) - n_f - 1.0) * x.0)
        .sum();
    Ok((weighted / (n_f * total)).clamp(0.0, 1.0 - f64::EPSILON))
}

/// Size of the taxed top bracket: `ceil(n * bps / 10_000)`, in integers.
pub fn top_bracket_size(n: usize, top_bracket_bps: u32) -> usize {
    let precision = BPS_PRECISION as usize;
    (n * top_bracket_bps as usize).div_ceil(precision)
}

/// Outcome of assessing the concentration tax over a set of balances.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaxAssessment {
    pub gini: f64,
    /// Zero below the threshold.
    pub rate: f64,
    /// Amount owed by each taxed holder. Only the top bracket appears here.
    pub levies: BTreeMap<ParticipantId, f64>,
    /// Total owed; flows to the treasury.
    pub revenue: f64,
}

impl TaxAssessment {
    pub fn applies(&self) -> bool {
        !self.levies.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConcentrationControl {
    policy: ConcentrationPolicy,
}

impl ConcentrationControl {
    pub fn new(policy: ConcentrationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ConcentrationPolicy {
        &self.policy
    }

    /// Tax rate for a given Gini: `(gini - threshold) * multiplier`, capped at 1.
    pub fn rate(&self, gini: f64) -> f64 {
        if gini < self.policy.gini_threshold {
            return 0.0;
        }
        ((gini - self.policy.gini_threshold) * self.policy.tax_multiplier).clamp(0.0, 1.0)
    }

    /// Assess the tax over `balances`.
    ///
    /// The top bracket is taken by descending balance, ties broken by
    /// participant id. Everyone outside it is untouched.
    pub fn assess(&self, balances: &BTreeMap<ParticipantId, f64>) -> Result<TaxAssessment, KernelError> {
        let values: Vec<f64> = balances.values().copied().collect();
        let gini = gini(&values)?;
        let rate = self.rate(gini);
        if rate == 0.0 {
            return Ok(TaxAssessment { gini, rate, ..TaxAssessment::default() });
        }

        let mut ranked: Vec<(&ParticipantId, f64)> = balances.iter().map(|(p, b)| (p, *b)).collect();
        ranked.sort_by(|a, b| OrderedFloat(b.1).cmp(&OrderedFloat(a.1)).then_with(|| a.0.cmp(b.0)));

        let bracket = top_bracket_size(ranked.len(), self.policy.top_bracket_bps);
        let levies: BTreeMap<ParticipantId, f64> = ranked
            .into_iter()
            .take(bracket)
            .map(|(p, b)| (p.clone(), b * rate))
            .filter(|(_, levy)| *levy > 0.0)
            .collect();
        let revenue = levies.values().sum();
        tracing::info!(gini, rate, taxed = levies.len(), revenue, "concentration tax assessed");
        Ok(TaxAssessment { gini, rate, levies, revenue })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::error::MalformedInput;
    use proptest::prelude::*;

    fn balances(values: &[f64]) -> BTreeMap<ParticipantId, f64> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| (ParticipantId::new(format!("p{i}")), *v))
            .collect()
    }

    // --- gini ---

    #[test]
    fn degenerate_inputs_are_zero() {
        assert_eq!(gini(&[]).unwrap(), 0.0);
        assert_eq!(gini(&[7.0]).unwrap(), 0.0);
        assert_eq!(gini(&[0.0, 0.0, 0.0]).unwrap(), 0.0);
        assert_eq!(gini(&[3.3, 3.3, 3.3, 3.3]).unwrap(), 0.0);
    }

    #[test]
    fn known_values() {
        assert!((gini(&[10.0, 10.0, 10.0, 10.0, 60.0]).unwrap() - 0.4).abs() < 1e-12);
        assert!((gini(&[1.0, 1.0, 1.0, 1.0, 96.0]).unwrap() - 0.76).abs() < 1e-12);
        assert!((gini(&[0.0, 0.0, 0.0, 1.0]).unwrap() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn order_does_not_matter() {
        assert_eq!(gini(&[60.0, 10.0, 10.0, 10.0, 10.0]).unwrap(), gini(&[10.0, 10.0, 60.0, 10.0, 10.0]).unwrap());
    }

    #[test]
    fn negative_value_is_invariant_violation() {
        let err = gini(&[1.0, -2.0]).unwrap_err();
        assert_eq!(err, KernelError::Invariant(InvariantViolation::NegativeValue { index: 1, value: -2.0 }));
    }

    #[test]
    fn nan_is_malformed() {
        let err = gini(&[1.0, f64::NAN]).unwrap_err();
        assert!(matches!(err, KernelError::Malformed(MalformedInput::NonFinite { .. })));
    }

    // --- bracket ---

    #[test]
    fn bracket_rounds_up() {
        assert_eq!(top_bracket_size(5, 2000), 1);
        assert_eq!(top_bracket_size(6, 2000), 2);
        assert_eq!(top_bracket_size(10, 2000), 2);
        assert_eq!(top_bracket_size(1, 2000), 1);
        assert_eq!(top_bracket_size(0, 2000), 0);
    }

    // --- tax ---

    #[test]
    fn below_threshold_no_tax() {
        let t = ConcentrationControl::default().assess(&balances(&[10.0, 10.0, 10.0, 10.0, 60.0])).unwrap();
        assert!(!t.applies());
        assert_eq!(t.rate, 0.0);
        assert_eq!(t.revenue, 0.0);
    }

    #[test]
    fn above_threshold_taxes_only_top_holder() {
        let t = ConcentrationControl::default().assess(&balances(&[1.0, 1.0, 1.0, 1.0, 96.0])).unwrap();
        assert!((t.rate - 0.32).abs() < 1e-12);
        assert_eq!(t.levies.len(), 1);
        let levy = t.levies[&ParticipantId::new("p4")];
        assert!((levy - 96.0 * 0.32).abs() < 1e-9);
        assert_eq!(t.revenue, levy);
    }

    #[test]
    fn ties_break_by_id() {
        let mut policy = ConcentrationPolicy::default();
        policy.gini_threshold = 0.1;
        let t = ConcentrationControl::new(policy).assess(&balances(&[0.0, 0.0, 0.0, 50.0, 50.0])).unwrap();
        assert_eq!(t.levies.keys().cloned().collect::<Vec<_>>(), vec![ParticipantId::new("p3")]);
    }

    #[test]
    fn rate_caps_at_one() {
        let mut policy = ConcentrationPolicy::default();
        policy.tax_multiplier = 100.0;
        assert_eq!(ConcentrationControl::new(policy).rate(0.9), 1.0);
    }

    proptest! {
        #[test]
        fn gini_in_unit_interval(values in prop::collection::vec(0.0f64..1e9, 0..64)) {
            let g = gini(&values).unwrap();
            prop_assert!((0.0..1.0).contains(&g));
        }

        #[test]
        fn gini_of_constant_is_zero(x in 0.0f64..1e9, n in 1usize..64) {
            prop_assert_eq!(gini(&vec![x; n]).unwrap(), 0.0);
        }

        #[test]
        fn bottom_holders_never_taxed(values in prop::collection::vec(0.0f64..1e6, 1..40)) {
            let b = balances(&values);
            let t = ConcentrationControl::default().assess(&b).unwrap();
            prop_assert!(t.levies.len() <= top_bracket_size(values.len(), 2000));
            prop_assert!(t.revenue <= b.values().sum::<f64>());
        }
    }
}
