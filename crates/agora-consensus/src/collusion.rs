//! Collusion detection over validator vote histories.
//!
//! 1. Encode each history as a numeric vector (see [`VoteEncoding`]).
//! 2. Cosine similarity for every validator pair, over the common prefix of
//!    the two histories. A zero vector has similarity 0 with everything.
//! 3. A validator is suspicious when its similarity is strictly above the
//!    threshold with at least `peer_fraction` of the other validators.
//! 4. A cartel is flagged when the suspicious set is at least
//!    `population_fraction` of all validators.
//!
//! Both fraction checks compare integers in basis points, so the `>=`
//! boundaries are exact.

use std::collections::{BTreeMap, BTreeSet};

use agora_core::constants::BPS_PRECISION;
use agora_core::error::MalformedInput;
use agora_core::policy::{CollusionPolicy, VoteEncoding};
use agora_core::types::{ValidatorId, ValidatorVoteRecord, VoteChoice};
use serde::{Deserialize, Serialize};

/// Cosine similarity over the common prefix of `a` and `b`.
///
/// 0 when either prefix has zero norm, or the prefix is empty.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let len = a.len().min(b.len());
    let (a, b) = (&a[..len], &b[..len]);
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f64 = a.iter().map(|x| x * x).sum();
    let nb: f64 = b.iter().map(|x| x * x).sum();
    // One square root of the product keeps identical ±1 vectors at exactly 1.
    let denom = (na * nb).sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }
    (dot / denom).clamp(-1.0, 1.0)
}

/// Majority vote of round `round` among validators that voted in it.
/// `None` on a tie.
fn round_majority(records: &[ValidatorVoteRecord], round: usize) -> Option<VoteChoice> {
    let sum: i64 = records
        .iter()
        .filter_map(|r| r.votes().get(round))
        .map(|v| match v {
            VoteChoice::Approve => 1,
            VoteChoice::Reject => -1,
        })
        .sum();
    match sum.signum() {
        1 => Some(VoteChoice::Approve),
        -1 => Some(VoteChoice::Reject),
        _ => None,
    }
}

/// Encode every history under `encoding`. Output is aligned with `records`.
pub fn encode_votes(records: &[ValidatorVoteRecord], encoding: VoteEncoding) -> Vec<Vec<f64>> {
    match encoding {
        VoteEncoding::Raw => records
            .iter()
            .map(|r| r.votes().iter().map(VoteChoice::as_signed).collect())
            .collect(),
        VoteEncoding::Dissent => {
            let rounds = records.iter().map(|r| r.rounds()).max().unwrap_or(0);
            let majorities: Vec<Option<VoteChoice>> = (0..rounds).map(|i| round_majority(records, i)).collect();
            records
                .iter()
                .map(|r| {
                    r.votes()
                        .iter()
                        .zip(&majorities)
                        .map(|(v, m)| match m {
                            Some(m) if m != v => v.as_signed(),
                            _ => 0.0,
                        })
                        .collect()
                })
                .collect()
        }
    }
}

/// `part / whole >= bps / 10_000`, in integers. False when `whole` is zero.
pub fn meets_fraction(part: usize, whole: usize, bps: u32) -> bool {
    whole > 0 && part as u128 * BPS_PRECISION as u128 >= bps as u128 * whole as u128
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarPair {
    pub a: ValidatorId,
    pub b: ValidatorId,
    pub similarity: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CollusionReport {
    pub validators: usize,
    /// Pairs above the similarity threshold, `a < b`.
    pub similar_pairs: Vec<SimilarPair>,
    pub suspicious: BTreeSet<ValidatorId>,
    pub cartel_detected: bool,
}

#[derive(Debug, Clone, Default)]
pub struct CollusionDetector {
    policy: CollusionPolicy,
}

impl CollusionDetector {
    pub fn new(policy: CollusionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CollusionPolicy {
        &self.policy
    }

    /// Run one detection sweep. Validator ids must be unique.
    ///
    /// Fewer than two validators gives an empty report.
    pub fn detect(&self, records: &[ValidatorVoteRecord]) -> Result<CollusionReport, MalformedInput> {
        let mut sorted: Vec<&ValidatorVoteRecord> = records.iter().collect();
        sorted.sort_by(|a, b| a.validator.cmp(&b.validator));
        for pair in sorted.windows(2) {
            if pair[0].validator == pair[1].validator {
                return Err(MalformedInput::DuplicateId(pair[0].validator.to_string()));
            }
        }
        let n = sorted.len();
        if n < 2 {
            return Ok(CollusionReport { validators: n, ..CollusionReport::default() });
        }

        let owned: Vec<ValidatorVoteRecord> = sorted.iter().map(|r| (*r).clone()).collect();
        let vectors = encode_votes(&owned, self.policy.encoding);

        let mut high: BTreeMap<usize, usize> = BTreeMap::new();
        let mut similar_pairs = Vec::new();
        for i in 0..n {
            for j in (i + 1)..n {
                let similarity = cosine_similarity(&vectors[i], &vectors[j]);
                if similarity > self.policy.similarity_threshold {
                    *high.entry(i).or_insert(0) += 1;
                    *high.entry(j).or_insert(0) += 1;
                    similar_pairs.push(SimilarPair {
                        a: owned[i].validator.clone(),
                        b: owned[j].validator.clone(),
                        similarity,
                    });
                }
            }
        }

        let suspicious: BTreeSet<ValidatorId> = high
            .iter()
            .filter(|&(_, &count)| meets_fraction(count, n - 1, self.policy.peer_fraction_bps))
            .map(|(&i, _)| owned[i].validator.clone())
            .collect();
        let cartel_detected = meets_fraction(suspicious.len(), n, self.policy.population_fraction_bps);

        if cartel_detected {
            tracing::warn!(validators = n, suspicious = suspicious.len(), "cartel detected");
        } else {
            tracing::debug!(validators = n, suspicious = suspicious.len(), pairs = similar_pairs.len(), "collusion sweep clean");
        }
        Ok(CollusionReport { validators: n, similar_pairs, suspicious, cartel_detected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const A: VoteChoice = VoteChoice::Approve;
    const R: VoteChoice = VoteChoice::Reject;

    fn pattern(rounds: usize) -> Vec<VoteChoice> {
        (0..rounds).map(|i| if i % 3 == 0 { R } else { A }).collect()
    }

    fn flip(votes: &[VoteChoice]) -> Vec<VoteChoice> {
        votes.iter().map(|v| if *v == A { R } else { A }).collect()
    }

    fn record(id: &str, votes: Vec<VoteChoice>) -> ValidatorVoteRecord {
        ValidatorVoteRecord::new(id.into(), votes)
    }

    /// `majority` validators vote `pattern`, `bloc` validators vote its opposite.
    fn split(majority: usize, bloc: usize, rounds: usize) -> Vec<ValidatorVoteRecord> {
        let base = pattern(rounds);
        let mut out: Vec<_> = (0..majority).map(|i| record(&format!("m{i:02}"), base.clone())).collect();
        out.extend((0..bloc).map(|i| record(&format!("b{i:02}"), flip(&base))));
        out
    }

    // --- cosine ---

    #[test]
    fn cosine_basics() {
        assert_eq!(cosine_similarity(&[1.0, -1.0], &[1.0, -1.0]), 1.0);
        assert_eq!(cosine_similarity(&[1.0, -1.0], &[-1.0, 1.0]), -1.0);
        assert_eq!(cosine_similarity(&[1.0, 1.0], &[1.0, -1.0]), 0.0);
    }

    #[test]
    fn cosine_zero_vector_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn cosine_uses_common_prefix() {
        assert_eq!(cosine_similarity(&[1.0, -1.0], &[1.0, -1.0, 1.0, 1.0]), 1.0);
    }

    // --- encoding ---

    #[test]
    fn dissent_zeroes_majority_votes() {
        let records = vec![record("x", vec![A, A]), record("y", vec![A, R]), record("z", vec![R, R])];
        let v = encode_votes(&records, VoteEncoding::Dissent);
        assert_eq!(v[0], vec![0.0, 1.0]);
        assert_eq!(v[1], vec![0.0, 0.0]);
        assert_eq!(v[2], vec![-1.0, 0.0]);
    }

    #[test]
    fn dissent_ties_encode_zero() {
        let records = vec![record("x", vec![A]), record("y", vec![R])];
        let v = encode_votes(&records, VoteEncoding::Dissent);
        assert_eq!(v, vec![vec![0.0], vec![0.0]]);
    }

    // --- detection ---

    #[test]
    fn seven_three_split_not_flagged() {
        let report = CollusionDetector::default().detect(&split(7, 3, 12)).unwrap();
        // Each bloc member matches 2 of 9 peers, below 30%.
        assert!(report.suspicious.is_empty());
        assert!(!report.cartel_detected);
        assert_eq!(report.similar_pairs.len(), 3);
    }

    #[test]
    fn raw_encoding_flags_the_majority() {
        let mut policy = CollusionPolicy::default();
        policy.encoding = VoteEncoding::Raw;
        let report = CollusionDetector::new(policy).detect(&split(7, 3, 12)).unwrap();
        assert_eq!(report.suspicious.len(), 7);
        assert!(report.cartel_detected);
    }

    #[test]
    fn bloc_at_exactly_thirty_percent_of_peers_flags() {
        // 11 validators: each of the 4 bloc members matches 3 of 10 peers (30%),
        // and 4 of 11 suspicious is above 30% of the population.
        let report = CollusionDetector::default().detect(&split(7, 4, 12)).unwrap();
        assert_eq!(report.suspicious.len(), 4);
        assert!(report.suspicious.iter().all(|v| v.as_str().starts_with('b')));
        assert!(report.cartel_detected);
    }

    #[test]
    fn population_boundary_is_inclusive() {
        assert!(meets_fraction(3, 10, 3000));
        assert!(!meets_fraction(2, 10, 3000));
        assert!(meets_fraction(3, 9, 3000));
        assert!(!meets_fraction(2, 9, 3000));
        assert!(!meets_fraction(0, 0, 3000));
    }

    #[test]
    fn lone_pair_does_not_trip_alarm() {
        let report = CollusionDetector::default().detect(&split(10, 2, 12)).unwrap();
        assert_eq!(report.similar_pairs.len(), 1);
        assert!(report.suspicious.is_empty());
        assert!(!report.cartel_detected);
    }

    #[test]
    fn unequal_lengths_tolerated() {
        let records = vec![
            record("a", vec![A, R, A, R, A]),
            record("b", vec![A, R, A]),
            record("c", vec![R, A, R, A, R, A]),
        ];
        let report = CollusionDetector::default().detect(&records).unwrap();
        assert_eq!(report.validators, 3);
    }

    #[test]
    fn degenerate_inputs() {
        let d = CollusionDetector::default();
        assert_eq!(d.detect(&[]).unwrap(), CollusionReport::default());
        let one = d.detect(&[record("a", vec![A])]).unwrap();
        assert_eq!(one.validators, 1);
        assert!(!one.cartel_detected);
        let silent = d.detect(&[record("a", vec![]), record("b", vec![])]).unwrap();
        assert!(silent.similar_pairs.is_empty());
    }

    #[test]
    fn duplicate_validator_rejected() {
        let records = vec![record("a", vec![A]), record("a", vec![R])];
        assert_eq!(
            CollusionDetector::default().detect(&records),
            Err(MalformedInput::DuplicateId("a".into()))
        );
    }

    #[test]
    fn report_independent_of_input_order() {
        let mut records = split(7, 4, 12);
        let a = CollusionDetector::default().detect(&records).unwrap();
        records.reverse();
        let b = CollusionDetector::default().detect(&records).unwrap();
        assert_eq!(a, b);
    }

    proptest! {
        #[test]
        fn cosine_bounded_and_symmetric(
            a in prop::collection::vec(-1.0f64..=1.0, 0..32),
            b in prop::collection::vec(-1.0f64..=1.0, 0..32),
        ) {
            let s = cosine_similarity(&a, &b);
            prop_assert!(s.is_finite());
            prop_assert!((-1.0..=1.0).contains(&s));
            prop_assert_eq!(s, cosine_similarity(&b, &a));
        }
    }
}
