//! Kernel policy: every threshold and coefficient the engines consult.
//!
//! A [`KernelPolicy`] is constructed explicitly and passed into each engine,
//! so two engines with different constants can run side by side. The struct
//! deserializes from TOML/JSON with every field optional, falling back to the
//! defaults in [`constants`](crate::constants).

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::MalformedInput;

/// Per-signal weighting and priority thresholds for level-1 clusters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterPolicy {
    /// Minimum signals in a (cell, category) group before a cluster forms.
    pub min_signals: usize,
    /// Weight per attestation before the contribution floor applies.
    pub attestation_coefficient: f64,
    /// Multiplier on a signal's influence-weight contribution.
    pub influence_coefficient: f64,
    /// Floor on the attestation part of a signal's contribution.
    pub min_contribution: f64,
    /// Weight at or above which a cluster becomes priority.
    pub gravity_threshold: f64,
    /// Member count at or above which a cluster becomes priority.
    pub priority_signal_count: usize,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self {
            min_signals: MIN_CLUSTER_SIGNALS,
            attestation_coefficient: ATTESTATION_COEFFICIENT,
            influence_coefficient: INFLUENCE_COEFFICIENT,
            min_contribution: MIN_SIGNAL_CONTRIBUTION,
            gravity_threshold: GRAVITY_THRESHOLD,
            priority_signal_count: PRIORITY_SIGNAL_COUNT,
        }
    }
}

/// Thresholds to promote a grouping from one level to the next.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelThresholds {
    pub min_child_clusters: usize,
    pub min_total_weight: f64,
    /// Hard floor: never satisfied by weight alone.
    pub min_signals: usize,
}

/// Hierarchical promotion policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromotionPolicy {
    /// `thresholds[L - 1]` gates promotion from level `L` to `L + 1`.
    pub thresholds: [LevelThresholds; 3],
    /// Highest level that promotions reach automatically. Levels above are
    /// computed and reported but wait for an explicit trigger.
    pub max_enabled_level: u8,
}

impl Default for PromotionPolicy {
    fn default() -> Self {
        let at = |i: usize| LevelThresholds {
            min_child_clusters: MIN_CHILD_CLUSTERS[i],
            min_total_weight: MIN_TOTAL_WEIGHT[i],
            min_signals: MIN_SIGNALS[i],
        };
        Self {
            thresholds: [at(0), at(1), at(2)],
            max_enabled_level: DEFAULT_MAX_ENABLED_LEVEL,
        }
    }
}

impl PromotionPolicy {
    /// Thresholds for promoting *from* `level`. `None` for level 4 and above.
    pub fn from_level(&self, level: u8) -> Option<&LevelThresholds> {
        match level {
            1..=3 => self.thresholds.get(level as usize - 1),
            _ => None,
        }
    }

    /// Whether promotions *into* `level` are applied without a trigger.
    pub fn is_enabled(&self, level: u8) -> bool {
        level <= self.max_enabled_level
    }
}

/// Where slashed influence goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SlashDestination {
    #[default]
    Treasury,
    /// Removed from supply, reported as an explicit burn.
    Burn,
}

/// Accuracy scoring and influence economy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfluencePolicy {
    pub tolerance: f64,
    pub max_penalty: f64,
    pub global_supply: f64,
    pub zero_sum_epsilon: f64,
    pub slash_destination: SlashDestination,
}

impl Default for InfluencePolicy {
    fn default() -> Self {
        Self {
            tolerance: ACCURACY_TOLERANCE,
            max_penalty: ACCURACY_MAX_PENALTY,
            global_supply: GLOBAL_INFLUENCE_SUPPLY,
            zero_sum_epsilon: ZERO_SUM_EPSILON,
            slash_destination: SlashDestination::Treasury,
        }
    }
}

/// Gini tax policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcentrationPolicy {
    pub gini_threshold: f64,
    pub tax_multiplier: f64,
    pub top_bracket_bps: u32,
}

impl Default for ConcentrationPolicy {
    fn default() -> Self {
        Self {
            gini_threshold: GINI_TAX_THRESHOLD,
            tax_multiplier: GINI_TAX_MULTIPLIER,
            top_bracket_bps: GINI_TOP_BRACKET_BPS,
        }
    }
}

/// How vote vectors are turned into numbers before similarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum VoteEncoding {
    /// approve = +1, reject = -1 on every round.
    Raw,
    /// ±1 only on rounds where the vote departs from the round majority, else 0.
    #[default]
    Dissent,
}

/// Collusion detector policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollusionPolicy {
    /// Similarity strictly above this counts as "highly similar".
    pub similarity_threshold: f64,
    /// Share of other validators needed to mark a validator suspicious (≥).
    pub peer_fraction_bps: u32,
    /// Share of the population that must be suspicious to flag a cartel (≥).
    pub population_fraction_bps: u32,
    pub encoding: VoteEncoding,
}

impl Default for CollusionPolicy {
    fn default() -> Self {
        Self {
            similarity_threshold: COLLUSION_SIMILARITY_THRESHOLD,
            peer_fraction_bps: COLLUSION_PEER_FRACTION_BPS,
            population_fraction_bps: CARTEL_POPULATION_FRACTION_BPS,
            encoding: VoteEncoding::default(),
        }
    }
}

/// The full set of policy constants for one kernel instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct KernelPolicy {
    pub cluster: ClusterPolicy,
    pub promotion: PromotionPolicy,
    pub influence: InfluencePolicy,
    pub concentration: ConcentrationPolicy,
    pub collusion: CollusionPolicy,
}

fn invalid(msg: impl Into<String>) -> MalformedInput {
    MalformedInput::InvalidPolicy(msg.into())
}

fn check_non_negative(name: &str, v: f64) -> Result<(), MalformedInput> {
    if !v.is_finite() || v < 0.0 {
        return Err(invalid(format!("{name} must be finite and non-negative, got {v}")));
    }
    Ok(())
}

fn check_bps(name: &str, v: u32) -> Result<(), MalformedInput> {
    if v == 0 || v > BPS_PRECISION {
        return Err(invalid(format!("{name} must lie in (0, {BPS_PRECISION}] bps, got {v}")));
    }
    Ok(())
}

impl KernelPolicy {
    /// Reject incoherent policies before any engine uses them.
    pub fn validate(&self) -> Result<(), MalformedInput> {
        let c = &self.cluster;
        if c.min_signals == 0 {
            return Err(invalid("cluster.min_signals must be at least 1"));
        }
        check_non_negative("cluster.attestation_coefficient", c.attestation_coefficient)?;
        check_non_negative("cluster.influence_coefficient", c.influence_coefficient)?;
        check_non_negative("cluster.min_contribution", c.min_contribution)?;
        check_non_negative("cluster.gravity_threshold", c.gravity_threshold)?;

        let p = &self.promotion;
        if !(1..=MAX_LEVEL).contains(&p.max_enabled_level) {
            return Err(invalid(format!(
                "promotion.max_enabled_level must lie in 1..={MAX_LEVEL}, got {}",
                p.max_enabled_level
            )));
        }
        for t in &p.thresholds {
            check_non_negative("promotion.min_total_weight", t.min_total_weight)?;
        }
        for pair in p.thresholds.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if lo.min_child_clusters >= hi.min_child_clusters
                || lo.min_total_weight >= hi.min_total_weight
                || lo.min_signals >= hi.min_signals
            {
                return Err(invalid("promotion thresholds must strictly increase with level"));
            }
        }

        let i = &self.influence;
        check_non_negative("influence.tolerance", i.tolerance)?;
        check_non_negative("influence.max_penalty", i.max_penalty)?;
        if i.tolerance >= i.max_penalty {
            return Err(invalid("influence.tolerance must be below influence.max_penalty"));
        }
        if !i.global_supply.is_finite() || i.global_supply <= 0.0 {
            return Err(invalid("influence.global_supply must be positive"));
        }
        if !i.zero_sum_epsilon.is_finite() || i.zero_sum_epsilon <= 0.0 {
            return Err(invalid("influence.zero_sum_epsilon must be positive"));
        }

        let g = &self.concentration;
        check_non_negative("concentration.gini_threshold", g.gini_threshold)?;
        check_non_negative("concentration.tax_multiplier", g.tax_multiplier)?;
        check_bps("concentration.top_bracket_bps", g.top_bracket_bps)?;

        let k = &self.collusion;
        if !k.similarity_threshold.is_finite() || !(-1.0..=1.0).contains(&k.similarity_threshold) {
            return Err(invalid("collusion.similarity_threshold must lie in [-1, 1]"));
        }
        check_bps("collusion.peer_fraction_bps", k.peer_fraction_bps)?;
        check_bps("collusion.population_fraction_bps", k.population_fraction_bps)?;
        Ok(())
    }
}
