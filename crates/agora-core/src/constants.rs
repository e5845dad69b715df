//! Kernel constants and default policy values.
//!
//! Every tunable here is only a *default*: the engines read their thresholds
//! from [`KernelPolicy`](crate::policy::KernelPolicy), so tests and callers
//! can run parallel instances with different constants.

/// Basis-point denominator. 10,000 BPS = 100%.
pub const BPS_PRECISION: u32 = 10_000;

// ---------------------------------------------------------------------------
// Clustering
// ---------------------------------------------------------------------------

/// Minimum number of signals sharing a cell and category before a cluster forms.
pub const MIN_CLUSTER_SIGNALS: usize = 3;

/// Weight a signal contributes per attestation before the floor of 1.0 applies.
///
/// Per-signal contribution is `max(1, attestations * ATTESTATION_COEFFICIENT)`
/// plus `influence_weight * INFLUENCE_COEFFICIENT`.
pub const ATTESTATION_COEFFICIENT: f64 = 0.5;

/// Multiplier applied to a signal's influence-weight contribution.
pub const INFLUENCE_COEFFICIENT: f64 = 1.0;

/// Floor on the attestation part of a signal's contribution.
pub const MIN_SIGNAL_CONTRIBUTION: f64 = 1.0;

/// Cluster weight at or above which a forming cluster becomes priority.
pub const GRAVITY_THRESHOLD: f64 = 10.0;

/// Member count at or above which a forming cluster becomes priority.
pub const PRIORITY_SIGNAL_COUNT: usize = 10;

// ---------------------------------------------------------------------------
// Hierarchical promotion
// ---------------------------------------------------------------------------

/// Highest cluster level (global scope).
pub const MAX_LEVEL: u8 = 4;

/// Highest level promotions are applied to automatically by default.
pub const DEFAULT_MAX_ENABLED_LEVEL: u8 = 2;

/// Minimum child clusters to promote from level `L` (index `L - 1`).
pub const MIN_CHILD_CLUSTERS: [usize; 3] = [3, 5, 10];

/// Minimum total child weight to promote from level `L` (index `L - 1`).
pub const MIN_TOTAL_WEIGHT: [f64; 3] = [50.0, 250.0, 1_500.0];

/// Hard floor on underlying signals to promote from level `L` (index `L - 1`).
pub const MIN_SIGNALS: [usize; 3] = [15, 100, 1_000];

// ---------------------------------------------------------------------------
// Accuracy & influence
// ---------------------------------------------------------------------------

/// Relative error at or below which a prediction scores full accuracy.
pub const ACCURACY_TOLERANCE: f64 = 0.1;

/// Relative error at or beyond which a prediction scores zero accuracy.
pub const ACCURACY_MAX_PENALTY: f64 = 0.5;

/// The global influence supply used to normalise vitality.
pub const GLOBAL_INFLUENCE_SUPPLY: f64 = 1_000_000.0;

/// Offset inside the diminishing-returns logarithm: `1 / ln(influence + 10)`.
///
/// `ln(10) > 0`, so the factor is finite for a participant with zero influence.
pub const DIMINISHING_RETURNS_OFFSET: f64 = 10.0;

/// Tolerance of the zero-sum check on a resolution round.
pub const ZERO_SUM_EPSILON: f64 = 1e-4;

// ---------------------------------------------------------------------------
// Concentration control
// ---------------------------------------------------------------------------

/// Gini coefficient at or above which the concentration tax applies.
pub const GINI_TAX_THRESHOLD: f64 = 0.6;

/// Tax rate multiplier: `rate = (gini - threshold) * multiplier`.
pub const GINI_TAX_MULTIPLIER: f64 = 2.0;

/// Share of holders (by rank) subject to the tax, in basis points.
pub const GINI_TOP_BRACKET_BPS: u32 = 2_000;

// ---------------------------------------------------------------------------
// Collusion detection
// ---------------------------------------------------------------------------

/// Cosine similarity strictly above which two validators are "highly similar".
pub const COLLUSION_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Share of other validators a validator must be highly similar to, in BPS.
pub const COLLUSION_PEER_FRACTION_BPS: u32 = 3_000;

/// Share of the validator population that must be suspicious, in BPS.
pub const CARTEL_POPULATION_FRACTION_BPS: u32 = 3_000;
