//! Trait interfaces between the kernel and its collaborators.
//!
//! - [`ProximityAdapter`]: geocell mapping and adjacency (external; a grid
//!   reference implementation lives in [`geocell`](crate::geocell))
//! - [`InfluenceCalculator`]: accuracy and influence math (agora-influence implements)

use serde::{Deserialize, Serialize};

use crate::error::MalformedInput;
use crate::proposal::Prediction;
use crate::types::{CellId, Coordinate};

/// Deterministic mapping from coordinates to coarse spatial cells.
///
/// The kernel only ever asks "same cell" and "neighbouring cell" questions;
/// how cells are shaped is up to the implementation.
pub trait ProximityAdapter: Send + Sync {
    /// The cell containing `coordinate`.
    fn cell_of(&self, coordinate: &Coordinate) -> CellId;

    /// Whether two cells touch. Must be symmetric; a cell is adjacent to itself.
    fn are_adjacent(&self, a: &CellId, b: &CellId) -> bool;

    /// Default implementation: identifier equality.
    fn same_cell(&self, a: &CellId, b: &CellId) -> bool {
        a == b
    }
}

/// Result of slashing a balance: what the holder keeps and what is removed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlashOutcome {
    pub retained: f64,
    pub slashed: f64,
}

/// Pure accuracy and influence computation.
///
/// Implemented by the influence engine (agora-influence).
pub trait InfluenceCalculator: Send + Sync {
    /// Accuracy in `[0, 1]` of a predicted value against the actual outcome.
    ///
    /// `tolerance` is relative to `actual` (absolute when `actual` is zero).
    fn accuracy(&self, predicted: f64, actual: f64, tolerance: f64) -> Result<f64, MalformedInput>;

    /// Influence gained for a resolved prediction.
    fn influence_delta(
        &self,
        accuracy: f64,
        stake: f64,
        current_influence: f64,
        global_vitality: f64,
    ) -> Result<f64, MalformedInput>;

    /// Remove `percent` of `influence`. The slashed part must be credited elsewhere.
    fn slash(&self, influence: f64, percent: f64) -> Result<SlashOutcome, MalformedInput>;

    /// Accuracy of a resolved prediction.
    ///
    /// Default implementation: rejects unresolved predictions, then defers
    /// to [`accuracy`](Self::accuracy) with the prediction's own tolerance.
    fn prediction_accuracy(&self, prediction: &Prediction) -> Result<f64, MalformedInput> {
        let actual = prediction
            .actual
            .ok_or_else(|| MalformedInput::UnresolvedPrediction(prediction.id.to_string()))?;
        self.accuracy(prediction.predicted, actual, prediction.tolerance)
    }
}
