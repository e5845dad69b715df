//! Prediction accuracy.
//!
//! ```text
//! diff     = |predicted - actual|
//! scale    = |actual|, or 1 when actual == 0
//! tol      = scale * tolerance
//! cap      = scale * max_penalty
//! accuracy = 1                               if diff <= tol
//!          = 0                               if diff >= cap
//!          = 1 - (diff - tol) / (cap - tol)  otherwise
//! ```
//!
//! Over- and under-predictions by the same absolute amount score the same.

use agora_core::error::{MalformedInput, ensure_finite, ensure_non_negative};

/// Accuracy in `[0, 1]` of `predicted` against `actual`.
///
/// `tolerance` and `max_penalty` are relative to `|actual|`; when `actual`
/// is zero they are taken as absolute amounts.
pub fn accuracy(predicted: f64, actual: f64, tolerance: f64, max_penalty: f64) -> Result<f64, MalformedInput> {
    let predicted = ensure_finite("predicted", predicted)?;
    let actual = ensure_finite("actual", actual)?;
    let tolerance = ensure_non_negative("tolerance", tolerance)?;
    let max_penalty = ensure_non_negative("max_penalty", max_penalty)?;

    let diff = (predicted - actual).abs();
    let scale = if actual == 0.0 { 1.0 } else { actual.abs() };
    let tol = scale * tolerance;
    let cap = scale * max_penalty;

    if diff <= tol {
        return Ok(1.0);
    }
    if diff >= cap {
        return Ok(0.0);
    }
    // tol < diff < cap, so the denominator is positive.
    Ok((1.0 - (diff - tol) / (cap - tol)).clamp(0.0, 1.0))
}
