//! Proposals, predictions and validator results.
//!
//! A [`Proposal`] links to at most one problem, carries at least one
//! [`Prediction`], collects one [`ValidationResult`] per validator and moves
//! through `draft → validating → active | rejected → completed`.
//! Deciding *when* validation is over belongs to the quorum gate in
//! agora-consensus; this module only enforces the legal moves.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{MalformedInput, ensure_finite, ensure_non_negative};
use crate::types::{PredictionId, ProblemId, ProposalId, ValidatorId};

/// A measurable claim attached to a proposal.
///
/// Created unresolved; [`resolve`](Self::resolve) sets the actual value
/// exactly once, after which the prediction is immutable.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Prediction {
    pub id: PredictionId,
    pub metric: String,
    pub predicted: f64,
    #[serde(default)]
    pub actual: Option<f64>,
    /// Relative tolerance window (0.1 = within 10% of the actual value).
    pub tolerance: f64,
    pub timeframe: String,
}

impl Prediction {
    pub fn new(
        id: PredictionId,
        metric: impl Into<String>,
        predicted: f64,
        tolerance: f64,
        timeframe: impl Into<String>,
    ) -> Self {
        Self {
            id,
            metric: metric.into(),
            predicted,
            actual: None,
            tolerance,
            timeframe: timeframe.into(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.actual.is_some()
    }

    /// Record the ground-truth value. Fails on a second call.
    pub fn resolve(&mut self, actual: f64) -> Result<(), MalformedInput> {
        if self.actual.is_some() {
            return Err(MalformedInput::AlreadyResolved(self.id.to_string()));
        }
        self.actual = Some(ensure_finite("actual", actual)?);
        Ok(())
    }

    /// Reject non-finite predicted values and negative tolerances.
    pub fn validate(&self) -> Result<(), MalformedInput> {
        ensure_finite("predicted", self.predicted)?;
        ensure_non_negative("tolerance", self.tolerance)?;
        if let Some(actual) = self.actual {
            ensure_finite("actual", actual)?;
        }
        Ok(())
    }
}

/// Outcome a single validator reported for a proposal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass,
    Fail,
    /// Passes with reservations; counts in favour.
    Warning,
    Pending,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidationResult {
    pub validator: ValidatorId,
    pub status: ValidationStatus,
    #[serde(default)]
    pub message: Option<String>,
}

impl ValidationResult {
    pub fn new(validator: ValidatorId, status: ValidationStatus) -> Self {
        Self { validator, status, message: None }
    }
}

/// Vote counts folded from a proposal's validation results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationTally {
    pub in_favor: usize,
    pub against: usize,
    pub pending: usize,
}

impl ValidationTally {
    pub fn total(&self) -> usize {
        self.in_favor + self.against + self.pending
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    #[default]
    Draft,
    Validating,
    Active,
    Rejected,
    Completed,
}

impl ProposalStatus {
    /// Whether `self → to` is a legal move.
    pub fn can_transition(&self, to: ProposalStatus) -> bool {
        use ProposalStatus::*;
        matches!(
            (self, to),
            (Draft, Validating)
                | (Validating, Active)
                | (Validating, Rejected)
                | (Active, Completed)
                | (Rejected, Completed)
        )
    }

    pub fn transition(&self, to: ProposalStatus) -> Result<ProposalStatus, MalformedInput> {
        if self.can_transition(to) {
            Ok(to)
        } else {
            Err(MalformedInput::InvalidTransition { from: self.to_string(), to: to.to_string() })
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Draft => "draft",
            Self::Validating => "validating",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::Completed => "completed",
        })
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Proposal {
    pub id: ProposalId,
    #[serde(default)]
    pub problem: Option<ProblemId>,
    predictions: Vec<Prediction>,
    #[serde(default)]
    validations: Vec<ValidationResult>,
    #[serde(default)]
    status: ProposalStatus,
}

impl Proposal {
    /// Create a draft proposal. At least one prediction is required and
    /// prediction ids must be unique.
    pub fn new(
        id: ProposalId,
        problem: Option<ProblemId>,
        predictions: Vec<Prediction>,
    ) -> Result<Self, MalformedInput> {
        if predictions.is_empty() {
            return Err(MalformedInput::NoPredictions(id.to_string()));
        }
        for (i, p) in predictions.iter().enumerate() {
            p.validate()?;
            if predictions[..i].iter().any(|q| q.id == p.id) {
                return Err(MalformedInput::DuplicateId(p.id.to_string()));
            }
        }
        Ok(Self {
            id,
            problem,
            predictions,
            validations: Vec::new(),
            status: ProposalStatus::Draft,
        })
    }

    pub fn status(&self) -> ProposalStatus {
        self.status
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn validations(&self) -> &[ValidationResult] {
        &self.validations
    }

    pub fn transition(&mut self, to: ProposalStatus) -> Result<(), MalformedInput> {
        self.status = self.status.transition(to)?;
        Ok(())
    }

    /// Record a validator's result. A validator has at most one entry; a
    /// pending entry may be replaced by a final one, a final entry may not.
    pub fn record_validation(&mut self, result: ValidationResult) -> Result<(), MalformedInput> {
        match self.validations.iter_mut().find(|v| v.validator == result.validator) {
            Some(existing) if existing.status == ValidationStatus::Pending => {
                *existing = result;
                Ok(())
            }
            Some(existing) => Err(MalformedInput::DuplicateId(existing.validator.to_string())),
            None => {
                self.validations.push(result);
                Ok(())
            }
        }
    }

    /// Fold validation results: pass and warning in favour, fail against.
    pub fn tally(&self) -> ValidationTally {
        self.validations.iter().fold(ValidationTally::default(), |mut t, v| {
            match v.status {
                ValidationStatus::Pass | ValidationStatus::Warning => t.in_favor += 1,
                ValidationStatus::Fail => t.against += 1,
                ValidationStatus::Pending => t.pending += 1,
            }
            t
        })
    }

    /// Resolve one of this proposal's predictions.
    pub fn resolve_prediction(&mut self, id: &PredictionId, actual: f64) -> Result<(), MalformedInput> {
        self.predictions
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| MalformedInput::UnknownPrediction(id.to_string()))?
            .resolve(actual)
    }
}
