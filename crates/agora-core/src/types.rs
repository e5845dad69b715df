//! Core records: signals, identifiers, influence records and vote histories.
//!
//! Records are plain data handed in by the caller and handed back out.
//! Influence and weights are `f64`; every constructor rejects non-finite and
//! negative amounts so the engines never see NaN.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MalformedInput, ensure_non_negative};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Identifier of an anonymous signal.
    SignalId
);
string_id!(
    /// Identifier of the context (community, deployment) that owns a signal.
    ContextId
);
string_id!(
    /// Identifier of a spatial cell produced by a proximity adapter.
    CellId
);
string_id!(
    /// Identifier of a participant holding influence.
    ParticipantId
);
string_id!(
    /// Identifier of a validator casting votes on proposals.
    ValidatorId
);
string_id!(ProblemId);
string_id!(ProposalId);
string_id!(PredictionId);

/// A 32-byte BLAKE3 digest.
///
/// Used for deterministic cluster identifiers and audit-log chaining.
/// Serializes as a lowercase hex string so it can key JSON maps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The zero hash. Previous-hash of the first audit entry.
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for Hash256 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s, &mut bytes)?;
        Ok(Self(bytes))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl From<blake3::Hash> for Hash256 {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash.into())
    }
}

/// A WGS84 coordinate in decimal degrees.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Closed set of signal categories.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Infrastructure,
    Environment,
    Safety,
    Health,
    Education,
    Economy,
    Governance,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Self::Infrastructure,
        Self::Environment,
        Self::Safety,
        Self::Health,
        Self::Education,
        Self::Economy,
        Self::Governance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::Environment => "environment",
            Self::Safety => "safety",
            Self::Health => "health",
            Self::Education => "education",
            Self::Economy => "economy",
            Self::Governance => "governance",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = MalformedInput;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| MalformedInput::UnknownCategory(s.to_string()))
    }
}

/// Lifecycle of a signal: raw → clustered → validated.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    #[default]
    Raw,
    Clustered,
    Validated,
}

impl fmt::Display for SignalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Raw => "raw",
            Self::Clustered => "clustered",
            Self::Validated => "validated",
        };
        f.write_str(s)
    }
}

/// An anonymous, geolocated observation.
///
/// Immutable once created except for `status` and `attestations`, which only
/// move forward. Signals are never deleted, only re-tagged.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Signal {
    pub id: SignalId,
    pub context_id: ContextId,
    pub cell: CellId,
    pub category: Category,
    pub description: String,
    pub submitted_at: DateTime<Utc>,
    attestations: u32,
    influence_weight: f64,
    #[serde(default)]
    status: SignalStatus,
}

impl Signal {
    /// Create a raw signal. The influence weight must be finite and non-negative.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: SignalId,
        context_id: ContextId,
        cell: CellId,
        category: Category,
        description: impl Into<String>,
        submitted_at: DateTime<Utc>,
        attestations: u32,
        influence_weight: f64,
    ) -> Result<Self, MalformedInput> {
        let influence_weight = ensure_non_negative("influence_weight", influence_weight)?;
        Ok(Self {
            id,
            context_id,
            cell,
            category,
            description: description.into(),
            submitted_at,
            attestations,
            influence_weight,
            status: SignalStatus::Raw,
        })
    }

    pub fn attestations(&self) -> u32 {
        self.attestations
    }

    pub fn influence_weight(&self) -> f64 {
        self.influence_weight
    }

    pub fn status(&self) -> SignalStatus {
        self.status
    }

    /// Record one more corroboration. Saturates instead of wrapping.
    pub fn attest(&mut self) {
        self.attestations = self.attestations.saturating_add(1);
    }

    /// Re-tag as clustered. Idempotent; a validated signal stays validated.
    pub fn mark_clustered(&mut self) {
        if self.status == SignalStatus::Raw {
            self.status = SignalStatus::Clustered;
        }
    }

    /// Re-tag as validated. Only clustered (or already validated) signals qualify.
    pub fn mark_validated(&mut self) -> Result<(), MalformedInput> {
        match self.status {
            SignalStatus::Raw => Err(MalformedInput::InvalidTransition {
                from: SignalStatus::Raw.to_string(),
                to: SignalStatus::Validated.to_string(),
            }),
            _ => {
                self.status = SignalStatus::Validated;
                Ok(())
            }
        }
    }

    /// Reject records deserialized with a negative or non-finite weight.
    pub fn validate(&self) -> Result<(), MalformedInput> {
        ensure_non_negative("influence_weight", self.influence_weight)?;
        Ok(())
    }
}

/// A participant's current influence and the votes they have cast.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ParticipantInfluenceRecord {
    pub participant: ParticipantId,
    pub influence: f64,
    #[serde(default)]
    pub vote_history: Vec<VoteChoice>,
}

impl ParticipantInfluenceRecord {
    pub fn new(participant: ParticipantId, influence: f64) -> Result<Self, MalformedInput> {
        let influence = ensure_non_negative("influence", influence)?;
        Ok(Self {
            participant,
            influence,
            vote_history: Vec::new(),
        })
    }

    /// The participant's vote history as a validator record, for collusion
    /// sweeps where participants validate under their own id.
    pub fn vote_record(&self) -> ValidatorVoteRecord {
        ValidatorVoteRecord::new(ValidatorId::new(self.participant.as_str()), self.vote_history.clone())
    }
}

/// A categorical validator vote.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum VoteChoice {
    Approve,
    Reject,
}

impl VoteChoice {
    /// Numeric encoding used for similarity: approve = +1, reject = -1.
    pub fn as_signed(&self) -> f64 {
        match self {
            Self::Approve => 1.0,
            Self::Reject => -1.0,
        }
    }
}

impl fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        })
    }
}

/// Per-round vote history of one validator, aligned by round index.
///
/// Append-only: rounds are only ever pushed at the end.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ValidatorVoteRecord {
    pub validator: ValidatorId,
    votes: Vec<VoteChoice>,
}

impl ValidatorVoteRecord {
    pub fn new(validator: ValidatorId, votes: Vec<VoteChoice>) -> Self {
        Self { validator, votes }
    }

    /// Parse textual votes, rejecting anything that is not `approve` or `reject`.
    pub fn from_labels<S: AsRef<str>>(
        validator: ValidatorId,
        labels: &[S],
    ) -> Result<Self, MalformedInput> {
        let votes = labels
            .iter()
            .map(|label| match label.as_ref() {
                "approve" => Ok(VoteChoice::Approve),
                "reject" => Ok(VoteChoice::Reject),
                other => Err(MalformedInput::UnknownVote {
                    validator: validator.to_string(),
                    value: other.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { validator, votes })
    }

    pub fn votes(&self) -> &[VoteChoice] {
        &self.votes
    }

    pub fn record(&mut self, vote: VoteChoice) {
        self.votes.push(vote);
    }

    pub fn rounds(&self) -> usize {
        self.votes.len()
    }
}
