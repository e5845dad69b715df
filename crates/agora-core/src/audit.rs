//! Append-only, hash-chained log of kernel outcomes.
//!
//! Each entry commits to its predecessor:
//! `hash = BLAKE3("agora-audit" || sequence || recorded_at || kind || payload || prev_hash)`.
//! [`AuditLog::verify`] recomputes every hash and compares. The payload is
//! stored as a `serde_json::Value`, whose map keys serialize in sorted order,
//! so the hash input is canonical.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AuditError;
use crate::types::Hash256;

const DOMAIN: &[u8] = b"agora-audit";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AuditEntry {
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub kind: String,
    pub payload: serde_json::Value,
    pub prev_hash: Hash256,
    pub hash: Hash256,
}

impl AuditEntry {
    fn compute_hash(
        sequence: u64,
        recorded_at: &DateTime<Utc>,
        kind: &str,
        payload: &serde_json::Value,
        prev_hash: &Hash256,
    ) -> Result<Hash256, AuditError> {
        let body = serde_json::to_vec(payload).map_err(|e| AuditError::Serialization(e.to_string()))?;
        let mut hasher = blake3::Hasher::new();
        hasher.update(DOMAIN);
        hasher.update(&sequence.to_le_bytes());
        hasher.update(recorded_at.to_rfc3339().as_bytes());
        hasher.update(&(kind.len() as u64).to_le_bytes());
        hasher.update(kind.as_bytes());
        hasher.update(&(body.len() as u64).to_le_bytes());
        hasher.update(&body);
        hasher.update(prev_hash.as_bytes());
        Ok(hasher.finalize().into())
    }

    /// Recompute this entry's hash from its contents.
    pub fn recompute(&self) -> Result<Hash256, AuditError> {
        Self::compute_hash(self.sequence, &self.recorded_at, &self.kind, &self.payload, &self.prev_hash)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct AuditLog {
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap entries read back from storage. Call [`verify`](Self::verify) before trusting them.
    pub fn from_entries(entries: Vec<AuditEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash of the newest entry, or [`Hash256::ZERO`] for an empty log.
    pub fn head(&self) -> Hash256 {
        self.entries.last().map(|e| e.hash).unwrap_or(Hash256::ZERO)
    }

    /// Append a record. Returns the new entry.
    pub fn append<T: Serialize>(
        &mut self,
        kind: impl Into<String>,
        recorded_at: DateTime<Utc>,
        payload: &T,
    ) -> Result<&AuditEntry, AuditError> {
        let kind = kind.into();
        let payload = serde_json::to_value(payload).map_err(|e| AuditError::Serialization(e.to_string()))?;
        let sequence = self.entries.len() as u64;
        let prev_hash = self.head();
        let hash = AuditEntry::compute_hash(sequence, &recorded_at, &kind, &payload, &prev_hash)?;
        self.entries.push(AuditEntry { sequence, recorded_at, kind, payload, prev_hash, hash });
        tracing::debug!(sequence, %hash, "audit entry appended");
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Recompute-and-compare every entry and link.
    pub fn verify(&self) -> Result<(), AuditError> {
        let mut prev = Hash256::ZERO;
        for (expected, entry) in self.entries.iter().enumerate() {
            let expected = expected as u64;
            if entry.sequence != expected {
                return Err(AuditError::SequenceGap { sequence: entry.sequence, expected });
            }
            if entry.prev_hash != prev {
                return Err(AuditError::BrokenLink(entry.sequence));
            }
            if entry.recompute()? != entry.hash {
                return Err(AuditError::HashMismatch(entry.sequence));
            }
            prev = entry.hash;
        }
        Ok(())
    }
}
