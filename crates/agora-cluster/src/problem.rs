//! Problems: the citable form of a promoted cluster or a direct submission.
//!
//! A problem's provenance names every source signal and every cluster in
//! its lineage. Provenance only grows; [`Problem::refresh`] merges in what a
//! cluster gathered after the problem was cut.

use std::collections::BTreeSet;

use agora_core::error::MalformedInput;
use agora_core::types::{Category, ProblemId, SignalId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterId, ClusterLevel, ClusterStatus, SignalCluster};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ProblemOrigin {
    Cluster { cluster: ClusterId, level: ClusterLevel },
    Direct,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Problem {
    pub id: ProblemId,
    pub category: Category,
    pub description: String,
    pub origin: ProblemOrigin,
    /// Aggregated priority: the cluster weight at the time of the last refresh.
    pub priority_score: f64,
    pub created_at: DateTime<Utc>,
    source_signals: BTreeSet<SignalId>,
    lineage: BTreeSet<ClusterId>,
}

impl Problem {
    /// Cut a problem from a promoted cluster.
    pub fn from_cluster(
        id: ProblemId,
        cluster: &SignalCluster,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, MalformedInput> {
        if cluster.status() != ClusterStatus::Promoted {
            return Err(MalformedInput::InvalidTransition {
                from: cluster.status().to_string(),
                to: "problem".into(),
            });
        }
        let mut lineage = cluster.lineage().clone();
        lineage.insert(cluster.id);
        Ok(Self {
            id,
            category: cluster.category,
            description: description.into(),
            origin: ProblemOrigin::Cluster { cluster: cluster.id, level: cluster.level },
            priority_score: cluster.weight(),
            created_at,
            source_signals: cluster.source_signals().clone(),
            lineage,
        })
    }

    /// Promote a priority cluster and cut a problem from it in one step.
    pub fn promote(
        id: ProblemId,
        cluster: &mut SignalCluster,
        description: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, MalformedInput> {
        cluster.promote()?;
        Self::from_cluster(id, cluster, description, created_at)
    }

    /// A problem submitted directly, optionally citing supporting signals.
    pub fn direct(
        id: ProblemId,
        category: Category,
        description: impl Into<String>,
        priority_score: f64,
        signals: impl IntoIterator<Item = SignalId>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, MalformedInput> {
        let priority_score = agora_core::error::ensure_non_negative("priority_score", priority_score)?;
        Ok(Self {
            id,
            category,
            description: description.into(),
            origin: ProblemOrigin::Direct,
            priority_score,
            created_at,
            source_signals: signals.into_iter().collect(),
            lineage: BTreeSet::new(),
        })
    }

    pub fn source_signals(&self) -> &BTreeSet<SignalId> {
        &self.source_signals
    }

    pub fn lineage(&self) -> &BTreeSet<ClusterId> {
        &self.lineage
    }

    /// Merge in provenance the origin cluster gathered since. Returns whether
    /// anything was added. Fails for any cluster other than the origin.
    pub fn refresh(&mut self, cluster: &SignalCluster) -> Result<bool, MalformedInput> {
        match &self.origin {
            ProblemOrigin::Cluster { cluster: origin, .. } if *origin == cluster.id => {}
            _ => return Err(MalformedInput::UnknownCluster(cluster.id.to_string())),
        }
        let before = (self.source_signals.len(), self.lineage.len());
        self.source_signals.extend(cluster.source_signals().iter().cloned());
        self.lineage.extend(cluster.lineage().iter().copied());
        self.priority_score = self.priority_score.max(cluster.weight());
        Ok(before != (self.source_signals.len(), self.lineage.len()))
    }
}
