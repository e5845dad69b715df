//! Level-1 clustering pass.
//!
//! [`ClusterEngine::cluster`] takes the current cluster set and a batch of
//! signals and returns the updated set. Signals are grouped on the exact
//! `(category, cell)` key. A group with no existing cluster forms one once it
//! reaches `min_signals`; a group whose cluster already exists is absorbed
//! regardless of size. Growth in a level-1 cluster is carried up into any
//! parents that already contain it, so parent weight stays the sum of its
//! children.

use std::collections::{BTreeMap, BTreeSet};

use agora_core::error::{KernelError, MalformedInput};
use agora_core::policy::ClusterPolicy;
use agora_core::types::{Category, CellId, Signal, SignalId};
use serde::{Deserialize, Serialize};

use crate::cluster::{ClusterId, ClusterLevel, ClusterStatus, SignalCluster, local_cluster_id, propagate};

/// Result of one clustering pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusteringOutcome {
    /// Every cluster, level-1 and above, ordered by `(level, id)`.
    pub clusters: Vec<SignalCluster>,
    /// Level-1 clusters in priority status, ready for an explicit promotion.
    pub ready: Vec<ClusterId>,
    /// Signals now belonging to a cluster. The caller re-tags them as clustered.
    pub clustered_signals: Vec<SignalId>,
    /// Signals whose group is still below the minimum cluster size.
    pub unclustered: Vec<SignalId>,
}

impl ClusteringOutcome {
    pub fn get(&self, id: &ClusterId) -> Option<&SignalCluster> {
        self.clusters.iter().find(|c| &c.id == id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClusterEngine {
    policy: ClusterPolicy,
}

impl ClusterEngine {
    pub fn new(policy: ClusterPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &ClusterPolicy {
        &self.policy
    }

    /// Run one clustering pass.
    ///
    /// Pure: the same `existing` and `signals` always give the same outcome.
    /// A signal id may appear at most once per batch; passing a signal that
    /// is already a member refreshes its attestations and nothing else.
    pub fn cluster(
        &self,
        existing: &[SignalCluster],
        signals: &[Signal],
    ) -> Result<ClusteringOutcome, KernelError> {
        let mut clusters: BTreeMap<ClusterId, SignalCluster> = BTreeMap::new();
        for cluster in existing {
            if clusters.insert(cluster.id, cluster.clone()).is_some() {
                return Err(MalformedInput::DuplicateId(cluster.id.to_string()).into());
            }
        }

        let mut groups: BTreeMap<(Category, CellId), Vec<&Signal>> = BTreeMap::new();
        let mut seen = BTreeSet::new();
        for signal in signals {
            if !seen.insert(&signal.id) {
                return Err(MalformedInput::DuplicateId(signal.id.to_string()).into());
            }
            signal.validate()?;
            groups.entry((signal.category, signal.cell.clone())).or_default().push(signal);
        }

        let mut changed: BTreeSet<ClusterId> = BTreeSet::new();
        let mut clustered_signals = Vec::new();
        let mut unclustered = Vec::new();

        for ((category, cell), members) in groups {
            let id = local_cluster_id(category, &cell);
            if !clusters.contains_key(&id) {
                if members.len() < self.policy.min_signals {
                    tracing::trace!(%category, %cell, size = members.len(), "group below minimum cluster size");
                    unclustered.extend(members.iter().map(|s| s.id.clone()));
                    continue;
                }
                clusters.insert(id, SignalCluster::local(category, cell.clone()));
                tracing::debug!(%id, %category, %cell, "cluster formed");
            }
            let Some(cluster) = clusters.get_mut(&id) else {
                continue;
            };
            let before = cluster.status();
            for signal in &members {
                if cluster.absorb_signal(signal, &self.policy)? {
                    changed.insert(id);
                }
                clustered_signals.push(signal.id.clone());
            }
            if before != cluster.status() {
                tracing::info!(%id, weight = cluster.weight(), signals = cluster.signal_count(), "cluster reached priority");
            }
        }

        propagate(&mut clusters, changed);

        let ready = clusters
            .values()
            .filter(|c| c.level == ClusterLevel::Local && c.status() == ClusterStatus::Priority)
            .map(|c| c.id)
            .collect();

        let mut clusters: Vec<SignalCluster> = clusters.into_values().collect();
        clusters.sort_by(|a, b| (a.level, a.id).cmp(&(b.level, b.id)));

        Ok(ClusteringOutcome { clusters, ready, clustered_signals, unclustered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::types::ContextId;
    use chrono::{DateTime, Utc};

    fn signal(id: &str, cell: &str, category: Category, attestations: u32) -> Signal {
        Signal::new(
            id.into(),
            ContextId::new("ctx"),
            cell.into(),
            category,
            "pothole",
            DateTime::<Utc>::UNIX_EPOCH,
            attestations,
            0.0,
        )
        .unwrap()
    }

    fn batch(cell: &str, atts: &[u32]) -> Vec<Signal> {
        atts.iter()
            .enumerate()
            .map(|(i, a)| signal(&format!("{cell}/{i}"), cell, Category::Infrastructure, *a))
            .collect()
    }

    // --- formation ---

    #[test]
    fn documented_scenario_forms_cluster() {
        let engine = ClusterEngine::default();
        let out = engine.cluster(&[], &batch("0:0", &[0, 1, 2, 0, 3])).unwrap();
        assert_eq!(out.clusters.len(), 1);
        let c = &out.clusters[0];
        assert_eq!(c.weight(), 5.5);
        assert_eq!(c.status(), ClusterStatus::Forming);
        assert!(out.ready.is_empty());
        assert_eq!(out.clustered_signals.len(), 5);
        assert!(out.unclustered.is_empty());
    }

    #[test]
    fn small_group_left_unclustered() {
        let out = ClusterEngine::default().cluster(&[], &batch("0:0", &[5, 5])).unwrap();
        assert!(out.clusters.is_empty());
        assert_eq!(out.unclustered.len(), 2);
    }

    #[test]
    fn exact_key_only() {
        let mut signals = batch("0:0", &[0, 0]);
        signals.push(signal("other-cell", "0:1", Category::Infrastructure, 0));
        signals.push(signal("other-cat", "0:0", Category::Safety, 0));
        let out = ClusterEngine::default().cluster(&[], &signals).unwrap();
        assert!(out.clusters.is_empty());
        assert_eq!(out.unclustered.len(), 4);
    }

    #[test]
    fn priority_clusters_reported_ready() {
        let out = ClusterEngine::default().cluster(&[], &batch("0:0", &[20, 0, 0])).unwrap();
        assert_eq!(out.ready, vec![out.clusters[0].id]);
    }

    #[test]
    fn duplicate_ids_in_batch_rejected() {
        let mut signals = batch("0:0", &[0, 0, 0]);
        signals.push(signals[0].clone());
        let err = ClusterEngine::default().cluster(&[], &signals).unwrap_err();
        assert!(matches!(err, KernelError::Malformed(MalformedInput::DuplicateId(_))));
    }

    // --- incremental ---

    #[test]
    fn existing_cluster_absorbs_small_batch() {
        let engine = ClusterEngine::default();
        let first = engine.cluster(&[], &batch("0:0", &[0, 0, 0])).unwrap();
        let extra = vec![signal("late", "0:0", Category::Infrastructure, 4)];
        let second = engine.cluster(&first.clusters, &extra).unwrap();
        assert_eq!(second.clusters[0].weight(), 5.0);
        assert_eq!(second.clustered_signals, vec![SignalId::new("late")]);
    }

    #[test]
    fn repeating_a_batch_is_idempotent() {
        let engine = ClusterEngine::default();
        let signals = batch("0:0", &[0, 1, 2, 0, 3]);
        let first = engine.cluster(&[], &signals).unwrap();
        let second = engine.cluster(&first.clusters, &signals).unwrap();
        assert_eq!(first.clusters, second.clusters);
    }

    #[test]
    fn growth_reaches_existing_parent() {
        let engine = ClusterEngine::default();
        let first = engine.cluster(&[], &batch("0:0", &[20, 0, 0])).unwrap();
        let child = first.clusters[0].clone();
        let parent = SignalCluster::parent(ClusterLevel::District, Category::Infrastructure, &[&child]);
        let existing = vec![child, parent.clone()];

        let extra = vec![signal("late", "0:0", Category::Infrastructure, 10)];
        let out = engine.cluster(&existing, &extra).unwrap();
        let updated = out.get(&parent.id).unwrap();
        assert_eq!(updated.weight(), parent.weight() + 5.0);
        assert!(updated.source_signals().contains(&SignalId::new("late")));
    }

    #[test]
    fn output_is_deterministic() {
        let engine = ClusterEngine::default();
        let mut signals = batch("0:0", &[1, 2, 3]);
        signals.extend(batch("4:4", &[9, 9, 9]));
        let a = engine.cluster(&[], &signals).unwrap();
        signals.reverse();
        let b = engine.cluster(&[], &signals).unwrap();
        assert_eq!(a.clusters, b.clusters);
        assert_eq!(a.ready, b.ready);
    }
}
