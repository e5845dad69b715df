//! Signal clusters and their deterministic weight.
//!
//! Rules:
//! 1. Membership is append-only. Re-adding a member is a no-op except that a
//!    grown attestation count refreshes the member's contribution.
//! 2. Weight is the sum of per-member contributions, recomputed whenever
//!    membership changes. It is never set directly.
//! 3. Level-1 ids derive from `(category, cell)`; parent ids derive from the
//!    sorted ids of the children they were created with, via BLAKE3.
//! 4. Provenance (source signals and lineage clusters) only grows.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use agora_core::error::MalformedInput;
use agora_core::policy::ClusterPolicy;
use agora_core::types::{Category, CellId, Hash256, Signal, SignalId};
use serde::{Deserialize, Serialize};

pub type ClusterId = Hash256;

/// Hierarchy level of a cluster.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum ClusterLevel {
    Local = 1,
    District = 2,
    Regional = 3,
    Global = 4,
}

impl ClusterLevel {
    pub const ALL: [ClusterLevel; 4] = [Self::Local, Self::District, Self::Regional, Self::Global];

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(level: u8) -> Result<Self, MalformedInput> {
        match level {
            1 => Ok(Self::Local),
            2 => Ok(Self::District),
            3 => Ok(Self::Regional),
            4 => Ok(Self::Global),
            other => Err(MalformedInput::LevelOutOfRange(other)),
        }
    }

    /// The level a promotion from here produces. `None` at global scope.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Local => Some(Self::District),
            Self::District => Some(Self::Regional),
            Self::Regional => Some(Self::Global),
            Self::Global => None,
        }
    }
}

impl fmt::Display for ClusterLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.as_u8())
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClusterStatus {
    #[default]
    Forming,
    Priority,
    Promoted,
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Forming => "forming",
            Self::Priority => "priority",
            Self::Promoted => "promoted",
        })
    }
}

/// Per-signal contribution to cluster weight.
///
/// `max(min_contribution, attestations * attestation_coefficient)
///  + influence_weight * influence_coefficient`
///
/// Monotonic in both attestations and influence, and a pure function of its
/// arguments. With the default policy, attestations `[0, 1, 2, 0, 3]` and no
/// influence contribute `1 + 1 + 1 + 1 + 1.5 = 5.5`.
pub fn signal_contribution(attestations: u32, influence_weight: f64, policy: &ClusterPolicy) -> f64 {
    let attested = (attestations as f64 * policy.attestation_coefficient).max(policy.min_contribution);
    attested + influence_weight * policy.influence_coefficient
}

/// Snapshot of the mutable parts of a member signal.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct MemberSignal {
    pub attestations: u32,
    pub influence_weight: f64,
}

/// Snapshot of a child cluster taken when it was absorbed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ChildCluster {
    pub weight: f64,
    pub signal_count: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Members {
    Signals(BTreeMap<SignalId, MemberSignal>),
    Clusters(BTreeMap<ClusterId, ChildCluster>),
}

impl Members {
    pub fn len(&self) -> usize {
        match self {
            Self::Signals(m) => m.len(),
            Self::Clusters(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An aggregate over signals (level 1) or clusters (levels 2–4) sharing a
/// category and a spatially connected set of cells.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SignalCluster {
    pub id: ClusterId,
    pub level: ClusterLevel,
    pub category: Category,
    cells: BTreeSet<CellId>,
    members: Members,
    weight: f64,
    status: ClusterStatus,
    source_signals: BTreeSet<SignalId>,
    lineage: BTreeSet<ClusterId>,
}

/// Level-1 cluster id for a `(category, cell)` pair.
pub fn local_cluster_id(category: Category, cell: &CellId) -> ClusterId {
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"agora-cluster-l1");
    hasher.update(category.as_str().as_bytes());
    hasher.update(&[0]);
    hasher.update(cell.as_str().as_bytes());
    hasher.finalize().into()
}

/// Parent cluster id: BLAKE3 over the level and the sorted, deduplicated child ids.
pub fn parent_cluster_id(level: ClusterLevel, children: &[ClusterId]) -> ClusterId {
    let mut unique = children.to_vec();
    unique.sort();
    unique.dedup();
    let mut hasher = blake3::Hasher::new();
    hasher.update(b"agora-cluster");
    hasher.update(&[level.as_u8()]);
    for id in &unique {
        hasher.update(id.as_bytes());
    }
    hasher.finalize().into()
}

impl SignalCluster {
    /// An empty level-1 cluster for `(category, cell)`.
    pub fn local(category: Category, cell: CellId) -> Self {
        Self {
            id: local_cluster_id(category, &cell),
            level: ClusterLevel::Local,
            category,
            cells: BTreeSet::from([cell]),
            members: Members::Signals(BTreeMap::new()),
            weight: 0.0,
            status: ClusterStatus::Forming,
            source_signals: BTreeSet::new(),
            lineage: BTreeSet::new(),
        }
    }

    /// A parent at `level` built from `children`. The caller has checked
    /// category, level and adjacency.
    pub fn parent(level: ClusterLevel, category: Category, children: &[&SignalCluster]) -> Self {
        let ids: Vec<ClusterId> = children.iter().map(|c| c.id).collect();
        let mut parent = Self {
            id: parent_cluster_id(level, &ids),
            level,
            category,
            cells: BTreeSet::new(),
            members: Members::Clusters(BTreeMap::new()),
            weight: 0.0,
            status: ClusterStatus::Priority,
            source_signals: BTreeSet::new(),
            lineage: BTreeSet::new(),
        };
        for child in children {
            parent.absorb_child(child);
        }
        parent
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn status(&self) -> ClusterStatus {
        self.status
    }

    pub fn cells(&self) -> &BTreeSet<CellId> {
        &self.cells
    }

    pub fn members(&self) -> &Members {
        &self.members
    }

    /// Every signal under this cluster, across all levels.
    pub fn source_signals(&self) -> &BTreeSet<SignalId> {
        &self.source_signals
    }

    /// Every cluster below this one, across all levels.
    pub fn lineage(&self) -> &BTreeSet<ClusterId> {
        &self.lineage
    }

    pub fn signal_count(&self) -> usize {
        self.source_signals.len()
    }

    pub fn child_ids(&self) -> Vec<ClusterId> {
        match &self.members {
            Members::Clusters(m) => m.keys().copied().collect(),
            Members::Signals(_) => Vec::new(),
        }
    }

    pub fn contains_child(&self, id: &ClusterId) -> bool {
        matches!(&self.members, Members::Clusters(m) if m.contains_key(id))
    }

    /// Add or refresh a member signal. Returns whether anything changed.
    ///
    /// Only level-1 clusters hold signals, and only signals from their own
    /// cell and category.
    pub fn absorb_signal(&mut self, signal: &Signal, policy: &ClusterPolicy) -> Result<bool, MalformedInput> {
        if signal.category != self.category || !self.cells.contains(&signal.cell) {
            return Err(MalformedInput::MixedGrouping(format!(
                "signal {} ({}, {}) does not belong to cluster {}",
                signal.id, signal.category, signal.cell, self.id
            )));
        }
        let Members::Signals(members) = &mut self.members else {
            return Err(MalformedInput::MixedGrouping(format!(
                "{} cluster {} cannot hold signals",
                self.level, self.id
            )));
        };
        signal.validate()?;
        let snapshot = MemberSignal {
            attestations: signal.attestations(),
            influence_weight: signal.influence_weight(),
        };
        let changed = match members.get_mut(&signal.id) {
            None => {
                members.insert(signal.id.clone(), snapshot);
                true
            }
            Some(existing) => {
                // Attestations only grow; a stale copy never lowers weight.
                let attestations = existing.attestations.max(snapshot.attestations);
                let influence_weight = existing.influence_weight.max(snapshot.influence_weight);
                let refreshed = MemberSignal { attestations, influence_weight };
                let changed = refreshed != *existing;
                *existing = refreshed;
                changed
            }
        };
        self.source_signals.insert(signal.id.clone());
        if changed {
            self.recompute(policy);
        }
        Ok(changed)
    }

    /// Add a child cluster snapshot, or refresh one that has grown since it
    /// was taken. Returns whether anything changed.
    pub fn absorb_child(&mut self, child: &SignalCluster) -> bool {
        let Members::Clusters(members) = &mut self.members else {
            return false;
        };
        let snapshot = ChildCluster { weight: child.weight, signal_count: child.signal_count() };
        match members.get(&child.id) {
            Some(existing) if *existing == snapshot => return false,
            _ => {
                members.insert(child.id, snapshot);
            }
        }
        self.cells.extend(child.cells.iter().cloned());
        self.source_signals.extend(child.source_signals.iter().cloned());
        self.lineage.insert(child.id);
        self.lineage.extend(child.lineage.iter().copied());
        self.weight = Self::children_weight(members);
        true
    }

    fn children_weight(members: &BTreeMap<ClusterId, ChildCluster>) -> f64 {
        members.values().map(|c| c.weight).sum()
    }

    /// Recompute weight from members and move forming → priority when a
    /// level-1 threshold is met (weight OR count).
    pub fn recompute(&mut self, policy: &ClusterPolicy) {
        self.weight = match &self.members {
            Members::Signals(m) => m
                .values()
                .map(|s| signal_contribution(s.attestations, s.influence_weight, policy))
                .sum(),
            Members::Clusters(m) => Self::children_weight(m),
        };
        if self.status == ClusterStatus::Forming && self.meets_priority(policy) {
            self.status = ClusterStatus::Priority;
        }
    }

    /// Whether the disjunctive priority condition holds for a level-1 cluster.
    pub fn meets_priority(&self, policy: &ClusterPolicy) -> bool {
        self.level == ClusterLevel::Local
            && (self.weight >= policy.gravity_threshold
                || self.members.len() >= policy.priority_signal_count)
    }

    /// Explicit priority → promoted transition.
    ///
    /// Promoting an already promoted cluster is a no-op returning `false`.
    pub fn promote(&mut self) -> Result<bool, MalformedInput> {
        match self.status {
            ClusterStatus::Priority => {
                self.status = ClusterStatus::Promoted;
                Ok(true)
            }
            ClusterStatus::Promoted => Ok(false),
            ClusterStatus::Forming => Err(MalformedInput::InvalidTransition {
                from: ClusterStatus::Forming.to_string(),
                to: ClusterStatus::Promoted.to_string(),
            }),
        }
    }
}

/// Refresh parents whose children changed, one level at a time.
pub(crate) fn propagate(clusters: &mut BTreeMap<ClusterId, SignalCluster>, mut changed: BTreeSet<ClusterId>) {
    for level in [ClusterLevel::District, ClusterLevel::Regional, ClusterLevel::Global] {
        if changed.is_empty() {
            return;
        }
        let parents: Vec<ClusterId> = clusters
            .values()
            .filter(|c| c.level == level && changed.iter().any(|id| c.contains_child(id)))
            .map(|c| c.id)
            .collect();
        let mut next = BTreeSet::new();
        for parent_id in parents {
            let children: Vec<SignalCluster> = changed
                .iter()
                .filter(|id| clusters.get(&parent_id).is_some_and(|p| p.contains_child(id)))
                .filter_map(|id| clusters.get(id).cloned())
                .collect();
            if let Some(parent) = clusters.get_mut(&parent_id) {
                let mut grew = false;
                for child in &children {
                    grew |= parent.absorb_child(child);
                }
                if grew {
                    next.insert(parent_id);
                }
            }
        }
        changed = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::types::ContextId;
    use chrono::{DateTime, Utc};
    use proptest::prelude::*;

    fn signal(id: &str, cell: &str, attestations: u32, influence: f64) -> Signal {
        Signal::new(
            id.into(),
            ContextId::new("ctx"),
            cell.into(),
            Category::Infrastructure,
            "broken streetlight",
            DateTime::<Utc>::UNIX_EPOCH,
            attestations,
            influence,
        )
        .unwrap()
    }

    fn filled(cell: &str, attestations: &[u32]) -> SignalCluster {
        let policy = ClusterPolicy::default();
        let mut c = SignalCluster::local(Category::Infrastructure, cell.into());
        for (i, a) in attestations.iter().enumerate() {
            c.absorb_signal(&signal(&format!("{cell}-{i}"), cell, *a, 0.0), &policy).unwrap();
        }
        c
    }

    // --- contribution ---

    #[test]
    fn contribution_floor_applies() {
        let p = ClusterPolicy::default();
        assert_eq!(signal_contribution(0, 0.0, &p), 1.0);
        assert_eq!(signal_contribution(2, 0.0, &p), 1.0);
        assert_eq!(signal_contribution(3, 0.0, &p), 1.5);
        assert_eq!(signal_contribution(4, 2.0, &p), 4.0);
    }

    #[test]
    fn documented_weight_example() {
        let c = filled("0:0", &[0, 1, 2, 0, 3]);
        assert_eq!(c.weight(), 5.5);
        assert_eq!(c.signal_count(), 5);
    }

    // --- absorb ---

    #[test]
    fn absorbing_same_signal_twice_is_noop() {
        let policy = ClusterPolicy::default();
        let mut c = filled("0:0", &[0, 1, 2]);
        let before = c.weight();
        let changed = c.absorb_signal(&signal("0:0-0", "0:0", 0, 0.0), &policy).unwrap();
        assert!(!changed);
        assert_eq!(c.weight(), before);
        assert_eq!(c.members().len(), 3);
    }

    #[test]
    fn grown_attestations_refresh_weight() {
        let policy = ClusterPolicy::default();
        let mut c = filled("0:0", &[0, 0, 0]);
        assert_eq!(c.weight(), 3.0);
        c.absorb_signal(&signal("0:0-0", "0:0", 6, 0.0), &policy).unwrap();
        assert_eq!(c.weight(), 5.0);
        // A stale copy does not lower it again.
        c.absorb_signal(&signal("0:0-0", "0:0", 0, 0.0), &policy).unwrap();
        assert_eq!(c.weight(), 5.0);
    }

    #[test]
    fn foreign_cell_rejected() {
        let policy = ClusterPolicy::default();
        let mut c = SignalCluster::local(Category::Infrastructure, "0:0".into());
        let err = c.absorb_signal(&signal("x", "5:5", 0, 0.0), &policy).unwrap_err();
        assert!(matches!(err, MalformedInput::MixedGrouping(_)));
    }

    // --- status ---

    #[test]
    fn priority_by_weight_alone() {
        let c = filled("0:0", &[20, 0, 0]);
        assert!(c.weight() >= ClusterPolicy::default().gravity_threshold);
        assert_eq!(c.status(), ClusterStatus::Priority);
    }

    #[test]
    fn priority_by_count_alone() {
        let c = filled("0:0", &[0; 10]);
        assert_eq!(c.weight(), 10.0);
        let mut policy = ClusterPolicy::default();
        policy.gravity_threshold = 1_000.0;
        let mut c2 = SignalCluster::local(Category::Infrastructure, "0:0".into());
        for i in 0..10 {
            c2.absorb_signal(&signal(&format!("s{i}"), "0:0", 0, 0.0), &policy).unwrap();
        }
        assert_eq!(c2.status(), ClusterStatus::Priority);
        assert_eq!(c.status(), ClusterStatus::Priority);
    }

    #[test]
    fn small_cluster_stays_forming() {
        let c = filled("0:0", &[0, 0, 0]);
        assert_eq!(c.status(), ClusterStatus::Forming);
    }

    #[test]
    fn promote_requires_priority_and_is_idempotent() {
        let mut forming = filled("0:0", &[0, 0, 0]);
        assert!(forming.promote().is_err());

        let mut c = filled("0:0", &[20, 0, 0]);
        assert!(c.promote().unwrap());
        assert!(!c.promote().unwrap());
        assert_eq!(c.status(), ClusterStatus::Promoted);
    }

    // --- parents ---

    #[test]
    fn parent_aggregates_children() {
        let a = filled("0:0", &[20, 0, 0]);
        let b = filled("0:1", &[0, 0, 0, 4]);
        let parent = SignalCluster::parent(ClusterLevel::District, Category::Infrastructure, &[&a, &b]);
        assert_eq!(parent.weight(), a.weight() + b.weight());
        assert_eq!(parent.signal_count(), 7);
        assert_eq!(parent.cells().len(), 2);
        assert!(parent.lineage().contains(&a.id));
        assert!(parent.lineage().contains(&b.id));
        assert_eq!(parent.status(), ClusterStatus::Priority);
    }

    #[test]
    fn parent_absorb_is_idempotent() {
        let a = filled("0:0", &[20, 0, 0]);
        let b = filled("0:1", &[0, 0, 0]);
        let mut parent = SignalCluster::parent(ClusterLevel::District, Category::Infrastructure, &[&a]);
        assert!(parent.absorb_child(&b));
        let w = parent.weight();
        assert!(!parent.absorb_child(&b));
        assert_eq!(parent.weight(), w);
        assert_eq!(parent.signal_count(), 6);
    }

    #[test]
    fn grown_child_refreshes_parent() {
        let policy = ClusterPolicy::default();
        let mut a = filled("0:0", &[20, 0, 0]);
        let mut parent = SignalCluster::parent(ClusterLevel::District, Category::Infrastructure, &[&a]);
        a.absorb_signal(&signal("0:0-9", "0:0", 4, 0.0), &policy).unwrap();
        assert!(parent.absorb_child(&a));
        assert_eq!(parent.weight(), a.weight());
        assert_eq!(parent.signal_count(), 4);
        assert_eq!(parent.child_ids(), vec![a.id]);
    }

    #[test]
    fn parent_id_order_independent() {
        let a = local_cluster_id(Category::Health, &"1:1".into());
        let b = local_cluster_id(Category::Health, &"1:2".into());
        assert_eq!(
            parent_cluster_id(ClusterLevel::District, &[a, b]),
            parent_cluster_id(ClusterLevel::District, &[b, a, b])
        );
        assert_ne!(
            parent_cluster_id(ClusterLevel::District, &[a, b]),
            parent_cluster_id(ClusterLevel::Regional, &[a, b])
        );
    }

    #[test]
    fn local_id_depends_on_category_and_cell() {
        let cell: CellId = "3:4".into();
        assert_ne!(local_cluster_id(Category::Health, &cell), local_cluster_id(Category::Safety, &cell));
        assert_eq!(local_cluster_id(Category::Health, &cell), local_cluster_id(Category::Health, &cell));
    }

    #[test]
    fn cluster_serde_roundtrip() {
        let a = filled("0:0", &[1, 2, 3]);
        let parent = SignalCluster::parent(ClusterLevel::District, Category::Infrastructure, &[&a]);
        let json = serde_json::to_string(&parent).unwrap();
        let back: SignalCluster = serde_json::from_str(&json).unwrap();
        assert_eq!(back, parent);
    }

    #[test]
    fn level_navigation() {
        assert_eq!(ClusterLevel::Local.next(), Some(ClusterLevel::District));
        assert_eq!(ClusterLevel::Global.next(), None);
        assert_eq!(ClusterLevel::from_u8(3).unwrap(), ClusterLevel::Regional);
        assert_eq!(ClusterLevel::from_u8(5), Err(MalformedInput::LevelOutOfRange(5)));
    }

    proptest! {
        #[test]
        fn contribution_monotonic_in_attestations(a in 0u32..10_000, b in 0u32..10_000, w in 0.0f64..100.0) {
            let p = ClusterPolicy::default();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(signal_contribution(lo, w, &p) <= signal_contribution(hi, w, &p));
        }

        #[test]
        fn contribution_monotonic_in_influence(a in 0u32..10_000, x in 0.0f64..100.0, y in 0.0f64..100.0) {
            let p = ClusterPolicy::default();
            let (lo, hi) = if x <= y { (x, y) } else { (y, x) };
            prop_assert!(signal_contribution(a, lo, &p) <= signal_contribution(a, hi, &p));
        }

        #[test]
        fn weight_independent_of_insertion_order(atts in prop::collection::vec(0u32..50, 1..20)) {
            let forward = filled("0:0", &atts);
            let policy = ClusterPolicy::default();
            let mut backward = SignalCluster::local(Category::Infrastructure, "0:0".into());
            for (i, a) in atts.iter().enumerate().rev() {
                backward.absorb_signal(&signal(&format!("0:0-{i}"), "0:0", *a, 0.0), &policy).unwrap();
            }
            prop_assert_eq!(forward.weight().to_bits(), backward.weight().to_bits());
        }
    }
}
