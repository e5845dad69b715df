//! Hierarchical promotion: local → district → regional → global.
//!
//! A grouping of level-`L` clusters promotes into one level-`L+1` parent when
//!
//! ```text
//! (children >= min_child_clusters[L] OR weight >= min_total_weight[L])
//!     AND signals >= min_signals[L]
//! ```
//!
//! The signal floor is never satisfied by weight. Groupings are discovered as
//! connected components of same-category clusters whose cells touch. A
//! component that touches an existing parent extends that parent instead of
//! creating a second one.
//!
//! Promotions into a level above `max_enabled_level` are planned and reported
//! as awaiting a trigger. Only [`PromotionEngine::trigger`] applies them.
//! Promotion never deletes a lower-level cluster.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use agora_core::error::{InvariantViolation, KernelError, MalformedInput};
use agora_core::policy::{LevelThresholds, PromotionPolicy};
use agora_core::traits::ProximityAdapter;
use agora_core::types::{Category, SignalId};
use serde::{Serialize, Serializer};

use crate::cluster::{ClusterId, ClusterLevel, ClusterStatus, SignalCluster, propagate};

fn serialize_display<T: fmt::Display, S: Serializer>(value: &T, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(value)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// Target level is enabled; [`PromotionEngine::run`] applies it.
    AutoPromote,
    /// Target level is disabled; needs [`PromotionEngine::trigger`].
    AwaitingTrigger,
}

/// A grouping that qualifies for promotion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionCandidate {
    pub target: ClusterLevel,
    pub category: Category,
    pub children: Vec<ClusterId>,
    pub total_weight: f64,
    pub signal_count: usize,
    /// Existing parent this grouping joins instead of forming a new one.
    pub extends: Option<ClusterId>,
    pub readiness: Readiness,
}

/// A grouping that was discovered but does not meet the thresholds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deferral {
    pub category: Category,
    pub children: Vec<ClusterId>,
    #[serde(serialize_with = "serialize_display")]
    pub reason: InvariantViolation,
}

/// Promotion plan for one source level. Computing it changes nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionPlan {
    pub level: ClusterLevel,
    pub candidates: Vec<PromotionCandidate>,
    pub deferred: Vec<Deferral>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromotionOutcome {
    /// Every cluster after promotion, ordered by `(level, id)`.
    pub clusters: Vec<SignalCluster>,
    pub created: Vec<ClusterId>,
    pub extended: Vec<ClusterId>,
    pub awaiting: Vec<PromotionCandidate>,
    pub deferred: Vec<Deferral>,
}

#[derive(Debug, Clone, Default)]
pub struct PromotionEngine {
    policy: PromotionPolicy,
}

type ClusterMap = BTreeMap<ClusterId, SignalCluster>;

fn index(clusters: &[SignalCluster]) -> Result<ClusterMap, MalformedInput> {
    let mut map = BTreeMap::new();
    for c in clusters {
        if map.insert(c.id, c.clone()).is_some() {
            return Err(MalformedInput::DuplicateId(c.id.to_string()));
        }
    }
    Ok(map)
}

fn into_sorted(map: ClusterMap) -> Vec<SignalCluster> {
    let mut clusters: Vec<SignalCluster> = map.into_values().collect();
    clusters.sort_by(|a, b| (a.level, a.id).cmp(&(b.level, b.id)));
    clusters
}

fn touches(a: &SignalCluster, b: &SignalCluster, proximity: &dyn ProximityAdapter) -> bool {
    a.cells().iter().any(|x| b.cells().iter().any(|y| proximity.are_adjacent(x, y)))
}

/// Connected components over cell adjacency. Each component is sorted by id.
fn components(members: &[&SignalCluster], proximity: &dyn ProximityAdapter) -> Vec<Vec<usize>> {
    let mut visited = vec![false; members.len()];
    let mut out = Vec::new();
    for start in 0..members.len() {
        if visited[start] {
            continue;
        }
        visited[start] = true;
        let mut stack = vec![start];
        let mut component = Vec::new();
        while let Some(i) = stack.pop() {
            component.push(i);
            for j in 0..members.len() {
                if !visited[j] && touches(members[i], members[j], proximity) {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }
        component.sort_by_key(|&i| members[i].id);
        out.push(component);
    }
    out
}

/// Parent at `target` that already holds `child`, if any.
fn parent_of(map: &ClusterMap, target: ClusterLevel, child: &ClusterId) -> Option<ClusterId> {
    map.values()
        .find(|p| p.level == target && p.contains_child(child))
        .map(|p| p.id)
}

fn totals(children: &[&SignalCluster]) -> (f64, usize) {
    let weight = children.iter().map(|c| c.weight()).sum();
    let signals: BTreeSet<&SignalId> = children.iter().flat_map(|c| c.source_signals()).collect();
    (weight, signals.len())
}

fn check_thresholds(
    level: ClusterLevel,
    thresholds: &LevelThresholds,
    child_count: usize,
    weight: f64,
    signals: usize,
) -> Result<(), InvariantViolation> {
    if signals < thresholds.min_signals {
        return Err(InvariantViolation::SignalFloor {
            level: level.as_u8(),
            have: signals,
            need: thresholds.min_signals,
        });
    }
    if child_count < thresholds.min_child_clusters && weight < thresholds.min_total_weight {
        return Err(InvariantViolation::InsufficientEvidence {
            level: level.as_u8(),
            children: child_count,
            need_children: thresholds.min_child_clusters,
            weight,
            need_weight: thresholds.min_total_weight,
        });
    }
    Ok(())
}

impl PromotionEngine {
    pub fn new(policy: PromotionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PromotionPolicy {
        &self.policy
    }

    fn readiness(&self, target: ClusterLevel) -> Readiness {
        if self.policy.is_enabled(target.as_u8()) {
            Readiness::AutoPromote
        } else {
            Readiness::AwaitingTrigger
        }
    }

    fn target_and_thresholds(&self, level: ClusterLevel) -> Result<(ClusterLevel, LevelThresholds), MalformedInput> {
        let target = level.next().ok_or(MalformedInput::LevelOutOfRange(level.as_u8()))?;
        let thresholds = *self
            .policy
            .from_level(level.as_u8())
            .ok_or(MalformedInput::LevelOutOfRange(level.as_u8()))?;
        Ok((target, thresholds))
    }

    /// Discover promotable groupings among level-`level` clusters.
    ///
    /// Eligible children are priority or promoted clusters that no parent
    /// holds yet.
    pub fn plan(
        &self,
        clusters: &[SignalCluster],
        level: ClusterLevel,
        proximity: &dyn ProximityAdapter,
    ) -> Result<PromotionPlan, KernelError> {
        let map = index(clusters)?;
        Ok(self.plan_map(&map, level, proximity)?)
    }

    fn plan_map(
        &self,
        map: &ClusterMap,
        level: ClusterLevel,
        proximity: &dyn ProximityAdapter,
    ) -> Result<PromotionPlan, MalformedInput> {
        let (target, thresholds) = self.target_and_thresholds(level)?;
        let mut by_category: BTreeMap<Category, Vec<&SignalCluster>> = BTreeMap::new();
        for c in map.values() {
            let eligible = c.level == level
                && matches!(c.status(), ClusterStatus::Priority | ClusterStatus::Promoted)
                && parent_of(map, target, &c.id).is_none();
            if eligible {
                by_category.entry(c.category).or_default().push(c);
            }
        }

        let mut candidates = Vec::new();
        let mut deferred = Vec::new();
        for (category, members) in by_category {
            let parents: Vec<&SignalCluster> = map
                .values()
                .filter(|p| p.level == target && p.category == category)
                .collect();
            for component in components(&members, proximity) {
                let children: Vec<&SignalCluster> = component.iter().map(|&i| members[i]).collect();
                let ids: Vec<ClusterId> = children.iter().map(|c| c.id).collect();
                let (total_weight, signal_count) = totals(&children);

                let extends = parents
                    .iter()
                    .find(|p| children.iter().any(|c| touches(p, c, proximity)))
                    .map(|p| p.id);

                if extends.is_none() {
                    if let Err(reason) = check_thresholds(level, &thresholds, ids.len(), total_weight, signal_count) {
                        tracing::debug!(%category, %level, %reason, "grouping deferred");
                        deferred.push(Deferral { category, children: ids, reason });
                        continue;
                    }
                }
                candidates.push(PromotionCandidate {
                    target,
                    category,
                    children: ids,
                    total_weight,
                    signal_count,
                    extends,
                    readiness: self.readiness(target),
                });
            }
        }
        Ok(PromotionPlan { level, candidates, deferred })
    }

    /// Apply one candidate: build or extend the parent and mark the children promoted.
    /// An extended parent's growth is carried into every ancestor above it.
    /// Returns the parent id and whether it was newly created.
    fn apply(map: &mut ClusterMap, candidate: &PromotionCandidate) -> Result<(ClusterId, bool), MalformedInput> {
        let mut children = Vec::with_capacity(candidate.children.len());
        for id in &candidate.children {
            let child = map.get_mut(id).ok_or_else(|| MalformedInput::UnknownCluster(id.to_string()))?;
            child.promote()?;
            children.push(child.clone());
        }
        let (parent_id, created) = match candidate.extends {
            Some(parent_id) => {
                let parent = map
                    .get_mut(&parent_id)
                    .ok_or_else(|| MalformedInput::UnknownCluster(parent_id.to_string()))?;
                let mut grew = false;
                for child in &children {
                    grew |= parent.absorb_child(child);
                }
                if grew {
                    propagate(map, BTreeSet::from([parent_id]));
                }
                (parent_id, false)
            }
            None => {
                let refs: Vec<&SignalCluster> = children.iter().collect();
                let parent = SignalCluster::parent(candidate.target, candidate.category, &refs);
                let id = parent.id;
                map.insert(id, parent);
                (id, true)
            }
        };
        tracing::info!(
            parent = %parent_id,
            level = %candidate.target,
            children = candidate.children.len(),
            created,
            "clusters promoted"
        );
        Ok((parent_id, created))
    }

    /// Plan and apply every auto-promotable grouping, cascading upward.
    ///
    /// Groupings whose target level is disabled are returned in `awaiting`.
    /// Running twice over the result is a no-op.
    pub fn run(
        &self,
        clusters: &[SignalCluster],
        proximity: &dyn ProximityAdapter,
    ) -> Result<PromotionOutcome, KernelError> {
        let mut map = index(clusters)?;
        let mut created = Vec::new();
        let mut extended = Vec::new();
        let mut awaiting = Vec::new();
        let mut deferred = Vec::new();

        for level in [ClusterLevel::Local, ClusterLevel::District, ClusterLevel::Regional] {
            let plan = self.plan_map(&map, level, proximity)?;
            deferred.extend(plan.deferred);
            for candidate in plan.candidates {
                if candidate.readiness == Readiness::AwaitingTrigger {
                    awaiting.push(candidate);
                    continue;
                }
                let (id, fresh) = Self::apply(&mut map, &candidate)?;
                if fresh {
                    created.push(id);
                } else if !extended.contains(&id) {
                    extended.push(id);
                }
            }
        }

        Ok(PromotionOutcome { clusters: into_sorted(map), created, extended, awaiting, deferred })
    }

    /// Explicitly promote `children` into one parent one level up, regardless
    /// of whether that level is enabled.
    ///
    /// The children must share a level and category, be priority or
    /// promoted, and form one spatially connected grouping. If they already
    /// sit under a single parent the call changes nothing.
    pub fn trigger(
        &self,
        clusters: &[SignalCluster],
        children: &[ClusterId],
        proximity: &dyn ProximityAdapter,
    ) -> Result<PromotionOutcome, KernelError> {
        let mut map = index(clusters)?;
        let ids: Vec<ClusterId> = children.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
        let first = ids.first().ok_or(MalformedInput::EmptyGrouping)?;
        let head = map.get(first).ok_or_else(|| MalformedInput::UnknownCluster(first.to_string()))?;
        let (level, category) = (head.level, head.category);
        let (target, thresholds) = self.target_and_thresholds(level)?;

        let mut members = Vec::with_capacity(ids.len());
        for id in &ids {
            let c = map.get(id).ok_or_else(|| MalformedInput::UnknownCluster(id.to_string()))?;
            if c.level != level || c.category != category {
                return Err(MalformedInput::MixedGrouping(format!(
                    "{} is {} {}, expected {} {}",
                    c.id, c.level, c.category, level, category
                ))
                .into());
            }
            if c.status() == ClusterStatus::Forming {
                return Err(MalformedInput::InvalidTransition {
                    from: ClusterStatus::Forming.to_string(),
                    to: ClusterStatus::Promoted.to_string(),
                }
                .into());
            }
            members.push(c);
        }

        let parents: BTreeSet<ClusterId> = ids.iter().filter_map(|id| parent_of(&map, target, id)).collect();
        if parents.len() > 1 {
            return Err(MalformedInput::MixedGrouping("children already sit under different parents".into()).into());
        }
        let extends = parents.into_iter().next();

        let parts = components(&members, proximity);
        if parts.len() > 1 {
            let stray = parts.get(1).and_then(|p| p.first()).map(|&i| members[i].id.to_string());
            return Err(InvariantViolation::NonAdjacentMembers(stray.unwrap_or_default()).into());
        }

        let (total_weight, signal_count) = totals(&members);
        if let Some(parent_id) = extends {
            if ids.iter().all(|id| parent_of(&map, target, id) == Some(parent_id)) {
                tracing::debug!(parent = %parent_id, "grouping already promoted");
                return Ok(PromotionOutcome {
                    clusters: into_sorted(map),
                    created: Vec::new(),
                    extended: Vec::new(),
                    awaiting: Vec::new(),
                    deferred: Vec::new(),
                });
            }
        } else {
            check_thresholds(level, &thresholds, ids.len(), total_weight, signal_count)?;
        }

        let candidate = PromotionCandidate {
            target,
            category,
            children: ids,
            total_weight,
            signal_count,
            extends,
            readiness: self.readiness(target),
        };
        let (id, fresh) = Self::apply(&mut map, &candidate)?;
        let (created, extended) = if fresh { (vec![id], Vec::new()) } else { (Vec::new(), vec![id]) };
        Ok(PromotionOutcome { clusters: into_sorted(map), created, extended, awaiting: Vec::new(), deferred: Vec::new() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::geocell::GridProximity;
    use agora_core::policy::ClusterPolicy;
    use agora_core::types::{ContextId, Signal};
    use chrono::{DateTime, Utc};

    /// Level-1 priority cluster at `(row, col)` holding `n` signals with
    /// `attestations` each.
    fn local(row: i64, col: i64, n: usize, attestations: u32) -> SignalCluster {
        local_in(Category::Infrastructure, row, col, n, attestations)
    }

    fn local_in(category: Category, row: i64, col: i64, n: usize, attestations: u32) -> SignalCluster {
        let policy = ClusterPolicy::default();
        let cell = GridProximity::cell(row, col);
        let mut c = SignalCluster::local(category, cell.clone());
        for i in 0..n {
            let s = Signal::new(
                format!("{category}/{cell}/{i}").into(),
                ContextId::new("ctx"),
                cell.clone(),
                category,
                "flooding",
                DateTime::<Utc>::UNIX_EPOCH,
                attestations,
                0.0,
            )
            .unwrap();
            c.absorb_signal(&s, &policy).unwrap();
        }
        c
    }

    fn grid() -> GridProximity {
        GridProximity::new(1.0).unwrap()
    }

    fn row_of_three() -> Vec<SignalCluster> {
        vec![local(0, 0, 10, 0), local(0, 1, 10, 0), local(0, 2, 10, 0)]
    }

    // --- plan ---

    #[test]
    fn adjacent_priority_clusters_qualify() {
        let engine = PromotionEngine::default();
        let plan = engine.plan(&row_of_three(), ClusterLevel::Local, &grid()).unwrap();
        assert_eq!(plan.candidates.len(), 1);
        let c = &plan.candidates[0];
        assert_eq!(c.target, ClusterLevel::District);
        assert_eq!(c.children.len(), 3);
        assert_eq!(c.signal_count, 30);
        assert_eq!(c.readiness, Readiness::AutoPromote);
        assert!(c.extends.is_none());
    }

    #[test]
    fn non_adjacent_clusters_do_not_group() {
        let clusters = vec![local(0, 0, 10, 0), local(0, 5, 10, 0), local(0, 9, 10, 0)];
        let plan = PromotionEngine::default().plan(&clusters, ClusterLevel::Local, &grid()).unwrap();
        assert!(plan.candidates.is_empty());
        assert_eq!(plan.deferred.len(), 3);
    }

    #[test]
    fn categories_never_mix() {
        let clusters = vec![
            local(0, 0, 10, 0),
            local_in(Category::Safety, 0, 1, 10, 0),
            local(0, 2, 10, 0),
        ];
        let plan = PromotionEngine::default().plan(&clusters, ClusterLevel::Local, &grid()).unwrap();
        assert!(plan.candidates.is_empty());
    }

    #[test]
    fn weight_alone_satisfies_disjunction() {
        // Two children, but 2 * 10 signals * 3.0 = 60 weight >= 50.
        let clusters = vec![local(0, 0, 10, 6), local(1, 1, 10, 6)];
        let plan = PromotionEngine::default().plan(&clusters, ClusterLevel::Local, &grid()).unwrap();
        assert_eq!(plan.candidates.len(), 1);
        assert_eq!(plan.candidates[0].total_weight, 60.0);
    }

    #[test]
    fn signal_floor_is_hard() {
        // Huge weight, three children, but only 3 * 3 = 9 signals < 15.
        let clusters = vec![local(0, 0, 3, 1000), local(0, 1, 3, 1000), local(0, 2, 3, 1000)];
        let plan = PromotionEngine::default().plan(&clusters, ClusterLevel::Local, &grid()).unwrap();
        assert!(plan.candidates.is_empty());
        assert!(matches!(
            plan.deferred[0].reason,
            InvariantViolation::SignalFloor { level: 1, have: 9, need: 15 }
        ));
    }

    #[test]
    fn forming_clusters_are_not_eligible() {
        let clusters = vec![local(0, 0, 5, 0), local(0, 1, 5, 0), local(0, 2, 5, 0)];
        assert!(clusters.iter().all(|c| c.status() == ClusterStatus::Forming));
        let plan = PromotionEngine::default().plan(&clusters, ClusterLevel::Local, &grid()).unwrap();
        assert!(plan.candidates.is_empty());
        assert!(plan.deferred.is_empty());
    }

    #[test]
    fn global_level_has_no_target() {
        let err = PromotionEngine::default().plan(&[], ClusterLevel::Global, &grid()).unwrap_err();
        assert_eq!(err, KernelError::Malformed(MalformedInput::LevelOutOfRange(4)));
    }

    // --- run ---

    #[test]
    fn run_creates_parent_and_promotes_children() {
        let clusters = row_of_three();
        let out = PromotionEngine::default().run(&clusters, &grid()).unwrap();
        assert_eq!(out.created.len(), 1);
        let parent = out.clusters.iter().find(|c| c.id == out.created[0]).unwrap();
        assert_eq!(parent.level, ClusterLevel::District);
        assert_eq!(parent.signal_count(), 30);
        assert_eq!(parent.weight(), clusters.iter().map(|c| c.weight()).sum::<f64>());
        for child in out.clusters.iter().filter(|c| c.level == ClusterLevel::Local) {
            assert_eq!(child.status(), ClusterStatus::Promoted);
        }
        // Lower levels survive.
        assert_eq!(out.clusters.len(), 4);
    }

    #[test]
    fn run_is_idempotent() {
        let engine = PromotionEngine::default();
        let first = engine.run(&row_of_three(), &grid()).unwrap();
        let second = engine.run(&first.clusters, &grid()).unwrap();
        assert!(second.created.is_empty());
        assert!(second.extended.is_empty());
        assert_eq!(first.clusters, second.clusters);
    }

    #[test]
    fn late_neighbour_extends_existing_parent() {
        let engine = PromotionEngine::default();
        let first = engine.run(&row_of_three(), &grid()).unwrap();
        let parent_id = first.created[0];
        let mut clusters = first.clusters.clone();
        clusters.push(local(0, 3, 10, 0));

        let second = engine.run(&clusters, &grid()).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.extended, vec![parent_id]);
        let parent = second.clusters.iter().find(|c| c.id == parent_id).unwrap();
        assert_eq!(parent.signal_count(), 40);
    }

    #[test]
    fn extension_reaches_grandparent() {
        // Ten neighbours of weight 30 make a district; the district alone
        // clears the regional thresholds (100 signals, 300 >= 250).
        let engine = PromotionEngine::default();
        let row: Vec<SignalCluster> = (0..10).map(|col| local(0, col, 10, 6)).collect();
        let district = engine.run(&row, &grid()).unwrap();
        let district_id = district.created[0];
        let regional = engine.trigger(&district.clusters, &[district_id], &grid()).unwrap();
        let regional_id = regional.created[0];

        let mut clusters = regional.clusters.clone();
        clusters.push(local(0, 10, 10, 6));
        let out = engine.run(&clusters, &grid()).unwrap();
        assert_eq!(out.extended, vec![district_id]);

        let find = |id: ClusterId| out.clusters.iter().find(|c| c.id == id).unwrap();
        let (d, r) = (find(district_id), find(regional_id));
        assert_eq!(d.weight(), 330.0);
        assert_eq!(d.signal_count(), 110);
        assert_eq!(r.weight(), d.weight());
        assert_eq!(r.source_signals(), d.source_signals());
        assert!(r.lineage().is_superset(d.lineage()));

        // Settled: a second pass changes nothing.
        let again = engine.run(&out.clusters, &grid()).unwrap();
        assert!(again.extended.is_empty());
        assert_eq!(again.clusters, out.clusters);
    }

    #[test]
    fn triggered_extension_reaches_grandparent() {
        let engine = PromotionEngine::default();
        let row: Vec<SignalCluster> = (0..10).map(|col| local(0, col, 10, 6)).collect();
        let district = engine.run(&row, &grid()).unwrap();
        let district_id = district.created[0];
        let regional = engine.trigger(&district.clusters, &[district_id], &grid()).unwrap();
        let regional_id = regional.created[0];

        let mut policy = PromotionPolicy::default();
        policy.max_enabled_level = 1;
        let mut clusters = regional.clusters.clone();
        let late = local(0, 10, 10, 6);
        let late_id = late.id;
        clusters.push(late);
        let ids: Vec<ClusterId> = clusters
            .iter()
            .filter(|c| c.level == ClusterLevel::Local)
            .map(|c| c.id)
            .collect();
        let out = PromotionEngine::new(policy).trigger(&clusters, &ids, &grid()).unwrap();
        assert_eq!(out.extended, vec![district_id]);
        let r = out.clusters.iter().find(|c| c.id == regional_id).unwrap();
        assert_eq!(r.weight(), 330.0);
        assert!(r.lineage().contains(&late_id));
    }

    #[test]
    fn disabled_level_awaits_trigger() {
        let mut policy = PromotionPolicy::default();
        policy.max_enabled_level = 1;
        let out = PromotionEngine::new(policy).run(&row_of_three(), &grid()).unwrap();
        assert!(out.created.is_empty());
        assert_eq!(out.awaiting.len(), 1);
        assert_eq!(out.awaiting[0].readiness, Readiness::AwaitingTrigger);
        assert!(out.clusters.iter().all(|c| c.status() == ClusterStatus::Priority));
    }

    // --- trigger ---

    #[test]
    fn trigger_promotes_into_disabled_level() {
        let mut policy = PromotionPolicy::default();
        policy.max_enabled_level = 1;
        let engine = PromotionEngine::new(policy);
        let clusters = row_of_three();
        let ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        let out = engine.trigger(&clusters, &ids, &grid()).unwrap();
        assert_eq!(out.created.len(), 1);
    }

    #[test]
    fn trigger_twice_does_not_double_count() {
        let engine = PromotionEngine::default();
        let clusters = row_of_three();
        let ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        let first = engine.trigger(&clusters, &ids, &grid()).unwrap();
        let second = engine.trigger(&first.clusters, &ids, &grid()).unwrap();
        assert!(second.created.is_empty());
        assert_eq!(first.clusters, second.clusters);
        let parent = second.clusters.iter().find(|c| c.id == first.created[0]).unwrap();
        assert_eq!(parent.signal_count(), 30);
    }

    #[test]
    fn trigger_rejects_signal_floor() {
        let clusters = vec![local(0, 0, 3, 1000), local(0, 1, 3, 1000), local(0, 2, 3, 1000)];
        let ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        let err = PromotionEngine::default().trigger(&clusters, &ids, &grid()).unwrap_err();
        assert!(err.is_invariant_violation());
        assert!(matches!(err, KernelError::Invariant(InvariantViolation::SignalFloor { .. })));
    }

    #[test]
    fn trigger_rejects_disconnected_grouping() {
        let clusters = vec![local(0, 0, 10, 0), local(0, 1, 10, 0), local(0, 9, 10, 0)];
        let ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        let err = PromotionEngine::default().trigger(&clusters, &ids, &grid()).unwrap_err();
        assert!(matches!(err, KernelError::Invariant(InvariantViolation::NonAdjacentMembers(_))));
    }

    #[test]
    fn trigger_rejects_mixed_and_empty() {
        let engine = PromotionEngine::default();
        let clusters = vec![local(0, 0, 10, 0), local_in(Category::Health, 0, 1, 10, 0)];
        let ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        assert!(matches!(
            engine.trigger(&clusters, &ids, &grid()),
            Err(KernelError::Malformed(MalformedInput::MixedGrouping(_)))
        ));
        assert_eq!(
            engine.trigger(&clusters, &[], &grid()),
            Err(KernelError::Malformed(MalformedInput::EmptyGrouping))
        );
    }

    #[test]
    fn trigger_rejects_forming_children() {
        let clusters = vec![local(0, 0, 5, 0), local(0, 1, 5, 0), local(0, 2, 5, 0)];
        let ids: Vec<ClusterId> = clusters.iter().map(|c| c.id).collect();
        let err = PromotionEngine::default().trigger(&clusters, &ids, &grid()).unwrap_err();
        assert!(matches!(err, KernelError::Malformed(MalformedInput::InvalidTransition { .. })));
    }
}
