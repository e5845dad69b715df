//! # agora-cluster: Signal clustering and hierarchical promotion.
//!
//! All passes are pure functions of their input snapshots: no randomness,
//! no wall clock, no I/O. Iteration happens over ordered maps so the same
//! input produces bit-identical output.
//!
//! - **Clustering**: raw signals sharing a spatial cell and category form a
//!   level-1 cluster once the group reaches the minimum size. Cluster weight
//!   is recomputed from member contributions on every membership change.
//! - **Promotion**: spatially adjacent clusters of one level merge into a
//!   parent one level up when child count or total weight suffices *and*
//!   the underlying signal count clears a hard floor.
//! - **Problems**: a promoted cluster becomes a citable problem that links
//!   back to every source signal and every cluster in its lineage.

pub mod cluster;
pub mod engine;
pub mod problem;
pub mod promotion;

pub use cluster::{ClusterId, ClusterLevel, ClusterStatus, Members, SignalCluster, signal_contribution};
pub use engine::{ClusterEngine, ClusteringOutcome};
pub use problem::{Problem, ProblemOrigin};
pub use promotion::{Deferral, PromotionCandidate, PromotionEngine, PromotionOutcome, PromotionPlan, Readiness};
