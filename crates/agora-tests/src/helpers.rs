//! Shared builders for scenario and property tests.

use std::collections::BTreeMap;

use agora_core::geocell::GridProximity;
use agora_core::types::*;
use chrono::{DateTime, Utc};

/// Fixed timestamp `secs` after the epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).expect("timestamp in range")
}

/// Grid with one-degree cells, addressed by [`GridProximity::cell`].
pub fn grid() -> GridProximity {
    GridProximity::new(1.0).expect("valid cell size")
}

/// A raw signal in `cell`.
pub fn signal(id: &str, cell: &CellId, category: Category, attestations: u32, influence_weight: f64) -> Signal {
    Signal::new(
        SignalId::new(id),
        ContextId::new("ctx"),
        cell.clone(),
        category,
        format!("report {id}"),
        at(1_700_000_000),
        attestations,
        influence_weight,
    )
    .expect("valid signal")
}

/// `count` identical signals in one cell, ids prefixed by the cell.
pub fn signals_in(cell: &CellId, category: Category, count: usize, attestations: u32, influence_weight: f64) -> Vec<Signal> {
    (0..count)
        .map(|i| signal(&format!("{cell}/{i}"), cell, category, attestations, influence_weight))
        .collect()
}

/// Participants `p0..pn` holding `balances` in order.
pub fn participants(balances: &[f64]) -> Vec<ParticipantInfluenceRecord> {
    balances
        .iter()
        .enumerate()
        .map(|(i, b)| ParticipantInfluenceRecord::new(ParticipantId::new(format!("p{i}")), *b).expect("valid balance"))
        .collect()
}

/// Balances keyed `p0..pn`.
pub fn balance_map(balances: &[f64]) -> BTreeMap<ParticipantId, f64> {
    participants(balances).into_iter().map(|r| (r.participant, r.influence)).collect()
}

/// Vote pattern with a reject every third round.
pub fn pattern(rounds: usize) -> Vec<VoteChoice> {
    (0..rounds)
        .map(|i| if i % 3 == 0 { VoteChoice::Reject } else { VoteChoice::Approve })
        .collect()
}

/// `majority` validators (`m..`) vote [`pattern`], `bloc` validators (`b..`)
/// vote its exact opposite.
pub fn vote_split(majority: usize, bloc: usize, rounds: usize) -> Vec<ValidatorVoteRecord> {
    let base = pattern(rounds);
    let opposite: Vec<VoteChoice> = base
        .iter()
        .map(|v| match v {
            VoteChoice::Approve => VoteChoice::Reject,
            VoteChoice::Reject => VoteChoice::Approve,
        })
        .collect();
    let mut out: Vec<ValidatorVoteRecord> = (0..majority)
        .map(|i| ValidatorVoteRecord::new(ValidatorId::new(format!("m{i:02}")), base.clone()))
        .collect();
    out.extend((0..bloc).map(|i| ValidatorVoteRecord::new(ValidatorId::new(format!("b{i:02}")), opposite.clone())));
    out
}
