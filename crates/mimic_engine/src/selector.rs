//! Two-stage upstream selection.
//!
//! Stage A narrows the record list by inbound path (text framing only;
//! binary framing carries no meaningful path and treats every record as
//! a candidate). Stage B resolves weighted groups to exactly one member
//! each and gates ungrouped records on their independent probability.

use behavior_dsl::Behavior;
use mimic_core::{Framing, Sampler, UpstreamRecord};
use std::collections::HashSet;

/// Result of selection for one request.
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    /// The config routes by path and nothing was eligible: answer 404.
    NoMatch,
    /// Records to call, in configuration order.
    Selected(Vec<UpstreamRecord>),
}

/// Selects the upstream subset for one request.
///
/// Group members compete for a single slot, placed where the group's
/// first candidate sat. Weights come from the request behavior's
/// `upstreamWeights` when present: explicit weights are used as given,
/// unspecified members share `100 − Σexplicit` equally, and a
/// non-positive total falls back to equal probability.
#[must_use]
pub fn select_upstreams(
    records: &[UpstreamRecord],
    path: &str,
    framing: Framing,
    behavior: &Behavior,
    sampler: &Sampler,
) -> Selection {
    // Stage A: path candidacy.
    let candidates: Vec<&UpstreamRecord> = match framing {
        Framing::Binary => records.iter().collect(),
        Framing::Text => records
            .iter()
            .filter(|r| r.is_catch_all() || r.matches_path(path))
            .collect(),
    };

    if candidates.is_empty() {
        let routes_by_path = records.iter().any(|r| !r.is_catch_all());
        if routes_by_path {
            return Selection::NoMatch;
        }
        return Selection::Selected(Vec::new());
    }

    // Stage B: group resolution and probability gates, preserving order.
    let mut selected: Vec<UpstreamRecord> = Vec::new();
    let mut resolved: HashSet<&str> = HashSet::new();

    for record in &candidates {
        match record.group.as_deref() {
            None => {
                if record.probability > 0.0 {
                    if sampler.chance(record.probability) {
                        selected.push((*record).clone());
                    }
                } else {
                    selected.push((*record).clone());
                }
            }
            Some(group) => {
                if !resolved.insert(group) {
                    continue;
                }
                let members: Vec<&UpstreamRecord> = candidates
                    .iter()
                    .filter(|r| r.group.as_deref() == Some(group))
                    .copied()
                    .collect();
                let winner = pick_group_member(&members, behavior, sampler);
                selected.push(winner.clone());
            }
        }
    }

    Selection::Selected(selected)
}

/// Resolves one group to a single member by weight.
fn pick_group_member<'a>(
    members: &[&'a UpstreamRecord],
    behavior: &Behavior,
    sampler: &Sampler,
) -> &'a UpstreamRecord {
    let weights = effective_weights(members, behavior);
    members[sampler.pick_weighted(&weights)]
}

fn effective_weights(members: &[&UpstreamRecord], behavior: &Behavior) -> Vec<f64> {
    let Some(overrides) = &behavior.upstream_weights else {
        return vec![1.0; members.len()];
    };

    let explicit: Vec<Option<f64>> = members
        .iter()
        .map(|m| overrides.get(&m.id).map(|w| f64::from(*w)))
        .collect();
    let sum_explicit: f64 = explicit.iter().flatten().sum();
    let unspecified = explicit.iter().filter(|w| w.is_none()).count();

    let share = if unspecified > 0 {
        #[allow(clippy::cast_precision_loss)]
        let share = (100.0 - sum_explicit) / unspecified as f64;
        share.max(0.0)
    } else {
        0.0
    };

    explicit.into_iter().map(|w| w.unwrap_or(share)).collect()
}
