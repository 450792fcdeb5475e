//! Per-note differences between consecutive runs' decisions.

use std::collections::{BTreeMap, BTreeSet};

use notescore_core::{NoteDecision, NoteId, NoteStatusChange};

const NONE: &str = "NONE";

fn all_rules(decision: &NoteDecision) -> BTreeSet<&str> {
    decision
        .meta_scorer_active_rules
        .iter()
        .chain(decision.tier_scores.values().flat_map(|s| s.active_rules.iter()))
        .map(String::as_str)
        .collect()
}

fn same_intercept(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b || (a.is_nan() && b.is_nan()),
        (None, None) => true,
        _ => false,
    }
}

fn render_intercept(value: Option<f64>) -> String {
    value.map_or_else(|| "none".to_string(), |v| v.to_string())
}

/// Diff one note. `None` when nothing tracked changed.
pub fn note_status_change(
    previous: Option<&NoteDecision>,
    current: &NoteDecision,
    new_ratings: u32,
) -> Option<NoteStatusChange> {
    let old_status = previous.map_or(NONE, |d| d.final_status.as_str());
    let status_changed = old_status != current.final_status.as_str();

    let old_decided_by = previous.map_or_else(|| NONE.to_string(), |d| d.decided_by.name());
    let new_decided_by = current.decided_by.name();
    let decided_by_changed = old_decided_by != new_decided_by;

    let old_rules = previous.map(all_rules).unwrap_or_default();
    let new_rules = all_rules(current);
    let added: Vec<String> = new_rules.difference(&old_rules).map(|r| r.to_string()).collect();
    let removed: Vec<String> = old_rules.difference(&new_rules).map(|r| r.to_string()).collect();

    let old_intercept = previous.and_then(NoteDecision::decided_by_intercept);
    let new_intercept = current.decided_by_intercept();
    let intercept_changed = !same_intercept(old_intercept, new_intercept);

    let is_new = previous.is_none();
    if !(is_new || status_changed || decided_by_changed || intercept_changed)
        && added.is_empty()
        && removed.is_empty()
    {
        return None;
    }

    Some(NoteStatusChange {
        note_id: current.note_id,
        final_status_change: status_changed
            .then(|| format!("{old_status} -> {}", current.final_status)),
        new_ratings,
        decided_by_change: decided_by_changed
            .then(|| format!("{old_decided_by} -> {new_decided_by}")),
        all_added_rules: added,
        all_removed_rules: removed,
        decided_by_intercept_change: intercept_changed.then(|| {
            format!(
                "{} -> {}",
                render_intercept(old_intercept),
                render_intercept(new_intercept)
            )
        }),
    })
}

/// Diff a whole run against the previous run's decisions.
pub fn note_status_changes(
    previous: &BTreeMap<NoteId, NoteDecision>,
    current: &[NoteDecision],
    new_ratings: &BTreeMap<NoteId, u32>,
) -> Vec<NoteStatusChange> {
    current
        .iter()
        .filter_map(|decision| {
            note_status_change(
                previous.get(&decision.note_id),
                decision,
                new_ratings.get(&decision.note_id).copied().unwrap_or(0),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use notescore_core::{NoteStatus, Tier, TierScore};

    use super::*;

    fn decision(status: NoteStatus, decided_by: Tier, intercept: f64) -> NoteDecision {
        NoteDecision {
            note_id: 7,
            final_status: status,
            unlocked_status: status,
            decided_by: decided_by.clone(),
            meta_scorer_active_rules: vec!["CoreModel".into()],
            first_tag: None,
            second_tag: None,
            modeling_group: None,
            topic: None,
            tier_scores: BTreeMap::from([(
                decided_by,
                TierScore {
                    status,
                    note_intercept: intercept,
                    note_factor: 0.0,
                    intercept_interval: None,
                    num_final_round_ratings: 5,
                    active_rules: vec!["RuleA".into()],
                },
            )]),
            rescoring_active_rule: None,
            num_ratings: 5,
        }
    }

    #[test]
    fn unchanged_decision_produces_no_row() {
        let d = decision(NoteStatus::CurrentlyRatedHelpful, Tier::Core, 0.42);
        assert_eq!(note_status_change(Some(&d), &d, 0), None);
    }

    #[test]
    fn nan_intercepts_compare_equal() {
        let d = decision(NoteStatus::NeedsMoreRatings, Tier::Core, f64::NAN);
        assert_eq!(note_status_change(Some(&d), &d, 3), None);
    }

    #[test]
    fn new_note_renders_none_as_old_status() {
        let d = decision(NoteStatus::CurrentlyRatedHelpful, Tier::Core, 0.42);
        let change = note_status_change(None, &d, 4).unwrap();
        assert_eq!(
            change.final_status_change.as_deref(),
            Some("NONE -> CURRENTLY_RATED_HELPFUL")
        );
        assert_eq!(change.decided_by_change.as_deref(), Some("NONE -> core"));
        assert_eq!(change.new_ratings, 4);
        assert_eq!(change.all_added_rules, vec!["CoreModel", "RuleA"]);
        assert_eq!(change.decided_by_intercept_change.as_deref(), Some("none -> 0.42"));
    }

    #[test]
    fn status_and_tier_changes_are_reported() {
        let old = decision(NoteStatus::NeedsMoreRatings, Tier::Core, 0.1);
        let mut new = decision(NoteStatus::CurrentlyRatedHelpful, Tier::Group(13), 0.45);
        new.tier_scores
            .values_mut()
            .for_each(|s| s.active_rules = vec!["RuleB".into()]);

        let change = note_status_change(Some(&old), &new, 0).unwrap();
        assert_eq!(
            change.final_status_change.as_deref(),
            Some("NEEDS_MORE_RATINGS -> CURRENTLY_RATED_HELPFUL")
        );
        assert_eq!(change.decided_by_change.as_deref(), Some("core -> group:13"));
        assert_eq!(change.all_added_rules, vec!["RuleB"]);
        assert_eq!(change.all_removed_rules, vec!["RuleA"]);
        assert_eq!(change.decided_by_intercept_change.as_deref(), Some("0.1 -> 0.45"));
    }

    #[test]
    fn run_level_diff_skips_stable_notes() {
        let stable = decision(NoteStatus::CurrentlyRatedHelpful, Tier::Core, 0.42);
        let mut moved = decision(NoteStatus::CurrentlyRatedNotHelpful, Tier::Core, -0.1);
        moved.note_id = 8;
        let mut moved_before = moved.clone();
        moved_before.final_status = NoteStatus::NeedsMoreRatings;

        let previous = BTreeMap::from([(7, stable.clone()), (8, moved_before)]);
        let changes = note_status_changes(&previous, &[stable, moved], &BTreeMap::from([(8, 2)]));
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].note_id, 8);
        assert_eq!(changes[0].new_ratings, 2);
    }
}
