//! Churn check between two committed history files.
//!
//! Replays the rescoring-rule partition over the label movement from one
//! history to the next. Rating counts are not part of a history file, so
//! every note counts as having no new ratings.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use notescore_core::{ScoringConfig, ScoringPhase, StatusHistoryRecord, TimestampMillis};
use notescore_scoring::{
    ChurnReport, HistoryTransition, RescoringFacts, StatusFlip, partition_notes,
};
use notescore_store::read_history_file;

pub struct ChurnCheck {
    pub report: ChurnReport,
    /// Notes in the later history that the earlier one never saw.
    pub new_notes: usize,
    /// Notes present only in the earlier history.
    pub dropped_notes: usize,
}

/// Transitions for every note the later history has a status for.
pub fn transitions_between(
    before: &[StatusHistoryRecord],
    after: &[StatusHistoryRecord],
) -> Vec<HistoryTransition> {
    let before: BTreeMap<_, _> = before.iter().map(|r| (r.note_id, r)).collect();
    after
        .iter()
        .filter_map(|record| {
            let final_status = record.current_status?;
            let previous = before.get(&record.note_id);
            Some(HistoryTransition {
                note_id: record.note_id,
                previous_status: previous.and_then(|p| p.current_status),
                final_status,
                locked: record.is_locked(),
                prior_status_change_millis: previous
                    .and_then(|p| p.timestamp_millis_of_most_recent_status_change),
            })
        })
        .collect()
}

/// Measure churn for `phase`'s rules across two history snapshots.
pub fn check_history_transition(
    before: &[StatusHistoryRecord],
    after: &[StatusHistoryRecord],
    phase: ScoringPhase,
    now: TimestampMillis,
    config: &ScoringConfig,
) -> ChurnCheck {
    let transitions = transitions_between(before, after);
    let facts: Vec<RescoringFacts> = transitions
        .iter()
        .map(|t| RescoringFacts::from_transition(t, 0))
        .collect();
    let rules = config.rescoring_rules(phase, &BTreeMap::new());
    let assignment = partition_notes(&rules, &facts, now, config.recent_flip_lookback_millis);
    let flips: Vec<StatusFlip> = transitions.iter().map(StatusFlip::from).collect();

    let after_ids: std::collections::BTreeSet<_> = after.iter().map(|r| r.note_id).collect();
    ChurnCheck {
        report: ChurnReport::evaluate(&rules, &assignment, &flips, config),
        new_notes: transitions.iter().filter(|t| t.previous_status.is_none()).count(),
        dropped_notes: before.iter().filter(|r| !after_ids.contains(&r.note_id)).count(),
    }
}

/// Load both files and run the check. `now` defaults to the latest current
/// status timestamp in the later file.
pub fn check_history_files(
    before: &Path,
    after: &Path,
    phase: ScoringPhase,
    config: &ScoringConfig,
) -> anyhow::Result<ChurnCheck> {
    let before = read_history_file(before)
        .with_context(|| format!("reading {}", before.display()))?;
    let after_records =
        read_history_file(after).with_context(|| format!("reading {}", after.display()))?;
    eprintln!(
        "  Compared {} notes against {} earlier records",
        after_records.len(),
        before.len()
    );
    let now = after_records
        .iter()
        .filter_map(|r| r.timestamp_millis_of_current_status)
        .max()
        .unwrap_or_default();
    Ok(check_history_transition(&before, &after_records, phase, now, config))
}
