//! Partitions the scored notes into rescoring-rule subsets.

use std::collections::BTreeMap;

use notescore_core::{
    NoteId, NoteStatus, Rating, RescoringRule, RescoringRuleId, StatusHistoryRecord,
    TimestampMillis,
};
use tracing::debug;

use crate::history::HistoryTransition;

/// Per-note facts the rule predicates look at.
#[derive(Debug, Clone, PartialEq)]
pub struct RescoringFacts {
    pub note_id: NoteId,
    pub locked: bool,
    pub new_ratings: u32,
    pub previous_status: Option<NoteStatus>,
    pub final_status: NoteStatus,
    pub prior_status_change_millis: Option<TimestampMillis>,
}

impl RescoringFacts {
    pub fn from_transition(transition: &HistoryTransition, new_ratings: u32) -> Self {
        Self {
            note_id: transition.note_id,
            locked: transition.locked,
            new_ratings,
            previous_status: transition.previous_status,
            final_status: transition.final_status,
            prior_status_change_millis: transition.prior_status_change_millis,
        }
    }

    fn just_flipped(&self) -> bool {
        self.previous_status
            .is_some_and(|previous| previous != self.final_status)
    }
}

/// Whether `rule`'s predicate holds for a note.
pub fn rule_matches(
    rule: RescoringRuleId,
    facts: &RescoringFacts,
    now: TimestampMillis,
    lookback_millis: TimestampMillis,
) -> bool {
    match rule {
        RescoringRuleId::AllUnlockedNotes => !facts.locked,
        RescoringRuleId::UnlockedNotesWithNoNewRatings => !facts.locked && facts.new_ratings == 0,
        RescoringRuleId::NotesWithNewRatings => facts.new_ratings > 0,
        RescoringRuleId::NotesThatJustFlippedStatus => facts.just_flipped(),
        RescoringRuleId::NotesThatFlippedRecently => facts
            .prior_status_change_millis
            .is_some_and(|changed| changed >= now - lookback_millis),
    }
}

/// Which rule claimed each note. Each note is claimed at most once.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleAssignment {
    pub claimed: BTreeMap<RescoringRuleId, Vec<NoteId>>,
    pub unclaimed: Vec<NoteId>,
}

impl RuleAssignment {
    pub fn notes_for(&self, rule: RescoringRuleId) -> &[NoteId] {
        self.claimed.get(&rule).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rule_for(&self, note_id: NoteId) -> Option<RescoringRuleId> {
        self.claimed
            .iter()
            .find(|(_, notes)| notes.contains(&note_id))
            .map(|(rule, _)| *rule)
    }
}

/// Assign every note to the first rule (in the given order) that admits it
/// and whose predicate holds.
pub fn partition_notes(
    rules: &[RescoringRule],
    facts: &[RescoringFacts],
    now: TimestampMillis,
    lookback_millis: TimestampMillis,
) -> RuleAssignment {
    let mut assignment = RuleAssignment::default();
    for rule in rules {
        assignment.claimed.entry(rule.id).or_default();
    }
    for note in facts {
        let claimed_by = rules.iter().find(|rule| {
            rule.admits(note.note_id) && rule_matches(rule.id, note, now, lookback_millis)
        });
        match claimed_by {
            Some(rule) => assignment
                .claimed
                .entry(rule.id)
                .or_default()
                .push(note.note_id),
            None => assignment.unclaimed.push(note.note_id),
        }
    }
    for (rule, notes) in &assignment.claimed {
        debug!(rule = %rule, count = notes.len(), "rescoring subset");
    }
    if !assignment.unclaimed.is_empty() {
        debug!(count = assignment.unclaimed.len(), "notes claimed by no rescoring rule");
    }
    assignment
}

/// Ratings created after each note's previous scoring run.
///
/// Notes with no history count every rating as new.
pub fn count_new_ratings(
    ratings: &[Rating],
    history: &BTreeMap<NoteId, StatusHistoryRecord>,
) -> BTreeMap<NoteId, u32> {
    let mut counts = BTreeMap::new();
    for rating in ratings {
        let previous_run = history
            .get(&rating.note_id)
            .and_then(|record| record.timestamp_millis_of_current_status);
        let is_new = previous_run.is_none_or(|run| rating.created_at_millis > run);
        if is_new {
            *counts.entry(rating.note_id).or_insert(0) += 1;
        }
    }
    counts
}
