//! Churn-rate limiter.
//!
//! Churn is a whole-subset aggregate: it is only evaluated once every note
//! in the run has a staged status. An exceeding subset fails the run; flips
//! are never dropped to fit under a cap.

use std::collections::BTreeMap;
use std::fmt;

use notescore_core::{NoteId, NoteStatus, RescoringRule, RescoringRuleId, ScoringConfig};
use serde::Serialize;
use tracing::{info, warn};

use crate::history::HistoryTransition;
use crate::rescoring::RuleAssignment;
use crate::ScoringError;

/// Old and new label of one note, as the limiter sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlip {
    pub note_id: NoteId,
    pub old_status: Option<NoteStatus>,
    pub new_status: NoteStatus,
}

impl StatusFlip {
    /// Notes scored for the first time never count as flips.
    pub fn flipped(&self) -> bool {
        self.old_status.is_some_and(|old| old != self.new_status)
    }

    fn gained_helpful(&self) -> bool {
        self.old_status
            .is_some_and(|old| old != NoteStatus::CurrentlyRatedHelpful)
            && self.new_status == NoteStatus::CurrentlyRatedHelpful
    }

    fn lost_helpful(&self) -> bool {
        self.old_status == Some(NoteStatus::CurrentlyRatedHelpful)
            && self.new_status != NoteStatus::CurrentlyRatedHelpful
    }
}

impl From<&HistoryTransition> for StatusFlip {
    fn from(transition: &HistoryTransition) -> Self {
        Self {
            note_id: transition.note_id,
            old_status: transition.previous_status,
            new_status: transition.final_status,
        }
    }
}

/// Churn measured over one rescoring-rule subset.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubsetChurn {
    pub rule: RescoringRuleId,
    pub notes: usize,
    pub flips: usize,
    pub churn_rate: f64,
    pub max_churn_rate: f64,
    /// Newly helpful notes relative to previously helpful notes. Monitoring only.
    pub new_crh_rate: f64,
    /// Previously helpful notes that lost the label. Monitoring only.
    pub lost_crh_rate: f64,
    /// False when the subset is too small for the cap to apply.
    pub enforced: bool,
}

impl SubsetChurn {
    fn measure(rule: &RescoringRule, flips: &[StatusFlip], config: &ScoringConfig) -> Self {
        let notes = flips.len();
        let flipped = flips.iter().filter(|f| f.flipped()).count();
        let prior_crh = flips
            .iter()
            .filter(|f| f.old_status == Some(NoteStatus::CurrentlyRatedHelpful))
            .count();
        let gained = flips.iter().filter(|f| f.gained_helpful()).count();
        let lost = flips.iter().filter(|f| f.lost_helpful()).count();

        Self {
            rule: rule.id,
            notes,
            flips: flipped,
            churn_rate: ratio(flipped, notes),
            max_churn_rate: rule.max_churn_rate,
            new_crh_rate: ratio(gained, prior_crh),
            lost_crh_rate: ratio(lost, prior_crh),
            enforced: notes >= config.min_notes_for_churn_enforcement,
        }
    }

    fn violation(&self) -> Option<ChurnViolation> {
        (self.enforced && self.churn_rate > self.max_churn_rate).then(|| ChurnViolation {
            rule: self.rule,
            churn_rate: self.churn_rate,
            max_churn_rate: self.max_churn_rate,
            notes: self.notes,
            flips: self.flips,
        })
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// A subset whose churn exceeded its cap.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChurnViolation {
    pub rule: RescoringRuleId,
    pub churn_rate: f64,
    pub max_churn_rate: f64,
    pub notes: usize,
    pub flips: usize,
}

impl fmt::Display for ChurnViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}/{} notes flipped ({:.4} > {:.4})",
            self.rule, self.flips, self.notes, self.churn_rate, self.max_churn_rate
        )
    }
}

/// Churn for every subset of a run, in rule order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChurnReport {
    pub subsets: Vec<SubsetChurn>,
}

impl ChurnReport {
    /// Measure every rule's subset. Unclaimed notes are not measured.
    pub fn evaluate(
        rules: &[RescoringRule],
        assignment: &RuleAssignment,
        flips: &[StatusFlip],
        config: &ScoringConfig,
    ) -> Self {
        let by_note: BTreeMap<NoteId, &StatusFlip> =
            flips.iter().map(|flip| (flip.note_id, flip)).collect();

        let subsets = rules
            .iter()
            .map(|rule| {
                let members: Vec<StatusFlip> = assignment
                    .notes_for(rule.id)
                    .iter()
                    .filter_map(|note_id| by_note.get(note_id).map(|flip| **flip))
                    .collect();
                let churn = SubsetChurn::measure(rule, &members, config);
                info!(
                    rule = %churn.rule,
                    count = churn.notes,
                    flips = churn.flips,
                    rate = churn.churn_rate,
                    max = churn.max_churn_rate,
                    new_crh = churn.new_crh_rate,
                    lost_crh = churn.lost_crh_rate,
                    "churn"
                );
                churn
            })
            .collect();
        Self { subsets }
    }

    pub fn subset(&self, rule: RescoringRuleId) -> Option<&SubsetChurn> {
        self.subsets.iter().find(|s| s.rule == rule)
    }

    pub fn violations(&self) -> Vec<ChurnViolation> {
        self.subsets.iter().filter_map(SubsetChurn::violation).collect()
    }

    /// Fail with every violating subset, or succeed if none exceeded its cap.
    pub fn enforce(&self) -> Result<(), ScoringError> {
        let violations = self.violations();
        if violations.is_empty() {
            return Ok(());
        }
        for violation in &violations {
            warn!(%violation, "churn limit exceeded");
        }
        Err(ScoringError::ChurnLimitExceeded(violations))
    }
}

#[cfg(test)]
mod tests {
    use NoteStatus::*;

    use super::*;

    fn flip(note_id: NoteId, old: Option<NoteStatus>, new: NoteStatus) -> StatusFlip {
        StatusFlip {
            note_id,
            old_status: old,
            new_status: new,
        }
    }

    fn one_rule_run(
        rule: RescoringRuleId,
        flips: &[StatusFlip],
        config: &ScoringConfig,
    ) -> ChurnReport {
        let rules: Vec<RescoringRule> = config
            .rescoring_rules(rule.phase(), &BTreeMap::new())
            .into_iter()
            .filter(|r| r.id == rule)
            .collect();
        let mut assignment = RuleAssignment::default();
        assignment
            .claimed
            .insert(rule, flips.iter().map(|f| f.note_id).collect());
        ChurnReport::evaluate(&rules, &assignment, flips, config)
    }

    #[test]
    fn churn_at_cap_passes_and_above_cap_fails() {
        let config = ScoringConfig::default();
        // 3 of 100 flipped: exactly the 3% cap.
        let mut flips: Vec<StatusFlip> = (0..100)
            .map(|id| flip(id, Some(CurrentlyRatedHelpful), CurrentlyRatedHelpful))
            .collect();
        for f in flips.iter_mut().take(3) {
            f.new_status = NeedsMoreRatings;
        }
        let rule = RescoringRuleId::UnlockedNotesWithNoNewRatings;
        assert!(one_rule_run(rule, &flips, &config).enforce().is_ok());

        flips[3].new_status = NeedsMoreRatings;
        let err = one_rule_run(rule, &flips, &config).enforce().unwrap_err();
        match err {
            ScoringError::ChurnLimitExceeded(violations) => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].rule, rule);
                assert_eq!(violations[0].flips, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unbounded_rules_measure_but_never_block() {
        let config = ScoringConfig::default();
        let flips: Vec<StatusFlip> = (0..10)
            .map(|id| flip(id, Some(NeedsMoreRatings), CurrentlyRatedHelpful))
            .collect();
        let report = one_rule_run(RescoringRuleId::NotesThatJustFlippedStatus, &flips, &config);
        assert_eq!(report.subsets[0].churn_rate, 1.0);
        assert!(report.enforce().is_ok());
    }

    #[test]
    fn first_observations_are_not_flips() {
        let config = ScoringConfig::default();
        let flips = [flip(1, None, CurrentlyRatedHelpful)];
        let report = one_rule_run(RescoringRuleId::UnlockedNotesWithNoNewRatings, &flips, &config);
        assert_eq!(report.subsets[0].flips, 0);
        assert_eq!(report.subsets[0].churn_rate, 0.0);
    }

    #[test]
    fn empty_subset_has_zero_churn() {
        let config = ScoringConfig::default();
        let report = one_rule_run(RescoringRuleId::NotesWithNewRatings, &[], &config);
        assert_eq!(report.subsets[0].notes, 0);
        assert_eq!(report.subsets[0].churn_rate, 0.0);
        assert!(report.enforce().is_ok());
    }

    #[test]
    fn small_subsets_skip_enforcement() {
        let config = ScoringConfig {
            min_notes_for_churn_enforcement: 200,
            ..ScoringConfig::default()
        };
        let flips = [flip(1, Some(CurrentlyRatedHelpful), NeedsMoreRatings)];
        let report = one_rule_run(RescoringRuleId::UnlockedNotesWithNoNewRatings, &flips, &config);
        assert!(!report.subsets[0].enforced);
        assert!(report.enforce().is_ok());
    }

    #[test]
    fn crh_movement_rates() {
        let config = ScoringConfig::default();
        let flips = [
            flip(1, Some(CurrentlyRatedHelpful), CurrentlyRatedHelpful),
            flip(2, Some(CurrentlyRatedHelpful), NeedsMoreRatings),
            flip(3, Some(NeedsMoreRatings), CurrentlyRatedHelpful),
            flip(4, Some(NeedsMoreRatings), CurrentlyRatedHelpful),
        ];
        let report = one_rule_run(RescoringRuleId::NotesWithNewRatings, &flips, &config);
        let subset = report.subset(RescoringRuleId::NotesWithNewRatings).unwrap();
        assert_eq!(subset.new_crh_rate, 1.0);
        assert_eq!(subset.lost_crh_rate, 0.5);
        assert_eq!(subset.churn_rate, 0.75);
    }

    #[test]
    fn violation_message_names_rule() {
        let violation = ChurnViolation {
            rule: RescoringRuleId::AllUnlockedNotes,
            churn_rate: 0.05,
            max_churn_rate: 0.04,
            notes: 100,
            flips: 5,
        };
        let err = ScoringError::ChurnLimitExceeded(vec![violation]);
        assert!(err.to_string().contains("ALL_UNLOCKED_NOTES: 5/100"));
    }
}
