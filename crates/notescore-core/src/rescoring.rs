//! Rescoring rules: the closed, ordered set of note subsets that each carry
//! their own churn cap.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::status::NoteId;

/// Which of the two sequential scoring phases is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScoringPhase {
    Prescoring,
    Final,
}

/// Rescoring rules in priority order. A note belongs to the first rule that
/// claims it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RescoringRuleId {
    AllUnlockedNotes,
    UnlockedNotesWithNoNewRatings,
    NotesWithNewRatings,
    NotesThatJustFlippedStatus,
    NotesThatFlippedRecently,
}

impl RescoringRuleId {
    pub const ALL: [RescoringRuleId; 5] = [
        Self::AllUnlockedNotes,
        Self::UnlockedNotesWithNoNewRatings,
        Self::NotesWithNewRatings,
        Self::NotesThatJustFlippedStatus,
        Self::NotesThatFlippedRecently,
    ];

    /// 1-based priority; lower numbers claim notes first.
    pub fn priority(&self) -> u8 {
        match self {
            Self::AllUnlockedNotes => 1,
            Self::UnlockedNotesWithNoNewRatings => 2,
            Self::NotesWithNewRatings => 3,
            Self::NotesThatJustFlippedStatus => 4,
            Self::NotesThatFlippedRecently => 5,
        }
    }

    pub fn phase(&self) -> ScoringPhase {
        match self {
            Self::AllUnlockedNotes => ScoringPhase::Prescoring,
            _ => ScoringPhase::Final,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AllUnlockedNotes => "ALL_UNLOCKED_NOTES",
            Self::UnlockedNotesWithNoNewRatings => "UNLOCKED_NOTES_WITH_NO_NEW_RATINGS",
            Self::NotesWithNewRatings => "NOTES_WITH_NEW_RATINGS",
            Self::NotesThatJustFlippedStatus => "NOTES_THAT_JUST_FLIPPED_STATUS",
            Self::NotesThatFlippedRecently => "NOTES_THAT_FLIPPED_RECENTLY",
        }
    }

    /// Rules evaluated during `phase`, in priority order.
    pub fn for_phase(phase: ScoringPhase) -> impl Iterator<Item = RescoringRuleId> {
        Self::ALL.into_iter().filter(move |rule| rule.phase() == phase)
    }
}

impl fmt::Display for RescoringRuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rescoring rule with its policy attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RescoringRule {
    pub id: RescoringRuleId,
    /// Explicit restriction. `None` means every note not claimed earlier.
    pub note_set: Option<BTreeSet<NoteId>>,
    pub max_churn_rate: f64,
}

impl RescoringRule {
    pub fn admits(&self, note_id: NoteId) -> bool {
        self.note_set
            .as_ref()
            .is_none_or(|set| set.contains(&note_id))
    }

    /// Rules with effectively unlimited caps measure churn but never block.
    pub fn is_enforcing(&self) -> bool {
        self.max_churn_rate < 1.0
    }
}
