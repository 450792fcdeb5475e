use notescore_core::{NoteId, NoteStatus};
use thiserror::Error;

use crate::churn::ChurnViolation;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("churn limit exceeded: {}", join_violations(.0))]
    ChurnLimitExceeded(Vec<ChurnViolation>),

    #[error(
        "note {note_id}: locked status {locked} disagrees with current status {} and no retro-lock explains it",
        .current.map_or("<none>", |s| s.as_str())
    )]
    LockInvariantViolation {
        note_id: NoteId,
        locked: NoteStatus,
        current: Option<NoteStatus>,
    },

    #[error("note {0} appears more than once in the run")]
    DuplicateNote(NoteId),
}

fn join_violations(violations: &[ChurnViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
