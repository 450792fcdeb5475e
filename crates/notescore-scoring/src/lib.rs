//! Scoring algorithms: status arbitration, explanation tags, status history,
//! rescoring subsets, and churn control. No I/O happens here.

pub mod changes;
pub mod churn;
mod error;
pub mod explanation;
pub mod history;
pub mod rescoring;
pub mod resolver;

pub use changes::{note_status_change, note_status_changes};
pub use churn::{ChurnReport, ChurnViolation, StatusFlip, SubsetChurn};
pub use error::ScoringError;
pub use explanation::{ExplanationTags, select_explanation_tags, top_two_tags};
pub use history::{
    HistoryTransition, NoteObservation, StagedHistory, advance, check_lock_invariant, stage_run,
};
pub use rescoring::{
    RescoringFacts, RuleAssignment, count_new_ratings, partition_notes, rule_matches,
};
pub use resolver::{
    NoteCandidates, Resolution, TierGate, assign_modeling_group, resolve_note,
};
