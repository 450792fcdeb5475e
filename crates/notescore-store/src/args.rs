//! In-memory scoring arguments handed to scorer evaluations.

use std::sync::Arc;

use notescore_core::{
    Enrollment, Note, PrescoringMetaOutput, RaterModelOutput, Rating, ScorerOutput,
    StatusHistoryRecord,
};

/// The four input tables consumed from ingestion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoringInputs {
    pub notes: Vec<Note>,
    pub ratings: Vec<Rating>,
    pub status_history: Vec<StatusHistoryRecord>,
    pub enrollment: Vec<Enrollment>,
}

/// Prescoring results carried into the final phase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrescoringOutputs {
    pub note_outputs: Vec<ScorerOutput>,
    pub rater_outputs: Vec<RaterModelOutput>,
    pub meta: PrescoringMetaOutput,
}

/// Which tables a scorer evaluation reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TableNeeds {
    pub notes: bool,
    pub ratings: bool,
    pub status_history: bool,
    pub enrollment: bool,
    pub prescoring: bool,
}

impl TableNeeds {
    pub const ALL: TableNeeds = TableNeeds {
        notes: true,
        ratings: true,
        status_history: true,
        enrollment: true,
        prescoring: true,
    };

    /// Rater-facing evaluations never look at the note table or history.
    pub const RATER_FACING: TableNeeds = TableNeeds {
        notes: false,
        ratings: true,
        status_history: false,
        enrollment: true,
        prescoring: true,
    };
}

/// Read-only view of one phase's tables. Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct ScoringArgs {
    pub notes: Option<Arc<Vec<Note>>>,
    pub ratings: Option<Arc<Vec<Rating>>>,
    pub status_history: Option<Arc<Vec<StatusHistoryRecord>>>,
    pub enrollment: Option<Arc<Vec<Enrollment>>>,
    pub prescoring_note_outputs: Option<Arc<Vec<ScorerOutput>>>,
    pub prescoring_rater_outputs: Option<Arc<Vec<RaterModelOutput>>>,
    pub prescoring_meta: Option<Arc<PrescoringMetaOutput>>,
}

impl ScoringArgs {
    pub fn from_inputs(inputs: ScoringInputs) -> Self {
        Self {
            notes: Some(Arc::new(inputs.notes)),
            ratings: Some(Arc::new(inputs.ratings)),
            status_history: Some(Arc::new(inputs.status_history)),
            enrollment: Some(Arc::new(inputs.enrollment)),
            ..Self::default()
        }
    }

    pub fn with_prescoring(mut self, prescoring: PrescoringOutputs) -> Self {
        self.prescoring_note_outputs = Some(Arc::new(prescoring.note_outputs));
        self.prescoring_rater_outputs = Some(Arc::new(prescoring.rater_outputs));
        self.prescoring_meta = Some(Arc::new(prescoring.meta));
        self
    }

    /// A view carrying only the tables in `needs`.
    pub fn retain_only(&self, needs: TableNeeds) -> Self {
        fn keep<T>(table: &Option<Arc<T>>, needed: bool) -> Option<Arc<T>> {
            if needed { table.clone() } else { None }
        }
        Self {
            notes: keep(&self.notes, needs.notes),
            ratings: keep(&self.ratings, needs.ratings),
            status_history: keep(&self.status_history, needs.status_history),
            enrollment: keep(&self.enrollment, needs.enrollment),
            prescoring_note_outputs: keep(&self.prescoring_note_outputs, needs.prescoring),
            prescoring_rater_outputs: keep(&self.prescoring_rater_outputs, needs.prescoring),
            prescoring_meta: keep(&self.prescoring_meta, needs.prescoring),
        }
    }

    pub fn notes(&self) -> &[Note] {
        self.notes.as_deref().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn ratings(&self) -> &[Rating] {
        self.ratings.as_deref().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn status_history(&self) -> &[StatusHistoryRecord] {
        self.status_history.as_deref().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn enrollment(&self) -> &[Enrollment] {
        self.enrollment.as_deref().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn prescoring_note_outputs(&self) -> &[ScorerOutput] {
        self.prescoring_note_outputs
            .as_deref()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn prescoring_rater_outputs(&self) -> &[RaterModelOutput] {
        self.prescoring_rater_outputs
            .as_deref()
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rater_facing_view_drops_note_table() {
        let args = ScoringArgs::from_inputs(ScoringInputs::default())
            .with_prescoring(PrescoringOutputs::default());
        let view = args.retain_only(TableNeeds::RATER_FACING);
        assert!(view.notes.is_none());
        assert!(view.status_history.is_none());
        assert!(view.ratings.is_some());
        assert!(view.prescoring_meta.is_some());
        assert!(view.notes().is_empty());
    }

    #[test]
    fn views_share_tables() {
        let args = ScoringArgs::from_inputs(ScoringInputs::default());
        let view = args.retain_only(TableNeeds::ALL);
        let (Some(a), Some(b)) = (&args.ratings, &view.ratings) else {
            panic!("ratings missing");
        };
        assert!(Arc::ptr_eq(a, b));
        assert!(view.prescoring_note_outputs.is_none());
    }
}
