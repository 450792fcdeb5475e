//! Note status history state machine.
//!
//! ```text
//!   Unrated ──> NeedsMoreRatings <──> CurrentlyRatedHelpful
//!                      ^                      ^
//!                      └──────────> CurrentlyRatedNotHelpful
//! ```
//!
//! `Locked` is orthogonal to the label: once a lock is recorded, every run
//! writes the locked label regardless of what the resolver proposed. A
//! retro-lock newer than the lock replaces the locked label once.
//!
//! Runs are staged in full before anything is persisted; see [`stage_run`].

use std::collections::BTreeMap;

use notescore_core::{
    LockDirective, ModelingGroup, NoteId, NoteStatus, ParticipantId, StatusHistoryRecord,
    TimestampMillis,
};
use tracing::{debug, info, warn};

use crate::resolver::Resolution;
use crate::ScoringError;

/// Everything this run learned about one note.
#[derive(Debug, Clone)]
pub struct NoteObservation {
    pub note_id: NoteId,
    pub note_author_participant_id: ParticipantId,
    pub created_at_millis: TimestampMillis,
    pub resolution: Resolution,
    pub core_status: Option<NoteStatus>,
    pub expansion_status: Option<NoteStatus>,
    pub group_status: Option<NoteStatus>,
    pub modeling_group: Option<ModelingGroup>,
}

/// Label movement of one note in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTransition {
    pub note_id: NoteId,
    /// `None` when the note had never been scored.
    pub previous_status: Option<NoteStatus>,
    pub final_status: NoteStatus,
    pub locked: bool,
    /// Most recent status change recorded before this run.
    pub prior_status_change_millis: Option<TimestampMillis>,
}

impl HistoryTransition {
    /// A published label changed. First observations are not flips.
    pub fn flipped(&self) -> bool {
        self.previous_status
            .is_some_and(|previous| previous != self.final_status)
    }
}

/// Fail if a persisted record is locked at one label but shows another.
pub fn check_lock_invariant(record: &StatusHistoryRecord) -> Result<(), ScoringError> {
    let Some(locked) = record.lock() else {
        return Ok(());
    };
    if record.current_status == Some(locked) || record.retro_lock_supersedes() {
        return Ok(());
    }
    Err(ScoringError::LockInvariantViolation {
        note_id: record.note_id,
        locked,
        current: record.current_status,
    })
}

fn apply_directive(record: &mut StatusHistoryRecord, directive: &LockDirective) {
    match *directive {
        LockDirective::Lock {
            timestamp_millis,
            status,
        } => {
            if record.timestamp_millis_of_status_lock.is_some() {
                debug!(note_id = record.note_id, "already locked, lock directive ignored");
                return;
            }
            record.timestamp_millis_of_status_lock = Some(timestamp_millis);
            record.locked_status = Some(status);
            debug!(note_id = record.note_id, %status, "note locked");
        }
        LockDirective::RetroLock {
            timestamp_millis,
            status,
        } => match record.timestamp_millis_of_status_lock {
            Some(lock) if timestamp_millis > lock => {
                if record.timestamp_millis_of_retro_lock == Some(timestamp_millis) {
                    return;
                }
                info!(
                    note_id = record.note_id,
                    from = ?record.locked_status,
                    to = %status,
                    "retro-lock replaced locked status"
                );
                record.locked_status = Some(status);
                record.timestamp_millis_of_retro_lock = Some(timestamp_millis);
            }
            Some(_) => {
                debug!(note_id = record.note_id, "retro-lock predates lock, ignored");
            }
            None => {
                warn!(note_id = record.note_id, "retro-lock for unlocked note ignored");
            }
        },
    }
}

/// Advance one note's history by one run.
pub fn advance(
    prior: Option<&StatusHistoryRecord>,
    observation: &NoteObservation,
    directive: Option<&LockDirective>,
    now: TimestampMillis,
) -> Result<(StatusHistoryRecord, HistoryTransition), ScoringError> {
    let mut record = match prior {
        Some(prior) => {
            check_lock_invariant(prior)?;
            prior.clone()
        }
        None => StatusHistoryRecord::unrated(
            observation.note_id,
            observation.note_author_participant_id.clone(),
            observation.created_at_millis,
        ),
    };
    let previous_status = record.current_status;
    let prior_status_change_millis = record.timestamp_millis_of_most_recent_status_change;

    let locked_before = record.lock().is_some();
    if let Some(directive) = directive {
        apply_directive(&mut record, directive);
    }

    let lock = record.lock();
    let final_status = lock.unwrap_or(observation.resolution.status);
    let changed = previous_status != Some(final_status);

    if changed {
        record.timestamp_millis_of_most_recent_status_change = Some(now);
    }
    record.current_status = Some(final_status);
    record.timestamp_millis_of_current_status = Some(now);

    if final_status.is_rated() {
        if record.first_non_nmr_status.is_none() {
            record.first_non_nmr_status = Some(final_status);
            record.timestamp_millis_of_first_non_nmr_status = Some(now);
        }
        if changed || record.most_recent_non_nmr_status.is_none() {
            record.most_recent_non_nmr_status = Some(final_status);
            record.timestamp_millis_of_latest_non_nmr_status = Some(now);
        }
    }

    record.current_core_status = observation.core_status;
    record.current_expansion_status = observation.expansion_status;
    record.current_group_status = observation.group_status;
    record.current_modeling_group = observation.modeling_group;
    // A lock set this run records the tier behind the locked label.
    if lock.is_none() || !locked_before || record.current_decided_by.is_none() {
        record.current_decided_by = Some(observation.resolution.decided_by.clone());
    }

    let transition = HistoryTransition {
        note_id: record.note_id,
        previous_status,
        final_status,
        locked: lock.is_some(),
        prior_status_change_millis,
    };
    Ok((record, transition))
}

/// A complete, not yet persisted history for one run.
#[derive(Debug, Clone, Default)]
pub struct StagedHistory {
    /// Every record, including notes not scored this run.
    pub records: BTreeMap<NoteId, StatusHistoryRecord>,
    pub transitions: Vec<HistoryTransition>,
}

impl StagedHistory {
    pub fn transition(&self, note_id: NoteId) -> Option<&HistoryTransition> {
        self.transitions.iter().find(|t| t.note_id == note_id)
    }
}

/// Stage the history for a whole run.
///
/// Every prior record is validated, including notes not observed this run;
/// any violation aborts the whole run.
pub fn stage_run(
    prior: &BTreeMap<NoteId, StatusHistoryRecord>,
    observations: &[NoteObservation],
    directives: &BTreeMap<NoteId, LockDirective>,
    now: TimestampMillis,
) -> Result<StagedHistory, ScoringError> {
    for record in prior.values() {
        check_lock_invariant(record)?;
    }

    let mut staged = StagedHistory {
        records: prior.clone(),
        transitions: Vec::with_capacity(observations.len()),
    };
    let mut seen = std::collections::BTreeSet::new();
    for observation in observations {
        if !seen.insert(observation.note_id) {
            return Err(ScoringError::DuplicateNote(observation.note_id));
        }
        let (record, transition) = advance(
            prior.get(&observation.note_id),
            observation,
            directives.get(&observation.note_id),
            now,
        )?;
        staged.records.insert(record.note_id, record);
        staged.transitions.push(transition);
    }

    let flips = staged.transitions.iter().filter(|t| t.flipped()).count();
    debug!(notes = staged.transitions.len(), flips, "staged status history");
    Ok(staged)
}
