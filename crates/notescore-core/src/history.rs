//! Persisted per-note status lineage.

use serde::{Deserialize, Serialize};

use crate::status::{ModelingGroup, NoteId, NoteStatus, ParticipantId, Tier, TimestampMillis};

/// One row per note, carried from run to run.
///
/// Once `timestamp_millis_of_status_lock` is set, `current_status` must equal
/// `locked_status` unless a retro-lock newer than the lock replaced it.
/// `first_non_nmr_status` and its timestamp never change once set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryRecord {
    pub note_id: NoteId,
    pub note_author_participant_id: ParticipantId,
    pub created_at_millis: TimestampMillis,
    pub timestamp_millis_of_first_non_nmr_status: Option<TimestampMillis>,
    pub first_non_nmr_status: Option<NoteStatus>,
    pub timestamp_millis_of_current_status: Option<TimestampMillis>,
    pub current_status: Option<NoteStatus>,
    pub timestamp_millis_of_latest_non_nmr_status: Option<TimestampMillis>,
    pub most_recent_non_nmr_status: Option<NoteStatus>,
    pub timestamp_millis_of_status_lock: Option<TimestampMillis>,
    pub locked_status: Option<NoteStatus>,
    pub timestamp_millis_of_retro_lock: Option<TimestampMillis>,
    pub current_core_status: Option<NoteStatus>,
    pub current_expansion_status: Option<NoteStatus>,
    pub current_group_status: Option<NoteStatus>,
    pub current_decided_by: Option<Tier>,
    pub current_modeling_group: Option<ModelingGroup>,
    pub timestamp_millis_of_most_recent_status_change: Option<TimestampMillis>,
}

impl StatusHistoryRecord {
    /// A fresh record for a note that has never been scored (the `Unrated` state).
    pub fn unrated(
        note_id: NoteId,
        note_author_participant_id: impl Into<ParticipantId>,
        created_at_millis: TimestampMillis,
    ) -> Self {
        Self {
            note_id,
            note_author_participant_id: note_author_participant_id.into(),
            created_at_millis,
            timestamp_millis_of_first_non_nmr_status: None,
            first_non_nmr_status: None,
            timestamp_millis_of_current_status: None,
            current_status: None,
            timestamp_millis_of_latest_non_nmr_status: None,
            most_recent_non_nmr_status: None,
            timestamp_millis_of_status_lock: None,
            locked_status: None,
            timestamp_millis_of_retro_lock: None,
            current_core_status: None,
            current_expansion_status: None,
            current_group_status: None,
            current_decided_by: None,
            current_modeling_group: None,
            timestamp_millis_of_most_recent_status_change: None,
        }
    }

    pub fn is_unrated(&self) -> bool {
        self.current_status.is_none()
    }

    /// The label the note is frozen at, if it is locked.
    pub fn lock(&self) -> Option<NoteStatus> {
        self.timestamp_millis_of_status_lock.and(self.locked_status)
    }

    pub fn is_locked(&self) -> bool {
        self.lock().is_some()
    }

    /// True when a recorded retro-lock postdates the original lock.
    pub fn retro_lock_supersedes(&self) -> bool {
        match (
            self.timestamp_millis_of_status_lock,
            self.timestamp_millis_of_retro_lock,
        ) {
            (Some(lock), Some(retro)) => retro > lock,
            _ => false,
        }
    }
}

/// Instruction from the locking policy for one note in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LockDirective {
    /// Freeze the note at `status`. Ignored if the note is already locked.
    Lock {
        timestamp_millis: TimestampMillis,
        status: NoteStatus,
    },
    /// One-time override replacing the locked label of an already-locked note.
    RetroLock {
        timestamp_millis: TimestampMillis,
        status: NoteStatus,
    },
}
