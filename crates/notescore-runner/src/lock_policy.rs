//! Lock policies decide when a note's status freezes. The history state
//! machine only enforces the directives they return.

use notescore_core::{LockDirective, Note, NoteStatus, StatusHistoryRecord, TimestampMillis};

pub trait LockPolicy: Send + Sync {
    /// Directive for one note this run, given the status the resolver proposed.
    fn directive(
        &self,
        note: &Note,
        record: Option<&StatusHistoryRecord>,
        proposed: NoteStatus,
        now: TimestampMillis,
    ) -> Option<LockDirective>;
}

/// Never locks anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverLock;

impl LockPolicy for NeverLock {
    fn directive(
        &self,
        _note: &Note,
        _record: Option<&StatusHistoryRecord>,
        _proposed: NoteStatus,
        _now: TimestampMillis,
    ) -> Option<LockDirective> {
        None
    }
}

/// Locks a note at its rated status once it is older than `lock_after_millis`.
#[derive(Debug, Clone, Copy)]
pub struct AgeLockPolicy {
    pub lock_after_millis: TimestampMillis,
}

impl Default for AgeLockPolicy {
    fn default() -> Self {
        Self {
            lock_after_millis: chrono::Duration::days(14).num_milliseconds(),
        }
    }
}

impl LockPolicy for AgeLockPolicy {
    fn directive(
        &self,
        note: &Note,
        record: Option<&StatusHistoryRecord>,
        proposed: NoteStatus,
        now: TimestampMillis,
    ) -> Option<LockDirective> {
        if record.is_some_and(StatusHistoryRecord::is_locked) || !proposed.is_rated() {
            return None;
        }
        (now - note.created_at_millis >= self.lock_after_millis).then_some(LockDirective::Lock {
            timestamp_millis: now,
            status: proposed,
        })
    }
}

#[cfg(test)]
mod tests {
    use notescore_core::Classification;

    use super::*;

    const DAY: TimestampMillis = 24 * 60 * 60 * 1000;

    fn note(created_at_millis: TimestampMillis) -> Note {
        Note {
            note_id: 5,
            note_author_participant_id: "author".into(),
            created_at_millis,
            classification: Classification::NotMisleading,
            topic: None,
            helpful_tag_counts: Default::default(),
            not_helpful_tag_counts: Default::default(),
        }
    }

    #[test]
    fn young_notes_stay_unlocked() {
        let policy = AgeLockPolicy::default();
        let now = 10 * DAY;
        assert_eq!(
            policy.directive(&note(0), None, NoteStatus::CurrentlyRatedHelpful, now),
            None
        );
    }

    #[test]
    fn old_rated_notes_lock_at_proposed_status() {
        let policy = AgeLockPolicy::default();
        let now = 14 * DAY;
        assert_eq!(
            policy.directive(&note(0), None, NoteStatus::CurrentlyRatedNotHelpful, now),
            Some(LockDirective::Lock {
                timestamp_millis: now,
                status: NoteStatus::CurrentlyRatedNotHelpful,
            })
        );
    }

    #[test]
    fn unrated_or_locked_notes_get_nothing() {
        let policy = AgeLockPolicy::default();
        let now = 30 * DAY;
        assert_eq!(
            policy.directive(&note(0), None, NoteStatus::NeedsMoreRatings, now),
            None
        );

        let mut record = StatusHistoryRecord::unrated(5, "author", 0);
        record.current_status = Some(NoteStatus::CurrentlyRatedHelpful);
        record.locked_status = Some(NoteStatus::CurrentlyRatedHelpful);
        record.timestamp_millis_of_status_lock = Some(20 * DAY);
        assert_eq!(
            policy.directive(&note(0), Some(&record), NoteStatus::CurrentlyRatedNotHelpful, now),
            None
        );
    }

    #[test]
    fn never_lock_is_inert() {
        assert_eq!(
            NeverLock.directive(&note(0), None, NoteStatus::CurrentlyRatedHelpful, 100 * DAY),
            None
        );
    }
}
