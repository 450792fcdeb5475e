//! Explanation tag selection.
//!
//! A decided note is shown with up to two tags explaining the decision:
//! helpful tags for a helpful note, not-helpful tags for a not-helpful note.

use std::cmp::Reverse;

use notescore_core::{ExplanationTag, ExplanationTagRef, Note, NoteStatus, ScoringConfig, TagCounts};

/// The (first, second) explanation tags for a note. Empty slots are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplanationTags {
    pub first: Option<ExplanationTagRef>,
    pub second: Option<ExplanationTagRef>,
}

/// Top two tags by (count desc, tie-break priority desc).
///
/// A tag qualifies with at least `min_ratings_to_get_tag` votes; if fewer
/// than `min_tags_needed_for_status` tags qualify, nothing is selected.
pub fn top_two_tags<T: ExplanationTag>(
    counts: &TagCounts<T>,
    config: &ScoringConfig,
) -> (Option<T>, Option<T>) {
    let mut qualifying: Vec<(u32, T)> = T::ALL
        .iter()
        .map(|&tag| (counts.get(&tag).copied().unwrap_or(0), tag))
        .filter(|&(count, _)| count >= config.min_ratings_to_get_tag)
        .collect();

    if qualifying.len() < config.min_tags_needed_for_status {
        return (None, None);
    }

    qualifying.sort_by_key(|&(count, tag)| Reverse((count, tag.tiebreak_priority())));
    let mut top = qualifying.into_iter().map(|(_, tag)| tag);
    (top.next(), top.next())
}

/// Select explanation tags for a note given its final status.
pub fn select_explanation_tags(
    note: &Note,
    status: NoteStatus,
    config: &ScoringConfig,
) -> ExplanationTags {
    let (first, second) = match status {
        NoteStatus::CurrentlyRatedHelpful => {
            let (a, b) = top_two_tags(&note.helpful_tag_counts, config);
            (a.map(Into::into), b.map(Into::into))
        }
        NoteStatus::CurrentlyRatedNotHelpful => {
            let (a, b) = top_two_tags(&note.not_helpful_tag_counts, config);
            (a.map(Into::into), b.map(Into::into))
        }
        NoteStatus::NeedsMoreRatings => (None, None),
    };
    ExplanationTags { first, second }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use notescore_core::{Classification, HelpfulTag, NotHelpfulTag};

    use super::*;

    fn note_with(
        helpful: &[(HelpfulTag, u32)],
        not_helpful: &[(NotHelpfulTag, u32)],
    ) -> Note {
        Note {
            note_id: 1,
            note_author_participant_id: "author".into(),
            created_at_millis: 0,
            classification: Classification::MisinformedOrPotentiallyMisleading,
            topic: None,
            helpful_tag_counts: helpful.iter().copied().collect(),
            not_helpful_tag_counts: not_helpful.iter().copied().collect(),
        }
    }

    #[test]
    fn tie_goes_to_higher_priority() {
        let counts: TagCounts<NotHelpfulTag> =
            BTreeMap::from([(NotHelpfulTag::Other, 5), (NotHelpfulTag::Outdated, 5)]);
        let config = ScoringConfig::default();
        assert_eq!(
            top_two_tags(&counts, &config),
            (Some(NotHelpfulTag::Outdated), Some(NotHelpfulTag::Other))
        );
    }

    #[test]
    fn count_beats_priority() {
        let counts: TagCounts<HelpfulTag> = BTreeMap::from([
            (HelpfulTag::Informative, 3),
            (HelpfulTag::Other, 7),
            (HelpfulTag::Clear, 4),
        ]);
        let config = ScoringConfig::default();
        assert_eq!(
            top_two_tags(&counts, &config),
            (Some(HelpfulTag::Other), Some(HelpfulTag::Clear))
        );
    }

    #[test]
    fn below_vote_threshold_does_not_qualify() {
        let counts: TagCounts<HelpfulTag> =
            BTreeMap::from([(HelpfulTag::Informative, 1), (HelpfulTag::Clear, 9)]);
        let config = ScoringConfig::default();
        assert_eq!(top_two_tags(&counts, &config), (None, None));
    }

    #[test]
    fn single_slot_when_one_tag_required() {
        let counts: TagCounts<HelpfulTag> = BTreeMap::from([(HelpfulTag::Clear, 9)]);
        let config = ScoringConfig {
            min_tags_needed_for_status: 1,
            ..ScoringConfig::default()
        };
        assert_eq!(top_two_tags(&counts, &config), (Some(HelpfulTag::Clear), None));
    }

    #[test]
    fn repeated_calls_are_identical() {
        let counts: TagCounts<NotHelpfulTag> = NotHelpfulTag::ALL.iter().map(|&t| (t, 4)).collect();
        let config = ScoringConfig::default();
        let first = top_two_tags(&counts, &config);
        for _ in 0..10 {
            assert_eq!(top_two_tags(&counts, &config), first);
        }
        assert_eq!(
            first,
            (Some(NotHelpfulTag::Outdated), Some(NotHelpfulTag::SpamHarassmentOrAbuse))
        );
    }

    #[test]
    fn vocabulary_follows_status() {
        let note = note_with(
            &[(HelpfulTag::GoodSources, 3), (HelpfulTag::Clear, 3)],
            &[(NotHelpfulTag::Incorrect, 4), (NotHelpfulTag::OffTopic, 2)],
        );
        let config = ScoringConfig::default();

        let helpful = select_explanation_tags(&note, NoteStatus::CurrentlyRatedHelpful, &config);
        assert_eq!(helpful.first, Some(HelpfulTag::Clear.into()));
        assert_eq!(helpful.second, Some(HelpfulTag::GoodSources.into()));

        let not_helpful =
            select_explanation_tags(&note, NoteStatus::CurrentlyRatedNotHelpful, &config);
        assert_eq!(not_helpful.first, Some(NotHelpfulTag::Incorrect.into()));
        assert_eq!(not_helpful.second, Some(NotHelpfulTag::OffTopic.into()));

        let nmr = select_explanation_tags(&note, NoteStatus::NeedsMoreRatings, &config);
        assert_eq!(nmr, ExplanationTags::default());
    }

    #[test]
    fn zero_ratings_selects_nothing() {
        let note = note_with(&[], &[]);
        let config = ScoringConfig::default();
        let tags = select_explanation_tags(&note, NoteStatus::CurrentlyRatedHelpful, &config);
        assert_eq!(tags, ExplanationTags::default());
    }
}
