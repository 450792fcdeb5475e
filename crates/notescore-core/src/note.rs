//! Input rows consumed from ingestion: notes, ratings, and rater enrollment.
//!
//! All of these are read-only for the duration of a scoring phase.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::status::{ModelingGroup, NoteId, ParticipantId, TimestampMillis, TopicId};
use crate::tags::{HelpfulTag, NotHelpfulTag, TagCounts};
use crate::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    MisinformedOrPotentiallyMisleading,
    NotMisleading,
}

impl Classification {
    pub const ALL: [Classification; 2] = [Self::MisinformedOrPotentiallyMisleading, Self::NotMisleading];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MisinformedOrPotentiallyMisleading => "MISINFORMED_OR_POTENTIALLY_MISLEADING",
            Self::NotMisleading => "NOT_MISLEADING",
        }
    }
}

impl FromStr for Classification {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CoreError::UnknownLabel {
                kind: "classification",
                value: s.to_string(),
            })
    }
}

/// A user-submitted annotation being scored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub note_id: NoteId,
    pub note_author_participant_id: ParticipantId,
    pub created_at_millis: TimestampMillis,
    pub classification: Classification,
    /// Topic assignment, when the note was matched to a topic model.
    pub topic: Option<TopicId>,
    pub helpful_tag_counts: TagCounts<HelpfulTag>,
    pub not_helpful_tag_counts: TagCounts<NotHelpfulTag>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HelpfulnessLevel {
    Helpful,
    SomewhatHelpful,
    NotHelpful,
}

impl HelpfulnessLevel {
    pub const ALL: [HelpfulnessLevel; 3] = [Self::Helpful, Self::SomewhatHelpful, Self::NotHelpful];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helpful => "HELPFUL",
            Self::SomewhatHelpful => "SOMEWHAT_HELPFUL",
            Self::NotHelpful => "NOT_HELPFUL",
        }
    }
}

impl FromStr for HelpfulnessLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| CoreError::UnknownLabel {
                kind: "helpfulness level",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub note_id: NoteId,
    pub rater_participant_id: ParticipantId,
    pub created_at_millis: TimestampMillis,
    pub helpfulness_level: HelpfulnessLevel,
    pub helpful_tags: Vec<HelpfulTag>,
    pub not_helpful_tags: Vec<NotHelpfulTag>,
}

/// Contributor enrollment state. Wire integers match the downstream consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnrollmentState {
    EarnedIn,
    AtRisk,
    EarnedOutNoAcknowledge,
    EarnedOutAcknowledged,
    NewUser,
    Removed,
}

impl EnrollmentState {
    pub const ALL: [EnrollmentState; 6] = [
        Self::EarnedIn,
        Self::AtRisk,
        Self::EarnedOutNoAcknowledge,
        Self::EarnedOutAcknowledged,
        Self::NewUser,
        Self::Removed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EarnedIn => "earnedIn",
            Self::AtRisk => "atRisk",
            Self::EarnedOutNoAcknowledge => "earnedOutNoAcknowledge",
            Self::EarnedOutAcknowledged => "earnedOutAcknowledged",
            Self::NewUser => "newUser",
            Self::Removed => "removed",
        }
    }

    pub fn wire_code(&self) -> i32 {
        match self {
            Self::EarnedIn => 0,
            Self::AtRisk => 1,
            Self::EarnedOutNoAcknowledge => 2,
            Self::EarnedOutAcknowledged => 3,
            Self::NewUser => 4,
            Self::Removed => 5,
        }
    }
}

impl FromStr for EnrollmentState {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::UnknownEnrollmentState(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    pub participant_id: ParticipantId,
    pub enrollment_state: EnrollmentState,
    /// `CORE` or `EXPANSION`.
    pub modeling_population: String,
    pub modeling_group: Option<ModelingGroup>,
}
