//! Note status labels and the scorer tiers that produce them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::CoreError;

pub type NoteId = i64;
pub type ParticipantId = String;
pub type ModelingGroup = u32;
pub type TopicId = String;

/// Milliseconds since the Unix epoch.
///
/// Always carried as `Option<TimestampMillis>` where the event may not have
/// happened: `None` means "never", which is distinct from `Some(0)`.
pub type TimestampMillis = i64;

/// Public helpfulness status of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoteStatus {
    NeedsMoreRatings,
    CurrentlyRatedHelpful,
    CurrentlyRatedNotHelpful,
}

impl NoteStatus {
    pub const ALL: [NoteStatus; 3] = [
        Self::NeedsMoreRatings,
        Self::CurrentlyRatedHelpful,
        Self::CurrentlyRatedNotHelpful,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NeedsMoreRatings => "NEEDS_MORE_RATINGS",
            Self::CurrentlyRatedHelpful => "CURRENTLY_RATED_HELPFUL",
            Self::CurrentlyRatedNotHelpful => "CURRENTLY_RATED_NOT_HELPFUL",
        }
    }

    /// True for the two decided labels (anything but "needs more ratings").
    pub fn is_rated(&self) -> bool {
        !matches!(self, Self::NeedsMoreRatings)
    }
}

impl fmt::Display for NoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NoteStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoreError::UnknownStatus(s.to_string()))
    }
}

/// Family of a scorer tier, without the group/topic parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TierKind {
    Core,
    Expansion,
    ExpansionPlus,
    Group,
    Topic,
    Coverage,
    Harassment,
}

impl TierKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Core => "core",
            Self::Expansion => "expansion",
            Self::ExpansionPlus => "expansionPlus",
            Self::Group => "group",
            Self::Topic => "topic",
            Self::Coverage => "coverage",
            Self::Harassment => "harassment",
        }
    }
}

/// One independently trained reputation model.
///
/// Group and topic models are instantiated once per modeling group / topic,
/// so the tier carries that parameter. Wire form is `core`, `expansionPlus`,
/// `group:<id>`, `topic:<id>` and so on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Tier {
    Core,
    Expansion,
    ExpansionPlus,
    Group(ModelingGroup),
    Topic(TopicId),
    Coverage,
    Harassment,
}

impl Tier {
    pub fn kind(&self) -> TierKind {
        match self {
            Self::Core => TierKind::Core,
            Self::Expansion => TierKind::Expansion,
            Self::ExpansionPlus => TierKind::ExpansionPlus,
            Self::Group(_) => TierKind::Group,
            Self::Topic(_) => TierKind::Topic,
            Self::Coverage => TierKind::Coverage,
            Self::Harassment => TierKind::Harassment,
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Group(id) => format!("group:{id}"),
            Self::Topic(id) => format!("topic:{id}"),
            other => other.kind().as_str().to_string(),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Tier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || CoreError::UnknownTier(s.to_string());
        let (head, param) = match s.split_once(':') {
            Some((head, param)) => (head, Some(param)),
            None => (s, None),
        };
        let head = head.replace('_', "").to_ascii_lowercase();

        match (head.as_str(), param) {
            ("core", None) => Ok(Self::Core),
            ("expansion", None) => Ok(Self::Expansion),
            ("expansionplus", None) => Ok(Self::ExpansionPlus),
            ("coverage", None) => Ok(Self::Coverage),
            ("harassment", None) => Ok(Self::Harassment),
            ("group", Some(id)) => id.trim().parse().map(Self::Group).map_err(|_| unknown()),
            ("topic", Some(id)) if !id.is_empty() => Ok(Self::Topic(id.to_string())),
            _ => Err(unknown()),
        }
    }
}

impl TryFrom<String> for Tier {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Tier> for String {
    fn from(tier: Tier) -> Self {
        tier.name()
    }
}
