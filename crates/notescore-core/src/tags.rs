//! Explanation tag vocabularies.
//!
//! Raters attach tags to their helpful / not-helpful votes. Each vocabulary
//! has a fixed tie-break priority: when two tags have the same vote count,
//! the one with the higher priority wins. The catch-all "other" tag has
//! priority 0 in both vocabularies and loses every tie.
//!
//! Variant order is the column order of the rating tables, which is not the
//! tie-break order. Never reorder existing variants.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::CoreError;

/// Common behaviour of the two closed tag vocabularies.
pub trait ExplanationTag: Copy + Ord + Hash + fmt::Debug + 'static {
    /// Every tag of the vocabulary, in table column order.
    const ALL: &'static [Self];

    /// Column / wire name, e.g. `notHelpfulOutdated`.
    fn name(self) -> &'static str;

    /// Tie-break priority. Higher wins ties.
    fn tiebreak_priority(self) -> u8;

    fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .iter()
            .copied()
            .find(|tag| tag.name() == name)
            .ok_or_else(|| CoreError::UnknownTag(name.to_string()))
    }
}

/// Per-note vote counts for one vocabulary. Tags absent from the map have zero votes.
pub type TagCounts<T> = BTreeMap<T, u32>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HelpfulTag {
    #[serde(rename = "helpfulOther")]
    Other,
    #[serde(rename = "helpfulInformative")]
    Informative,
    #[serde(rename = "helpfulClear")]
    Clear,
    #[serde(rename = "helpfulEmpathetic")]
    Empathetic,
    #[serde(rename = "helpfulGoodSources")]
    GoodSources,
    #[serde(rename = "helpfulUniqueContext")]
    UniqueContext,
    #[serde(rename = "helpfulAddressesClaim")]
    AddressesClaim,
    #[serde(rename = "helpfulImportantContext")]
    ImportantContext,
    #[serde(rename = "helpfulUnbiasedLanguage")]
    UnbiasedLanguage,
}

impl ExplanationTag for HelpfulTag {
    const ALL: &'static [Self] = &[
        Self::Other,
        Self::Informative,
        Self::Clear,
        Self::Empathetic,
        Self::GoodSources,
        Self::UniqueContext,
        Self::AddressesClaim,
        Self::ImportantContext,
        Self::UnbiasedLanguage,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Other => "helpfulOther",
            Self::Informative => "helpfulInformative",
            Self::Clear => "helpfulClear",
            Self::Empathetic => "helpfulEmpathetic",
            Self::GoodSources => "helpfulGoodSources",
            Self::UniqueContext => "helpfulUniqueContext",
            Self::AddressesClaim => "helpfulAddressesClaim",
            Self::ImportantContext => "helpfulImportantContext",
            Self::UnbiasedLanguage => "helpfulUnbiasedLanguage",
        }
    }

    fn tiebreak_priority(self) -> u8 {
        match self {
            Self::Other => 0,
            Self::UnbiasedLanguage => 1,
            Self::UniqueContext => 2,
            Self::Empathetic => 3,
            Self::GoodSources => 4,
            Self::AddressesClaim => 5,
            Self::ImportantContext => 6,
            Self::Clear => 7,
            Self::Informative => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotHelpfulTag {
    #[serde(rename = "notHelpfulOther")]
    Other,
    #[serde(rename = "notHelpfulIncorrect")]
    Incorrect,
    #[serde(rename = "notHelpfulSourcesMissingOrUnreliable")]
    SourcesMissingOrUnreliable,
    #[serde(rename = "notHelpfulOpinionSpeculationOrBias")]
    OpinionSpeculationOrBias,
    #[serde(rename = "notHelpfulMissingKeyPoints")]
    MissingKeyPoints,
    #[serde(rename = "notHelpfulOutdated")]
    Outdated,
    #[serde(rename = "notHelpfulHardToUnderstand")]
    HardToUnderstand,
    #[serde(rename = "notHelpfulArgumentativeOrBiased")]
    ArgumentativeOrBiased,
    #[serde(rename = "notHelpfulOffTopic")]
    OffTopic,
    #[serde(rename = "notHelpfulSpamHarassmentOrAbuse")]
    SpamHarassmentOrAbuse,
    #[serde(rename = "notHelpfulIrrelevantSources")]
    IrrelevantSources,
    #[serde(rename = "notHelpfulOpinionSpeculation")]
    OpinionSpeculation,
    #[serde(rename = "notHelpfulNoteNotNeeded")]
    NoteNotNeeded,
}

impl ExplanationTag for NotHelpfulTag {
    const ALL: &'static [Self] = &[
        Self::Other,
        Self::Incorrect,
        Self::SourcesMissingOrUnreliable,
        Self::OpinionSpeculationOrBias,
        Self::MissingKeyPoints,
        Self::Outdated,
        Self::HardToUnderstand,
        Self::ArgumentativeOrBiased,
        Self::OffTopic,
        Self::SpamHarassmentOrAbuse,
        Self::IrrelevantSources,
        Self::OpinionSpeculation,
        Self::NoteNotNeeded,
    ];

    fn name(self) -> &'static str {
        match self {
            Self::Other => "notHelpfulOther",
            Self::Incorrect => "notHelpfulIncorrect",
            Self::SourcesMissingOrUnreliable => "notHelpfulSourcesMissingOrUnreliable",
            Self::OpinionSpeculationOrBias => "notHelpfulOpinionSpeculationOrBias",
            Self::MissingKeyPoints => "notHelpfulMissingKeyPoints",
            Self::Outdated => "notHelpfulOutdated",
            Self::HardToUnderstand => "notHelpfulHardToUnderstand",
            Self::ArgumentativeOrBiased => "notHelpfulArgumentativeOrBiased",
            Self::OffTopic => "notHelpfulOffTopic",
            Self::SpamHarassmentOrAbuse => "notHelpfulSpamHarassmentOrAbuse",
            Self::IrrelevantSources => "notHelpfulIrrelevantSources",
            Self::OpinionSpeculation => "notHelpfulOpinionSpeculation",
            Self::NoteNotNeeded => "notHelpfulNoteNotNeeded",
        }
    }

    fn tiebreak_priority(self) -> u8 {
        match self {
            Self::Other => 0,
            Self::IrrelevantSources => 1,
            Self::SourcesMissingOrUnreliable => 2,
            Self::OpinionSpeculation => 3,
            Self::OpinionSpeculationOrBias => 4,
            Self::MissingKeyPoints => 5,
            Self::NoteNotNeeded => 6,
            Self::ArgumentativeOrBiased => 7,
            Self::Incorrect => 8,
            Self::OffTopic => 9,
            Self::HardToUnderstand => 10,
            Self::SpamHarassmentOrAbuse => 11,
            Self::Outdated => 12,
        }
    }
}

/// A selected explanation tag from either vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExplanationTagRef {
    Helpful(HelpfulTag),
    NotHelpful(NotHelpfulTag),
}

impl ExplanationTagRef {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Helpful(tag) => tag.name(),
            Self::NotHelpful(tag) => tag.name(),
        }
    }

    /// Resolve a wire name against both vocabularies.
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        HelpfulTag::from_name(name)
            .map(Self::Helpful)
            .or_else(|_| NotHelpfulTag::from_name(name).map(Self::NotHelpful))
    }
}

impl From<HelpfulTag> for ExplanationTagRef {
    fn from(tag: HelpfulTag) -> Self {
        Self::Helpful(tag)
    }
}

impl From<NotHelpfulTag> for ExplanationTagRef {
    fn from(tag: NotHelpfulTag) -> Self {
        Self::NotHelpful(tag)
    }
}

impl fmt::Display for ExplanationTagRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
