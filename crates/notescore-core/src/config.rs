//! Process-wide scoring configuration.
//!
//! Built once at startup (defaults, or a TOML file overriding some fields)
//! and passed by reference to every component.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rescoring::{RescoringRule, RescoringRuleId, ScoringPhase};
use crate::status::{ModelingGroup, NoteId, TimestampMillis};
use crate::CoreError;

const DAY_MILLIS: TimestampMillis = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum votes a tag needs before it can be shown.
    pub min_ratings_to_get_tag: u32,
    /// Minimum number of qualifying tags before any tag is shown.
    pub min_tags_needed_for_status: usize,
    pub core_groups: BTreeSet<ModelingGroup>,
    pub expansion_groups: BTreeSet<ModelingGroup>,
    pub expansion_plus_groups: BTreeSet<ModelingGroup>,
    /// Window for the "flipped recently" rescoring rule.
    pub recent_flip_lookback_millis: TimestampMillis,
    /// Subsets smaller than this are measured but never fail the run.
    pub min_notes_for_churn_enforcement: usize,
    pub scorer_timeout_secs: u64,
    pub churn: ChurnLimits,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            min_ratings_to_get_tag: 2,
            min_tags_needed_for_status: 2,
            core_groups: BTreeSet::from([1, 2, 3, 6, 8, 9, 10, 11, 13, 14, 19, 21, 25]),
            expansion_groups: BTreeSet::from([
                0, 15, 17, 24, 29, 30, // first aggregate
                4, 5, 7, 12, 26, // second aggregate
                27, // third aggregate
                16, 20, 22, 23, 28, // leftovers
            ]),
            expansion_plus_groups: BTreeSet::from([18]),
            recent_flip_lookback_millis: 3 * DAY_MILLIS,
            min_notes_for_churn_enforcement: 0,
            scorer_timeout_secs: 3600,
            churn: ChurnLimits::default(),
        }
    }
}

/// Maximum fraction of a subset allowed to change status between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChurnLimits {
    pub all_unlocked_notes: f64,
    pub unlocked_notes_with_no_new_ratings: f64,
    pub notes_with_new_ratings: f64,
    pub notes_that_just_flipped_status: f64,
    pub notes_that_flipped_recently: f64,
}

impl Default for ChurnLimits {
    fn default() -> Self {
        Self {
            all_unlocked_notes: 0.04,
            unlocked_notes_with_no_new_ratings: 0.03,
            notes_with_new_ratings: 0.40,
            notes_that_just_flipped_status: 1e8,
            notes_that_flipped_recently: 1e8,
        }
    }
}

impl ChurnLimits {
    pub fn max_for(&self, rule: RescoringRuleId) -> f64 {
        match rule {
            RescoringRuleId::AllUnlockedNotes => self.all_unlocked_notes,
            RescoringRuleId::UnlockedNotesWithNoNewRatings => {
                self.unlocked_notes_with_no_new_ratings
            }
            RescoringRuleId::NotesWithNewRatings => self.notes_with_new_ratings,
            RescoringRuleId::NotesThatJustFlippedStatus => self.notes_that_just_flipped_status,
            RescoringRuleId::NotesThatFlippedRecently => self.notes_that_flipped_recently,
        }
    }
}

impl ScoringConfig {
    /// Parse a TOML document. Fields not present keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, CoreError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "loaded scoring config");
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, CoreError> {
        toml::to_string_pretty(self).map_err(|e| CoreError::InvalidConfig(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.min_ratings_to_get_tag == 0 {
            return Err(CoreError::InvalidConfig(
                "min_ratings_to_get_tag must be at least 1".into(),
            ));
        }
        for rule in RescoringRuleId::ALL {
            let max = self.churn.max_for(rule);
            if max.is_nan() || max < 0.0 {
                return Err(CoreError::InvalidConfig(format!(
                    "churn cap for {rule} must be a non-negative number, got {max}"
                )));
            }
        }
        let group_sets = [
            ("core_groups", &self.core_groups),
            ("expansion_groups", &self.expansion_groups),
            ("expansion_plus_groups", &self.expansion_plus_groups),
        ];
        for (i, (name, set)) in group_sets.iter().enumerate() {
            for (other_name, other) in &group_sets[i + 1..] {
                if let Some(group) = set.intersection(other).next() {
                    return Err(CoreError::InvalidConfig(format!(
                        "modeling group {group} is in both {name} and {other_name}"
                    )));
                }
            }
        }
        if self.recent_flip_lookback_millis < 0 {
            return Err(CoreError::InvalidConfig(
                "recent_flip_lookback_millis must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Build the rules evaluated during `phase`, in priority order.
    ///
    /// `note_sets` supplies explicit restrictions for rules that have one;
    /// rules missing from the map apply to every unclaimed note.
    pub fn rescoring_rules(
        &self,
        phase: ScoringPhase,
        note_sets: &BTreeMap<RescoringRuleId, BTreeSet<NoteId>>,
    ) -> Vec<RescoringRule> {
        RescoringRuleId::for_phase(phase)
            .map(|id| RescoringRule {
                id,
                note_set: note_sets.get(&id).cloned(),
                max_churn_rate: self.churn.max_for(id),
            })
            .collect()
    }
}
