//! Rows produced by scorer models and by the final decision stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::note::EnrollmentState;
use crate::rescoring::RescoringRuleId;
use crate::status::{ModelingGroup, NoteId, NoteStatus, ParticipantId, Tier, TopicId};
use crate::tags::ExplanationTagRef;

/// Confidence bound on a note intercept.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterceptInterval {
    #[serde(with = "nan_as_null")]
    pub min: f64,
    #[serde(with = "nan_as_null")]
    pub max: f64,
}

/// One model's verdict for one note. Never mutated after production.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerOutput {
    pub note_id: NoteId,
    pub tier: Tier,
    pub status: NoteStatus,
    pub note_intercept: f64,
    pub note_factor: f64,
    pub intercept_interval: Option<InterceptInterval>,
    pub num_final_round_ratings: u32,
    /// Rule identifiers that fired while deriving `status`, in firing order.
    pub active_rules: Vec<String>,
    /// Only topic models report confidence; `None` elsewhere.
    pub confident: Option<bool>,
}

/// One model's parameters for one rater.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaterModelOutput {
    pub rater_participant_id: ParticipantId,
    pub tier: Tier,
    pub rater_intercept: f64,
    pub rater_factor: f64,
    pub reputation: Option<f64>,
}

/// Low-diligence global intercept across the three fitting rounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReputationGlobalIntercept {
    #[serde(with = "nan_as_null")]
    pub first_round: f64,
    #[serde(with = "nan_as_null")]
    pub second_round: f64,
    #[serde(with = "nan_as_null")]
    pub final_round: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescoringMetaScorerOutput {
    pub global_intercept: Option<f64>,
    pub low_diligence_global_intercept: Option<ReputationGlobalIntercept>,
    /// Tag name to filtering threshold.
    pub tag_filtering_thresholds: Option<BTreeMap<String, f64>>,
}

/// Calibration values computed during prescoring, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescoringMetaOutput {
    pub meta_scorer_output: BTreeMap<Tier, PrescoringMetaScorerOutput>,
}

impl PrescoringMetaOutput {
    pub fn for_tier(&self, tier: &Tier) -> Option<&PrescoringMetaScorerOutput> {
        self.meta_scorer_output.get(tier)
    }
}

/// JSON has no NaN; unscored parameters travel as `null`.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Per-tier columns carried on a decision row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierScore {
    pub status: NoteStatus,
    #[serde(with = "nan_as_null")]
    pub note_intercept: f64,
    #[serde(with = "nan_as_null")]
    pub note_factor: f64,
    pub intercept_interval: Option<InterceptInterval>,
    pub num_final_round_ratings: u32,
    pub active_rules: Vec<String>,
}

impl From<&ScorerOutput> for TierScore {
    fn from(output: &ScorerOutput) -> Self {
        Self {
            status: output.status,
            note_intercept: output.note_intercept,
            note_factor: output.note_factor,
            intercept_interval: output.intercept_interval,
            num_final_round_ratings: output.num_final_round_ratings,
            active_rules: output.active_rules.clone(),
        }
    }
}

/// Final per-note decision exposed to persistence and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDecision {
    pub note_id: NoteId,
    /// Status after locks are applied.
    pub final_status: NoteStatus,
    /// Status the resolver picked before locks were applied.
    pub unlocked_status: NoteStatus,
    pub decided_by: Tier,
    pub meta_scorer_active_rules: Vec<String>,
    pub first_tag: Option<ExplanationTagRef>,
    pub second_tag: Option<ExplanationTagRef>,
    pub modeling_group: Option<ModelingGroup>,
    pub topic: Option<TopicId>,
    pub tier_scores: BTreeMap<Tier, TierScore>,
    pub rescoring_active_rule: Option<RescoringRuleId>,
    pub num_ratings: u32,
}

impl NoteDecision {
    /// Intercept of the tier that decided the status, if that tier scored the note.
    pub fn decided_by_intercept(&self) -> Option<f64> {
        self.tier_scores
            .get(&self.decided_by)
            .map(|score| score.note_intercept)
    }
}

/// Merged per-rater output of the final phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaterScoreRow {
    pub rater_participant_id: ParticipantId,
    pub enrollment_state: Option<EnrollmentState>,
    pub modeling_group: Option<ModelingGroup>,
    pub tier_params: BTreeMap<Tier, (f64, f64)>,
    pub reputation: Option<f64>,
}

/// Difference between this run's and the previous run's decision for a note.
///
/// Derived every run and never persisted on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteStatusChange {
    pub note_id: NoteId,
    /// `OLD -> NEW`, or `None` when the final status did not change.
    pub final_status_change: Option<String>,
    pub new_ratings: u32,
    pub decided_by_change: Option<String>,
    pub all_added_rules: Vec<String>,
    pub all_removed_rules: Vec<String>,
    pub decided_by_intercept_change: Option<String>,
}

/// Handle to a large table placed outside the current execution context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedPayloadDescriptor {
    pub name: String,
    pub data_size: u64,
}
