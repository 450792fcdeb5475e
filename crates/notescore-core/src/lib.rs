pub mod config;
mod error;
pub mod history;
pub mod note;
pub mod outputs;
pub mod rescoring;
pub mod schema;
pub mod status;
pub mod tags;

pub use config::{ChurnLimits, ScoringConfig};
pub use error::CoreError;
pub use history::{LockDirective, StatusHistoryRecord};
pub use note::{Classification, Enrollment, EnrollmentState, HelpfulnessLevel, Note, Rating};
pub use outputs::{
    InterceptInterval, NoteDecision, NoteStatusChange, PrescoringMetaOutput,
    PrescoringMetaScorerOutput, RaterModelOutput, RaterScoreRow, ReputationGlobalIntercept,
    ScorerOutput, SharedPayloadDescriptor, TierScore,
};
pub use rescoring::{RescoringRule, RescoringRuleId, ScoringPhase};
pub use schema::tables;
pub use status::{
    ModelingGroup, NoteId, NoteStatus, ParticipantId, Tier, TierKind, TimestampMillis, TopicId,
};
pub use tags::{ExplanationTag, ExplanationTagRef, HelpfulTag, NotHelpfulTag, TagCounts};
