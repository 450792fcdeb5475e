/// Arrow schema definitions for the tables exchanged between scoring phases.
pub mod tables {
    use std::sync::Arc;

    use arrow::datatypes::{DataType, Field, Schema};

    use crate::tags::{ExplanationTag, HelpfulTag, NotHelpfulTag};

    pub const NOTE_ID: &str = "noteId";
    pub const NOTE_AUTHOR_PARTICIPANT_ID: &str = "noteAuthorParticipantId";
    pub const CREATED_AT_MILLIS: &str = "createdAtMillis";
    pub const CLASSIFICATION: &str = "classification";
    pub const NOTE_TOPIC: &str = "noteTopic";
    pub const RATER_PARTICIPANT_ID: &str = "raterParticipantId";
    pub const HELPFULNESS_LEVEL: &str = "helpfulnessLevel";
    pub const PARTICIPANT_ID: &str = "participantId";
    pub const ENROLLMENT_STATE: &str = "enrollmentState";
    pub const MODELING_POPULATION: &str = "modelingPopulation";
    pub const MODELING_GROUP: &str = "modelingGroup";
    pub const SCORER_NAME: &str = "scorerName";
    pub const RATING_STATUS: &str = "internalRatingStatus";
    pub const NOTE_INTERCEPT: &str = "internalNoteIntercept";
    pub const NOTE_FACTOR_1: &str = "internalNoteFactor1";
    pub const NOTE_INTERCEPT_MIN: &str = "internalNoteIntercept_min";
    pub const NOTE_INTERCEPT_MAX: &str = "internalNoteIntercept_max";
    pub const NUM_FINAL_ROUND_RATINGS: &str = "numFinalRoundRatings";
    pub const ACTIVE_RULES: &str = "internalActiveRules";
    pub const NOTE_CONFIDENT: &str = "noteConfident";
    pub const RATER_INTERCEPT: &str = "internalRaterIntercept";
    pub const RATER_FACTOR_1: &str = "internalRaterFactor1";
    pub const RATER_REPUTATION: &str = "internalRaterReputation";

    pub const FIRST_NON_NMR_TIMESTAMP: &str = "timestampMillisOfFirstNonNMRStatus";
    pub const FIRST_NON_NMR_STATUS: &str = "firstNonNMRStatus";
    pub const CURRENT_STATUS_TIMESTAMP: &str = "timestampMillisOfCurrentStatus";
    pub const CURRENT_STATUS: &str = "currentStatus";
    pub const LATEST_NON_NMR_TIMESTAMP: &str = "timestampMillisOfLatestNonNMRStatus";
    pub const MOST_RECENT_NON_NMR_STATUS: &str = "mostRecentNonNMRStatus";
    pub const STATUS_LOCK_TIMESTAMP: &str = "timestampMillisOfStatusLock";
    pub const LOCKED_STATUS: &str = "lockedStatus";
    pub const RETRO_LOCK_TIMESTAMP: &str = "timestampMillisOfRetroLock";
    pub const CURRENT_CORE_STATUS: &str = "currentCoreStatus";
    pub const CURRENT_EXPANSION_STATUS: &str = "currentExpansionStatus";
    pub const CURRENT_GROUP_STATUS: &str = "currentGroupStatus";
    pub const CURRENT_DECIDED_BY: &str = "currentDecidedBy";
    pub const CURRENT_MODELING_GROUP: &str = "currentModelingGroup";
    pub const MOST_RECENT_STATUS_CHANGE_TIMESTAMP: &str =
        "timestampMillisOfMostRecentStatusChange";

    fn utf8(name: &str, nullable: bool) -> Field {
        Field::new(name, DataType::Utf8, nullable)
    }

    fn millis(name: &str, nullable: bool) -> Field {
        Field::new(name, DataType::Int64, nullable)
    }

    /// Schema for the note table: identity plus one vote-count column per tag.
    pub fn notes_schema() -> Schema {
        let mut fields = vec![
            Field::new(NOTE_ID, DataType::Int64, false),
            utf8(NOTE_AUTHOR_PARTICIPANT_ID, false),
            millis(CREATED_AT_MILLIS, false),
            utf8(CLASSIFICATION, false),
            utf8(NOTE_TOPIC, true),
        ];
        fields.extend(tag_fields::<HelpfulTag>(DataType::UInt32));
        fields.extend(tag_fields::<NotHelpfulTag>(DataType::UInt32));
        Schema::new(fields)
    }

    /// Schema for the rating table: one boolean column per tag.
    pub fn ratings_schema() -> Schema {
        let mut fields = vec![
            Field::new(NOTE_ID, DataType::Int64, false),
            utf8(RATER_PARTICIPANT_ID, false),
            millis(CREATED_AT_MILLIS, false),
            utf8(HELPFULNESS_LEVEL, false),
        ];
        fields.extend(tag_fields::<HelpfulTag>(DataType::Boolean));
        fields.extend(tag_fields::<NotHelpfulTag>(DataType::Boolean));
        Schema::new(fields)
    }

    /// Schema for the persisted note status history. Timestamps are nullable
    /// because "never happened" is not the same as epoch zero.
    pub fn note_status_history_schema() -> Schema {
        Schema::new(vec![
            Field::new(NOTE_ID, DataType::Int64, false),
            utf8(NOTE_AUTHOR_PARTICIPANT_ID, false),
            millis(CREATED_AT_MILLIS, false),
            millis(FIRST_NON_NMR_TIMESTAMP, true),
            utf8(FIRST_NON_NMR_STATUS, true),
            millis(CURRENT_STATUS_TIMESTAMP, true),
            utf8(CURRENT_STATUS, true),
            millis(LATEST_NON_NMR_TIMESTAMP, true),
            utf8(MOST_RECENT_NON_NMR_STATUS, true),
            millis(STATUS_LOCK_TIMESTAMP, true),
            utf8(LOCKED_STATUS, true),
            millis(RETRO_LOCK_TIMESTAMP, true),
            utf8(CURRENT_CORE_STATUS, true),
            utf8(CURRENT_EXPANSION_STATUS, true),
            utf8(CURRENT_GROUP_STATUS, true),
            utf8(CURRENT_DECIDED_BY, true),
            Field::new(CURRENT_MODELING_GROUP, DataType::UInt32, true),
            millis(MOST_RECENT_STATUS_CHANGE_TIMESTAMP, true),
        ])
    }

    pub fn user_enrollment_schema() -> Schema {
        Schema::new(vec![
            utf8(PARTICIPANT_ID, false),
            utf8(ENROLLMENT_STATE, false),
            utf8(MODELING_POPULATION, false),
            Field::new(MODELING_GROUP, DataType::UInt32, true),
        ])
    }

    /// Schema for note-level scorer output, one row per (note, tier).
    pub fn note_model_output_schema() -> Schema {
        Schema::new(vec![
            Field::new(NOTE_ID, DataType::Int64, false),
            utf8(SCORER_NAME, false),
            utf8(RATING_STATUS, false),
            Field::new(NOTE_INTERCEPT, DataType::Float64, false),
            Field::new(NOTE_FACTOR_1, DataType::Float64, false),
            Field::new(NOTE_INTERCEPT_MIN, DataType::Float64, true),
            Field::new(NOTE_INTERCEPT_MAX, DataType::Float64, true),
            Field::new(NUM_FINAL_ROUND_RATINGS, DataType::UInt32, false),
            Field::new(
                ACTIVE_RULES,
                DataType::List(Arc::new(Field::new("item", DataType::Utf8, true))),
                false,
            ),
            Field::new(NOTE_CONFIDENT, DataType::Boolean, true),
        ])
    }

    /// Schema for rater-level scorer output, one row per (rater, tier).
    pub fn rater_model_output_schema() -> Schema {
        Schema::new(vec![
            utf8(RATER_PARTICIPANT_ID, false),
            utf8(SCORER_NAME, false),
            Field::new(RATER_INTERCEPT, DataType::Float64, false),
            Field::new(RATER_FACTOR_1, DataType::Float64, false),
            Field::new(RATER_REPUTATION, DataType::Float64, true),
        ])
    }

    fn tag_fields<T: ExplanationTag>(data_type: DataType) -> impl Iterator<Item = Field> {
        T::ALL
            .iter()
            .map(move |tag| Field::new(tag.name(), data_type.clone(), false))
    }
}

#[cfg(test)]
mod tests {
    use super::tables;

    #[test]
    fn notes_schema_has_a_column_per_tag() {
        let schema = tables::notes_schema();
        assert_eq!(schema.fields().len(), 5 + 9 + 13);
        assert!(schema.field_with_name("notHelpfulOutdated").is_ok());
        assert!(schema.field_with_name(tables::NOTE_TOPIC).unwrap().is_nullable());
    }

    #[test]
    fn ratings_schema_has_expected_fields() {
        let schema = tables::ratings_schema();
        assert_eq!(schema.fields().len(), 4 + 9 + 13);
        assert!(schema.field_with_name("helpfulClear").is_ok());
    }

    #[test]
    fn history_timestamps_are_nullable() {
        let schema = tables::note_status_history_schema();
        assert_eq!(schema.fields().len(), 18);
        for field in schema.fields() {
            if field.name().starts_with("timestampMillis") {
                assert!(field.is_nullable(), "{} should be nullable", field.name());
            }
        }
    }

    #[test]
    fn model_output_schemas_have_expected_fields() {
        assert_eq!(tables::note_model_output_schema().fields().len(), 10);
        assert_eq!(tables::rater_model_output_schema().fields().len(), 5);
        assert_eq!(tables::user_enrollment_schema().fields().len(), 4);
    }
}
