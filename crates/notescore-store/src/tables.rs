//! Conversion between typed rows and Arrow record batches.
//!
//! Every writer produces a batch matching the schema in
//! [`notescore_core::tables`]; every reader accepts any batch carrying at
//! least the columns it needs, in any order.

use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int64Array, ListArray, ListBuilder, StringArray,
    StringBuilder, UInt32Array,
};
use arrow::record_batch::RecordBatch;
use notescore_core::tables as t;
use notescore_core::{
    Enrollment, ExplanationTag, HelpfulTag, InterceptInterval, NotHelpfulTag, Note, NoteStatus,
    RaterModelOutput, Rating, ScorerOutput, StatusHistoryRecord, TagCounts, Tier,
};

use crate::StoreError;

// ── Arrow extraction helpers ──

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A, StoreError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| StoreError::MissingColumn(name.to_string()))?
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| StoreError::ColumnType {
            column: name.to_string(),
            expected: std::any::type_name::<A>(),
        })
}

fn str_at(array: &StringArray, row: usize) -> Option<&str> {
    array.is_valid(row).then(|| array.value(row))
}

fn required_str<'a>(array: &'a StringArray, name: &str, row: usize) -> Result<&'a str, StoreError> {
    str_at(array, row).ok_or_else(|| StoreError::NullValue {
        column: name.to_string(),
        row,
    })
}

fn i64_at(array: &Int64Array, row: usize) -> Option<i64> {
    array.is_valid(row).then(|| array.value(row))
}

fn u32_at(array: &UInt32Array, row: usize) -> Option<u32> {
    array.is_valid(row).then(|| array.value(row))
}

fn f64_at(array: &Float64Array, row: usize) -> Option<f64> {
    array.is_valid(row).then(|| array.value(row))
}

fn status_at(array: &StringArray, row: usize) -> Result<Option<NoteStatus>, StoreError> {
    Ok(str_at(array, row).map(str::parse::<NoteStatus>).transpose()?)
}

fn strings_at(lists: &ListArray, name: &str, row: usize) -> Result<Vec<String>, StoreError> {
    if lists.is_null(row) {
        return Ok(Vec::new());
    }
    let values = lists.value(row);
    let strings = values
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| StoreError::ColumnType {
            column: name.to_string(),
            expected: "List<Utf8>",
        })?;
    Ok((0..strings.len())
        .filter(|&i| strings.is_valid(i))
        .map(|i| strings.value(i).to_string())
        .collect())
}

fn utf8_column<S: AsRef<str>>(values: impl Iterator<Item = S>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

fn opt_utf8_column<S: AsRef<str>>(values: impl Iterator<Item = Option<S>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

fn millis_column(values: impl Iterator<Item = Option<i64>>) -> ArrayRef {
    Arc::new(Int64Array::from_iter(values))
}

fn status_column(values: impl Iterator<Item = Option<NoteStatus>>) -> ArrayRef {
    opt_utf8_column(values.map(|status| status.map(|s| s.as_str())))
}

// ── Notes ──

fn count_columns<T: ExplanationTag>(maps: &[&TagCounts<T>]) -> Vec<ArrayRef> {
    T::ALL
        .iter()
        .map(|tag| {
            Arc::new(UInt32Array::from_iter_values(
                maps.iter().map(|counts| counts.get(tag).copied().unwrap_or(0)),
            )) as ArrayRef
        })
        .collect()
}

fn count_arrays<T: ExplanationTag>(
    batch: &RecordBatch,
) -> Result<Vec<(T, &UInt32Array)>, StoreError> {
    T::ALL
        .iter()
        .map(|&tag| Ok((tag, column::<UInt32Array>(batch, tag.name())?)))
        .collect()
}

fn counts_at<T: ExplanationTag>(arrays: &[(T, &UInt32Array)], row: usize) -> TagCounts<T> {
    arrays
        .iter()
        .filter_map(|(tag, counts)| {
            u32_at(counts, row)
                .filter(|&count| count > 0)
                .map(|count| (*tag, count))
        })
        .collect()
}

pub fn notes_to_batch(notes: &[Note]) -> Result<RecordBatch, StoreError> {
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(notes.iter().map(|n| n.note_id))),
        utf8_column(notes.iter().map(|n| n.note_author_participant_id.as_str())),
        Arc::new(Int64Array::from_iter_values(
            notes.iter().map(|n| n.created_at_millis),
        )),
        utf8_column(notes.iter().map(|n| n.classification.as_str())),
        opt_utf8_column(notes.iter().map(|n| n.topic.as_deref())),
    ];
    let helpful: Vec<_> = notes.iter().map(|n| &n.helpful_tag_counts).collect();
    let not_helpful: Vec<_> = notes.iter().map(|n| &n.not_helpful_tag_counts).collect();
    columns.extend(count_columns::<HelpfulTag>(&helpful));
    columns.extend(count_columns::<NotHelpfulTag>(&not_helpful));
    Ok(RecordBatch::try_new(Arc::new(t::notes_schema()), columns)?)
}

pub fn notes_from_batches(batches: &[RecordBatch]) -> Result<Vec<Note>, StoreError> {
    let mut notes = Vec::new();
    for batch in batches {
        let ids = column::<Int64Array>(batch, t::NOTE_ID)?;
        let authors = column::<StringArray>(batch, t::NOTE_AUTHOR_PARTICIPANT_ID)?;
        let created = column::<Int64Array>(batch, t::CREATED_AT_MILLIS)?;
        let classifications = column::<StringArray>(batch, t::CLASSIFICATION)?;
        let topics = column::<StringArray>(batch, t::NOTE_TOPIC)?;
        let helpful = count_arrays::<HelpfulTag>(batch)?;
        let not_helpful = count_arrays::<NotHelpfulTag>(batch)?;

        for row in 0..batch.num_rows() {
            notes.push(Note {
                note_id: ids.value(row),
                note_author_participant_id: required_str(
                    authors,
                    t::NOTE_AUTHOR_PARTICIPANT_ID,
                    row,
                )?
                .to_string(),
                created_at_millis: created.value(row),
                classification: required_str(classifications, t::CLASSIFICATION, row)?.parse()?,
                topic: str_at(topics, row).map(str::to_string),
                helpful_tag_counts: counts_at(&helpful, row),
                not_helpful_tag_counts: counts_at(&not_helpful, row),
            });
        }
    }
    Ok(notes)
}

// ── Ratings ──

fn flag_columns<T: ExplanationTag>(tag_lists: &[&[T]]) -> Vec<ArrayRef> {
    T::ALL
        .iter()
        .map(|tag| {
            Arc::new(BooleanArray::from(
                tag_lists
                    .iter()
                    .map(|tags| tags.contains(tag))
                    .collect::<Vec<bool>>(),
            )) as ArrayRef
        })
        .collect()
}

fn flag_arrays<T: ExplanationTag>(
    batch: &RecordBatch,
) -> Result<Vec<(T, &BooleanArray)>, StoreError> {
    T::ALL
        .iter()
        .map(|&tag| Ok((tag, column::<BooleanArray>(batch, tag.name())?)))
        .collect()
}

fn flags_at<T: ExplanationTag>(arrays: &[(T, &BooleanArray)], row: usize) -> Vec<T> {
    arrays
        .iter()
        .filter(|(_, flags)| flags.is_valid(row) && flags.value(row))
        .map(|(tag, _)| *tag)
        .collect()
}

pub fn ratings_to_batch(ratings: &[Rating]) -> Result<RecordBatch, StoreError> {
    let mut columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(ratings.iter().map(|r| r.note_id))),
        utf8_column(ratings.iter().map(|r| r.rater_participant_id.as_str())),
        Arc::new(Int64Array::from_iter_values(
            ratings.iter().map(|r| r.created_at_millis),
        )),
        utf8_column(ratings.iter().map(|r| r.helpfulness_level.as_str())),
    ];
    let helpful: Vec<&[HelpfulTag]> = ratings.iter().map(|r| r.helpful_tags.as_slice()).collect();
    let not_helpful: Vec<&[NotHelpfulTag]> = ratings
        .iter()
        .map(|r| r.not_helpful_tags.as_slice())
        .collect();
    columns.extend(flag_columns(&helpful));
    columns.extend(flag_columns(&not_helpful));
    Ok(RecordBatch::try_new(Arc::new(t::ratings_schema()), columns)?)
}

pub fn ratings_from_batches(batches: &[RecordBatch]) -> Result<Vec<Rating>, StoreError> {
    let mut ratings = Vec::new();
    for batch in batches {
        let note_ids = column::<Int64Array>(batch, t::NOTE_ID)?;
        let raters = column::<StringArray>(batch, t::RATER_PARTICIPANT_ID)?;
        let created = column::<Int64Array>(batch, t::CREATED_AT_MILLIS)?;
        let levels = column::<StringArray>(batch, t::HELPFULNESS_LEVEL)?;
        let helpful = flag_arrays::<HelpfulTag>(batch)?;
        let not_helpful = flag_arrays::<NotHelpfulTag>(batch)?;

        for row in 0..batch.num_rows() {
            ratings.push(Rating {
                note_id: note_ids.value(row),
                rater_participant_id: required_str(raters, t::RATER_PARTICIPANT_ID, row)?
                    .to_string(),
                created_at_millis: created.value(row),
                helpfulness_level: required_str(levels, t::HELPFULNESS_LEVEL, row)?.parse()?,
                helpful_tags: flags_at(&helpful, row),
                not_helpful_tags: flags_at(&not_helpful, row),
            });
        }
    }
    Ok(ratings)
}

// ── Status history ──

pub fn history_to_batch(records: &[StatusHistoryRecord]) -> Result<RecordBatch, StoreError> {
    let r = records;
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(r.iter().map(|h| h.note_id))),
        utf8_column(r.iter().map(|h| h.note_author_participant_id.as_str())),
        Arc::new(Int64Array::from_iter_values(r.iter().map(|h| h.created_at_millis))),
        millis_column(r.iter().map(|h| h.timestamp_millis_of_first_non_nmr_status)),
        status_column(r.iter().map(|h| h.first_non_nmr_status)),
        millis_column(r.iter().map(|h| h.timestamp_millis_of_current_status)),
        status_column(r.iter().map(|h| h.current_status)),
        millis_column(r.iter().map(|h| h.timestamp_millis_of_latest_non_nmr_status)),
        status_column(r.iter().map(|h| h.most_recent_non_nmr_status)),
        millis_column(r.iter().map(|h| h.timestamp_millis_of_status_lock)),
        status_column(r.iter().map(|h| h.locked_status)),
        millis_column(r.iter().map(|h| h.timestamp_millis_of_retro_lock)),
        status_column(r.iter().map(|h| h.current_core_status)),
        status_column(r.iter().map(|h| h.current_expansion_status)),
        status_column(r.iter().map(|h| h.current_group_status)),
        opt_utf8_column(r.iter().map(|h| h.current_decided_by.as_ref().map(Tier::name))),
        Arc::new(UInt32Array::from_iter(r.iter().map(|h| h.current_modeling_group))),
        millis_column(r.iter().map(|h| h.timestamp_millis_of_most_recent_status_change)),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(t::note_status_history_schema()),
        columns,
    )?)
}

pub fn history_from_batches(
    batches: &[RecordBatch],
) -> Result<Vec<StatusHistoryRecord>, StoreError> {
    let mut records = Vec::new();
    for batch in batches {
        let ids = column::<Int64Array>(batch, t::NOTE_ID)?;
        let authors = column::<StringArray>(batch, t::NOTE_AUTHOR_PARTICIPANT_ID)?;
        let created = column::<Int64Array>(batch, t::CREATED_AT_MILLIS)?;
        let first_ts = column::<Int64Array>(batch, t::FIRST_NON_NMR_TIMESTAMP)?;
        let first = column::<StringArray>(batch, t::FIRST_NON_NMR_STATUS)?;
        let current_ts = column::<Int64Array>(batch, t::CURRENT_STATUS_TIMESTAMP)?;
        let current = column::<StringArray>(batch, t::CURRENT_STATUS)?;
        let latest_ts = column::<Int64Array>(batch, t::LATEST_NON_NMR_TIMESTAMP)?;
        let latest = column::<StringArray>(batch, t::MOST_RECENT_NON_NMR_STATUS)?;
        let lock_ts = column::<Int64Array>(batch, t::STATUS_LOCK_TIMESTAMP)?;
        let locked = column::<StringArray>(batch, t::LOCKED_STATUS)?;
        let retro_ts = column::<Int64Array>(batch, t::RETRO_LOCK_TIMESTAMP)?;
        let core = column::<StringArray>(batch, t::CURRENT_CORE_STATUS)?;
        let expansion = column::<StringArray>(batch, t::CURRENT_EXPANSION_STATUS)?;
        let group = column::<StringArray>(batch, t::CURRENT_GROUP_STATUS)?;
        let decided_by = column::<StringArray>(batch, t::CURRENT_DECIDED_BY)?;
        let modeling_group = column::<UInt32Array>(batch, t::CURRENT_MODELING_GROUP)?;
        let change_ts = column::<Int64Array>(batch, t::MOST_RECENT_STATUS_CHANGE_TIMESTAMP)?;

        for row in 0..batch.num_rows() {
            records.push(StatusHistoryRecord {
                note_id: ids.value(row),
                note_author_participant_id: required_str(
                    authors,
                    t::NOTE_AUTHOR_PARTICIPANT_ID,
                    row,
                )?
                .to_string(),
                created_at_millis: created.value(row),
                timestamp_millis_of_first_non_nmr_status: i64_at(first_ts, row),
                first_non_nmr_status: status_at(first, row)?,
                timestamp_millis_of_current_status: i64_at(current_ts, row),
                current_status: status_at(current, row)?,
                timestamp_millis_of_latest_non_nmr_status: i64_at(latest_ts, row),
                most_recent_non_nmr_status: status_at(latest, row)?,
                timestamp_millis_of_status_lock: i64_at(lock_ts, row),
                locked_status: status_at(locked, row)?,
                timestamp_millis_of_retro_lock: i64_at(retro_ts, row),
                current_core_status: status_at(core, row)?,
                current_expansion_status: status_at(expansion, row)?,
                current_group_status: status_at(group, row)?,
                current_decided_by: str_at(decided_by, row)
                    .map(str::parse::<Tier>)
                    .transpose()?,
                current_modeling_group: u32_at(modeling_group, row),
                timestamp_millis_of_most_recent_status_change: i64_at(change_ts, row),
            });
        }
    }
    Ok(records)
}

// ── Enrollment ──

pub fn enrollment_to_batch(rows: &[Enrollment]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        utf8_column(rows.iter().map(|e| e.participant_id.as_str())),
        utf8_column(rows.iter().map(|e| e.enrollment_state.as_str())),
        utf8_column(rows.iter().map(|e| e.modeling_population.as_str())),
        Arc::new(UInt32Array::from_iter(rows.iter().map(|e| e.modeling_group))),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(t::user_enrollment_schema()),
        columns,
    )?)
}

pub fn enrollment_from_batches(batches: &[RecordBatch]) -> Result<Vec<Enrollment>, StoreError> {
    let mut rows = Vec::new();
    for batch in batches {
        let participants = column::<StringArray>(batch, t::PARTICIPANT_ID)?;
        let states = column::<StringArray>(batch, t::ENROLLMENT_STATE)?;
        let populations = column::<StringArray>(batch, t::MODELING_POPULATION)?;
        let groups = column::<UInt32Array>(batch, t::MODELING_GROUP)?;
        for row in 0..batch.num_rows() {
            rows.push(Enrollment {
                participant_id: required_str(participants, t::PARTICIPANT_ID, row)?.to_string(),
                enrollment_state: required_str(states, t::ENROLLMENT_STATE, row)?.parse()?,
                modeling_population: required_str(populations, t::MODELING_POPULATION, row)?
                    .to_string(),
                modeling_group: u32_at(groups, row),
            });
        }
    }
    Ok(rows)
}

// ── Scorer outputs ──

pub fn note_outputs_to_batch(outputs: &[ScorerOutput]) -> Result<RecordBatch, StoreError> {
    let mut rules = ListBuilder::new(StringBuilder::new());
    for output in outputs {
        for rule in &output.active_rules {
            rules.values().append_value(rule);
        }
        rules.append(true);
    }
    let columns: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from_iter_values(outputs.iter().map(|o| o.note_id))),
        utf8_column(outputs.iter().map(|o| o.tier.name())),
        utf8_column(outputs.iter().map(|o| o.status.as_str())),
        Arc::new(Float64Array::from_iter_values(
            outputs.iter().map(|o| o.note_intercept),
        )),
        Arc::new(Float64Array::from_iter_values(
            outputs.iter().map(|o| o.note_factor),
        )),
        Arc::new(Float64Array::from_iter(
            outputs.iter().map(|o| o.intercept_interval.map(|i| i.min)),
        )),
        Arc::new(Float64Array::from_iter(
            outputs.iter().map(|o| o.intercept_interval.map(|i| i.max)),
        )),
        Arc::new(UInt32Array::from_iter_values(
            outputs.iter().map(|o| o.num_final_round_ratings),
        )),
        Arc::new(rules.finish()),
        Arc::new(BooleanArray::from(
            outputs.iter().map(|o| o.confident).collect::<Vec<Option<bool>>>(),
        )),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(t::note_model_output_schema()),
        columns,
    )?)
}

pub fn note_outputs_from_batches(
    batches: &[RecordBatch],
) -> Result<Vec<ScorerOutput>, StoreError> {
    let mut outputs = Vec::new();
    for batch in batches {
        let ids = column::<Int64Array>(batch, t::NOTE_ID)?;
        let scorers = column::<StringArray>(batch, t::SCORER_NAME)?;
        let statuses = column::<StringArray>(batch, t::RATING_STATUS)?;
        let intercepts = column::<Float64Array>(batch, t::NOTE_INTERCEPT)?;
        let factors = column::<Float64Array>(batch, t::NOTE_FACTOR_1)?;
        let mins = column::<Float64Array>(batch, t::NOTE_INTERCEPT_MIN)?;
        let maxes = column::<Float64Array>(batch, t::NOTE_INTERCEPT_MAX)?;
        let counts = column::<UInt32Array>(batch, t::NUM_FINAL_ROUND_RATINGS)?;
        let rules = column::<ListArray>(batch, t::ACTIVE_RULES)?;
        let confident = column::<BooleanArray>(batch, t::NOTE_CONFIDENT)?;

        for row in 0..batch.num_rows() {
            let intercept_interval = match (f64_at(mins, row), f64_at(maxes, row)) {
                (Some(min), Some(max)) => Some(InterceptInterval { min, max }),
                _ => None,
            };
            outputs.push(ScorerOutput {
                note_id: ids.value(row),
                tier: required_str(scorers, t::SCORER_NAME, row)?.parse()?,
                status: required_str(statuses, t::RATING_STATUS, row)?.parse()?,
                note_intercept: intercepts.value(row),
                note_factor: factors.value(row),
                intercept_interval,
                num_final_round_ratings: counts.value(row),
                active_rules: strings_at(rules, t::ACTIVE_RULES, row)?,
                confident: confident.is_valid(row).then(|| confident.value(row)),
            });
        }
    }
    Ok(outputs)
}

pub fn rater_outputs_to_batch(outputs: &[RaterModelOutput]) -> Result<RecordBatch, StoreError> {
    let columns: Vec<ArrayRef> = vec![
        utf8_column(outputs.iter().map(|o| o.rater_participant_id.as_str())),
        utf8_column(outputs.iter().map(|o| o.tier.name())),
        Arc::new(Float64Array::from_iter_values(
            outputs.iter().map(|o| o.rater_intercept),
        )),
        Arc::new(Float64Array::from_iter_values(
            outputs.iter().map(|o| o.rater_factor),
        )),
        Arc::new(Float64Array::from_iter(outputs.iter().map(|o| o.reputation))),
    ];
    Ok(RecordBatch::try_new(
        Arc::new(t::rater_model_output_schema()),
        columns,
    )?)
}

pub fn rater_outputs_from_batches(
    batches: &[RecordBatch],
) -> Result<Vec<RaterModelOutput>, StoreError> {
    let mut outputs = Vec::new();
    for batch in batches {
        let raters = column::<StringArray>(batch, t::RATER_PARTICIPANT_ID)?;
        let scorers = column::<StringArray>(batch, t::SCORER_NAME)?;
        let intercepts = column::<Float64Array>(batch, t::RATER_INTERCEPT)?;
        let factors = column::<Float64Array>(batch, t::RATER_FACTOR_1)?;
        let reputations = column::<Float64Array>(batch, t::RATER_REPUTATION)?;
        for row in 0..batch.num_rows() {
            outputs.push(RaterModelOutput {
                rater_participant_id: required_str(raters, t::RATER_PARTICIPANT_ID, row)?
                    .to_string(),
                tier: required_str(scorers, t::SCORER_NAME, row)?.parse()?,
                rater_intercept: intercepts.value(row),
                rater_factor: factors.value(row),
                reputation: f64_at(reputations, row),
            });
        }
    }
    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use notescore_core::{Classification, EnrollmentState, HelpfulnessLevel};

    use super::*;

    fn sample_note() -> Note {
        Note {
            note_id: 42,
            note_author_participant_id: "author".into(),
            created_at_millis: 1_700_000_000_000,
            classification: Classification::MisinformedOrPotentiallyMisleading,
            topic: Some("messiEvent".into()),
            helpful_tag_counts: BTreeMap::from([(HelpfulTag::Clear, 3)]),
            not_helpful_tag_counts: BTreeMap::from([(NotHelpfulTag::Outdated, 1)]),
        }
    }

    #[test]
    fn notes_survive_arrow() {
        let batch = notes_to_batch(&[sample_note()]).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(batch.num_columns(), 5 + 9 + 13);
        let notes = notes_from_batches(&[batch]).unwrap();
        assert_eq!(notes, vec![sample_note()]);
    }

    #[test]
    fn rating_tags_become_boolean_columns() {
        let rating = Rating {
            note_id: 42,
            rater_participant_id: "rater".into(),
            created_at_millis: 5,
            helpfulness_level: HelpfulnessLevel::SomewhatHelpful,
            helpful_tags: vec![HelpfulTag::Informative, HelpfulTag::GoodSources],
            not_helpful_tags: vec![],
        };
        let batch = ratings_to_batch(std::slice::from_ref(&rating)).unwrap();
        let informative = column::<BooleanArray>(&batch, "helpfulInformative").unwrap();
        assert!(informative.value(0));
        let parsed = ratings_from_batches(&[batch]).unwrap();
        assert_eq!(parsed, vec![rating]);
    }

    #[test]
    fn history_nulls_stay_null() {
        let mut record = StatusHistoryRecord::unrated(7, "author", 100);
        record.current_status = Some(NoteStatus::CurrentlyRatedHelpful);
        record.timestamp_millis_of_current_status = Some(0);
        record.current_decided_by = Some(Tier::Group(13));
        record.current_modeling_group = Some(13);

        let batch = history_to_batch(std::slice::from_ref(&record)).unwrap();
        let lock_ts = column::<Int64Array>(&batch, t::STATUS_LOCK_TIMESTAMP).unwrap();
        assert!(lock_ts.is_null(0));
        let current_ts = column::<Int64Array>(&batch, t::CURRENT_STATUS_TIMESTAMP).unwrap();
        assert!(current_ts.is_valid(0));

        let parsed = history_from_batches(&[batch]).unwrap();
        assert_eq!(parsed, vec![record]);
    }

    #[test]
    fn enrollment_round_trips_state_names() {
        let row = Enrollment {
            participant_id: "p1".into(),
            enrollment_state: EnrollmentState::AtRisk,
            modeling_population: "CORE".into(),
            modeling_group: None,
        };
        let batch = enrollment_to_batch(std::slice::from_ref(&row)).unwrap();
        let states = column::<StringArray>(&batch, t::ENROLLMENT_STATE).unwrap();
        assert_eq!(states.value(0), "atRisk");
        assert_eq!(enrollment_from_batches(&[batch]).unwrap(), vec![row]);
    }

    #[test]
    fn note_outputs_keep_rules_and_interval() {
        let output = ScorerOutput {
            note_id: 1,
            tier: Tier::Topic("messiEvent".into()),
            status: NoteStatus::CurrentlyRatedHelpful,
            note_intercept: 0.44,
            note_factor: 0.01,
            intercept_interval: Some(InterceptInterval { min: 0.3, max: 0.5 }),
            num_final_round_ratings: 9,
            active_rules: vec!["TopicModel".into(), "GeneralCRH".into()],
            confident: Some(true),
        };
        let other = ScorerOutput {
            tier: Tier::Core,
            intercept_interval: None,
            active_rules: vec![],
            confident: None,
            ..output.clone()
        };
        let batch = note_outputs_to_batch(&[output.clone(), other.clone()]).unwrap();
        let scorers = column::<StringArray>(&batch, t::SCORER_NAME).unwrap();
        assert_eq!(scorers.value(0), "topic:messiEvent");
        assert_eq!(note_outputs_from_batches(&[batch]).unwrap(), vec![output, other]);
    }

    #[test]
    fn missing_column_is_reported() {
        let batch = rater_outputs_to_batch(&[]).unwrap();
        let err = notes_from_batches(&[batch]).unwrap_err();
        assert!(matches!(err, StoreError::MissingColumn(c) if c == t::NOTE_ID));
    }

    #[test]
    fn unknown_status_is_rejected() {
        let mut record = StatusHistoryRecord::unrated(7, "author", 100);
        record.current_status = Some(NoteStatus::NeedsMoreRatings);
        let batch = history_to_batch(&[record]).unwrap();
        let mut columns = batch.columns().to_vec();
        let idx = batch.schema().index_of(t::CURRENT_STATUS).unwrap();
        columns[idx] = Arc::new(StringArray::from(vec![Some("MAYBE_HELPFUL")]));
        let bad = RecordBatch::try_new(batch.schema(), columns).unwrap();
        let err = history_from_batches(&[bad]).unwrap_err();
        assert!(err.to_string().contains("MAYBE_HELPFUL"));
    }
}
