//! Vertical card display for status history records.
//!
//! Renders one row of a history RecordBatch as a grouped, human-readable
//! card. Millisecond timestamps are shown with their UTC date alongside.

use arrow::array::{Array, Int64Array};
use arrow::record_batch::RecordBatch;
use arrow::util::display::{ArrayFormatter, FormatOptions};
use chrono::{DateTime, SecondsFormat};
use notescore_core::tables::*;

// ── Schema section groupings ──

const IDENTITY: &[&str] = &[NOTE_ID, NOTE_AUTHOR_PARTICIPANT_ID, CREATED_AT_MILLIS];

const CURRENT: &[&str] = &[
    CURRENT_STATUS,
    CURRENT_STATUS_TIMESTAMP,
    CURRENT_DECIDED_BY,
    CURRENT_MODELING_GROUP,
    MOST_RECENT_STATUS_CHANGE_TIMESTAMP,
];

const TIERS: &[&str] = &[
    CURRENT_CORE_STATUS,
    CURRENT_EXPANSION_STATUS,
    CURRENT_GROUP_STATUS,
];

const LABELS: &[&str] = &[
    FIRST_NON_NMR_STATUS,
    FIRST_NON_NMR_TIMESTAMP,
    MOST_RECENT_NON_NMR_STATUS,
    LATEST_NON_NMR_TIMESTAMP,
];

const LOCK: &[&str] = &[LOCKED_STATUS, STATUS_LOCK_TIMESTAMP, RETRO_LOCK_TIMESTAMP];

// ── Public API ──

/// Locate a note's row across history batches.
pub fn find_note_row(batches: &[RecordBatch], note_id: i64) -> Option<(&RecordBatch, usize)> {
    batches.iter().find_map(|batch| {
        let ids = batch
            .column_by_name(NOTE_ID)?
            .as_any()
            .downcast_ref::<Int64Array>()?;
        (0..ids.len())
            .find(|&i| ids.is_valid(i) && ids.value(i) == note_id)
            .map(|row| (batch, row))
    })
}

/// Print one history record as a vertical card grouped by schema section.
pub fn print_history_card(batch: &RecordBatch, row: usize) -> anyhow::Result<()> {
    let note_id = format_cell(batch, row, NOTE_ID)?.unwrap_or_default();
    println!("=== note {note_id} ===");
    println!();

    print_section(batch, row, "Identity", IDENTITY)?;
    print_section(batch, row, "Current", CURRENT)?;
    print_section(batch, row, "Tier Labels", TIERS)?;
    print_section(batch, row, "Label Lineage", LABELS)?;
    print_section(batch, row, "Lock", LOCK)?;
    Ok(())
}

/// Render epoch milliseconds as an RFC 3339 UTC timestamp.
pub fn format_millis(millis: i64) -> String {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| format!("{millis} (out of range)"))
}

// ── Section rendering ──

fn print_section(
    batch: &RecordBatch,
    row: usize,
    header: &str,
    cols: &[&str],
) -> anyhow::Result<()> {
    let mut lines = Vec::new();
    for &col in cols {
        if let Some(value) = format_cell(batch, row, col)? {
            lines.push(format!("  {col:<40} {value}"));
        }
    }
    // Sections with nothing to show are skipped entirely.
    if lines.is_empty() {
        return Ok(());
    }
    println!("{header}");
    for line in lines {
        println!("{line}");
    }
    println!();
    Ok(())
}

fn is_millis_column(col: &str) -> bool {
    col.starts_with("timestampMillis") || col == CREATED_AT_MILLIS
}

/// `None` for missing columns and null cells.
fn format_cell(batch: &RecordBatch, row: usize, col: &str) -> anyhow::Result<Option<String>> {
    let Some(array) = batch.column_by_name(col) else {
        return Ok(None);
    };
    if array.is_null(row) {
        return Ok(None);
    }
    if is_millis_column(col) {
        if let Some(millis) = array.as_any().downcast_ref::<Int64Array>() {
            let value = millis.value(row);
            return Ok(Some(format!("{value} ({})", format_millis(value))));
        }
    }
    let formatter = ArrayFormatter::try_new(array.as_ref(), &FormatOptions::default())?;
    Ok(Some(formatter.value(row).to_string()))
}

#[cfg(test)]
mod tests {
    use notescore_core::{NoteStatus, StatusHistoryRecord};
    use notescore_store::tables::history_to_batch;

    use super::*;

    fn batch() -> RecordBatch {
        let mut locked = StatusHistoryRecord::unrated(8, "author-8", 0);
        locked.current_status = Some(NoteStatus::CurrentlyRatedHelpful);
        locked.timestamp_millis_of_current_status = Some(1_000);
        locked.locked_status = Some(NoteStatus::CurrentlyRatedHelpful);
        locked.timestamp_millis_of_status_lock = Some(1_000);
        history_to_batch(&[StatusHistoryRecord::unrated(7, "author-7", 0), locked]).unwrap()
    }

    #[test]
    fn finds_row_by_note_id() {
        let batches = vec![batch()];
        let (_, row) = find_note_row(&batches, 8).unwrap();
        assert_eq!(row, 1);
        assert!(find_note_row(&batches, 99).is_none());
    }

    #[test]
    fn timestamps_render_with_date() {
        let batch = batch();
        let cell = format_cell(&batch, 1, STATUS_LOCK_TIMESTAMP).unwrap().unwrap();
        assert_eq!(cell, "1000 (1970-01-01T00:00:01.000Z)");
    }

    #[test]
    fn null_cells_are_skipped() {
        let batch = batch();
        assert_eq!(format_cell(&batch, 0, LOCKED_STATUS).unwrap(), None);
        assert_eq!(
            format_cell(&batch, 1, LOCKED_STATUS).unwrap().as_deref(),
            Some("CURRENTLY_RATED_HELPFUL")
        );
        assert_eq!(format_cell(&batch, 0, "noSuchColumn").unwrap(), None);
    }

    #[test]
    fn millis_formatting() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00.000Z");
    }
}
