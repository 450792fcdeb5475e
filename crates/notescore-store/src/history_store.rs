//! Persistence of the status history and the decisions of the last
//! committed run.
//!
//! A commit replaces the whole history at once. Writers stage every file
//! next to its destination and rename it into place, so a failed commit
//! leaves the previous run's files untouched. Decisions go to a uniquely
//! named JSON file that the history names in its schema metadata; a
//! decisions file no committed history names is never read.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use arrow::record_batch::RecordBatch;
use notescore_core::{NoteDecision, NoteId, StatusHistoryRecord};
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::{StoreError, tables};

pub const HISTORY_FILE: &str = "note_status_history.parquet";
pub const DECISIONS_PREFIX: &str = "scored_notes-";
pub const DECISIONS_SUFFIX: &str = ".json";
/// History schema metadata key naming the decisions file of the same run.
pub const DECISIONS_METADATA_KEY: &str = "notescore.decisions_file";

/// Everything a run needs from the previous committed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunState {
    pub history: BTreeMap<NoteId, StatusHistoryRecord>,
    pub decisions: BTreeMap<NoteId, NoteDecision>,
}

impl RunState {
    pub fn from_parts(history: Vec<StatusHistoryRecord>, decisions: Vec<NoteDecision>) -> Self {
        Self {
            history: history.into_iter().map(|r| (r.note_id, r)).collect(),
            decisions: decisions.into_iter().map(|d| (d.note_id, d)).collect(),
        }
    }
}

/// Durable home of the status history. `commit` is all-or-nothing.
pub trait HistoryStore: Send + Sync {
    fn load(&self) -> Result<RunState, StoreError>;
    fn commit(&self, state: &RunState) -> Result<(), StoreError>;
}

// ── Parquet files ──

fn staging_file(path: &Path) -> Result<NamedTempFile, StoreError> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
    Ok(NamedTempFile::new_in(dir)?)
}

/// Write a batch to `path`, replacing any existing file atomically.
pub fn write_parquet(path: &Path, batch: &RecordBatch) -> Result<(), StoreError> {
    let mut tmp = staging_file(path)?;
    {
        let mut writer = ArrowWriter::try_new(tmp.as_file_mut(), batch.schema(), None)?;
        writer.write(batch)?;
        writer.close()?;
    }
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

pub fn read_parquet(path: &Path) -> Result<Vec<RecordBatch>, StoreError> {
    let file = File::open(path)?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    Ok(reader.collect::<Result<Vec<_>, _>>()?)
}

/// Read a status history Parquet file.
pub fn read_history_file(path: &Path) -> Result<Vec<StatusHistoryRecord>, StoreError> {
    if !path.exists() {
        return Err(StoreError::HistoryNotFound(path.to_path_buf()));
    }
    tables::history_from_batches(&read_parquet(path)?)
}

pub fn write_history_file(path: &Path, records: &[StatusHistoryRecord]) -> Result<(), StoreError> {
    write_parquet(path, &tables::history_to_batch(records)?)
}

/// History and last decisions kept as files in one directory.
///
/// Renaming the history Parquet file into place is the commit point. The
/// decisions file it names is written before that rename, and older
/// decisions files are removed after it.
#[derive(Debug, Clone)]
pub struct ParquetHistoryStore {
    dir: PathBuf,
}

impl ParquetHistoryStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn history_path(&self) -> PathBuf {
        self.dir.join(HISTORY_FILE)
    }

    fn is_decisions_file(name: &str) -> bool {
        name.starts_with(DECISIONS_PREFIX) && name.ends_with(DECISIONS_SUFFIX)
    }

    /// Remove decisions files other than `keep`.
    fn remove_stale_decisions(&self, keep: &str) {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "cannot list store directory");
                return;
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == keep || !Self::is_decisions_file(&name) {
                continue;
            }
            match fs::remove_file(entry.path()) {
                Ok(()) => debug!(file = %name, "removed stale decisions"),
                Err(e) => warn!(file = %name, error = %e, "failed to remove stale decisions"),
            }
        }
    }
}

fn with_decisions_file(batch: RecordBatch, name: &str) -> Result<RecordBatch, StoreError> {
    let mut metadata = batch.schema().metadata().clone();
    metadata.insert(DECISIONS_METADATA_KEY.to_string(), name.to_string());
    let schema = Arc::new(batch.schema().as_ref().clone().with_metadata(metadata));
    Ok(batch.with_schema(schema)?)
}

impl HistoryStore for ParquetHistoryStore {
    fn load(&self) -> Result<RunState, StoreError> {
        let history_path = self.history_path();
        if !history_path.exists() {
            info!(path = %history_path.display(), "no committed history, starting empty");
            return Ok(RunState::default());
        }
        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&history_path)?)?;
        let decisions_file = builder.schema().metadata().get(DECISIONS_METADATA_KEY).cloned();
        let batches = builder.build()?.collect::<Result<Vec<_>, _>>()?;
        let history = tables::history_from_batches(&batches)?;
        let decisions: Vec<NoteDecision> = match decisions_file {
            Some(name) => serde_json::from_slice(&fs::read(self.dir.join(name))?)?,
            None => Vec::new(),
        };
        info!(
            notes = history.len(),
            decisions = decisions.len(),
            "loaded committed history"
        );
        Ok(RunState::from_parts(history, decisions))
    }

    fn commit(&self, state: &RunState) -> Result<(), StoreError> {
        let records: Vec<StatusHistoryRecord> = state.history.values().cloned().collect();
        let batch = tables::history_to_batch(&records)?;
        let decisions: Vec<&NoteDecision> = state.decisions.values().collect();

        let mut tmp = tempfile::Builder::new()
            .prefix(DECISIONS_PREFIX)
            .suffix(DECISIONS_SUFFIX)
            .tempfile_in(&self.dir)?;
        serde_json::to_writer(tmp.as_file_mut(), &decisions)?;
        tmp.as_file_mut().flush()?;
        let (_, decisions_path) = tmp.keep().map_err(|e| StoreError::Io(e.error))?;
        let decisions_name = decisions_path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();

        let written = with_decisions_file(batch, &decisions_name)
            .and_then(|batch| write_parquet(&self.history_path(), &batch));
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&decisions_path) {
                warn!(file = %decisions_name, error = %cleanup, "failed to discard uncommitted decisions");
            }
            return Err(e);
        }
        self.remove_stale_decisions(&decisions_name);
        info!(notes = records.len(), decisions = decisions.len(), "committed status history");
        Ok(())
    }
}

/// Store kept in memory. Counts commits so callers can assert on them.
#[derive(Debug, Default)]
pub struct InMemoryHistoryStore {
    state: Mutex<RunState>,
    commits: Mutex<usize>,
}

impl InMemoryHistoryStore {
    pub fn new(state: RunState) -> Self {
        Self {
            state: Mutex::new(state),
            commits: Mutex::new(0),
        }
    }

    pub fn commits(&self) -> usize {
        *self.commits.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> RunState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl HistoryStore for InMemoryHistoryStore {
    fn load(&self) -> Result<RunState, StoreError> {
        Ok(self.snapshot())
    }

    fn commit(&self, state: &RunState) -> Result<(), StoreError> {
        // State is only ever replaced whole.
        let mut current = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let mut commits = self.commits.lock().unwrap_or_else(PoisonError::into_inner);
        *current = state.clone();
        *commits += 1;
        Ok(())
    }
}
