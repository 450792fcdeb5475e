//! Cross-phase argument channel.
//!
//! Large tables move between scoring phases as Arrow IPC files in a payload
//! directory. The sender publishes each table and hands over a small,
//! serializable descriptor set; the receiver acquires every payload, decodes
//! it back into typed rows, and releases the backing files when the
//! acquisition is dropped, on success and failure paths alike.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use notescore_core::{PrescoringMetaOutput, SharedPayloadDescriptor};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::args::{PrescoringOutputs, ScoringArgs, ScoringInputs};
use crate::{StoreError, tables};

const NOTES: &str = "notes";
const RATINGS: &str = "ratings";
const STATUS_HISTORY: &str = "noteStatusHistory";
const ENROLLMENT: &str = "userEnrollment";
const PRESCORING_NOTE_OUTPUT: &str = "prescoringNoteModelOutput";
const PRESCORING_RATER_OUTPUT: &str = "prescoringRaterModelOutput";

/// Descriptors for the four input tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrescoringArgsShared {
    pub notes: SharedPayloadDescriptor,
    pub ratings: SharedPayloadDescriptor,
    pub status_history: SharedPayloadDescriptor,
    pub enrollment: SharedPayloadDescriptor,
}

/// Descriptors for the final phase. The calibration values are small and
/// travel inline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalScoringArgsShared {
    #[serde(flatten)]
    pub inputs: PrescoringArgsShared,
    pub prescoring_note_output: SharedPayloadDescriptor,
    pub prescoring_rater_output: SharedPayloadDescriptor,
    pub prescoring_meta_output: PrescoringMetaOutput,
}

impl FinalScoringArgsShared {
    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Payloads published into one directory.
#[derive(Debug, Clone)]
pub struct PayloadChannel {
    dir: PathBuf,
}

impl PayloadChannel {
    /// Open a channel over `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write one table and return its descriptor. Each publish gets a fresh,
    /// unique payload name.
    pub fn publish(&self, name: &str, batch: &RecordBatch) -> Result<SharedPayloadDescriptor, StoreError> {
        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{name}-"))
            .suffix(".arrow")
            .tempfile_in(&self.dir)?;
        {
            let mut writer = FileWriter::try_new(&mut tmp, &batch.schema())?;
            writer.write(batch)?;
            writer.finish()?;
        }
        let (_, path) = tmp.keep().map_err(|e| StoreError::Io(e.error))?;
        let data_size = fs::metadata(&path)?.len();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StoreError::UnknownPayload(path.display().to_string()))?
            .to_string();
        debug!(payload = %name, rows = batch.num_rows(), data_size, "published payload");
        Ok(SharedPayloadDescriptor { name, data_size })
    }

    /// Resolve a descriptor into its batches. The payload is released when
    /// the lease is dropped.
    pub fn acquire(&self, descriptor: &SharedPayloadDescriptor) -> Result<PayloadLease, StoreError> {
        let plain_name = Path::new(&descriptor.name).file_name().map(|n| n == descriptor.name.as_str());
        if plain_name != Some(true) {
            return Err(StoreError::UnknownPayload(descriptor.name.clone()));
        }
        let path = self.dir.join(&descriptor.name);
        let actual = match fs::metadata(&path) {
            Ok(meta) => meta.len(),
            Err(_) => return Err(StoreError::UnknownPayload(descriptor.name.clone())),
        };
        if actual != descriptor.data_size {
            return Err(StoreError::PayloadSize {
                name: descriptor.name.clone(),
                expected: descriptor.data_size,
                actual,
            });
        }
        let reader = FileReader::try_new(File::open(&path)?, None)?;
        let batches = reader.collect::<Result<Vec<_>, _>>()?;
        Ok(PayloadLease {
            descriptor: descriptor.clone(),
            path,
            batches,
        })
    }

    /// Publish the four input tables.
    pub fn publish_inputs(&self, inputs: &ScoringInputs) -> Result<PrescoringArgsShared, StoreError> {
        Ok(PrescoringArgsShared {
            notes: self.publish(NOTES, &tables::notes_to_batch(&inputs.notes)?)?,
            ratings: self.publish(RATINGS, &tables::ratings_to_batch(&inputs.ratings)?)?,
            status_history: self.publish(
                STATUS_HISTORY,
                &tables::history_to_batch(&inputs.status_history)?,
            )?,
            enrollment: self.publish(ENROLLMENT, &tables::enrollment_to_batch(&inputs.enrollment)?)?,
        })
    }

    /// Publish everything the final phase reads.
    pub fn publish_final(
        &self,
        inputs: &ScoringInputs,
        prescoring: &PrescoringOutputs,
    ) -> Result<FinalScoringArgsShared, StoreError> {
        Ok(FinalScoringArgsShared {
            inputs: self.publish_inputs(inputs)?,
            prescoring_note_output: self.publish(
                PRESCORING_NOTE_OUTPUT,
                &tables::note_outputs_to_batch(&prescoring.note_outputs)?,
            )?,
            prescoring_rater_output: self.publish(
                PRESCORING_RATER_OUTPUT,
                &tables::rater_outputs_to_batch(&prescoring.rater_outputs)?,
            )?,
            prescoring_meta_output: prescoring.meta.clone(),
        })
    }

    /// Acquire the prescoring inputs.
    pub fn acquire_prescoring(&self, shared: &PrescoringArgsShared) -> Result<AcquiredArgs, StoreError> {
        let mut leases = Vec::with_capacity(4);
        let inputs = self.acquire_inputs(shared, &mut leases)?;
        Ok(AcquiredArgs {
            args: ScoringArgs::from_inputs(inputs),
            leases,
        })
    }

    /// Acquire everything the final phase reads.
    pub fn acquire_final(&self, shared: &FinalScoringArgsShared) -> Result<AcquiredArgs, StoreError> {
        let mut leases = Vec::with_capacity(6);
        let inputs = self.acquire_inputs(&shared.inputs, &mut leases)?;
        let note_lease = self.acquire(&shared.prescoring_note_output)?;
        let note_outputs = tables::note_outputs_from_batches(note_lease.batches());
        leases.push(note_lease);
        let rater_lease = self.acquire(&shared.prescoring_rater_output)?;
        let rater_outputs = tables::rater_outputs_from_batches(rater_lease.batches());
        leases.push(rater_lease);

        let prescoring = PrescoringOutputs {
            note_outputs: note_outputs?,
            rater_outputs: rater_outputs?,
            meta: shared.prescoring_meta_output.clone(),
        };
        Ok(AcquiredArgs {
            args: ScoringArgs::from_inputs(inputs).with_prescoring(prescoring),
            leases,
        })
    }

    fn acquire_inputs(
        &self,
        shared: &PrescoringArgsShared,
        leases: &mut Vec<PayloadLease>,
    ) -> Result<ScoringInputs, StoreError> {
        let notes = self.acquire(&shared.notes)?;
        let ratings = self.acquire(&shared.ratings)?;
        let history = self.acquire(&shared.status_history)?;
        let enrollment = self.acquire(&shared.enrollment)?;
        let decoded_notes = tables::notes_from_batches(notes.batches());
        let decoded_ratings = tables::ratings_from_batches(ratings.batches());
        let decoded_history = tables::history_from_batches(history.batches());
        let decoded_enrollment = tables::enrollment_from_batches(enrollment.batches());
        leases.extend([notes, ratings, history, enrollment]);
        Ok(ScoringInputs {
            notes: decoded_notes?,
            ratings: decoded_ratings?,
            status_history: decoded_history?,
            enrollment: decoded_enrollment?,
        })
    }
}

/// Scoped hold on one published payload.
#[derive(Debug)]
pub struct PayloadLease {
    descriptor: SharedPayloadDescriptor,
    path: PathBuf,
    batches: Vec<RecordBatch>,
}

impl PayloadLease {
    pub fn descriptor(&self) -> &SharedPayloadDescriptor {
        &self.descriptor
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }
}

impl Drop for PayloadLease {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(payload = %self.descriptor.name, "released payload"),
            Err(e) => warn!(payload = %self.descriptor.name, error = %e, "failed to release payload"),
        }
    }
}

/// Decoded arguments plus the leases backing them.
#[derive(Debug)]
pub struct AcquiredArgs {
    pub args: ScoringArgs,
    leases: Vec<PayloadLease>,
}

impl AcquiredArgs {
    pub fn descriptors(&self) -> impl Iterator<Item = &SharedPayloadDescriptor> {
        self.leases.iter().map(PayloadLease::descriptor)
    }
}
