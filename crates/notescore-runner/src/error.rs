use std::time::Duration;

use notescore_core::{CoreError, Tier};
use notescore_scoring::ScoringError;
use notescore_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    #[error("scorer {tier} failed: {message}")]
    ScorerFailed { tier: Tier, message: String },

    #[error("scorer {tier} timed out after {:.1}s", .timeout.as_secs_f64())]
    ScorerTimedOut { tier: Tier, timeout: Duration },
}
