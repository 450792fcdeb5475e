//! Scoring run orchestration.
//!
//! Scorer evaluations run as isolated tasks with a wall-clock budget; the
//! [`Pipeline`] sequences prescoring and final scoring, gates on churn, and
//! commits the status history all at once.

mod error;
pub mod lock_policy;
pub mod pipeline;
pub mod scorer;
mod timing;

pub use error::RunnerError;
pub use lock_policy::{AgeLockPolicy, LockPolicy, NeverLock};
pub use pipeline::{FinalRunOutput, Pipeline, PrescoringRun};
pub use scorer::{Evaluation, Scorer, ScorerRun, evaluate_all};
pub use timing::PhaseTimer;
