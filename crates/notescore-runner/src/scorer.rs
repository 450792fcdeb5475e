//! Scorer evaluations.
//!
//! Model fitting lives outside this crate; a [`Scorer`] wraps one fitted
//! model tier. Every evaluation runs on the blocking pool with its own view
//! of the input tables and a wall-clock budget. A failed or timed-out
//! evaluation is reported as a missing output for its tier and never fails
//! the phase.

use std::sync::Arc;
use std::time::{Duration, Instant};

use notescore_core::{
    PrescoringMetaScorerOutput, RaterModelOutput, ScorerOutput, ScoringPhase, Tier,
};
use notescore_store::{ScoringArgs, TableNeeds};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::RunnerError;

/// What one evaluation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScorerRun {
    pub note_outputs: Vec<ScorerOutput>,
    pub rater_outputs: Vec<RaterModelOutput>,
    /// Calibration values; only meaningful in the prescoring phase.
    pub meta: Option<PrescoringMetaScorerOutput>,
}

/// One model tier.
pub trait Scorer: Send + Sync {
    fn tier(&self) -> Tier;

    /// Tables this scorer reads. Everything else is stripped from its view.
    fn needs(&self) -> TableNeeds {
        TableNeeds::ALL
    }

    fn score(&self, phase: ScoringPhase, args: &ScoringArgs) -> anyhow::Result<ScorerRun>;
}

/// Result of one isolated evaluation.
#[derive(Debug)]
pub struct Evaluation {
    pub tier: Tier,
    pub elapsed: Duration,
    pub outcome: Result<ScorerRun, RunnerError>,
}

impl Evaluation {
    pub fn run(&self) -> Option<&ScorerRun> {
        self.outcome.as_ref().ok()
    }
}

async fn evaluate_one(
    scorer: Arc<dyn Scorer>,
    phase: ScoringPhase,
    view: ScoringArgs,
    timeout: Duration,
) -> Evaluation {
    let tier = scorer.tier();
    let start = Instant::now();
    // A timed-out evaluation keeps its blocking thread until it returns; its
    // result is discarded.
    let task = tokio::task::spawn_blocking(move || scorer.score(phase, &view));
    let outcome = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(Ok(run))) => Ok(run),
        Ok(Ok(Err(e))) => Err(RunnerError::ScorerFailed {
            tier: tier.clone(),
            message: format!("{e:#}"),
        }),
        Ok(Err(join)) => Err(RunnerError::ScorerFailed {
            tier: tier.clone(),
            message: join.to_string(),
        }),
        Err(_) => Err(RunnerError::ScorerTimedOut {
            tier: tier.clone(),
            timeout,
        }),
    };
    Evaluation {
        tier,
        elapsed: start.elapsed(),
        outcome,
    }
}

/// Run every scorer concurrently. Evaluations come back in scorer order.
pub async fn evaluate_all(
    scorers: &[Arc<dyn Scorer>],
    args: &ScoringArgs,
    phase: ScoringPhase,
    timeout: Duration,
) -> Vec<Evaluation> {
    let mut set = JoinSet::new();
    for (idx, scorer) in scorers.iter().enumerate() {
        let view = args.retain_only(scorer.needs());
        let scorer = Arc::clone(scorer);
        set.spawn(async move { (idx, evaluate_one(scorer, phase, view, timeout).await) });
    }

    let mut evaluations = Vec::with_capacity(scorers.len());
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(evaluation) => evaluations.push(evaluation),
            Err(e) => warn!(error = %e, "scorer task aborted"),
        }
    }
    evaluations.sort_by_key(|(idx, _)| *idx);

    let evaluations: Vec<Evaluation> = evaluations.into_iter().map(|(_, e)| e).collect();
    for evaluation in &evaluations {
        match &evaluation.outcome {
            Ok(run) => debug!(
                tier = %evaluation.tier,
                notes = run.note_outputs.len(),
                raters = run.rater_outputs.len(),
                elapsed_ms = evaluation.elapsed.as_millis() as u64,
                "scorer finished"
            ),
            Err(e) => warn!(tier = %evaluation.tier, error = %e, "scorer output missing"),
        }
    }
    evaluations
}
