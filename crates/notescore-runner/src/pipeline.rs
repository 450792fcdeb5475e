//! Two-phase scoring run.
//!
//! ```text
//!   inputs ──publish──▶ prescoring evaluations ──▶ rule-1 churn gate
//!                                   │
//!                       publish_final (descriptors + meta, JSON)
//!                                   ▼
//!   final evaluations ──▶ resolve ──▶ locks ──▶ stage history
//!        ──▶ rules 2..5 churn gate ──▶ decisions + diffs ──▶ commit
//! ```
//!
//! Nothing is committed unless every churn gate passes, and a commit writes
//! the whole history at once.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use notescore_core::{
    Enrollment, LockDirective, Note, NoteDecision, NoteId, NoteStatusChange,
    PrescoringMetaOutput, RaterModelOutput, RaterScoreRow, Rating, RescoringRuleId, ScorerOutput,
    ScoringConfig, ScoringPhase, StatusHistoryRecord, Tier, TierScore, TimestampMillis,
};
use notescore_scoring::{
    ChurnReport, HistoryTransition, NoteCandidates, NoteObservation, RescoringFacts,
    RuleAssignment, StagedHistory, StatusFlip, TierGate, assign_modeling_group, count_new_ratings,
    note_status_changes, partition_notes, resolve_note, select_explanation_tags, stage_run,
};
use notescore_store::{
    FinalScoringArgsShared, HistoryStore, PayloadChannel, PrescoringOutputs, RunState,
    ScoringInputs,
};
use tracing::{debug, info};

use crate::lock_policy::{LockPolicy, NeverLock};
use crate::scorer::{Evaluation, Scorer, evaluate_all};
use crate::timing::PhaseTimer;
use crate::RunnerError;

/// What the prescoring phase hands to the final phase.
#[derive(Debug, Clone)]
pub struct PrescoringRun {
    pub handoff: FinalScoringArgsShared,
    pub churn: ChurnReport,
    pub missing_tiers: Vec<Tier>,
}

/// Everything a committed run produced.
#[derive(Debug, Clone)]
pub struct FinalRunOutput {
    pub decisions: Vec<NoteDecision>,
    pub rater_rows: Vec<RaterScoreRow>,
    pub changes: Vec<NoteStatusChange>,
    pub churn: ChurnReport,
    /// The full committed history, including notes not scored this run.
    pub history: Vec<StatusHistoryRecord>,
    pub missing_tiers: Vec<Tier>,
}

#[derive(Debug, Default)]
struct PhaseOutputs {
    note_outputs: Vec<ScorerOutput>,
    rater_outputs: Vec<RaterModelOutput>,
    meta: PrescoringMetaOutput,
    missing_tiers: Vec<Tier>,
}

impl PhaseOutputs {
    fn collect(evaluations: Vec<Evaluation>) -> Self {
        let mut outputs = Self::default();
        for evaluation in evaluations {
            match evaluation.outcome {
                Ok(run) => {
                    outputs.note_outputs.extend(run.note_outputs);
                    outputs.rater_outputs.extend(run.rater_outputs);
                    if let Some(meta) = run.meta {
                        outputs.meta.meta_scorer_output.insert(evaluation.tier, meta);
                    }
                }
                Err(_) => outputs.missing_tiers.push(evaluation.tier),
            }
        }
        outputs
    }
}

type OutputsByNote<'a> = BTreeMap<NoteId, Vec<&'a ScorerOutput>>;

fn outputs_by_note(outputs: &[ScorerOutput]) -> OutputsByNote<'_> {
    let mut by_note: OutputsByNote<'_> = BTreeMap::new();
    for output in outputs {
        by_note.entry(output.note_id).or_default().push(output);
    }
    by_note
}

/// Resolve every note in `notes`, in order.
fn observe_notes(
    notes: &[Note],
    by_note: &OutputsByNote<'_>,
    history: &BTreeMap<NoteId, StatusHistoryRecord>,
    config: &ScoringConfig,
) -> Vec<NoteObservation> {
    let known: BTreeSet<NoteId> = notes.iter().map(|note| note.note_id).collect();
    let orphaned = by_note.keys().filter(|id| !known.contains(id)).count();
    if orphaned > 0 {
        debug!(count = orphaned, "ignoring scorer output for notes outside the note table");
    }

    notes
        .iter()
        .map(|note| {
            let outputs = by_note.get(&note.note_id).cloned().unwrap_or_default();
            let modeling_group = assign_modeling_group(&outputs);
            let candidates = NoteCandidates {
                note_id: note.note_id,
                modeling_group,
                topic: note.topic.as_deref(),
                outputs,
            };
            let gate = TierGate::for_history(history.get(&note.note_id));
            let resolution = resolve_note(&candidates, &gate, config);
            let status_of = |tier: &Tier| candidates.output_for(tier).map(|o| o.status);
            NoteObservation {
                note_id: note.note_id,
                note_author_participant_id: note.note_author_participant_id.clone(),
                created_at_millis: note.created_at_millis,
                core_status: status_of(&Tier::Core),
                expansion_status: status_of(&Tier::Expansion),
                group_status: modeling_group.and_then(|group| status_of(&Tier::Group(group))),
                modeling_group,
                resolution,
            }
        })
        .collect()
}

fn history_map(records: &[StatusHistoryRecord]) -> BTreeMap<NoteId, StatusHistoryRecord> {
    records.iter().map(|r| (r.note_id, r.clone())).collect()
}

/// Merge per-tier rater parameters. Later outputs win for the same tier.
fn rater_rows(
    outputs: &[&[RaterModelOutput]],
    enrollment: &[Enrollment],
) -> Vec<RaterScoreRow> {
    let enrollment: BTreeMap<&str, &Enrollment> = enrollment
        .iter()
        .map(|e| (e.participant_id.as_str(), e))
        .collect();
    let mut rows: BTreeMap<String, RaterScoreRow> = BTreeMap::new();
    for output in outputs.iter().flat_map(|o| o.iter()) {
        let row = rows
            .entry(output.rater_participant_id.clone())
            .or_insert_with(|| {
                let enrolled = enrollment.get(output.rater_participant_id.as_str());
                RaterScoreRow {
                    rater_participant_id: output.rater_participant_id.clone(),
                    enrollment_state: enrolled.map(|e| e.enrollment_state),
                    modeling_group: enrolled.and_then(|e| e.modeling_group),
                    tier_params: BTreeMap::new(),
                    reputation: None,
                }
            });
        row.tier_params
            .insert(output.tier.clone(), (output.rater_intercept, output.rater_factor));
        if output.reputation.is_some() {
            row.reputation = output.reputation;
        }
    }
    rows.into_values().collect()
}

fn merge_missing(into: &mut Vec<Tier>, more: Vec<Tier>) {
    for tier in more {
        if !into.contains(&tier) {
            into.push(tier);
        }
    }
}

/// Orchestrates scorer evaluations, status decisions and the history commit.
pub struct Pipeline {
    config: Arc<ScoringConfig>,
    scorers: Vec<Arc<dyn Scorer>>,
    channel: PayloadChannel,
    store: Arc<dyn HistoryStore>,
    lock_policy: Arc<dyn LockPolicy>,
    rule_note_sets: BTreeMap<RescoringRuleId, BTreeSet<NoteId>>,
    scorer_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        config: ScoringConfig,
        channel: PayloadChannel,
        store: Arc<dyn HistoryStore>,
    ) -> Result<Self, RunnerError> {
        config.validate()?;
        let scorer_timeout = Duration::from_secs(config.scorer_timeout_secs);
        Ok(Self {
            config: Arc::new(config),
            scorers: Vec::new(),
            channel,
            store,
            lock_policy: Arc::new(NeverLock),
            rule_note_sets: BTreeMap::new(),
            scorer_timeout,
        })
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn Scorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    pub fn with_lock_policy(mut self, policy: Arc<dyn LockPolicy>) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn with_scorer_timeout(mut self, timeout: Duration) -> Self {
        self.scorer_timeout = timeout;
        self
    }

    /// Restrict a rescoring rule to an explicit set of notes.
    pub fn with_rule_note_set(mut self, rule: RescoringRuleId, notes: BTreeSet<NoteId>) -> Self {
        self.rule_note_sets.insert(rule, notes);
        self
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Both phases back to back, with the committed history as input.
    ///
    /// The returned churn report covers every rescoring rule: rule 1 from
    /// prescoring followed by the final-phase rules.
    pub async fn run(
        &self,
        notes: Vec<Note>,
        ratings: Vec<Rating>,
        enrollment: Vec<Enrollment>,
        now: TimestampMillis,
    ) -> Result<FinalRunOutput, RunnerError> {
        let prior = self.store.load()?;
        let inputs = ScoringInputs {
            notes,
            ratings,
            status_history: prior.history.into_values().collect(),
            enrollment,
        };
        let prescoring = self.run_prescoring(&inputs, now).await?;

        // Only the serialized descriptors cross into the final phase.
        let json = prescoring.handoff.to_json()?;
        let handoff = FinalScoringArgsShared::from_json(&json)?;
        let mut output = self.run_final(&handoff, now).await?;

        let mut subsets = prescoring.churn.subsets;
        subsets.append(&mut output.churn.subsets);
        output.churn.subsets = subsets;
        let mut missing = prescoring.missing_tiers;
        merge_missing(&mut missing, std::mem::take(&mut output.missing_tiers));
        output.missing_tiers = missing;
        Ok(output)
    }

    /// Run every scorer once over the full inputs and publish the final
    /// phase's arguments.
    pub async fn run_prescoring(
        &self,
        inputs: &ScoringInputs,
        now: TimestampMillis,
    ) -> Result<PrescoringRun, RunnerError> {
        let _timer = PhaseTimer::start("prescoring");
        let shared = self.channel.publish_inputs(inputs)?;
        let acquired = self.channel.acquire_prescoring(&shared)?;
        let args = &acquired.args;

        let evaluations = evaluate_all(
            &self.scorers,
            args,
            ScoringPhase::Prescoring,
            self.scorer_timeout,
        )
        .await;
        let outputs = PhaseOutputs::collect(evaluations);

        let history = history_map(args.status_history());
        let by_note = outputs_by_note(&outputs.note_outputs);
        let observations = observe_notes(args.notes(), &by_note, &history, &self.config);
        let staged = stage_run(&history, &observations, &BTreeMap::new(), now)?;
        let new_ratings = count_new_ratings(args.ratings(), &history);
        let (_, churn) = self.measure_churn(ScoringPhase::Prescoring, &staged, &new_ratings, now);
        churn.enforce()?;
        drop(acquired);

        let missing_tiers = outputs.missing_tiers;
        let prescoring = PrescoringOutputs {
            note_outputs: outputs.note_outputs,
            rater_outputs: outputs.rater_outputs,
            meta: outputs.meta,
        };
        let handoff = self.channel.publish_final(inputs, &prescoring)?;
        info!(
            notes = inputs.notes.len(),
            outputs = prescoring.note_outputs.len(),
            meta_tiers = prescoring.meta.meta_scorer_output.len(),
            missing = missing_tiers.len(),
            "prescoring complete"
        );
        Ok(PrescoringRun {
            handoff,
            churn,
            missing_tiers,
        })
    }

    /// Score, decide and commit. On error nothing is committed.
    pub async fn run_final(
        &self,
        handoff: &FinalScoringArgsShared,
        now: TimestampMillis,
    ) -> Result<FinalRunOutput, RunnerError> {
        let _timer = PhaseTimer::start("final");
        let acquired = self.channel.acquire_final(handoff)?;
        let args = &acquired.args;
        let prior = self.store.load()?;

        let evaluations =
            evaluate_all(&self.scorers, args, ScoringPhase::Final, self.scorer_timeout).await;
        let outputs = PhaseOutputs::collect(evaluations);
        let by_note = outputs_by_note(&outputs.note_outputs);
        let observations = observe_notes(args.notes(), &by_note, &prior.history, &self.config);

        let directives: BTreeMap<NoteId, LockDirective> = args
            .notes()
            .iter()
            .zip(&observations)
            .filter_map(|(note, observation)| {
                self.lock_policy
                    .directive(
                        note,
                        prior.history.get(&note.note_id),
                        observation.resolution.status,
                        now,
                    )
                    .map(|directive| (note.note_id, directive))
            })
            .collect();
        if !directives.is_empty() {
            info!(count = directives.len(), "lock directives");
        }

        let staged = stage_run(&prior.history, &observations, &directives, now)?;
        let new_ratings = count_new_ratings(args.ratings(), &prior.history);
        let (assignment, churn) =
            self.measure_churn(ScoringPhase::Final, &staged, &new_ratings, now);
        churn.enforce()?;

        let mut rating_counts: BTreeMap<NoteId, u32> = BTreeMap::new();
        for rating in args.ratings() {
            *rating_counts.entry(rating.note_id).or_insert(0) += 1;
        }
        let decisions: Vec<NoteDecision> = args
            .notes()
            .iter()
            .zip(&observations)
            .zip(&staged.transitions)
            .map(|((note, observation), transition)| {
                self.decide(
                    note,
                    observation,
                    transition,
                    &staged,
                    &by_note,
                    &assignment,
                    rating_counts.get(&note.note_id).copied().unwrap_or(0),
                )
            })
            .collect();
        let changes = note_status_changes(&prior.decisions, &decisions, &new_ratings);
        let rater_rows = rater_rows(
            &[args.prescoring_rater_outputs(), outputs.rater_outputs.as_slice()],
            args.enrollment(),
        );

        let mut committed_decisions = prior.decisions;
        committed_decisions.extend(decisions.iter().map(|d| (d.note_id, d.clone())));
        let state = RunState {
            history: staged.records,
            decisions: committed_decisions,
        };
        self.store.commit(&state)?;
        info!(
            notes = decisions.len(),
            changes = changes.len(),
            flips = staged.transitions.iter().filter(|t| t.flipped()).count(),
            "final scoring committed"
        );

        Ok(FinalRunOutput {
            decisions,
            rater_rows,
            changes,
            churn,
            history: state.history.into_values().collect(),
            missing_tiers: outputs.missing_tiers,
        })
    }

    fn measure_churn(
        &self,
        phase: ScoringPhase,
        staged: &StagedHistory,
        new_ratings: &BTreeMap<NoteId, u32>,
        now: TimestampMillis,
    ) -> (RuleAssignment, ChurnReport) {
        let rules = self.config.rescoring_rules(phase, &self.rule_note_sets);
        let facts: Vec<RescoringFacts> = staged
            .transitions
            .iter()
            .map(|t| {
                RescoringFacts::from_transition(t, new_ratings.get(&t.note_id).copied().unwrap_or(0))
            })
            .collect();
        let assignment =
            partition_notes(&rules, &facts, now, self.config.recent_flip_lookback_millis);
        let flips: Vec<StatusFlip> = staged.transitions.iter().map(StatusFlip::from).collect();
        let report = ChurnReport::evaluate(&rules, &assignment, &flips, &self.config);
        (assignment, report)
    }

    #[allow(clippy::too_many_arguments)]
    fn decide(
        &self,
        note: &Note,
        observation: &NoteObservation,
        transition: &HistoryTransition,
        staged: &StagedHistory,
        by_note: &OutputsByNote<'_>,
        assignment: &RuleAssignment,
        num_ratings: u32,
    ) -> NoteDecision {
        let resolution = &observation.resolution;
        let tags = select_explanation_tags(note, transition.final_status, &self.config);
        let tier_scores = by_note
            .get(&note.note_id)
            .into_iter()
            .flatten()
            .map(|output| (output.tier.clone(), TierScore::from(*output)))
            .collect();
        // A locked note keeps the tier that decided its locked status.
        let decided_by = staged
            .records
            .get(&note.note_id)
            .and_then(|record| record.current_decided_by.clone())
            .unwrap_or_else(|| resolution.decided_by.clone());
        NoteDecision {
            note_id: note.note_id,
            final_status: transition.final_status,
            unlocked_status: resolution.status,
            decided_by,
            meta_scorer_active_rules: resolution.active_rules.clone(),
            first_tag: tags.first,
            second_tag: tags.second,
            modeling_group: observation.modeling_group,
            topic: note.topic.clone(),
            tier_scores,
            rescoring_active_rule: assignment.rule_for(note.note_id),
            num_ratings,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use notescore_core::{
        Classification, EnrollmentState, ExplanationTagRef, HelpfulTag, HelpfulnessLevel,
        NoteStatus,
    };
    use notescore_scoring::ScoringError;
    use notescore_store::{InMemoryHistoryStore, ScoringArgs};
    use tempfile::TempDir;

    use super::*;
    use crate::lock_policy::AgeLockPolicy;
    use crate::scorer::ScorerRun;
    use NoteStatus::*;

    const DAY: TimestampMillis = 24 * 60 * 60 * 1000;

    struct FixedScorer {
        tier: Tier,
        statuses: Mutex<Vec<(NoteId, NoteStatus)>>,
        raters: Vec<RaterModelOutput>,
    }

    impl FixedScorer {
        fn new(tier: Tier, statuses: &[(NoteId, NoteStatus)]) -> Arc<Self> {
            Arc::new(Self {
                tier,
                statuses: Mutex::new(statuses.to_vec()),
                raters: Vec::new(),
            })
        }

        fn set(&self, statuses: &[(NoteId, NoteStatus)]) {
            *self.statuses.lock().unwrap() = statuses.to_vec();
        }
    }

    impl Scorer for FixedScorer {
        fn tier(&self) -> Tier {
            self.tier.clone()
        }

        fn score(&self, phase: ScoringPhase, _args: &ScoringArgs) -> anyhow::Result<ScorerRun> {
            let note_outputs = self
                .statuses
                .lock()
                .unwrap()
                .iter()
                .map(|&(note_id, status)| ScorerOutput {
                    note_id,
                    tier: self.tier.clone(),
                    status,
                    note_intercept: 0.42,
                    note_factor: 0.1,
                    intercept_interval: None,
                    num_final_round_ratings: 10,
                    active_rules: vec![format!("{}-rule", self.tier)],
                    confident: None,
                })
                .collect();
            let meta = (phase == ScoringPhase::Prescoring).then(|| {
                notescore_core::PrescoringMetaScorerOutput {
                    global_intercept: Some(0.17),
                    ..Default::default()
                }
            });
            Ok(ScorerRun {
                note_outputs,
                rater_outputs: self.raters.clone(),
                meta,
            })
        }
    }

    struct BrokenScorer(Tier);

    impl Scorer for BrokenScorer {
        fn tier(&self) -> Tier {
            self.0.clone()
        }

        fn score(&self, _phase: ScoringPhase, _args: &ScoringArgs) -> anyhow::Result<ScorerRun> {
            anyhow::bail!("no convergence")
        }
    }

    struct SlowScorer(Tier);

    impl Scorer for SlowScorer {
        fn tier(&self) -> Tier {
            self.0.clone()
        }

        fn score(&self, _phase: ScoringPhase, _args: &ScoringArgs) -> anyhow::Result<ScorerRun> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(ScorerRun::default())
        }
    }

    fn note(note_id: NoteId) -> Note {
        Note {
            note_id,
            note_author_participant_id: format!("author-{note_id}"),
            created_at_millis: 0,
            classification: Classification::MisinformedOrPotentiallyMisleading,
            topic: None,
            helpful_tag_counts: BTreeMap::from([
                (HelpfulTag::GoodSources, 4),
                (HelpfulTag::Clear, 3),
            ]),
            not_helpful_tag_counts: BTreeMap::new(),
        }
    }

    fn rating(note_id: NoteId, rater: &str, created_at_millis: TimestampMillis) -> Rating {
        Rating {
            note_id,
            rater_participant_id: rater.into(),
            created_at_millis,
            helpfulness_level: HelpfulnessLevel::Helpful,
            helpful_tags: vec![HelpfulTag::GoodSources],
            not_helpful_tags: vec![],
        }
    }

    struct Harness {
        payloads: TempDir,
        store: Arc<InMemoryHistoryStore>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                payloads: TempDir::new().unwrap(),
                store: Arc::new(InMemoryHistoryStore::default()),
            }
        }

        fn pipeline(&self, config: ScoringConfig) -> Pipeline {
            let channel = PayloadChannel::open(self.payloads.path()).unwrap();
            Pipeline::new(config, channel, self.store.clone()).unwrap()
        }

        fn payloads_left(&self) -> usize {
            std::fs::read_dir(self.payloads.path()).unwrap().count()
        }
    }

    fn notes(ids: &[NoteId]) -> Vec<Note> {
        ids.iter().copied().map(note).collect()
    }

    #[tokio::test]
    async fn group_model_outranks_expansion() {
        let harness = Harness::new();
        let pipeline = harness
            .pipeline(ScoringConfig::default())
            .with_scorer(FixedScorer::new(Tier::Core, &[(1, NeedsMoreRatings)]))
            .with_scorer(FixedScorer::new(Tier::Group(13), &[(1, CurrentlyRatedHelpful)]))
            .with_scorer(FixedScorer::new(Tier::Expansion, &[(1, CurrentlyRatedNotHelpful)]));

        let output = pipeline
            .run(notes(&[1]), vec![rating(1, "r1", DAY)], vec![], 2 * DAY)
            .await
            .unwrap();

        let decision = &output.decisions[0];
        assert_eq!(decision.final_status, CurrentlyRatedHelpful);
        assert_eq!(decision.decided_by, Tier::Group(13));
        assert_eq!(decision.modeling_group, Some(13));
        assert_eq!(decision.meta_scorer_active_rules, vec!["group:13-rule".to_string()]);
        assert_eq!(
            decision.first_tag,
            Some(ExplanationTagRef::from(HelpfulTag::GoodSources))
        );
        assert_eq!(decision.second_tag, Some(ExplanationTagRef::from(HelpfulTag::Clear)));
        assert_eq!(decision.tier_scores.len(), 3);
        assert_eq!(decision.num_ratings, 1);
        assert_eq!(
            decision.rescoring_active_rule,
            Some(RescoringRuleId::NotesWithNewRatings)
        );

        let history = &output.history[0];
        assert_eq!(history.current_status, Some(CurrentlyRatedHelpful));
        assert_eq!(history.current_group_status, Some(CurrentlyRatedHelpful));
        assert_eq!(history.current_core_status, Some(NeedsMoreRatings));
        assert_eq!(harness.store.commits(), 1);
        assert_eq!(harness.payloads_left(), 0);
    }

    #[tokio::test]
    async fn rerun_over_identical_inputs_reports_no_changes() {
        let harness = Harness::new();
        let pipeline = harness
            .pipeline(ScoringConfig::default())
            .with_scorer(FixedScorer::new(
                Tier::Core,
                &[(1, CurrentlyRatedHelpful), (2, NeedsMoreRatings), (3, CurrentlyRatedNotHelpful)],
            ));
        let ratings = vec![rating(1, "r1", DAY), rating(2, "r2", DAY)];

        let first = pipeline
            .run(notes(&[1, 2, 3]), ratings.clone(), vec![], 2 * DAY)
            .await
            .unwrap();
        assert_eq!(first.changes.len(), 3);
        assert_eq!(
            first.changes[0].final_status_change.as_deref(),
            Some("NONE -> CURRENTLY_RATED_HELPFUL")
        );

        let second = pipeline
            .run(notes(&[1, 2, 3]), ratings, vec![], 3 * DAY)
            .await
            .unwrap();
        assert!(second.changes.is_empty());
        for (a, b) in first.decisions.iter().zip(&second.decisions) {
            assert_eq!(a.final_status, b.final_status);
            assert_eq!(a.decided_by, b.decided_by);
            assert_eq!(a.tier_scores, b.tier_scores);
        }
        assert_eq!(harness.store.commits(), 2);
    }

    #[tokio::test]
    async fn prescoring_churn_failure_commits_nothing() {
        let harness = Harness::new();
        let core = FixedScorer::new(
            Tier::Core,
            &[
                (1, CurrentlyRatedHelpful),
                (2, CurrentlyRatedHelpful),
                (3, CurrentlyRatedHelpful),
                (4, CurrentlyRatedHelpful),
            ],
        );
        let pipeline = harness.pipeline(ScoringConfig::default()).with_scorer(core.clone());
        pipeline.run(notes(&[1, 2, 3, 4]), vec![], vec![], DAY).await.unwrap();
        let committed = harness.store.snapshot();

        core.set(&[
            (1, NeedsMoreRatings),
            (2, CurrentlyRatedHelpful),
            (3, CurrentlyRatedHelpful),
            (4, CurrentlyRatedHelpful),
        ]);
        let err = pipeline
            .run(notes(&[1, 2, 3, 4]), vec![], vec![], 2 * DAY)
            .await
            .unwrap_err();
        match err {
            RunnerError::Scoring(ScoringError::ChurnLimitExceeded(violations)) => {
                assert_eq!(violations[0].rule, RescoringRuleId::AllUnlockedNotes);
                assert_eq!(violations[0].flips, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(harness.store.commits(), 1);
        assert_eq!(harness.store.snapshot(), committed);
        assert_eq!(harness.payloads_left(), 0);
    }

    #[tokio::test]
    async fn final_churn_failure_names_its_rule() {
        let harness = Harness::new();
        let mut config = ScoringConfig::default();
        config.churn.all_unlocked_notes = 1.0;
        let core = FixedScorer::new(Tier::Core, &[(1, CurrentlyRatedHelpful), (2, NeedsMoreRatings)]);
        let pipeline = harness.pipeline(config).with_scorer(core.clone());
        pipeline.run(notes(&[1, 2]), vec![], vec![], DAY).await.unwrap();

        core.set(&[(1, CurrentlyRatedNotHelpful), (2, NeedsMoreRatings)]);
        let err = pipeline
            .run(notes(&[1, 2]), vec![], vec![], 2 * DAY)
            .await
            .unwrap_err();
        assert!(
            err.to_string().contains("UNLOCKED_NOTES_WITH_NO_NEW_RATINGS"),
            "{err}"
        );
        assert_eq!(harness.store.commits(), 1);
        assert_eq!(harness.payloads_left(), 0);
    }

    #[tokio::test]
    async fn failed_and_slow_scorers_fall_through() {
        let harness = Harness::new();
        let pipeline = harness
            .pipeline(ScoringConfig::default())
            .with_scorer(FixedScorer::new(Tier::Core, &[(1, NeedsMoreRatings)]))
            .with_scorer(Arc::new(BrokenScorer(Tier::Expansion)))
            .with_scorer(Arc::new(SlowScorer(Tier::ExpansionPlus)))
            .with_scorer(FixedScorer::new(Tier::Coverage, &[(1, CurrentlyRatedNotHelpful)]))
            .with_scorer_timeout(Duration::from_millis(50));

        let output = pipeline.run(notes(&[1]), vec![], vec![], DAY).await.unwrap();
        assert_eq!(output.decisions[0].final_status, CurrentlyRatedNotHelpful);
        assert_eq!(output.decisions[0].decided_by, Tier::Coverage);
        assert_eq!(output.missing_tiers, vec![Tier::Expansion, Tier::ExpansionPlus]);
    }

    #[tokio::test]
    async fn age_lock_freezes_final_status() {
        let harness = Harness::new();
        let core = FixedScorer::new(Tier::Core, &[(1, CurrentlyRatedHelpful)]);
        let pipeline = harness
            .pipeline(ScoringConfig::default())
            .with_scorer(core.clone())
            .with_lock_policy(Arc::new(AgeLockPolicy::default()));

        let first = pipeline.run(notes(&[1]), vec![], vec![], 15 * DAY).await.unwrap();
        assert_eq!(first.history[0].locked_status, Some(CurrentlyRatedHelpful));
        assert_eq!(first.history[0].timestamp_millis_of_status_lock, Some(15 * DAY));

        core.set(&[(1, CurrentlyRatedNotHelpful)]);
        let second = pipeline.run(notes(&[1]), vec![], vec![], 16 * DAY).await.unwrap();
        let decision = &second.decisions[0];
        assert_eq!(decision.final_status, CurrentlyRatedHelpful);
        assert_eq!(decision.unlocked_status, CurrentlyRatedNotHelpful);
        assert_eq!(second.history[0].current_status, Some(CurrentlyRatedHelpful));
        assert!(second.changes.iter().all(|c| c.final_status_change.is_none()));
    }

    #[tokio::test]
    async fn lock_keeps_the_tier_that_decided_it() {
        let harness = Harness::new();
        let mut config = ScoringConfig::default();
        config.churn.all_unlocked_notes = 1.0;
        config.churn.unlocked_notes_with_no_new_ratings = 1.0;
        let core = FixedScorer::new(Tier::Core, &[(1, CurrentlyRatedHelpful)]);
        let expansion = FixedScorer::new(Tier::Expansion, &[(1, CurrentlyRatedNotHelpful)]);
        let pipeline = harness
            .pipeline(config)
            .with_scorer(core.clone())
            .with_scorer(expansion)
            .with_lock_policy(Arc::new(AgeLockPolicy::default()));

        let first = pipeline.run(notes(&[1]), vec![], vec![], DAY).await.unwrap();
        assert_eq!(first.decisions[0].decided_by, Tier::Core);
        assert_eq!(first.history[0].locked_status, None);

        core.set(&[(1, NeedsMoreRatings)]);
        let second = pipeline.run(notes(&[1]), vec![], vec![], 15 * DAY).await.unwrap();
        assert_eq!(second.history[0].locked_status, Some(CurrentlyRatedNotHelpful));
        assert_eq!(second.history[0].current_decided_by, Some(Tier::Expansion));
        assert_eq!(second.decisions[0].decided_by, Tier::Expansion);

        // Core decides again, but only the locking tier is eligible.
        core.set(&[(1, CurrentlyRatedHelpful)]);
        let third = pipeline.run(notes(&[1]), vec![], vec![], 16 * DAY).await.unwrap();
        let decision = &third.decisions[0];
        assert_eq!(decision.final_status, CurrentlyRatedNotHelpful);
        assert_eq!(decision.unlocked_status, CurrentlyRatedNotHelpful);
        assert_eq!(decision.decided_by, Tier::Expansion);
    }

    #[tokio::test]
    async fn rater_rows_merge_phases_and_enrollment() {
        let harness = Harness::new();
        let rater = |tier: Tier, intercept: f64, reputation: Option<f64>| RaterModelOutput {
            rater_participant_id: "r1".into(),
            tier,
            rater_intercept: intercept,
            rater_factor: -0.2,
            reputation,
        };
        let core = Arc::new(FixedScorer {
            tier: Tier::Core,
            statuses: Mutex::new(vec![(1, NeedsMoreRatings)]),
            raters: vec![rater(Tier::Core, 0.3, None)],
        });
        let helpfulness = Arc::new(FixedScorer {
            tier: Tier::Coverage,
            statuses: Mutex::new(vec![]),
            raters: vec![rater(Tier::Coverage, 0.1, Some(0.9))],
        });
        let pipeline = harness
            .pipeline(ScoringConfig::default())
            .with_scorer(core)
            .with_scorer(helpfulness);
        let enrollment = vec![Enrollment {
            participant_id: "r1".into(),
            enrollment_state: EnrollmentState::EarnedIn,
            modeling_population: "CORE".into(),
            modeling_group: Some(13),
        }];

        let output = pipeline
            .run(notes(&[1]), vec![rating(1, "r1", 10)], enrollment, DAY)
            .await
            .unwrap();
        assert_eq!(output.rater_rows.len(), 1);
        let row = &output.rater_rows[0];
        assert_eq!(row.enrollment_state, Some(EnrollmentState::EarnedIn));
        assert_eq!(row.modeling_group, Some(13));
        assert_eq!(row.tier_params.get(&Tier::Core), Some(&(0.3, -0.2)));
        assert_eq!(row.reputation, Some(0.9));
    }

    #[tokio::test]
    async fn churn_report_covers_both_phases() {
        let harness = Harness::new();
        let pipeline = harness
            .pipeline(ScoringConfig::default())
            .with_scorer(FixedScorer::new(Tier::Core, &[(1, CurrentlyRatedHelpful)]));
        let output = pipeline.run(notes(&[1]), vec![], vec![], DAY).await.unwrap();
        let rules: Vec<RescoringRuleId> = output.churn.subsets.iter().map(|s| s.rule).collect();
        assert_eq!(rules, RescoringRuleId::ALL.to_vec());
    }

    #[tokio::test]
    async fn prescoring_meta_reaches_final_scorers() {
        struct MetaProbe(Mutex<Option<f64>>);

        impl Scorer for MetaProbe {
            fn tier(&self) -> Tier {
                Tier::Core
            }

            fn score(&self, phase: ScoringPhase, args: &ScoringArgs) -> anyhow::Result<ScorerRun> {
                if phase == ScoringPhase::Prescoring {
                    return Ok(ScorerRun {
                        meta: Some(notescore_core::PrescoringMetaScorerOutput {
                            global_intercept: Some(0.21),
                            ..Default::default()
                        }),
                        ..ScorerRun::default()
                    });
                }
                let seen = args
                    .prescoring_meta
                    .as_ref()
                    .and_then(|meta| meta.for_tier(&Tier::Core))
                    .and_then(|meta| meta.global_intercept);
                *self.0.lock().unwrap() = seen;
                Ok(ScorerRun::default())
            }
        }

        let harness = Harness::new();
        let probe = Arc::new(MetaProbe(Mutex::new(None)));
        let pipeline = harness
            .pipeline(ScoringConfig::default())
            .with_scorer(probe.clone());
        pipeline.run(notes(&[1]), vec![], vec![], DAY).await.unwrap();
        assert_eq!(*probe.0.lock().unwrap(), Some(0.21));
    }
}
