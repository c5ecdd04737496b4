//! Workflow controller.
//!
//! ```text
//! init → normalizing → classifying ─┬─ (no matches) ──────────────────────────→ complete
//!                                   └─ researching → verifying → aggregating → complete
//! ```
//!
//! Every stage reads the current run and returns a `StageDelta`; the
//! controller merges it. A stage error ends the run in `error` with the
//! partial state intact. Failures inside one candidate's research or
//! verification are absorbed and recorded, never fatal.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::llm::provider::{LlmProvider, TokenUsage};
use crate::pipeline::aggregator::{aggregate, render_summary};
use crate::pipeline::classifier::Classifier;
use crate::pipeline::normalizer::normalize;
use crate::pipeline::types::{
    Candidate, EmailCategory, EmailInput, EvidenceRecord, MatchDecision, NormalizedEmail, ResearchFailure,
    StageDelta, StageError, WorkflowEvent, WorkflowPhase, WorkflowRun,
};
use crate::pipeline::verifier::Verifier;
use crate::research::ResearchAgent;
use crate::tools::web::WebSearch;

/// Buffered events before a slow stream consumer applies backpressure.
const EVENT_BUFFER: usize = 32;

/// External collaborators of a run.
#[derive(Clone)]
pub struct PipelineDeps {
    pub llm: Arc<dyn LlmProvider>,
    pub search: Arc<dyn WebSearch>,
}

/// A configured pipeline. Cheap to clone; holds no per-run state.
#[derive(Clone)]
pub struct Pipeline {
    deps: PipelineDeps,
    config: Arc<PipelineConfig>,
}

/// Run one email through the pipeline.
pub async fn run_pipeline(email: EmailInput, config: PipelineConfig, deps: PipelineDeps) -> WorkflowRun {
    Pipeline::new(config, deps).run(email).await
}

impl Pipeline {
    pub fn new(config: PipelineConfig, deps: PipelineDeps) -> Self {
        Self {
            deps,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Process one email to completion. Always returns a run; failures are
    /// recorded in `errors` and `phase`.
    pub async fn run(&self, email: EmailInput) -> WorkflowRun {
        self.drive(email, &Events(None)).await
    }

    /// Like `run`, but emits phase changes and stage deltas as they happen.
    /// The last event is always `Finished`.
    pub fn run_stream(&self, email: EmailInput) -> ReceiverStream<WorkflowEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let pipeline = self.clone();
        tokio::spawn(async move {
            pipeline.drive(email, &Events(Some(tx))).await;
        });
        ReceiverStream::new(rx)
    }

    async fn drive(&self, email: EmailInput, events: &Events) -> WorkflowRun {
        let started = Instant::now();
        let mut run = WorkflowRun::new(email);
        info!(run_id = %run.run_id, subject = %run.email.subject, "Pipeline run started");

        self.execute(&mut run, events).await;

        run.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        run.estimated_cost = run.usage.cost(self.deps.llm.cost_per_token());
        info!(
            run_id = %run.run_id,
            phase = %run.phase,
            candidates = run.candidates.len(),
            matched = run.matched_candidates().count(),
            errors = run.errors.len(),
            elapsed_ms = run.elapsed_ms,
            tokens = run.usage.total(),
            "Pipeline run finished"
        );
        events
            .send(WorkflowEvent::Finished {
                run: Box::new(run.clone()),
            })
            .await;
        run
    }

    async fn execute(&self, run: &mut WorkflowRun, events: &Events) {
        enter(run, WorkflowPhase::Normalizing, events).await;
        let delta = self.normalize_stage(run);
        complete(run, WorkflowPhase::Normalizing, delta, events).await;

        enter(run, WorkflowPhase::Classifying, events).await;
        match self.classify_stage(run).await {
            Ok(delta) => complete(run, WorkflowPhase::Classifying, delta, events).await,
            Err(e) => return fail(run, WorkflowPhase::Classifying, e, events).await,
        }

        if run.matched_candidates().next().is_none() {
            info!(candidates = run.candidates.len(), "No matched candidates, skipping research");
            let delta = StageDelta {
                has_matches: Some(false),
                summary: Some(render_summary(&run.candidates)),
                ..Default::default()
            };
            run.apply(delta);
            enter(run, WorkflowPhase::Complete, events).await;
            return;
        }

        let stages = [
            WorkflowPhase::Researching,
            WorkflowPhase::Verifying,
            WorkflowPhase::Aggregating,
        ];
        for phase in stages {
            enter(run, phase, events).await;
            let result = match phase {
                WorkflowPhase::Researching => self.research_stage(run).await,
                WorkflowPhase::Verifying => self.verify_stage(run).await,
                _ => self.aggregate_stage(run),
            };
            match result {
                Ok(delta) => complete(run, phase, delta, events).await,
                Err(e) => return fail(run, phase, e, events).await,
            }
        }

        enter(run, WorkflowPhase::Complete, events).await;
    }

    // ── Stages ──────────────────────────────────────────────────────

    fn normalize_stage(&self, run: &WorkflowRun) -> StageDelta {
        let normalized = normalize(&run.email);
        debug!(
            text_chars = normalized.text.chars().count(),
            urls = normalized.urls.len(),
            "Normalized email"
        );
        StageDelta {
            normalized: Some(normalized),
            ..Default::default()
        }
    }

    async fn classify_stage(&self, run: &WorkflowRun) -> Result<StageDelta, PipelineError> {
        let normalized: &NormalizedEmail = run.normalized.as_ref().ok_or(PipelineError::Precondition {
            stage: WorkflowPhase::Classifying,
            missing: "normalized content",
        })?;

        if normalized.is_empty() {
            warn!("Nothing to classify after normalization");
            return Ok(StageDelta {
                email_type: Some(EmailCategory::Other),
                candidates: Some(Vec::new()),
                has_matches: Some(false),
                ..Default::default()
            });
        }

        let classifier = Classifier::new(
            Arc::clone(&self.deps.llm),
            self.config.criteria.clone(),
            self.config.limits.clone(),
            self.config.research.auth_denylist.clone(),
        );
        let classification = classifier.classify(&run.email, normalized).await?;
        let has_matches = classification.candidates.iter().any(Candidate::matched);

        Ok(StageDelta {
            email_type: Some(classification.email_type),
            candidates: Some(classification.candidates),
            has_matches: Some(has_matches),
            usage: classification.usage,
            ..Default::default()
        })
    }

    /// Research matched candidates in fixed-size batches. Each candidate runs
    /// in its own task; a task that dies yields a not-found record for that
    /// candidate only.
    async fn research_stage(&self, run: &WorkflowRun) -> Result<StageDelta, PipelineError> {
        let matched: Vec<Candidate> = run.matched_candidates().cloned().collect();
        if matched.is_empty() {
            return Err(PipelineError::Precondition {
                stage: WorkflowPhase::Researching,
                missing: "matched candidates",
            });
        }

        let batch_size = self.config.research.concurrency.max(1);
        let mut records = Vec::with_capacity(matched.len());
        let mut errors = Vec::new();
        let mut usage = TokenUsage::default();

        for (batch_no, batch) in matched.chunks(batch_size).enumerate() {
            debug!(batch = batch_no, size = batch.len(), "Researching batch");

            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|candidate| {
                    let agent = ResearchAgent::new(
                        Arc::clone(&self.deps.llm),
                        Arc::clone(&self.deps.search),
                        self.config.research.clone(),
                        self.config.domains.clone(),
                    );
                    tokio::spawn(async move { agent.research(&candidate).await })
                })
                .collect();

            let results = futures::future::join_all(handles).await;

            for (candidate, result) in batch.iter().zip(results) {
                match result {
                    Ok(outcome) => {
                        usage.add(outcome.usage);
                        records.push(outcome.record);
                    }
                    Err(e) => {
                        error!(candidate = %candidate.label(), error = %e, "Research task failed");
                        errors.push(StageError::new(
                            WorkflowPhase::Researching,
                            format!("{}: {e}", candidate.label()),
                        ));
                        records.push(EvidenceRecord::not_found(
                            candidate.index,
                            Vec::new(),
                            0,
                            String::new(),
                            ResearchFailure::TaskFailed { message: e.to_string() },
                        ));
                    }
                }
            }
        }

        let found = records.iter().filter(|r| r.is_found()).count();
        info!(researched = records.len(), found, "Research complete");

        Ok(StageDelta {
            research_results: Some(records),
            errors,
            usage,
            ..Default::default()
        })
    }

    /// Re-check every researched candidate. A failed verification keeps the
    /// preliminary decision with a note.
    async fn verify_stage(&self, run: &WorkflowRun) -> Result<StageDelta, PipelineError> {
        if run.research_results.is_empty() {
            return Err(PipelineError::Precondition {
                stage: WorkflowPhase::Verifying,
                missing: "research results",
            });
        }

        let verifier = Verifier::new(
            Arc::clone(&self.deps.llm),
            self.config.criteria.clone(),
            self.config.verification.clone(),
            self.config.limits.clone(),
        );

        let mut candidates = run.candidates.clone();
        let mut errors = Vec::new();
        let mut usage = TokenUsage::default();

        for record in &run.research_results {
            let Some(candidate) = candidates.iter_mut().find(|c| c.index == record.candidate_index) else {
                warn!(index = record.candidate_index, "Evidence for unknown candidate");
                continue;
            };
            if !candidate.matched() {
                continue;
            }

            match verifier.verify(candidate, record).await {
                Ok((result, stage_usage)) => {
                    usage.add(stage_usage);
                    candidate.apply_verification(result);
                }
                Err(e) => {
                    warn!(candidate = %candidate.label(), error = %e, "Verification failed, keeping preliminary decision");
                    errors.push(StageError::new(WorkflowPhase::Verifying, format!("{}: {e}", candidate.label())));
                    let kept = candidate.decision();
                    let note = format!("{} (not verified: {e})", kept.reasoning);
                    let decision = MatchDecision::new(kept.matched, kept.confidence, note);
                    candidate.set_decision(decision, None);
                }
            }
        }

        Ok(StageDelta {
            candidates: Some(candidates),
            errors,
            usage,
            ..Default::default()
        })
    }

    fn aggregate_stage(&self, run: &WorkflowRun) -> Result<StageDelta, PipelineError> {
        let output = aggregate(
            run.candidates.clone(),
            &run.research_results,
            self.config.limits.preview_chars,
        );
        for line in output.summary.lines() {
            debug!("{line}");
        }
        Ok(StageDelta {
            candidates: Some(output.candidates),
            has_matches: Some(output.has_matches),
            summary: Some(output.summary),
            ..Default::default()
        })
    }
}

// ── Controller helpers ──────────────────────────────────────────────

/// Optional event sink. A dropped receiver only stops the events.
struct Events(Option<mpsc::Sender<WorkflowEvent>>);

impl Events {
    async fn send(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.0
            && tx.send(event).await.is_err()
        {
            debug!("Event receiver dropped");
        }
    }
}

async fn enter(run: &mut WorkflowRun, phase: WorkflowPhase, events: &Events) {
    if run.transition(phase) {
        debug!(run_id = %run.run_id, phase = %phase, "Entered phase");
        events.send(WorkflowEvent::PhaseEntered { phase }).await;
    }
}

async fn complete(run: &mut WorkflowRun, phase: WorkflowPhase, delta: StageDelta, events: &Events) {
    for e in &delta.errors {
        events.send(WorkflowEvent::StageFailed { error: e.clone() }).await;
    }
    if events.0.is_some() {
        events
            .send(WorkflowEvent::StageCompleted {
                phase,
                delta: Box::new(delta.clone()),
            })
            .await;
    }
    run.apply(delta);
}

async fn fail(run: &mut WorkflowRun, phase: WorkflowPhase, err: PipelineError, events: &Events) {
    error!(run_id = %run.run_id, phase = %phase, error = %err, "Stage failed, aborting run");
    let stage_error = StageError::new(phase, err.to_string());
    events
        .send(WorkflowEvent::StageFailed {
            error: stage_error.clone(),
        })
        .await;
    run.apply(StageDelta {
        errors: vec![stage_error],
        has_matches: Some(false),
        ..Default::default()
    });
    enter(run, WorkflowPhase::Error, events).await;
}
