//! Shared types for the opportunity pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::llm::TokenUsage;
use crate::pipeline::fields::StructuredFields;

/// Reason recorded when a rejection arrives without one.
pub const DEFAULT_REJECTION_REASON: &str = "Rejected: no matching criteria satisfied";

// ── Email ───────────────────────────────────────────────────────────

/// One inbound email. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailInput {
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub recipients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    /// Raw body, HTML or plain text.
    pub body: String,
}

/// Plain text plus opportunity URLs derived from an `EmailInput`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEmail {
    pub text: String,
    pub urls: Vec<String>,
}

impl NormalizedEmail {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.urls.is_empty()
    }
}

/// What kind of email the classifier thinks this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailCategory {
    JobAlert,
    RecruiterOutreach,
    Newsletter,
    ApplicationUpdate,
    Personal,
    #[serde(other)]
    Other,
}

// ── Candidates ──────────────────────────────────────────────────────

/// The `matched`/`confidence`/`reasoning` triple. Always replaced as a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMatchDecision")]
pub struct MatchDecision {
    pub matched: bool,
    pub confidence: f32,
    pub reasoning: String,
}

/// Wire form of `MatchDecision`; deserialization goes through `MatchDecision::new`.
#[derive(Deserialize)]
struct RawMatchDecision {
    matched: bool,
    confidence: f32,
    #[serde(default)]
    reasoning: String,
}

impl From<RawMatchDecision> for MatchDecision {
    fn from(raw: RawMatchDecision) -> Self {
        Self::new(raw.matched, raw.confidence, raw.reasoning)
    }
}

impl MatchDecision {
    /// Build a decision, clamping confidence into `[0, 1]` and filling in a
    /// reason for rejections that have none.
    pub fn new(matched: bool, confidence: f32, reasoning: impl Into<String>) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut reasoning = reasoning.into().trim().to_string();
        if !matched && reasoning.is_empty() {
            reasoning = DEFAULT_REJECTION_REASON.to_string();
        }
        Self {
            matched,
            confidence,
            reasoning,
        }
    }

    pub fn accept(confidence: f32, reasoning: impl Into<String>) -> Self {
        Self::new(true, confidence, reasoning)
    }

    pub fn reject(confidence: f32, reasoning: impl Into<String>) -> Self {
        Self::new(false, confidence, reasoning)
    }
}

/// One opportunity found in an email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Position in the classifier's output; stable across a run.
    pub index: usize,
    pub organization: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// The source URL sits behind a login wall.
    #[serde(default)]
    pub requires_auth: bool,
    #[serde(flatten)]
    decision: MatchDecision,
    /// Set only when verification flipped the decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_reason: Option<String>,
    #[serde(default)]
    pub extracted_fields: serde_json::Map<String, serde_json::Value>,
}

impl Candidate {
    pub fn new(index: usize, organization: impl Into<String>, title: impl Into<String>, decision: MatchDecision) -> Self {
        Self {
            index,
            organization: organization.into(),
            title: title.into(),
            location: None,
            technologies: Vec::new(),
            source_url: None,
            requires_auth: false,
            decision,
            changed_reason: None,
            extracted_fields: serde_json::Map::new(),
        }
    }

    pub fn decision(&self) -> &MatchDecision {
        &self.decision
    }

    pub fn matched(&self) -> bool {
        self.decision.matched
    }

    pub fn confidence(&self) -> f32 {
        self.decision.confidence
    }

    pub fn reasoning(&self) -> &str {
        &self.decision.reasoning
    }

    /// Replace the match triple. `changed_reason` is recorded only when the
    /// decision actually flipped.
    pub fn set_decision(&mut self, decision: MatchDecision, changed_reason: Option<String>) {
        if decision.matched != self.decision.matched {
            self.changed_reason = changed_reason
                .filter(|r| !r.trim().is_empty())
                .or_else(|| Some(decision.reasoning.clone()));
        }
        self.decision = decision;
    }

    /// Apply a verification result: new triple plus merged fields. Existing
    /// fields survive unless the verifier supplied a non-null replacement.
    pub fn apply_verification(&mut self, result: VerificationResult) {
        self.set_decision(result.decision, result.changed_reason);
        for (key, value) in result.enriched_fields {
            if !value.is_null() {
                self.extracted_fields.insert(key, value);
            }
        }
    }

    /// One-line label used in logs and summaries.
    pub fn label(&self) -> String {
        match &self.location {
            Some(loc) => format!("{} @ {} ({loc})", self.title, self.organization),
            None => format!("{} @ {}", self.title, self.organization),
        }
    }
}

// ── Research ────────────────────────────────────────────────────────

/// Which strategy produced a search task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// The URL the email itself linked to.
    SourceUrl,
    /// The organisation's own careers pages.
    CompanyCareers,
    /// Organisation plus title anywhere on the web.
    Targeted,
    /// Title plus location, no organisation restriction.
    Generic,
    /// Title-synonym retry.
    Synonym,
}

/// What a task asks the agent to do.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskAction {
    Search {
        query: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        include_domains: Vec<String>,
    },
    Extract {
        url: String,
    },
}

/// A prioritized research step derived from a candidate. Lower priority runs first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchTask {
    pub priority: u8,
    pub strategy: SearchStrategy,
    pub action: TaskAction,
}

/// Heuristic classification of a web page's origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    CompanyCareerPage,
    ApplicantTrackingSystem,
    JobBoard,
    Template,
    Other,
}

impl SourceType {
    /// Lower is more authoritative.
    pub fn rank(self) -> u8 {
        match self {
            Self::CompanyCareerPage => 0,
            Self::ApplicantTrackingSystem => 1,
            Self::JobBoard => 2,
            Self::Other => 3,
            Self::Template => 9,
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::CompanyCareerPage => "company_career_page",
            Self::ApplicantTrackingSystem => "applicant_tracking_system",
            Self::JobBoard => "job_board",
            Self::Template => "template",
            Self::Other => "other",
        };
        write!(f, "{s}")
    }
}

/// The validated page backing a found record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceSource {
    pub url: String,
    pub title: String,
    pub source_type: SourceType,
    pub content: String,
}

/// A page the agent looked at, with what it concluded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub source_type: SourceType,
    pub note: String,
}

/// Why research ended without validated evidence. Never an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResearchFailure {
    BudgetExhausted { iterations: u32 },
    ContextBudgetExceeded { chars: usize, limit: usize },
    ValidationFailed { url: String, failed_checks: Vec<String> },
    NoResults,
    TaskFailed { message: String },
    AgentGaveUp { reason: String },
}

impl std::fmt::Display for ResearchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BudgetExhausted { iterations } => {
                write!(f, "iteration budget exhausted after {iterations} tool calls")
            }
            Self::ContextBudgetExceeded { chars, limit } => {
                write!(f, "context budget exceeded ({chars} > {limit} chars)")
            }
            Self::ValidationFailed { url, failed_checks } => {
                write!(f, "{url} failed validation: {}", failed_checks.join("; "))
            }
            Self::NoResults => write!(f, "no search results"),
            Self::TaskFailed { message } => write!(f, "research task failed: {message}"),
            Self::AgentGaveUp { reason } => write!(f, "agent gave up: {reason}"),
        }
    }
}

/// Research outcome for one matched candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub candidate_index: usize,
    found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    primary_source: Option<EvidenceSource>,
    /// Every page inspected, deduplicated by URL.
    pub sources: Vec<SourceRef>,
    pub requirements: Vec<String>,
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_arrangement: Option<String>,
    pub iterations: u32,
    /// Audit trail of the agent's decisions.
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ResearchFailure>,
}

impl EvidenceRecord {
    /// A validated record. Returns a not-found record instead if the
    /// primary source has no URL or no text.
    pub fn found(
        candidate_index: usize,
        primary: EvidenceSource,
        sources: Vec<SourceRef>,
        fields: StructuredFields,
        iterations: u32,
        reasoning: String,
    ) -> Self {
        if primary.url.trim().is_empty() || primary.content.trim().is_empty() {
            return Self::not_found(
                candidate_index,
                sources,
                iterations,
                reasoning,
                ResearchFailure::ValidationFailed {
                    url: primary.url,
                    failed_checks: vec!["primary source has no URL or text".into()],
                },
            );
        }
        Self {
            candidate_index,
            found: true,
            primary_source: Some(primary),
            sources,
            requirements: fields.requirements,
            technologies: fields.technologies,
            deadline: fields.deadline,
            experience_years: fields.experience_years,
            work_arrangement: fields.work_arrangement,
            iterations,
            reasoning,
            failure: None,
        }
    }

    pub fn not_found(
        candidate_index: usize,
        sources: Vec<SourceRef>,
        iterations: u32,
        reasoning: String,
        failure: ResearchFailure,
    ) -> Self {
        Self {
            candidate_index,
            found: false,
            primary_source: None,
            sources,
            requirements: Vec::new(),
            technologies: Vec::new(),
            deadline: None,
            experience_years: None,
            work_arrangement: None,
            iterations,
            reasoning,
            failure: Some(failure),
        }
    }

    pub fn is_found(&self) -> bool {
        self.found
    }

    pub fn primary_source(&self) -> Option<&EvidenceSource> {
        self.primary_source.as_ref()
    }

    /// Validated evidence text, if any.
    pub fn evidence_text(&self) -> Option<&str> {
        self.primary_source.as_ref().map(|s| s.content.as_str())
    }
}

// ── Verification ────────────────────────────────────────────────────

/// Revised decision for one candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub decision: MatchDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changed_reason: Option<String>,
    #[serde(default)]
    pub enriched_fields: serde_json::Map<String, serde_json::Value>,
    /// False when there was no evidence to verify against.
    pub verified: bool,
}

// ── Workflow ────────────────────────────────────────────────────────

/// Phase of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPhase {
    Init,
    Normalizing,
    Classifying,
    Researching,
    Verifying,
    Aggregating,
    Complete,
    Error,
}

impl WorkflowPhase {
    /// Check if this phase allows transitioning to another phase.
    pub fn can_transition_to(&self, target: WorkflowPhase) -> bool {
        use WorkflowPhase::*;

        if target == Error {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (Init, Normalizing)
                | (Normalizing, Classifying)
                // The only branch: no matched candidates ends the run here.
                | (Classifying, Researching)
                | (Classifying, Complete)
                | (Researching, Verifying)
                | (Verifying, Aggregating)
                | (Aggregating, Complete)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

impl std::fmt::Display for WorkflowPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Init => "init",
            Self::Normalizing => "normalizing",
            Self::Classifying => "classifying",
            Self::Researching => "researching",
            Self::Verifying => "verifying",
            Self::Aggregating => "aggregating",
            Self::Complete => "complete",
            Self::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// A recorded phase change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: WorkflowPhase,
    pub to: WorkflowPhase,
    pub at: DateTime<Utc>,
}

/// A non-fatal (or run-ending) error, tagged with where it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: WorkflowPhase,
    pub message: String,
}

impl StageError {
    pub fn new(stage: WorkflowPhase, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

/// Output of one stage. `None` fields leave the run untouched; `errors`
/// append, `usage` accumulates, everything else replaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<NormalizedEmail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_type: Option<EmailCategory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub research_results: Option<Vec<EvidenceRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_matches: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StageError>,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Top-level record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub run_id: Uuid,
    pub email: EmailInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalized: Option<NormalizedEmail>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_type: Option<EmailCategory>,
    pub candidates: Vec<Candidate>,
    pub research_results: Vec<EvidenceRecord>,
    pub has_matches: bool,
    pub summary: String,
    pub errors: Vec<StageError>,
    pub phase: WorkflowPhase,
    pub transitions: Vec<PhaseTransition>,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
    pub usage: TokenUsage,
    /// Estimated spend in USD.
    pub estimated_cost: rust_decimal::Decimal,
}

impl WorkflowRun {
    pub fn new(email: EmailInput) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            email,
            normalized: None,
            email_type: None,
            candidates: Vec::new(),
            research_results: Vec::new(),
            has_matches: false,
            summary: String::new(),
            errors: Vec::new(),
            phase: WorkflowPhase::Init,
            transitions: Vec::new(),
            started_at: Utc::now(),
            elapsed_ms: 0,
            usage: TokenUsage::default(),
            estimated_cost: rust_decimal::Decimal::ZERO,
        }
    }

    /// Merge a stage's output into the run.
    pub fn apply(&mut self, delta: StageDelta) {
        if let Some(normalized) = delta.normalized {
            self.normalized = Some(normalized);
        }
        if let Some(email_type) = delta.email_type {
            self.email_type = Some(email_type);
        }
        if let Some(candidates) = delta.candidates {
            self.candidates = candidates;
        }
        if let Some(results) = delta.research_results {
            self.research_results = results;
        }
        if let Some(has_matches) = delta.has_matches {
            self.has_matches = has_matches;
        }
        if let Some(summary) = delta.summary {
            self.summary = summary;
        }
        self.errors.extend(delta.errors);
        self.usage.add(delta.usage);
    }

    /// Move to `to`, recording the transition. Illegal moves are logged and
    /// ignored.
    pub fn transition(&mut self, to: WorkflowPhase) -> bool {
        if !self.phase.can_transition_to(to) {
            tracing::warn!(from = %self.phase, to = %to, "Illegal phase transition ignored");
            return false;
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            at: Utc::now(),
        });
        self.phase = to;
        true
    }

    /// Candidates still matched.
    pub fn matched_candidates(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| c.matched())
    }
}

/// Progress events emitted by the streaming variant.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkflowEvent {
    PhaseEntered {
        phase: WorkflowPhase,
    },
    StageCompleted {
        phase: WorkflowPhase,
        delta: Box<StageDelta>,
    },
    StageFailed {
        error: StageError,
    },
    Finished {
        run: Box<WorkflowRun>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(matched: bool) -> Candidate {
        Candidate::new(
            0,
            "Acme A/S",
            "Backend Developer",
            MatchDecision::new(matched, 0.8, "software role"),
        )
    }

    #[test]
    fn decision_clamps_confidence() {
        assert_eq!(MatchDecision::accept(1.7, "x").confidence, 1.0);
        assert_eq!(MatchDecision::accept(-0.2, "x").confidence, 0.0);
        assert_eq!(MatchDecision::accept(f32::NAN, "x").confidence, 0.0);
    }

    #[test]
    fn rejection_always_has_reasoning() {
        let d = MatchDecision::reject(0.9, "   ");
        assert!(!d.matched);
        assert_eq!(d.reasoning, DEFAULT_REJECTION_REASON);
    }

    #[test]
    fn changed_reason_only_on_flip() {
        let mut c = candidate(true);
        c.set_decision(MatchDecision::accept(0.6, "borderline"), Some("ignored".into()));
        assert!(c.changed_reason.is_none());
        assert_eq!(c.confidence(), 0.6);

        c.set_decision(MatchDecision::reject(0.9, "needs 8 years"), None);
        assert_eq!(c.changed_reason.as_deref(), Some("needs 8 years"));
        assert!(!c.matched());
    }

    #[test]
    fn verification_merges_without_dropping_fields() {
        let mut c = candidate(true);
        c.extracted_fields.insert("salary".into(), serde_json::json!("DKK 50k"));
        c.extracted_fields.insert("deadline".into(), serde_json::json!("soon"));

        let mut enriched = serde_json::Map::new();
        enriched.insert("deadline".into(), serde_json::json!("2026-11-01"));
        enriched.insert("work_arrangement".into(), serde_json::Value::Null);
        c.apply_verification(VerificationResult {
            decision: MatchDecision::accept(0.85, "confirmed"),
            changed_reason: None,
            enriched_fields: enriched,
            verified: true,
        });

        assert_eq!(c.extracted_fields["salary"], "DKK 50k");
        assert_eq!(c.extracted_fields["deadline"], "2026-11-01");
        assert!(!c.extracted_fields.contains_key("work_arrangement"));
    }

    #[test]
    fn candidate_serializes_flat_triple() {
        let json = serde_json::to_value(candidate(false)).unwrap();
        assert_eq!(json["matched"], false);
        assert!(json["reasoning"].is_string());
        assert!(json.get("decision").is_none());
    }

    #[test]
    fn deserialized_candidate_is_clamped() {
        let json = r#"{"index": 0, "organization": "Acme", "title": "Developer",
            "matched": true, "confidence": 1.7, "reasoning": "fits"}"#;
        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.confidence(), 1.0);

        let json = r#"{"index": 1, "organization": "Beta", "title": "Welder",
            "matched": false, "confidence": -3.0, "reasoning": ""}"#;
        let c: Candidate = serde_json::from_str(json).unwrap();
        assert_eq!(c.confidence(), 0.0);
        assert_eq!(c.reasoning(), DEFAULT_REJECTION_REASON);
    }

    #[test]
    fn research_failure_round_trips_with_kind_tag() {
        let failure = ResearchFailure::AgentGaveUp {
            reason: "only login-walled postings".into(),
        };
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "agent_gave_up");
        assert_eq!(json["reason"], "only login-walled postings");
        assert_eq!(serde_json::from_value::<ResearchFailure>(json).unwrap(), failure);

        let record = EvidenceRecord::not_found(2, vec![], 4, "gave up".into(), failure.clone());
        let text = serde_json::to_string(&record).unwrap();
        let back: EvidenceRecord = serde_json::from_str(&text).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.failure, Some(failure));
    }

    #[test]
    fn found_requires_url_and_text() {
        let primary = EvidenceSource {
            url: "https://acme.dk/jobs/1".into(),
            title: "Backend".into(),
            source_type: SourceType::CompanyCareerPage,
            content: "  ".into(),
        };
        let record = EvidenceRecord::found(0, primary, vec![], StructuredFields::default(), 3, String::new());
        assert!(!record.is_found());
        assert!(record.primary_source().is_none());
    }

    #[test]
    fn phase_transitions() {
        use WorkflowPhase::*;
        assert!(Init.can_transition_to(Normalizing));
        assert!(Classifying.can_transition_to(Complete));
        assert!(Classifying.can_transition_to(Researching));
        assert!(Researching.can_transition_to(Error));
        assert!(!Init.can_transition_to(Researching));
        assert!(!Complete.can_transition_to(Error));
        assert!(!Error.can_transition_to(Normalizing));
    }

    #[test]
    fn run_applies_deltas_per_field() {
        let mut run = WorkflowRun::new(EmailInput {
            subject: "s".into(),
            sender: "a@b.c".into(),
            recipients: vec![],
            date: None,
            body: "b".into(),
        });
        run.apply(StageDelta {
            candidates: Some(vec![candidate(true)]),
            errors: vec![StageError::new(WorkflowPhase::Researching, "first")],
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
            },
            ..Default::default()
        });
        run.apply(StageDelta {
            candidates: Some(vec![candidate(false), candidate(false)]),
            errors: vec![StageError::new(WorkflowPhase::Verifying, "second")],
            usage: TokenUsage {
                input_tokens: 1,
                output_tokens: 1,
            },
            ..Default::default()
        });
        assert_eq!(run.candidates.len(), 2);
        assert_eq!(run.errors.len(), 2);
        assert_eq!(run.usage.total(), 17);
    }

    #[test]
    fn illegal_transition_is_ignored() {
        let mut run = WorkflowRun::new(EmailInput {
            subject: String::new(),
            sender: String::new(),
            recipients: vec![],
            date: None,
            body: String::new(),
        });
        assert!(!run.transition(WorkflowPhase::Verifying));
        assert_eq!(run.phase, WorkflowPhase::Init);
        assert!(run.transition(WorkflowPhase::Normalizing));
        assert_eq!(run.transitions.len(), 1);
    }

    #[test]
    fn unknown_category_is_other() {
        let cat: EmailCategory = serde_json::from_str("\"marketing_blast\"").unwrap();
        assert_eq!(cat, EmailCategory::Other);
    }
}
