//! Extraction & match classifier.
//!
//! One schema-constrained LLM call per email: classify the email, pull out
//! every opportunity it mentions, and give each a preliminary match decision.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{LimitsConfig, MatchCriteria};
use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider, TokenUsage};
use crate::llm::structured::complete_structured;
use crate::pipeline::normalizer::{clean_url, unwrap_redirect};
use crate::pipeline::types::{Candidate, EmailCategory, EmailInput, MatchDecision, NormalizedEmail};
use crate::tools::web::url_in_any_domain;

/// Appended when the body had to be cut.
pub const TRUNCATION_MARKER: &str = "[... content truncated ...]";

const CLASSIFY_MAX_TOKENS: u32 = 4096;

const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// Classifier output.
#[derive(Debug, Clone)]
pub struct Classification {
    pub email_type: EmailCategory,
    pub candidates: Vec<Candidate>,
    pub usage: TokenUsage,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default = "other_category")]
    email_type: EmailCategory,
    #[serde(default)]
    items: Vec<RawItem>,
}

fn other_category() -> EmailCategory {
    EmailCategory::Other
}

#[derive(Debug, Deserialize)]
struct RawItem {
    #[serde(alias = "company")]
    organization: String,
    title: String,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    technologies: Vec<String>,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    requires_auth: bool,
    matched: bool,
    confidence: f32,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    extracted_fields: serde_json::Map<String, serde_json::Value>,
}

/// Extraction & match classifier.
pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
    criteria: MatchCriteria,
    limits: LimitsConfig,
    auth_denylist: Vec<String>,
}

impl Classifier {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        criteria: MatchCriteria,
        limits: LimitsConfig,
        auth_denylist: Vec<String>,
    ) -> Self {
        Self {
            llm,
            criteria,
            limits,
            auth_denylist,
        }
    }

    /// Classify a normalized email. Any LLM or schema failure is fatal to the stage.
    pub async fn classify(
        &self,
        email: &EmailInput,
        normalized: &NormalizedEmail,
    ) -> Result<Classification, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_classifier_system_prompt(&self.criteria)),
            ChatMessage::user(build_classifier_user_prompt(email, normalized, &self.limits)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_response_schema(classification_schema())
        .with_metadata("stage", "classify");

        let (raw, usage): (RawClassification, TokenUsage) =
            complete_structured(self.llm.as_ref(), request)
                .await
                .map_err(|e| {
                    warn!(error = %e, "Classifier returned no usable output");
                    PipelineError::Classification(e.to_string())
                })?;

        let candidates: Vec<Candidate> = raw
            .items
            .into_iter()
            .enumerate()
            .map(|(index, item)| self.to_candidate(index, item))
            .collect();

        let matched = candidates.iter().filter(|c| c.matched()).count();
        info!(
            email_type = ?raw.email_type,
            candidates = candidates.len(),
            matched,
            "Classified email"
        );
        for c in &candidates {
            debug!(
                candidate = %c.label(),
                matched = c.matched(),
                confidence = c.confidence(),
                reasoning = %c.reasoning(),
                "Preliminary decision"
            );
        }

        Ok(Classification {
            email_type: raw.email_type,
            candidates,
            usage,
        })
    }

    fn to_candidate(&self, index: usize, item: RawItem) -> Candidate {
        let decision = MatchDecision::new(item.matched, item.confidence, item.reasoning);
        let mut candidate = Candidate::new(index, item.organization.trim(), item.title.trim(), decision);

        candidate.location = item.location.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
        candidate.technologies = item.technologies;
        candidate.source_url = item
            .source_url
            .map(|u| unwrap_redirect(u.trim()))
            .and_then(|u| clean_url(&u));
        candidate.requires_auth = item.requires_auth
            || candidate
                .source_url
                .as_deref()
                .is_some_and(|u| url_in_any_domain(u, &self.auth_denylist));
        candidate.extracted_fields = item.extracted_fields;
        candidate
    }
}

/// Cut `text` to `max_chars` characters, appending the truncation marker.
pub fn truncate_body(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}\n\n{TRUNCATION_MARKER}", &text[..cut]),
        None => text.to_string(),
    }
}

/// At most `max_urls` URLs, skipping any longer than `max_chars`.
fn bound_urls<'a>(urls: &'a [String], max_urls: usize, max_chars: usize) -> Vec<&'a str> {
    urls.iter()
        .map(String::as_str)
        .filter(|u| u.len() <= max_chars)
        .take(max_urls)
        .collect()
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_classifier_system_prompt(criteria: &MatchCriteria) -> String {
    let mut prompt = String::from(
        "You are an opportunity extraction engine. Read one email, decide what kind of email it is, \
         and extract every distinct opportunity (job posting, role, assignment) it mentions.\n\n\
         For each opportunity return: organization, title, location (if stated), technologies, \
         source_url (the link for that opportunity, if any), requires_auth (true if the link needs a login), \
         matched, confidence (0.0-1.0), reasoning, and extracted_fields.\n\n\
         Matching policy (inclusive):\n\
         - If an opportunity plausibly fits the criteria, mark it matched.\n\
         - If it is ambiguous, mark it matched with confidence between 0.5 and 0.7. Do not reject it.\n\
         - Reject only when one of the hard disqualifiers below clearly applies to the ROLE.\n\
         - Never reject because of the employer's industry. Judge the nature of the role itself.\n\
         - Every rejection must give a reasoning that names the disqualifier.\n\
         - If the email contains no opportunities, return an empty items list.\n",
    );

    prompt.push_str("\nMatch criteria:\n");
    prompt.push_str(criteria.criteria.trim());
    prompt.push('\n');

    if criteria.hard_disqualifiers.is_empty() {
        prompt.push_str("\nHard disqualifiers: none supplied. Do not reject anything that plausibly fits.\n");
    } else {
        prompt.push_str("\nHard disqualifiers:\n");
        for (i, d) in criteria.hard_disqualifiers.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, d.trim()));
        }
    }

    prompt.push_str("\nFields to extract into extracted_fields:\n");
    prompt.push_str(criteria.extraction_fields.trim());
    prompt.push('\n');

    if let Some(intent) = &criteria.user_intent {
        prompt.push_str("\nWhat the user is trying to achieve:\n");
        prompt.push_str(intent.trim());
        prompt.push('\n');
    }

    prompt
}

fn build_classifier_user_prompt(
    email: &EmailInput,
    normalized: &NormalizedEmail,
    limits: &LimitsConfig,
) -> String {
    let mut prompt = String::with_capacity(normalized.text.len().min(limits.max_body_chars) + 1024);

    prompt.push_str(&format!("Subject: {}\n", email.subject));
    prompt.push_str(&format!("From: {}\n", email.sender));
    if let Some(date) = email.date {
        prompt.push_str(&format!("Date: {}\n", date.to_rfc3339()));
    }

    let urls = bound_urls(&normalized.urls, limits.max_urls, limits.max_url_chars);
    if !urls.is_empty() {
        prompt.push_str("\nLinks found in the email:\n");
        for url in urls {
            prompt.push_str(&format!("- {url}\n"));
        }
    }

    prompt.push_str("\nEmail body:\n");
    prompt.push_str(&truncate_body(&normalized.text, limits.max_body_chars));
    prompt
}

fn classification_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "email_type": {
                "type": "string",
                "enum": ["job_alert", "recruiter_outreach", "newsletter", "application_update", "personal", "other"]
            },
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "organization": {"type": "string"},
                        "title": {"type": "string"},
                        "location": {"type": ["string", "null"]},
                        "technologies": {"type": "array", "items": {"type": "string"}},
                        "source_url": {"type": ["string", "null"]},
                        "requires_auth": {"type": "boolean"},
                        "matched": {"type": "boolean"},
                        "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                        "reasoning": {"type": "string"},
                        "extracted_fields": {"type": "object"}
                    },
                    "required": ["organization", "title", "matched", "confidence", "reasoning"]
                }
            }
        },
        "required": ["email_type", "items"]
    })
}
