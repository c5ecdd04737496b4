//! Verification pass: re-check a preliminary match against full evidence.
//!
//! The model re-derives the decision; the caller's experience policy is then
//! applied on top so thresholds never depend on the model following them.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::{LimitsConfig, MatchCriteria, VerificationPolicy};
use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider, TokenUsage};
use crate::llm::structured::complete_structured;
use crate::pipeline::classifier::truncate_body;
use crate::pipeline::types::{Candidate, EvidenceRecord, MatchDecision, VerificationResult};

const VERIFY_MAX_TOKENS: u32 = 2048;

const VERIFY_TEMPERATURE: f32 = 0.0;

/// Appended to reasoning when there was nothing to verify against.
pub const UNVERIFIED_NOTE: &str = "verification could not be performed: no evidence found";

/// The model's verdict before policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ProposedVerdict {
    pub matched: bool,
    pub confidence: f32,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub changed_reason: Option<String>,
    /// `None` when the model left the field out, `Some(None)` for an
    /// explicit null ("no requirement stated").
    #[serde(default, deserialize_with = "explicit_field")]
    pub experience_years: Option<Option<u32>>,
    #[serde(default)]
    pub enriched_fields: serde_json::Map<String, serde_json::Value>,
}

fn explicit_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Verification pass.
pub struct Verifier {
    llm: Arc<dyn LlmProvider>,
    criteria: MatchCriteria,
    policy: VerificationPolicy,
    limits: LimitsConfig,
}

impl Verifier {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        criteria: MatchCriteria,
        policy: VerificationPolicy,
        limits: LimitsConfig,
    ) -> Self {
        Self {
            llm,
            criteria,
            policy,
            limits,
        }
    }

    /// Verify one candidate against its evidence record.
    pub async fn verify(
        &self,
        candidate: &Candidate,
        evidence: &EvidenceRecord,
    ) -> Result<(VerificationResult, TokenUsage), PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_verifier_system_prompt(&self.criteria, &self.policy)),
            ChatMessage::user(build_verifier_user_prompt(candidate, evidence, &self.limits)),
        ])
        .with_temperature(VERIFY_TEMPERATURE)
        .with_max_tokens(VERIFY_MAX_TOKENS)
        .with_response_schema(verification_schema())
        .with_metadata("stage", "verify");

        let (proposed, usage): (ProposedVerdict, TokenUsage) =
            complete_structured(self.llm.as_ref(), request)
                .await
                .map_err(|e| PipelineError::Verification(format!("{}: {e}", candidate.label())))?;

        // The model read the full text; the regex guess only fills in when
        // the model did not answer at all.
        let experience_years = match proposed.experience_years {
            Some(answer) => answer,
            None => evidence.experience_years,
        };
        let mut enriched: serde_json::Map<String, serde_json::Value> = proposed
            .enriched_fields
            .clone()
            .into_iter()
            .filter(|(_, v)| !v.is_null())
            .collect();
        if let Some(years) = experience_years {
            enriched.insert("experience_years".into(), serde_json::json!(years));
        }

        let (decision, changed_reason) = apply_policy(
            &self.policy,
            candidate.decision(),
            proposed,
            experience_years,
            evidence.is_found(),
        );

        if decision.matched != candidate.matched() {
            info!(
                candidate = %candidate.label(),
                matched = decision.matched,
                reason = changed_reason.as_deref().unwrap_or_default(),
                "Verification flipped decision"
            );
        } else {
            debug!(
                candidate = %candidate.label(),
                before = candidate.confidence(),
                after = decision.confidence,
                "Verification kept decision"
            );
        }

        Ok((
            VerificationResult {
                decision,
                changed_reason,
                enriched_fields: enriched,
                verified: evidence.is_found(),
            },
            usage,
        ))
    }
}

/// Apply the caller's verification policy to the model's verdict.
///
/// Without evidence the original decision stands, slightly discounted.
/// With evidence, experience above the ceiling rejects and experience in the
/// borderline band caps confidence.
pub fn apply_policy(
    policy: &VerificationPolicy,
    original: &MatchDecision,
    proposed: ProposedVerdict,
    experience_years: Option<u32>,
    has_evidence: bool,
) -> (MatchDecision, Option<String>) {
    if !has_evidence {
        let reasoning = format!("{} ({UNVERIFIED_NOTE})", original.reasoning);
        let decision = MatchDecision::new(
            original.matched,
            original.confidence - policy.no_evidence_discount,
            reasoning,
        );
        return (decision, None);
    }

    let mut matched = proposed.matched;
    let mut confidence = proposed.confidence;
    let mut reasoning = proposed.reasoning;
    let mut changed_reason = proposed.changed_reason.filter(|r| !r.trim().is_empty());

    if let Some(years) = experience_years {
        if years > policy.ceiling_years {
            let reason = format!(
                "Requires {years} years of experience, above the {}-year ceiling",
                policy.ceiling_years
            );
            if matched {
                confidence = confidence.max(0.8);
            }
            matched = false;
            reasoning = if reasoning.trim().is_empty() {
                reason.clone()
            } else {
                format!("{reasoning}. {reason}")
            };
            changed_reason = Some(reason);
        } else if years >= policy.borderline_years && matched {
            confidence = confidence.min(policy.borderline_confidence);
            reasoning = format!("{reasoning} (borderline: requires {years} years of experience)");
        }
    }

    if matched == original.matched {
        changed_reason = None;
    } else if changed_reason.is_none() {
        changed_reason = Some(reasoning.clone());
    }

    (MatchDecision::new(matched, confidence, reasoning), changed_reason)
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_verifier_system_prompt(criteria: &MatchCriteria, policy: &VerificationPolicy) -> String {
    let mut prompt = String::from(
        "You are a verification engine. A preliminary match decision was made from a short email snippet. \
         Re-check it against the full description of the opportunity.\n\n\
         Look for disqualifiers that only appear in the full text: explicit seniority or years-of-experience \
         thresholds, and role-type keywords buried in boilerplate.\n\n",
    );
    prompt.push_str(&format!(
        "Experience policy: below {b} years passes at normal confidence; {b} to {c} years is borderline \
         (keep the match, confidence at most {conf:.1}); above {c} years is a rejection.\n",
        b = policy.borderline_years,
        c = policy.ceiling_years,
        conf = policy.borderline_confidence,
    ));
    prompt.push_str(
        "If no full description is available, keep the original decision.\n\
         Set changed_reason only if your decision differs from the preliminary one.\n\
         Report the minimum years of experience required as experience_years (null if not stated).\n\
         In enriched_fields give: deadline, required_technologies, nice_to_have_technologies, \
         work_arrangement, location. Use null for anything not stated.\n",
    );

    prompt.push_str("\nMatch criteria:\n");
    prompt.push_str(criteria.criteria.trim());
    prompt.push('\n');
    if !criteria.hard_disqualifiers.is_empty() {
        prompt.push_str("\nHard disqualifiers:\n");
        for (i, d) in criteria.hard_disqualifiers.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, d.trim()));
        }
    }
    if let Some(intent) = &criteria.user_intent {
        prompt.push_str("\nWhat the user is trying to achieve:\n");
        prompt.push_str(intent.trim());
        prompt.push('\n');
    }
    prompt
}

fn build_verifier_user_prompt(candidate: &Candidate, evidence: &EvidenceRecord, limits: &LimitsConfig) -> String {
    let mut prompt = String::with_capacity(limits.max_evidence_chars + 1024);

    prompt.push_str(&format!("Opportunity: {}\n", candidate.label()));
    prompt.push_str(&format!(
        "Preliminary decision: matched={}, confidence={:.2}\nReasoning: {}\n",
        candidate.matched(),
        candidate.confidence(),
        candidate.reasoning()
    ));
    if !candidate.extracted_fields.is_empty() {
        prompt.push_str(&format!(
            "Fields from the email: {}\n",
            serde_json::Value::Object(candidate.extracted_fields.clone())
        ));
    }

    match (evidence.primary_source(), evidence.evidence_text()) {
        (Some(source), Some(text)) => {
            prompt.push_str(&format!("\nFull description (from {}):\n", source.url));
            prompt.push_str(&truncate_body(text, limits.max_evidence_chars));
        }
        _ => {
            prompt.push_str("\nNo full description could be found.");
            if let Some(failure) = &evidence.failure {
                prompt.push_str(&format!(" Research outcome: {failure}."));
            }
        }
    }
    prompt
}

fn verification_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "matched": {"type": "boolean"},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1},
            "reasoning": {"type": "string"},
            "changed_reason": {"type": ["string", "null"]},
            "experience_years": {"type": ["integer", "null"]},
            "enriched_fields": {
                "type": "object",
                "properties": {
                    "deadline": {"type": ["string", "null"]},
                    "required_technologies": {"type": "array", "items": {"type": "string"}},
                    "nice_to_have_technologies": {"type": "array", "items": {"type": "string"}},
                    "work_arrangement": {"type": ["string", "null"]},
                    "location": {"type": ["string", "null"]}
                }
            }
        },
        "required": ["matched", "confidence", "reasoning"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fields::StructuredFields;
    use crate::pipeline::types::{EvidenceSource, ResearchFailure, SourceType};
    use crate::testing::ScriptedLlm;

    fn candidate() -> Candidate {
        let mut c = Candidate::new(0, "Acme A/S", "Backend Developer", MatchDecision::accept(0.8, "software role"));
        c.extracted_fields.insert("salary".into(), serde_json::json!("competitive"));
        c
    }

    fn found(text: &str, years: Option<u32>) -> EvidenceRecord {
        EvidenceRecord::found(
            0,
            EvidenceSource {
                url: "https://acme.dk/jobs/1".into(),
                title: "Backend Developer".into(),
                source_type: SourceType::CompanyCareerPage,
                content: text.into(),
            },
            vec![],
            StructuredFields {
                experience_years: years,
                ..Default::default()
            },
            2,
            String::new(),
        )
    }

    fn not_found() -> EvidenceRecord {
        EvidenceRecord::not_found(0, vec![], 15, String::new(), ResearchFailure::BudgetExhausted { iterations: 15 })
    }

    fn verifier(llm: Arc<ScriptedLlm>) -> Verifier {
        Verifier::new(
            llm,
            MatchCriteria {
                criteria: "Software roles, under 5 years".into(),
                ..Default::default()
            },
            VerificationPolicy::default(),
            LimitsConfig::default(),
        )
    }

    fn verdict(matched: bool, confidence: f32) -> ProposedVerdict {
        ProposedVerdict {
            matched,
            confidence,
            reasoning: "looks fine".into(),
            changed_reason: None,
            experience_years: None,
            enriched_fields: serde_json::Map::new(),
        }
    }

    #[tokio::test]
    async fn experience_above_ceiling_rejects() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"{"matched": true, "confidence": 0.7, "reasoning": "Backend role", "experience_years": 8,
                "enriched_fields": {"deadline": "2026-12-01", "work_arrangement": null}}"#,
        ]));
        let (result, usage) = verifier(llm.clone())
            .verify(&candidate(), &found("8+ years of experience required", None))
            .await
            .unwrap();

        assert!(!result.decision.matched);
        assert!(result.changed_reason.as_deref().unwrap().contains("8 years"));
        assert_eq!(result.enriched_fields["deadline"], "2026-12-01");
        assert_eq!(result.enriched_fields["experience_years"], 8);
        assert!(!result.enriched_fields.contains_key("work_arrangement"));
        assert!(result.verified);
        assert_eq!(usage.output_tokens, 20);

        let system = &llm.requests()[0].messages[0].content;
        assert!(system.starts_with("You are a verification engine"));
    }

    #[tokio::test]
    async fn borderline_experience_caps_confidence() {
        let llm = Arc::new(ScriptedLlm::new(&[r#"{"matched": true, "confidence": 0.9, "reasoning": "Good fit"}"#]));
        let (result, _) = verifier(llm)
            .verify(&candidate(), &found("Backend developer", Some(4)))
            .await
            .unwrap();
        assert!(result.decision.matched);
        assert!((result.decision.confidence - 0.6).abs() < f32::EPSILON);
        assert!(result.decision.reasoning.contains("borderline"));
        assert!(result.changed_reason.is_none());
    }

    #[tokio::test]
    async fn explicit_null_experience_overrides_heuristic() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"{"matched": true, "confidence": 0.8, "reasoning": "Entry-level backend role", "experience_years": null}"#,
        ]));
        let evidence = found(
            "Acme A/S builds on more than 20 years of experience in payments. No prior experience needed.",
            Some(20),
        );
        let (result, _) = verifier(llm).verify(&candidate(), &evidence).await.unwrap();

        assert!(result.decision.matched);
        assert!(result.changed_reason.is_none());
        assert!(!result.enriched_fields.contains_key("experience_years"));
    }

    #[tokio::test]
    async fn missing_experience_falls_back_to_heuristic() {
        let llm = Arc::new(ScriptedLlm::new(&[r#"{"matched": true, "confidence": 0.8, "reasoning": "Backend role"}"#]));
        let (result, _) = verifier(llm)
            .verify(&candidate(), &found("Senior backend developer", Some(9)))
            .await
            .unwrap();
        assert!(!result.decision.matched);
        assert!(result.changed_reason.as_deref().unwrap().contains("9 years"));
    }

    #[tokio::test]
    async fn no_evidence_keeps_decision_with_discount() {
        let llm = Arc::new(ScriptedLlm::new(&[r#"{"matched": false, "confidence": 0.9, "reasoning": "unsure"}"#]));
        let (result, _) = verifier(llm.clone()).verify(&candidate(), &not_found()).await.unwrap();

        assert_eq!(llm.requests().len(), 1);
        assert!(llm.last_user_prompt().contains("No full description"));
        assert!(result.decision.matched);
        assert!((result.decision.confidence - 0.7).abs() < 1e-6);
        assert!(result.decision.reasoning.contains(UNVERIFIED_NOTE));
        assert!(result.changed_reason.is_none());
        assert!(!result.verified);
    }

    #[tokio::test]
    async fn model_rejection_carries_changed_reason() {
        let llm = Arc::new(ScriptedLlm::new(&[
            r#"{"matched": false, "confidence": 0.85, "reasoning": "Actually a PLC role", "changed_reason": "Full text describes PLC programming"}"#,
        ]));
        let (result, _) = verifier(llm)
            .verify(&candidate(), &found("PLC programming in Siemens TIA", None))
            .await
            .unwrap();
        assert!(!result.decision.matched);
        assert_eq!(result.changed_reason.as_deref(), Some("Full text describes PLC programming"));
    }

    #[tokio::test]
    async fn malformed_reply_is_verification_error() {
        let llm = Arc::new(ScriptedLlm::new(&["not json"]));
        let err = verifier(llm).verify(&candidate(), &found("text", None)).await.unwrap_err();
        assert!(matches!(err, PipelineError::Verification(_)));
    }

    #[test]
    fn policy_below_borderline_is_untouched() {
        let original = MatchDecision::accept(0.8, "fits");
        let (d, changed) = apply_policy(&VerificationPolicy::default(), &original, verdict(true, 0.9), Some(2), true);
        assert!(d.matched);
        assert_eq!(d.confidence, 0.9);
        assert!(changed.is_none());
    }

    #[test]
    fn policy_ceiling_is_inclusive_borderline() {
        let original = MatchDecision::accept(0.8, "fits");
        let (d, _) = apply_policy(&VerificationPolicy::default(), &original, verdict(true, 0.9), Some(5), true);
        assert!(d.matched);
        assert!(d.confidence <= 0.6);
    }

    #[test]
    fn policy_clamps_confidence() {
        let original = MatchDecision::accept(0.05, "weak");
        let (d, _) = apply_policy(&VerificationPolicy::default(), &original, verdict(true, 0.05), None, false);
        assert_eq!(d.confidence, 0.0);
        assert!(d.matched);
    }

    #[test]
    fn changed_reason_dropped_when_decision_unchanged() {
        let original = MatchDecision::accept(0.8, "fits");
        let mut v = verdict(true, 0.7);
        v.changed_reason = Some("nothing changed really".into());
        let (_, changed) = apply_policy(&VerificationPolicy::default(), &original, v, None, true);
        assert!(changed.is_none());
    }
}
