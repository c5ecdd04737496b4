//! Aggregator: fold research output back onto candidates and summarise.
//!
//! Pure data shaping. Match decisions are never changed here.

use serde_json::{Value, json};

use crate::pipeline::types::{Candidate, EvidenceRecord};

/// Matched candidates below this confidence are shown as tentative.
const TENTATIVE_BELOW: f32 = 0.7;

/// Aggregated view of a run.
#[derive(Debug, Clone)]
pub struct AggregateOutput {
    pub candidates: Vec<Candidate>,
    pub has_matches: bool,
    pub summary: String,
}

/// Attach evidence to candidates, recompute `has_matches`, render the summary.
pub fn aggregate(mut candidates: Vec<Candidate>, records: &[EvidenceRecord], preview_chars: usize) -> AggregateOutput {
    for candidate in &mut candidates {
        if let Some(record) = records.iter().find(|r| r.candidate_index == candidate.index) {
            attach_evidence(candidate, record, preview_chars);
        }
        for value in candidate.extracted_fields.values_mut() {
            truncate_value(value, preview_chars);
        }
    }

    let has_matches = candidates.iter().any(|c| c.matched());
    let summary = render_summary(&candidates);
    AggregateOutput {
        candidates,
        has_matches,
        summary,
    }
}

fn attach_evidence(candidate: &mut Candidate, record: &EvidenceRecord, preview_chars: usize) {
    let primary = record.primary_source();
    let fields = &mut candidate.extracted_fields;

    fields.insert(
        "research".into(),
        json!({
            "found": record.is_found(),
            "source_url": primary.map(|s| s.url.as_str()),
            "source_title": primary.map(|s| s.title.as_str()).filter(|t| !t.is_empty()),
            "source_type": primary.map(|s| s.source_type.to_string()),
            "sources_checked": record.sources.len(),
            "iterations": record.iterations,
            "failure": record.failure.as_ref().map(|f| f.to_string()),
        }),
    );

    if !record.requirements.is_empty() {
        fields.insert("requirements".into(), json!(record.requirements));
    }
    insert_absent(fields, "deadline", record.deadline.as_ref().map(|d| json!(d)));
    insert_absent(fields, "experience_years", record.experience_years.map(|y| json!(y)));
    insert_absent(fields, "work_arrangement", record.work_arrangement.as_ref().map(|w| json!(w)));
    if let Some(text) = record.evidence_text() {
        fields.insert("evidence_preview".into(), json!(preview(text, preview_chars)));
    }

    for tech in &record.technologies {
        if !candidate.technologies.iter().any(|t| t.eq_ignore_ascii_case(tech)) {
            candidate.technologies.push(tech.clone());
        }
    }
    if !candidate.technologies.is_empty() {
        candidate
            .extracted_fields
            .insert("technologies".into(), json!(candidate.technologies));
    }
}

fn insert_absent(fields: &mut serde_json::Map<String, Value>, key: &str, value: Option<Value>) {
    let Some(value) = value else { return };
    let present = fields.get(key).is_some_and(|v| !v.is_null());
    if !present {
        fields.insert(key.to_string(), value);
    }
}

fn truncate_value(value: &mut Value, max_chars: usize) {
    match value {
        Value::String(s) if s.chars().count() > max_chars => *s = preview(s, max_chars),
        Value::Object(map) => map.values_mut().for_each(|v| truncate_value(v, max_chars)),
        Value::Array(items) => items.iter_mut().for_each(|v| truncate_value(v, max_chars)),
        _ => {}
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}…", text[..cut].trim_end()),
        None => text.to_string(),
    }
}

/// One line per candidate: glyph, label, confidence, source, deadline.
pub fn render_summary(candidates: &[Candidate]) -> String {
    let matched = candidates.iter().filter(|c| c.matched()).count();
    let mut out = format!("{} opportunities, {matched} matched\n", candidates.len());

    for c in candidates {
        let glyph = match (c.matched(), c.confidence() < TENTATIVE_BELOW) {
            (true, false) => '✓',
            (true, true) => '~',
            (false, _) => '✗',
        };
        out.push_str(&format!("{glyph} {} [{:.2}]", c.label(), c.confidence()));

        let source = c
            .extracted_fields
            .get("research")
            .and_then(|r| r.get("source_url"))
            .and_then(Value::as_str)
            .or(c.source_url.as_deref());
        if let Some(source) = source {
            out.push_str(&format!(" source: {source}"));
        }
        if let Some(deadline) = c.extracted_fields.get("deadline").and_then(Value::as_str) {
            out.push_str(&format!(" deadline: {deadline}"));
        }
        if !c.matched() {
            out.push_str(&format!(" ({})", c.reasoning()));
        }
        out.push('\n');
    }
    out
}
