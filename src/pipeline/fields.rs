//! Heuristic structured-field extraction over validated evidence text.
//!
//! Pattern scraping only. Callers go through `extract_structured_fields`
//! so this can be swapped for a model call without touching them.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_REQUIREMENTS: usize = 12;

/// Fields pulled out of a job description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredFields {
    pub requirements: Vec<String>,
    pub technologies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    /// Strictest minimum years of experience stated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experience_years: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_arrangement: Option<String>,
}

/// Canonical name and match pattern for each recognised technology.
const TECHNOLOGIES: &[(&str, &str)] = &[
    ("Rust", "rust"),
    ("Python", "python"),
    ("Java", "java"),
    ("JavaScript", "javascript"),
    ("TypeScript", "typescript"),
    ("Go", "golang"),
    ("C#", "c#"),
    ("C++", "c++"),
    (".NET", ".net"),
    ("Kotlin", "kotlin"),
    ("Swift", "swift"),
    ("PHP", "php"),
    ("Ruby", "ruby"),
    ("Scala", "scala"),
    ("React", "react"),
    ("Angular", "angular"),
    ("Vue", "vue"),
    ("Node.js", "node.js"),
    ("Django", "django"),
    ("Spring", "spring boot"),
    ("Kubernetes", "kubernetes"),
    ("Docker", "docker"),
    ("AWS", "aws"),
    ("Azure", "azure"),
    ("GCP", "gcp"),
    ("PostgreSQL", "postgresql"),
    ("PostgreSQL", "postgres"),
    ("MySQL", "mysql"),
    ("MongoDB", "mongodb"),
    ("Redis", "redis"),
    ("Kafka", "kafka"),
    ("Terraform", "terraform"),
    ("GraphQL", "graphql"),
    ("SQL", "sql"),
    ("Linux", "linux"),
    ("Git", "git"),
    ("PLC", "plc"),
];

static TECH_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    TECHNOLOGIES
        .iter()
        .map(|(name, needle)| {
            let pattern = format!(
                r"(?i)(?:^|[^a-z0-9+#.]){}(?:$|[^a-z0-9+#])",
                regex::escape(needle)
            );
            (*name, Regex::new(&pattern).expect("valid tech regex"))
        })
        .collect()
});

static REQUIREMENTS_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^\s*(?:requirements|qualifications|what you bring|what we expect|who you are|your profile|you have|must have|krav|kvalifikationer|din profil|vi forventer)\s*:?\s*$",
    )
    .expect("valid header regex")
});

static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:[-*•·–]|\d+[.)])\s+(.+)$").expect("valid bullet regex"));

static DEADLINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:application deadline|deadline|apply by|apply before|closing date|ansøgningsfrist|frist)\b\s*(?:is|er|:|-)?\s*((?:\d{1,2}(?:st|nd|rd|th)?\.?\s+[a-zæøå]{3,9}\.?(?:\s+\d{4})?|\d{1,2}[./-]\d{1,2}[./-]\d{2,4}|\d{4}-\d{2}-\d{2}|[a-z]{3,9}\s+\d{1,2}(?:st|nd|rd|th)?,?(?:\s+\d{4})?))\b",
    )
    .expect("valid deadline regex")
});

const MONTHS: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "maj", "jun", "jul", "aug", "sep", "oct", "okt", "nov", "dec",
];

static EXPERIENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(\d{1,2})\s*\+?\s*(?:(?:-|–|to)\s*\d{1,2}\s*\+?\s*)?(?:years?|yrs?|års?|år)\b[^.\n]{0,40}?(?:experience|erfaring)",
    )
    .expect("valid experience regex")
});

/// Phrases that make a years-of-experience mention a requirement on the
/// applicant rather than a claim about the company.
const REQUIREMENT_CUES: &[&str] = &[
    "minimum",
    "at least",
    "you have",
    "you bring",
    "you've",
    "you must",
    "you should",
    "requires",
    "required",
    "requirement",
    "must have",
    "ideally",
    "preferably",
    "we expect",
    "kræver",
    "mindst",
    "du har",
    "har du",
    "du skal",
    "vi forventer",
];

/// Pull requirements, technologies, deadline, experience and work arrangement out of `text`.
pub fn extract_structured_fields(text: &str) -> StructuredFields {
    StructuredFields {
        requirements: extract_requirements(text),
        technologies: extract_technologies(text),
        deadline: extract_deadline(text),
        experience_years: extract_experience_years(text),
        work_arrangement: extract_work_arrangement(text),
    }
}

fn extract_requirements(text: &str) -> Vec<String> {
    let Some(header) = REQUIREMENTS_HEADER.find(text) else {
        return Vec::new();
    };

    let mut items = Vec::new();
    for line in text[header.end()..].lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if items.is_empty() {
                continue;
            }
            break;
        }
        match BULLET.captures(trimmed) {
            Some(caps) => items.push(caps[1].trim().to_string()),
            // Un-bulleted line right after the header still counts; after
            // bullets it starts the next section.
            None if items.is_empty() => items.push(trimmed.to_string()),
            None => break,
        }
        if items.len() >= MAX_REQUIREMENTS {
            break;
        }
    }
    items
}

fn extract_technologies(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for (name, pattern) in TECH_PATTERNS.iter() {
        if pattern.is_match(text) && !found.iter().any(|f| f == name) {
            found.push((*name).to_string());
        }
    }
    found
}

fn extract_deadline(text: &str) -> Option<String> {
    DEADLINE
        .captures_iter(text)
        .map(|caps| caps[1].trim().trim_end_matches(['.', ',']).to_string())
        .find(|d| is_date_like(d))
}

/// Numeric dates always qualify; worded ones need a month name.
fn is_date_like(candidate: &str) -> bool {
    let lower = candidate.to_lowercase();
    if !lower.chars().any(|c| c.is_ascii_digit()) {
        return false;
    }
    let has_word = lower.chars().any(char::is_alphabetic);
    !has_word
        || lower
            .split(|c: char| !c.is_alphabetic())
            .any(|w| w.len() >= 3 && MONTHS.iter().any(|m| w.starts_with(m)))
}

fn extract_experience_years(text: &str) -> Option<u32> {
    EXPERIENCE
        .captures_iter(text)
        .filter(|caps| caps.get(0).is_some_and(|m| is_requirement_context(text, m.start())))
        .filter_map(|caps| caps[1].parse::<u32>().ok())
        .max()
}

/// A bulleted line, or a sentence with a requirement cue before `start`.
fn is_requirement_context(text: &str, start: usize) -> bool {
    let line_start = text[..start].rfind('\n').map_or(0, |i| i + 1);
    let line = text[line_start..].lines().next().unwrap_or_default();
    if BULLET.is_match(line) {
        return true;
    }
    let sentence_start = text[..start].rfind(['.', '\n', '!', '?']).map_or(0, |i| i + 1);
    let before = text[sentence_start..start].to_lowercase();
    REQUIREMENT_CUES.iter().any(|cue| before.contains(cue))
}

fn extract_work_arrangement(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    let arrangement = if lower.contains("hybrid") {
        "hybrid"
    } else if ["fully remote", "remote-first", "remote first", "work from home", "hjemmearbejde", "remote"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "remote"
    } else if ["on-site", "onsite", "on site", "in the office", "in-office"]
        .iter()
        .any(|k| lower.contains(k))
    {
        "on_site"
    } else {
        return None;
    };
    Some(arrangement.to_string())
}
