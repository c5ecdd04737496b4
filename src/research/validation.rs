//! Evidence validation checklist.
//!
//! A retrieved page is only evidence if it names the organisation and the
//! role, is not located in another country, and is not a generic template.
//! Any failed check rejects the page.

use serde::Serialize;

use crate::pipeline::types::Candidate;
use crate::research::synonyms::{contains_phrase, normalize_title, title_synonyms};

/// Legal-form suffixes stripped from organisation names.
const LEGAL_SUFFIXES: &[&str] = &[
    "a/s", "aps", "as", "i/s", "p/s", "ivs", "ab", "asa", "oy", "oyj", "gmbh", "ag", "bv", "b.v.",
    "nv", "n.v.", "sa", "s.a.", "ltd", "ltd.", "limited", "inc", "inc.", "llc", "plc", "corp",
    "corp.", "corporation", "co.", "group", "holding",
];

/// First words too generic to identify an organisation alone.
const GENERIC_FIRST_WORDS: &[&str] = &["the", "den", "det", "de", "danish", "dansk", "international", "global", "new"];

const TEMPLATE_URL_PATTERNS: &[&str] = &[
    "job-description/templates",
    "job-descriptions/templates",
    "/hire/job-description",
    "job-description-template",
    "job-description-sample",
    "sample-job-description",
    "job-description-example",
    "/resources/job-descriptions",
    "/templates/job",
];

const TEMPLATE_TEXT_PATTERNS: &[&str] = &[
    "[company name]",
    "[your company]",
    "[company]",
    "{company}",
    "{{company",
    "<company name>",
    "job description template",
    "use this template",
    "customize this template",
    "insert your company",
];

/// Sentences with these describe the company, not the job.
const HQ_MARKERS: &[&str] = &["headquarter", "head office", "hq", "hovedsæde", "hovedkontor"];

/// Sentences with these state where the work happens.
const LOCATION_MARKERS: &[&str] = &[
    "based in",
    "located in",
    "location:",
    "position is in",
    "role is in",
    "work from our",
    "arbejdssted",
    "placeret i",
];

/// Place names mapped to ISO country codes.
const GAZETTEER: &[(&str, &str)] = &[
    ("denmark", "DK"),
    ("danmark", "DK"),
    ("copenhagen", "DK"),
    ("københavn", "DK"),
    ("kobenhavn", "DK"),
    ("aarhus", "DK"),
    ("odense", "DK"),
    ("aalborg", "DK"),
    ("lyngby", "DK"),
    ("frederiksberg", "DK"),
    ("ballerup", "DK"),
    ("sweden", "SE"),
    ("sverige", "SE"),
    ("stockholm", "SE"),
    ("malmö", "SE"),
    ("malmo", "SE"),
    ("gothenburg", "SE"),
    ("göteborg", "SE"),
    ("norway", "NO"),
    ("norge", "NO"),
    ("oslo", "NO"),
    ("bergen", "NO"),
    ("finland", "FI"),
    ("helsinki", "FI"),
    ("germany", "DE"),
    ("deutschland", "DE"),
    ("berlin", "DE"),
    ("munich", "DE"),
    ("münchen", "DE"),
    ("hamburg", "DE"),
    ("netherlands", "NL"),
    ("amsterdam", "NL"),
    ("rotterdam", "NL"),
    ("united kingdom", "GB"),
    ("england", "GB"),
    ("london", "GB"),
    ("manchester", "GB"),
    ("poland", "PL"),
    ("warsaw", "PL"),
    ("krakow", "PL"),
    ("france", "FR"),
    ("paris", "FR"),
    ("spain", "ES"),
    ("madrid", "ES"),
    ("barcelona", "ES"),
    ("united states", "US"),
    ("usa", "US"),
    ("new york", "US"),
    ("san francisco", "US"),
    ("seattle", "US"),
    ("india", "IN"),
    ("bangalore", "IN"),
    ("bengaluru", "IN"),
    ("pune", "IN"),
];

/// One checklist item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckResult {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

/// Outcome of the full checklist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// `name: detail` for every failed check.
    pub fn failed_checks(&self) -> Vec<String> {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| format!("{}: {}", c.name, c.detail))
            .collect()
    }
}

/// What the page must corroborate.
#[derive(Debug, Clone, Copy)]
pub struct ValidationTarget<'a> {
    pub organization: &'a str,
    pub title: &'a str,
    pub location: Option<&'a str>,
}

impl<'a> From<&'a Candidate> for ValidationTarget<'a> {
    fn from(c: &'a Candidate) -> Self {
        Self {
            organization: &c.organization,
            title: &c.title,
            location: c.location.as_deref(),
        }
    }
}

/// Run the checklist over a retrieved page.
pub fn validate_evidence(target: ValidationTarget<'_>, url: &str, text: &str) -> ValidationReport {
    let lower = text.to_lowercase();
    ValidationReport {
        checks: vec![
            check_content(text),
            check_organization(target.organization, &lower),
            check_title(target.title, &lower),
            check_location(target.location, target.title, &lower),
            check_template(url, &lower),
        ],
    }
}

fn check_content(text: &str) -> CheckResult {
    let passed = !text.trim().is_empty();
    CheckResult {
        name: "content",
        passed,
        detail: if passed { "page has text".into() } else { "page is empty".into() },
    }
}

fn check_organization(organization: &str, lower_text: &str) -> CheckResult {
    let variants = organization_variants(organization);
    if variants.is_empty() {
        return CheckResult {
            name: "organization",
            passed: false,
            detail: "candidate has no organization to match".into(),
        };
    }

    let squashed: String = lower_text.chars().filter(|c| !c.is_whitespace()).collect();
    match variants
        .iter()
        .find(|v| contains_phrase(lower_text, v) || (!v.contains(' ') && v.len() > 4 && squashed.contains(v.as_str())))
    {
        Some(v) => CheckResult {
            name: "organization",
            passed: true,
            detail: format!("found '{v}'"),
        },
        None => CheckResult {
            name: "organization",
            passed: false,
            detail: format!("'{organization}' not mentioned"),
        },
    }
}

fn check_title(title: &str, lower_text: &str) -> CheckResult {
    let normalized = normalize_title(title);
    if normalized.is_empty() {
        return CheckResult {
            name: "title",
            passed: true,
            detail: "no title to check".into(),
        };
    }
    if contains_phrase(lower_text, &normalized) {
        return CheckResult {
            name: "title",
            passed: true,
            detail: format!("found '{normalized}'"),
        };
    }
    match title_synonyms(title)
        .into_iter()
        .find(|s| contains_phrase(lower_text, s))
    {
        Some(s) => CheckResult {
            name: "title",
            passed: true,
            detail: format!("found synonym '{s}'"),
        },
        None => CheckResult {
            name: "title",
            passed: false,
            detail: format!("'{title}' or a synonym not mentioned"),
        },
    }
}

fn check_location(location: Option<&str>, title: &str, lower_text: &str) -> CheckResult {
    let Some(location) = location.filter(|l| !l.trim().is_empty()) else {
        return CheckResult {
            name: "location",
            passed: true,
            detail: "no location specified".into(),
        };
    };
    let Some(expected) = country_of(location) else {
        return CheckResult {
            name: "location",
            passed: true,
            detail: format!("'{location}' not in gazetteer"),
        };
    };

    // Sentences naming the role or a work location decide; headquarters
    // sentences never count. Otherwise every non-HQ mention counts.
    let mut role_countries: Vec<&'static str> = Vec::new();
    let mut other_countries: Vec<&'static str> = Vec::new();
    let role_phrases = role_phrases(title);
    for sentence in lower_text.split(['.', '\n', '!', '?', ';']) {
        if HQ_MARKERS.iter().any(|m| sentence.contains(m)) {
            continue;
        }
        let about_role = LOCATION_MARKERS.iter().any(|m| sentence.contains(m))
            || role_phrases.iter().any(|p| contains_phrase(sentence, p));
        let bucket = if about_role { &mut role_countries } else { &mut other_countries };
        for code in countries_in(sentence) {
            if !bucket.contains(&code) {
                bucket.push(code);
            }
        }
    }

    let deciding = if role_countries.is_empty() { &other_countries } else { &role_countries };
    if deciding.is_empty() || deciding.contains(&expected) {
        return CheckResult {
            name: "location",
            passed: true,
            detail: format!("consistent with {expected}"),
        };
    }
    CheckResult {
        name: "location",
        passed: false,
        detail: format!("expected {expected}, role is in {}", deciding.join("/")),
    }
}

/// Normalized title plus its synonyms, for spotting sentences about the role.
fn role_phrases(title: &str) -> Vec<String> {
    let mut phrases = vec![normalize_title(title)];
    phrases.extend(title_synonyms(title));
    phrases.retain(|p| !p.is_empty());
    phrases
}

fn check_template(url: &str, lower_text: &str) -> CheckResult {
    if is_template_url(url) {
        return CheckResult {
            name: "template",
            passed: false,
            detail: "URL matches a job-description template pattern".into(),
        };
    }
    match TEMPLATE_TEXT_PATTERNS.iter().find(|p| lower_text.contains(*p)) {
        Some(p) => CheckResult {
            name: "template",
            passed: false,
            detail: format!("page contains placeholder '{p}'"),
        },
        None => CheckResult {
            name: "template",
            passed: true,
            detail: "no template markers".into(),
        },
    }
}

/// Whether a URL looks like a generic job-description template.
pub fn is_template_url(url: &str) -> bool {
    let lower = url.to_lowercase();
    TEMPLATE_URL_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Lowercased name variants: full name, legal suffix stripped, no-space
/// form and first word.
pub fn organization_variants(organization: &str) -> Vec<String> {
    let full = organization.trim().to_lowercase();
    if full.is_empty() {
        return Vec::new();
    }

    let mut words: Vec<&str> = full.split_whitespace().collect();
    while words.len() > 1 && words.last().is_some_and(|w| LEGAL_SUFFIXES.contains(&w.trim_matches(','))) {
        words.pop();
    }
    let stripped = words.join(" ").trim_end_matches(',').to_string();

    let mut variants = vec![full.clone()];
    let mut push = |v: String| {
        if !v.is_empty() && !variants.contains(&v) {
            variants.push(v);
        }
    };
    push(stripped.clone());
    push(stripped.replace(' ', ""));
    if let Some(first) = words.first()
        && words.len() > 1
        && first.chars().count() >= 3
        && !GENERIC_FIRST_WORDS.contains(first)
    {
        push((*first).to_string());
    }
    variants
}

/// Country code for a location string, if recognised.
pub fn country_of(location: &str) -> Option<&'static str> {
    let lower = location.to_lowercase();
    GAZETTEER
        .iter()
        .find(|(place, _)| contains_phrase(&lower, place))
        .map(|(_, code)| *code)
}

/// Every country mentioned in already-lowercased text, in gazetteer order.
fn countries_in(lower_text: &str) -> Vec<&'static str> {
    let mut found: Vec<&'static str> = Vec::new();
    for (place, code) in GAZETTEER {
        if !found.contains(code) && contains_phrase(lower_text, place) {
            found.push(*code);
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target<'a>(location: Option<&'a str>) -> ValidationTarget<'a> {
        ValidationTarget {
            organization: "Acme A/S",
            title: "Backend Developer",
            location,
        }
    }

    const GOOD_PAGE: &str = "Acme is hiring a Backend Developer for our office in Copenhagen, Denmark. \
                             You will build services in Rust.";

    #[test]
    fn good_page_passes() {
        let report = validate_evidence(target(Some("Copenhagen")), "https://acme.dk/careers/42", GOOD_PAGE);
        assert!(report.passed(), "{:?}", report.failed_checks());
    }

    #[test]
    fn organization_variants_strip_legal_suffix() {
        let v = organization_variants("Nordic Data Systems A/S");
        assert!(v.contains(&"nordic data systems".to_string()));
        assert!(v.contains(&"nordicdatasystems".to_string()));
        assert!(v.contains(&"nordic".to_string()));
        assert!(organization_variants("  ").is_empty());
    }

    #[test]
    fn no_space_variant_matches_domain_style_text() {
        let report = validate_evidence(
            ValidationTarget {
                organization: "Blue Ocean ApS",
                title: "Software Engineer",
                location: None,
            },
            "https://blueocean.dk/jobs/1",
            "Join BlueOcean as a software engineer.",
        );
        assert!(report.passed(), "{:?}", report.failed_checks());
    }

    #[test]
    fn synonym_title_passes() {
        let report = validate_evidence(
            target(None),
            "https://acme.dk/jobs/7",
            "Acme søger en backend udvikler til teamet i Aarhus.",
        );
        assert!(report.passed(), "{:?}", report.failed_checks());
    }

    #[test]
    fn wrong_country_fails() {
        let page = "Acme is hiring a Backend Developer in Berlin, Germany.";
        let report = validate_evidence(target(Some("Copenhagen, Denmark")), "https://acme.com/jobs/9", page);
        assert!(!report.passed());
        assert!(report.failed_checks().iter().any(|c| c.starts_with("location")));
    }

    #[test]
    fn headquarters_country_does_not_vouch_for_the_role() {
        let page = "Acme is headquartered in Copenhagen, Denmark. \
                    This Backend Developer role is based in Berlin, Germany.";
        let report = validate_evidence(target(Some("Copenhagen, Denmark")), "https://acme.com/jobs/3", page);
        assert!(!report.passed());
        assert!(report.failed_checks().iter().any(|c| c.starts_with("location") && c.contains("DE")));
    }

    #[test]
    fn role_sentence_outweighs_other_offices() {
        let page = "Acme has offices in Stockholm, Sweden and Oslo, Norway. \
                    We are hiring a Backend Developer for our team in Aarhus.";
        let report = validate_evidence(target(Some("Aarhus")), "https://acme.com/jobs/4", page);
        assert!(report.passed(), "{:?}", report.failed_checks());
    }

    #[test]
    fn foreign_hq_with_local_role_passes() {
        let page = "Acme AB is headquartered in Stockholm, Sweden. \
                    The Backend Developer position is in Copenhagen.";
        let report = validate_evidence(target(Some("Copenhagen")), "https://acme.com/jobs/5", page);
        assert!(report.passed(), "{:?}", report.failed_checks());
    }

    #[test]
    fn empty_organization_fails_the_check() {
        let report = validate_evidence(
            ValidationTarget {
                organization: "  ",
                title: "Backend Developer",
                location: None,
            },
            "https://jobs.example/1",
            "Backend Developer wanted.",
        );
        assert!(!report.passed());
        assert!(report.failed_checks()[0].starts_with("organization"));
    }

    #[test]
    fn unmentioned_location_is_not_disproof() {
        let page = "Acme is hiring a Backend Developer.";
        let report = validate_evidence(target(Some("Copenhagen")), "https://acme.dk/jobs/9", page);
        assert!(report.passed());
    }

    #[test]
    fn template_url_fails_even_if_text_matches() {
        let report = validate_evidence(
            target(Some("Copenhagen")),
            "https://www.indeed.com/hire/job-description/templates/backend-developer",
            GOOD_PAGE,
        );
        assert!(!report.passed());
        assert!(report.failed_checks().iter().any(|c| c.starts_with("template")));
    }

    #[test]
    fn placeholder_text_fails() {
        let page = "Acme Backend Developer. [Company Name] is looking for a backend developer.";
        let report = validate_evidence(target(None), "https://example.com/post", page);
        assert!(!report.passed());
    }

    #[test]
    fn missing_organization_fails() {
        let report = validate_evidence(target(None), "https://other.dk/jobs/1", "Backend Developer wanted.");
        assert_eq!(report.failed_checks().len(), 1);
        assert!(report.failed_checks()[0].starts_with("organization"));
    }

    #[test]
    fn country_lookup() {
        assert_eq!(country_of("København K"), Some("DK"));
        assert_eq!(country_of("Remote"), None);
        assert_eq!(country_of("London, UK"), Some("GB"));
    }
}
