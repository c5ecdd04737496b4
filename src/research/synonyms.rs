//! Job-title synonym table, English and Danish.

/// Groups of interchangeable titles. Matching is case-insensitive.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &[
        "backend developer",
        "back-end developer",
        "backend engineer",
        "back-end engineer",
        "server-side developer",
        "backend udvikler",
    ],
    &[
        "frontend developer",
        "front-end developer",
        "frontend engineer",
        "ui developer",
        "frontend udvikler",
    ],
    &[
        "full stack developer",
        "fullstack developer",
        "full-stack developer",
        "full stack engineer",
        "fullstack udvikler",
    ],
    &[
        "software developer",
        "software engineer",
        "software programmer",
        "softwareudvikler",
        "systemudvikler",
        "it-udvikler",
    ],
    &[
        "devops engineer",
        "site reliability engineer",
        "sre",
        "platform engineer",
        "cloud engineer",
    ],
    &[
        "data engineer",
        "data developer",
        "etl developer",
        "dataingeniør",
    ],
    &[
        "data scientist",
        "machine learning engineer",
        "ml engineer",
        "data analyst",
    ],
    &[
        "mobile developer",
        "ios developer",
        "android developer",
        "app developer",
        "app-udvikler",
    ],
    &[
        "test engineer",
        "qa engineer",
        "software tester",
        "test automation engineer",
        "testingeniør",
    ],
    &[
        "student developer",
        "student assistant",
        "studentermedhjælper",
        "studentermedarbejder",
        "studiejob",
    ],
    &[
        "graduate developer",
        "junior developer",
        "junior software engineer",
        "nyuddannet udvikler",
        "dimittend",
    ],
    &["intern", "internship", "praktikant", "praktikophold"],
    &["plc programmer", "plc developer", "automation engineer", "automationsingeniør", "plc-programmør"],
];

/// Seniority and level words ignored when comparing titles.
const TITLE_NOISE: &[&str] = &["senior", "junior", "lead", "principal", "staff", "medior", "(m/f/d)", "(m/k)"];

/// Lowercase the title and drop seniority words.
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .split_whitespace()
        .filter(|w| !TITLE_NOISE.contains(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Known synonyms for `title`, excluding the title itself. Titles that only
/// contain a known phrase still get that phrase's group.
pub fn title_synonyms(title: &str) -> Vec<String> {
    let normalized = normalize_title(title);
    if normalized.is_empty() {
        return Vec::new();
    }

    let mut out: Vec<String> = Vec::new();
    for group in SYNONYM_GROUPS {
        let hit = group
            .iter()
            .any(|s| normalized == *s || contains_phrase(&normalized, s));
        if !hit {
            continue;
        }
        for s in group.iter() {
            if *s != normalized && !out.iter().any(|o| o == s) {
                out.push((*s).to_string());
            }
        }
    }
    out
}

/// Whether `haystack` contains `phrase` on word boundaries.
pub fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .is_none_or(|c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .is_none_or(|c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}
