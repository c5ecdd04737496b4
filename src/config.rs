//! Configuration types.
//!
//! Free-text fields (criteria, extraction fields, intent, disqualifiers) are
//! passed verbatim into prompts. Nothing here interprets them.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Auth-walled domains the research agent never extracts from.
pub const DEFAULT_AUTH_DENYLIST: &[&str] = &[
    "linkedin.com",
    "facebook.com",
    "glassdoor.com",
    "xing.com",
    "instagram.com",
];

/// Caller-supplied match criteria.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchCriteria {
    /// What counts as a match, in the caller's own words.
    pub criteria: String,
    /// Which fields to extract per item.
    pub extraction_fields: String,
    /// Optional statement of what the user is trying to achieve.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_intent: Option<String>,
    /// Conditions that force rejection regardless of confidence.
    #[serde(default)]
    pub hard_disqualifiers: Vec<String>,
}

/// Optional domain preferences for research.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainFilters {
    /// Domains to favour when searching.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Domains to exclude from search results.
    #[serde(default)]
    pub deny: Vec<String>,
}

/// Research agent limits and strategy knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchConfig {
    /// Hard ceiling on tool invocations per candidate.
    pub max_iterations: u32,
    /// Candidates researched concurrently per batch.
    pub concurrency: usize,
    /// Results requested per search.
    pub results_per_search: usize,
    /// Top unvisited hits queued for extraction after each search.
    pub extracts_per_search: usize,
    /// Title-synonym queries tried after the direct strategies.
    pub max_synonym_queries: usize,
    /// Domains known to require authentication.
    pub auth_denylist: Vec<String>,
    /// Characters of extracted page text shown to the agent per observation.
    pub max_observation_chars: usize,
    /// Total prompt characters an agent may accumulate before giving up.
    pub max_context_chars: usize,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 15,
            concurrency: 3,
            results_per_search: 5,
            extracts_per_search: 2,
            max_synonym_queries: 3,
            auth_denylist: DEFAULT_AUTH_DENYLIST.iter().map(|d| d.to_string()).collect(),
            max_observation_chars: 4_000,
            max_context_chars: 120_000,
        }
    }
}

/// Caller policy applied when re-verifying a match against full evidence.
///
/// Years below `borderline_years` pass untouched, years in
/// `borderline_years..=ceiling_years` cap confidence at
/// `borderline_confidence`, anything above `ceiling_years` is rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationPolicy {
    pub borderline_years: u32,
    pub ceiling_years: u32,
    pub borderline_confidence: f32,
    /// Subtracted from confidence when no evidence could be found.
    pub no_evidence_discount: f32,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            borderline_years: 3,
            ceiling_years: 5,
            borderline_confidence: 0.6,
            no_evidence_discount: 0.1,
        }
    }
}

/// Size limits for prompts and stored previews.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Characters of normalized body sent to the classifier.
    pub max_body_chars: usize,
    /// URLs sent to the classifier.
    pub max_urls: usize,
    /// Characters kept for any URL sent to the classifier.
    pub max_url_chars: usize,
    /// Characters of evidence text sent to the verifier.
    pub max_evidence_chars: usize,
    /// Characters of full text kept in aggregated previews.
    pub preview_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_chars: 30_000,
            max_urls: 40,
            max_url_chars: 300,
            max_evidence_chars: 12_000,
            preview_chars: 500,
        }
    }
}

/// Everything a pipeline run needs besides its collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub criteria: MatchCriteria,
    #[serde(default)]
    pub domains: DomainFilters,
    #[serde(default)]
    pub research: ResearchConfig,
    #[serde(default)]
    pub verification: VerificationPolicy,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl PipelineConfig {
    /// Build config from environment variables.
    ///
    /// Criteria come from `SCOUT_CRITERIA` or the file named by
    /// `SCOUT_CRITERIA_FILE`; one of them is required.
    pub fn from_env() -> Result<Self, ConfigError> {
        let criteria = match std::env::var("SCOUT_CRITERIA") {
            Ok(c) if !c.trim().is_empty() => c,
            _ => match std::env::var("SCOUT_CRITERIA_FILE") {
                Ok(path) => std::fs::read_to_string(path)?,
                Err(_) => {
                    return Err(ConfigError::MissingRequired {
                        key: "SCOUT_CRITERIA".into(),
                        hint: "Set SCOUT_CRITERIA or SCOUT_CRITERIA_FILE".into(),
                    });
                }
            },
        };

        let criteria = MatchCriteria {
            criteria,
            extraction_fields: std::env::var("SCOUT_EXTRACTION_FIELDS").unwrap_or_else(|_| {
                "company, title, location, technologies, deadline, experience requirements".into()
            }),
            user_intent: std::env::var("SCOUT_USER_INTENT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            hard_disqualifiers: split_list(&std::env::var("SCOUT_DISQUALIFIERS").unwrap_or_default(), ';'),
        };

        let domains = DomainFilters {
            allow: split_list(&std::env::var("SCOUT_ALLOW_DOMAINS").unwrap_or_default(), ','),
            deny: split_list(&std::env::var("SCOUT_DENY_DOMAINS").unwrap_or_default(), ','),
        };

        let mut research = ResearchConfig::default();
        research.max_iterations = env_parse("SCOUT_MAX_ITERATIONS", research.max_iterations)?;
        research.concurrency = env_parse("SCOUT_RESEARCH_CONCURRENCY", research.concurrency)?.max(1);
        if let Ok(list) = std::env::var("SCOUT_AUTH_DENYLIST") {
            research.auth_denylist = split_list(&list, ',');
        }

        let mut verification = VerificationPolicy::default();
        verification.borderline_years =
            env_parse("SCOUT_EXPERIENCE_BORDERLINE", verification.borderline_years)?;
        verification.ceiling_years =
            env_parse("SCOUT_EXPERIENCE_CEILING", verification.ceiling_years)?;
        verification.borderline_confidence =
            env_parse("SCOUT_BORDERLINE_CONFIDENCE", verification.borderline_confidence)?
                .clamp(0.0, 1.0);

        if verification.borderline_years > verification.ceiling_years {
            return Err(ConfigError::InvalidValue {
                key: "SCOUT_EXPERIENCE_BORDERLINE".into(),
                message: format!(
                    "borderline ({}) must not exceed ceiling ({})",
                    verification.borderline_years, verification.ceiling_years
                ),
            });
        }

        Ok(Self {
            criteria,
            domains,
            research,
            verification,
            limits: LimitsConfig::default(),
        })
    }
}

fn split_list(raw: &str, sep: char) -> Vec<String> {
    raw.split(sep)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn research_defaults_match_budget() {
        let cfg = ResearchConfig::default();
        assert_eq!(cfg.max_iterations, 15);
        assert_eq!(cfg.concurrency, 3);
        assert!(cfg.auth_denylist.iter().any(|d| d == "linkedin.com"));
    }

    #[test]
    fn verification_defaults_are_ordered() {
        let policy = VerificationPolicy::default();
        assert!(policy.borderline_years <= policy.ceiling_years);
        assert!((0.0..=1.0).contains(&policy.borderline_confidence));
    }

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(
            split_list(" a.com, ,b.com ,", ','),
            vec!["a.com".to_string(), "b.com".to_string()]
        );
        assert!(split_list("", ';').is_empty());
    }

    #[test]
    fn env_parse_falls_back_to_default() {
        // SAFETY: the key is unique to this test.
        unsafe { std::env::remove_var("SCOUT_TEST_UNSET_KEY") };
        assert_eq!(env_parse("SCOUT_TEST_UNSET_KEY", 7u32).unwrap(), 7);
    }

    #[test]
    fn env_parse_rejects_garbage() {
        // SAFETY: the key is unique to this test.
        unsafe { std::env::set_var("SCOUT_TEST_BAD_NUMBER", "many") };
        let err = env_parse("SCOUT_TEST_BAD_NUMBER", 3u32).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn pipeline_config_deserializes_with_defaults() {
        let json = r#"{"criteria": {"criteria": "software roles", "extraction_fields": "title"}}"#;
        let cfg: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.criteria.criteria, "software roles");
        assert!(cfg.criteria.hard_disqualifiers.is_empty());
        assert_eq!(cfg.research.max_iterations, 15);
        assert_eq!(cfg.limits.max_body_chars, 30_000);
    }
}
