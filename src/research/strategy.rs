//! Research strategy: which searches to try, in which order, and how to
//! rank what comes back.
//!
//! Order: the link from the email itself, the organisation's own career
//! pages, organisation plus title anywhere, title plus location, then
//! title synonyms.

use crate::config::{DomainFilters, ResearchConfig};
use crate::pipeline::types::{Candidate, SearchStrategy, SearchTask, SourceType, TaskAction};
use crate::research::synonyms::title_synonyms;
use crate::research::validation::{is_template_url, organization_variants};
use crate::tools::web::{SearchHit, host_of, url_in_any_domain};

/// Hosts of applicant-tracking systems that publish on behalf of employers.
const ATS_HOSTS: &[&str] = &[
    "greenhouse.io",
    "lever.co",
    "myworkdayjobs.com",
    "smartrecruiters.com",
    "teamtailor.com",
    "recruitee.com",
    "hr-manager.net",
    "emply.com",
    "emply.net",
    "jobylon.com",
    "successfactors.com",
    "successfactors.eu",
    "bamboohr.com",
    "ashbyhq.com",
    "personio.de",
    "personio.com",
    "workable.com",
];

/// Aggregators and job boards.
const JOB_BOARD_HOSTS: &[&str] = &[
    "linkedin.com",
    "indeed.com",
    "glassdoor.com",
    "jobindex.dk",
    "jobnet.dk",
    "it-jobbank.dk",
    "thehub.io",
    "ofir.dk",
    "stepstone.de",
    "stepstone.dk",
    "monster.com",
    "careerjet.com",
    "simplyhired.com",
    "ziprecruiter.com",
];

/// Build the ordered task list for one candidate.
pub fn plan_search_tasks(
    candidate: &Candidate,
    research: &ResearchConfig,
    domains: &DomainFilters,
) -> Vec<SearchTask> {
    let mut tasks = Vec::new();
    let org = candidate.organization.trim();
    let title = candidate.title.trim();
    let location = candidate.location.as_deref().map(str::trim).unwrap_or_default();

    if let Some(url) = candidate.source_url.as_deref()
        && !candidate.requires_auth
        && !url_in_any_domain(url, &research.auth_denylist)
    {
        tasks.push(SearchTask {
            priority: 0,
            strategy: SearchStrategy::SourceUrl,
            action: TaskAction::Extract { url: url.to_string() },
        });
    }

    if !org.is_empty() {
        tasks.push(search_task(
            1,
            SearchStrategy::CompanyCareers,
            format!("\"{org}\" careers {title}"),
            domains.allow.clone(),
        ));
        tasks.push(search_task(
            2,
            SearchStrategy::Targeted,
            join_terms(&[&format!("\"{org}\""), &format!("\"{title}\""), location]),
            Vec::new(),
        ));
    }

    if !title.is_empty() {
        tasks.push(search_task(
            3,
            SearchStrategy::Generic,
            join_terms(&[title, location, "job"]),
            Vec::new(),
        ));

        let org_term = if org.is_empty() { String::new() } else { format!("\"{org}\"") };
        for (i, synonym) in title_synonyms(title)
            .into_iter()
            .take(research.max_synonym_queries)
            .enumerate()
        {
            tasks.push(search_task(
                u8::try_from(i).ok().and_then(|i| 4u8.checked_add(i)).unwrap_or(u8::MAX),
                SearchStrategy::Synonym,
                join_terms(&[&org_term, &synonym, location]),
                Vec::new(),
            ));
        }
    }

    tasks.sort_by_key(|t| t.priority);
    tasks
}

fn search_task(priority: u8, strategy: SearchStrategy, query: String, include_domains: Vec<String>) -> SearchTask {
    SearchTask {
        priority,
        strategy,
        action: TaskAction::Search { query, include_domains },
    }
}

fn join_terms(terms: &[&str]) -> String {
    terms
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Heuristic source type of a URL relative to the expected organisation.
pub fn classify_source(url: &str, organization: &str) -> SourceType {
    if is_template_url(url) {
        return SourceType::Template;
    }
    let Some(host) = host_of(url) else {
        return SourceType::Other;
    };
    let host_matches = |list: &[&str]| list.iter().any(|d| host == *d || host.ends_with(&format!(".{d}")));

    if host_matches(ATS_HOSTS) {
        return SourceType::ApplicantTrackingSystem;
    }
    if host_matches(JOB_BOARD_HOSTS) {
        return SourceType::JobBoard;
    }

    let own_domain = organization_variants(organization)
        .into_iter()
        .map(|v| v.replace(' ', ""))
        .filter(|v| v.chars().count() >= 3)
        .any(|v| host.split('.').any(|label| label == v || label.starts_with(&v)));
    if own_domain {
        SourceType::CompanyCareerPage
    } else {
        SourceType::Other
    }
}

/// Rank hits: most authoritative source type first, then by score.
/// Denylisted domains are dropped.
pub fn rank_hits(hits: Vec<SearchHit>, organization: &str, denylist: &[String]) -> Vec<(SearchHit, SourceType)> {
    let mut ranked: Vec<(SearchHit, SourceType)> = hits
        .into_iter()
        .filter(|h| !url_in_any_domain(&h.url, denylist))
        .map(|h| {
            let source_type = classify_source(&h.url, organization);
            (h, source_type)
        })
        .collect();
    ranked.sort_by(|(a, ta), (b, tb)| {
        ta.rank()
            .cmp(&tb.rank())
            .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal))
    });
    ranked
}
