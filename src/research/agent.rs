//! Evidence research agent.
//!
//! A bounded ReAct loop per matched candidate: the model picks the next
//! search or extract, the tool result comes back as an observation, and
//! every extracted page goes through the validation checklist. A page that
//! passes ends the loop. When the model is unavailable or unhelpful the
//! planned strategy queue drives the loop instead.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::{DomainFilters, ResearchConfig};
use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider, TokenUsage};
use crate::llm::structured::complete_structured;
use crate::pipeline::fields::extract_structured_fields;
use crate::pipeline::types::{
    Candidate, EvidenceRecord, EvidenceSource, ResearchFailure, SearchStrategy, SearchTask, SourceRef,
    SourceType, TaskAction,
};
use crate::research::strategy::{classify_source, plan_search_tasks, rank_hits};
use crate::research::validation::{ValidationTarget, validate_evidence};
use crate::tools::registry::ToolRegistry;
use crate::tools::web::{ExtractedPage, SearchHit, WebExtractTool, WebSearch, WebSearchTool};

const AGENT_MAX_TOKENS: u32 = 512;

const AGENT_TEMPERATURE: f32 = 0.0;

/// Observations shown to the model, newest last.
const MAX_OBSERVATIONS_IN_PROMPT: usize = 8;

/// Result of researching one candidate.
#[derive(Debug, Clone)]
pub struct ResearchOutcome {
    pub record: EvidenceRecord,
    pub usage: TokenUsage,
}

/// The model's chosen next step.
#[derive(Debug, Deserialize)]
struct AgentStep {
    #[serde(default)]
    thought: String,
    action: String,
    #[serde(default)]
    input: serde_json::Value,
}

enum Decision {
    Act { action: TaskAction, strategy: Option<SearchStrategy> },
    GiveUp(String),
    Exhausted,
}

/// Per-candidate research agent. Constructed fresh for each candidate and
/// owns its own tool registry.
pub struct ResearchAgent {
    llm: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    research: ResearchConfig,
    domains: DomainFilters,
}

impl ResearchAgent {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        search: Arc<dyn WebSearch>,
        research: ResearchConfig,
        domains: DomainFilters,
    ) -> Self {
        let mut excluded = research.auth_denylist.clone();
        excluded.extend(domains.deny.iter().cloned());

        let tools = ToolRegistry::new()
            .with(Arc::new(WebSearchTool::new(
                Arc::clone(&search),
                research.results_per_search,
                excluded,
            )))
            .with(Arc::new(WebExtractTool::new(search, research.auth_denylist.clone())));

        Self {
            llm,
            tools,
            research,
            domains,
        }
    }

    /// Research one candidate. Never fails: every outcome is an `EvidenceRecord`.
    pub async fn research(&self, candidate: &Candidate) -> ResearchOutcome {
        let label = candidate.label();
        info!(candidate = %label, "Starting research");

        let mut run = AgentRun::new(candidate, plan_search_tasks(candidate, &self.research, &self.domains));
        let max_iterations = self.research.max_iterations;
        // Model turns that do not lead to a tool call still count here, so
        // the loop terminates even if the model keeps stalling.
        let max_turns = max_iterations.saturating_mul(2).max(1);
        let mut turns = 0u32;

        while run.iterations < max_iterations && turns < max_turns {
            turns += 1;

            let decision = match self.decide(&mut run).await {
                Ok(decision) => decision,
                Err(failure) => return run.finish_not_found(failure),
            };

            let (action, strategy) = match decision {
                Decision::Act { action, strategy } => (action, strategy),
                Decision::GiveUp(reason) if run.queue.is_empty() => {
                    run.note(format!("Agent gave up: {reason}"));
                    let failure = run.exhausted_failure(Some(reason));
                    return run.finish_not_found(failure);
                }
                Decision::GiveUp(reason) => {
                    run.note(format!("Model wanted to give up ({reason}); planned strategies remain"));
                    run.llm_enabled = false;
                    continue;
                }
                Decision::Exhausted => {
                    run.note("All planned strategies tried".to_string());
                    let failure = run.exhausted_failure(None);
                    return run.finish_not_found(failure);
                }
            };

            if let Some(found) = self.act(&mut run, action, strategy).await {
                info!(
                    candidate = %label,
                    iterations = run.iterations,
                    url = %found.url,
                    "Research found validated evidence"
                );
                return run.finish_found(found);
            }
        }

        warn!(candidate = %label, iterations = run.iterations, "Research budget exhausted");
        run.note(format!("Stopped after {} tool calls", run.iterations));
        let failure = match run.rejected.last() {
            Some(_) => run.exhausted_failure(None),
            None => ResearchFailure::BudgetExhausted {
                iterations: run.iterations,
            },
        };
        run.finish_not_found(failure)
    }

    /// Pick the next step: ask the model, fall back to the plan.
    async fn decide(&self, run: &mut AgentRun<'_>) -> Result<Decision, ResearchFailure> {
        if run.llm_enabled {
            match self.ask_model(run).await {
                Ok(Some(decision)) => return Ok(decision),
                Ok(None) => {}
                Err(LlmError::ContextLengthExceeded { used, limit }) => {
                    return Err(ResearchFailure::ContextBudgetExceeded { chars: used, limit });
                }
                Err(e) => {
                    warn!(candidate = %run.candidate.label(), error = %e, "Agent model unavailable, following plan");
                    run.note(format!("Model unavailable ({e}); following planned strategies"));
                    run.llm_enabled = false;
                }
            }
        }

        Ok(match run.queue.pop_front() {
            Some(task) => Decision::Act {
                action: task.action,
                strategy: Some(task.strategy),
            },
            None => Decision::Exhausted,
        })
    }

    /// One model turn. `Ok(None)` means the reply was unusable this turn.
    async fn ask_model(&self, run: &mut AgentRun<'_>) -> Result<Option<Decision>, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_agent_system_prompt(&self.tools, &self.research.auth_denylist)),
            ChatMessage::user(build_agent_user_prompt(run, self.research.max_iterations)),
        ])
        .with_temperature(AGENT_TEMPERATURE)
        .with_max_tokens(AGENT_MAX_TOKENS)
        .with_response_schema(agent_step_schema())
        .with_metadata("stage", "research");

        let chars = request.prompt_chars();
        if chars > self.research.max_context_chars {
            return Err(LlmError::ContextLengthExceeded {
                used: chars,
                limit: self.research.max_context_chars,
            });
        }

        let (step, usage): (AgentStep, TokenUsage) = complete_structured(self.llm.as_ref(), request).await?;
        run.usage.add(usage);

        if !step.thought.trim().is_empty() {
            run.note(format!("Thought: {}", step.thought.trim()));
        }

        let decision = match step.action.as_str() {
            "web_search" => step
                .input
                .get("query")
                .and_then(|q| q.as_str())
                .filter(|q| !q.trim().is_empty())
                .map(|q| TaskAction::Search {
                    query: q.trim().to_string(),
                    include_domains: step
                        .input
                        .get("include_domains")
                        .and_then(|v| v.as_array())
                        .map(|a| a.iter().filter_map(|d| d.as_str().map(String::from)).collect())
                        .unwrap_or_default(),
                }),
            "web_extract" => step
                .input
                .get("url")
                .and_then(|u| u.as_str())
                .map(str::trim)
                .filter(|u| !run.visited.contains(*u))
                .map(|u| TaskAction::Extract { url: u.to_string() }),
            "give_up" => {
                let reason = step
                    .input
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("no reason given")
                    .to_string();
                return Ok(Some(Decision::GiveUp(reason)));
            }
            other => {
                debug!(action = other, "Agent proposed unknown action");
                None
            }
        };

        Ok(decision.map(|action| {
            run.queue.retain(|t| t.action != action);
            Decision::Act { action, strategy: None }
        }))
    }

    /// Execute one tool call and record the observation. Returns the
    /// validated source if this call produced one.
    async fn act(
        &self,
        run: &mut AgentRun<'_>,
        action: TaskAction,
        strategy: Option<SearchStrategy>,
    ) -> Option<EvidenceSource> {
        let origin = strategy.map_or_else(|| "model".to_string(), |s| format!("{s:?}"));
        match action {
            TaskAction::Search { query, include_domains } => {
                run.iterations += 1;
                debug!(candidate = %run.candidate.label(), iteration = run.iterations, query = %query, "web_search");
                let params = serde_json::json!({ "query": query, "include_domains": include_domains });
                match self.tools.execute("web_search", params).await {
                    Ok(output) => {
                        let hits: Vec<SearchHit> = serde_json::from_value(output.result).unwrap_or_default();
                        self.observe_hits(run, &query, &origin, hits);
                    }
                    Err(e) => run.observe(format!("[{origin}] search '{query}' failed: {e}")),
                }
                None
            }
            TaskAction::Extract { url } => {
                if !run.visited.insert(url.clone()) {
                    return None;
                }
                run.iterations += 1;
                debug!(candidate = %run.candidate.label(), iteration = run.iterations, url = %url, "web_extract");
                let params = serde_json::json!({ "url": url });
                match self.tools.execute("web_extract", params).await {
                    Ok(output) => match serde_json::from_value::<ExtractedPage>(output.result) {
                        Ok(page) => self.observe_page(run, &origin, page),
                        Err(e) => {
                            run.observe(format!("[{origin}] extract {url} returned garbage: {e}"));
                            None
                        }
                    },
                    Err(e) => {
                        run.record_source(&url, "", classify_source(&url, &run.candidate.organization), format!("extract failed: {e}"));
                        run.observe(format!("[{origin}] extract {url} failed: {e}"));
                        None
                    }
                }
            }
        }
    }

    fn observe_hits(&self, run: &mut AgentRun<'_>, query: &str, origin: &str, hits: Vec<SearchHit>) {
        let mut denied = self.research.auth_denylist.clone();
        denied.extend(self.domains.deny.iter().cloned());
        let ranked = rank_hits(hits, &run.candidate.organization, &denied);

        if ranked.is_empty() {
            run.observe(format!("[{origin}] search '{query}': no results"));
            return;
        }
        run.any_hits = true;

        let mut lines = vec![format!("[{origin}] search '{query}': {} results", ranked.len())];
        let mut to_extract = Vec::new();
        for (i, (hit, source_type)) in ranked.iter().enumerate() {
            lines.push(format!("  {}. [{source_type}] {} | {} ({:.2})", i + 1, hit.url, hit.title, hit.score));
            if *source_type == SourceType::Template {
                run.record_source(&hit.url, &hit.title, *source_type, "skipped: template page".into());
                continue;
            }
            let queued = run
                .queue
                .iter()
                .any(|t| matches!(&t.action, TaskAction::Extract { url } if *url == hit.url));
            if to_extract.len() < self.research.extracts_per_search && !run.visited.contains(&hit.url) && !queued {
                to_extract.push(hit.url.clone());
            }
        }
        run.observe(lines.join("\n"));

        // Best hit ends up at the front.
        let priority = run.queue.front().map_or(0, |t| t.priority);
        for url in to_extract.into_iter().rev() {
            run.queue.push_front(SearchTask {
                priority,
                strategy: SearchStrategy::SourceUrl,
                action: TaskAction::Extract { url },
            });
        }
    }

    fn observe_page(&self, run: &mut AgentRun<'_>, origin: &str, page: ExtractedPage) -> Option<EvidenceSource> {
        let source_type = classify_source(&page.url, &run.candidate.organization);
        let report = validate_evidence(ValidationTarget::from(run.candidate), &page.url, &page.raw_text);

        if report.passed() {
            run.record_source(&page.url, &page.title, source_type, "validated".into());
            run.observe(format!("[{origin}] extract {}: validated ({source_type})", page.url));
            return Some(EvidenceSource {
                url: page.url,
                title: page.title,
                source_type,
                content: page.raw_text,
            });
        }

        let failed = report.failed_checks();
        run.record_source(&page.url, &page.title, source_type, format!("rejected: {}", failed.join("; ")));
        let excerpt: String = page.raw_text.chars().take(self.research.max_observation_chars).collect();
        run.observe(format!(
            "[{origin}] extract {}: rejected ({})\n{excerpt}",
            page.url,
            failed.join("; ")
        ));
        run.rejected.push((page.url, failed));
        None
    }
}

/// Mutable state of one research run.
struct AgentRun<'a> {
    candidate: &'a Candidate,
    queue: VecDeque<SearchTask>,
    visited: HashSet<String>,
    sources: Vec<SourceRef>,
    source_index: HashMap<String, usize>,
    observations: Vec<String>,
    trace: Vec<String>,
    rejected: Vec<(String, Vec<String>)>,
    iterations: u32,
    any_hits: bool,
    llm_enabled: bool,
    usage: TokenUsage,
}

impl<'a> AgentRun<'a> {
    fn new(candidate: &'a Candidate, plan: Vec<SearchTask>) -> Self {
        Self {
            candidate,
            queue: plan.into(),
            visited: HashSet::new(),
            sources: Vec::new(),
            source_index: HashMap::new(),
            observations: Vec::new(),
            trace: Vec::new(),
            rejected: Vec::new(),
            iterations: 0,
            any_hits: false,
            llm_enabled: true,
            usage: TokenUsage::default(),
        }
    }

    fn note(&mut self, line: String) {
        self.trace.push(line);
    }

    fn observe(&mut self, observation: String) {
        let first_line = observation.lines().next().unwrap_or_default().to_string();
        self.trace.push(first_line);
        self.observations.push(observation);
    }

    /// Record an inspected page, keeping one entry per URL.
    fn record_source(&mut self, url: &str, title: &str, source_type: SourceType, note: String) {
        match self.source_index.get(url) {
            Some(&i) => self.sources[i].note = note,
            None => {
                self.source_index.insert(url.to_string(), self.sources.len());
                self.sources.push(SourceRef {
                    url: url.to_string(),
                    title: title.to_string(),
                    source_type,
                    note,
                });
            }
        }
    }

    fn exhausted_failure(&self, gave_up: Option<String>) -> ResearchFailure {
        if let Some((url, failed_checks)) = self.rejected.last() {
            return ResearchFailure::ValidationFailed {
                url: url.clone(),
                failed_checks: failed_checks.clone(),
            };
        }
        if !self.any_hits && self.visited.is_empty() {
            return ResearchFailure::NoResults;
        }
        ResearchFailure::AgentGaveUp {
            reason: gave_up.unwrap_or_else(|| "no planned strategy produced a usable page".into()),
        }
    }

    fn finish_found(mut self, primary: EvidenceSource) -> ResearchOutcome {
        let fields = extract_structured_fields(&primary.content);
        self.note(format!("Validated {} after {} tool calls", primary.url, self.iterations));
        ResearchOutcome {
            record: EvidenceRecord::found(
                self.candidate.index,
                primary,
                self.sources,
                fields,
                self.iterations,
                self.trace.join("\n"),
            ),
            usage: self.usage,
        }
    }

    fn finish_not_found(mut self, failure: ResearchFailure) -> ResearchOutcome {
        self.note(format!("Not found: {failure}"));
        info!(candidate = %self.candidate.label(), reason = %failure, "Research ended without evidence");
        ResearchOutcome {
            record: EvidenceRecord::not_found(
                self.candidate.index,
                self.sources,
                self.iterations,
                self.trace.join("\n"),
                failure,
            ),
            usage: self.usage,
        }
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_agent_system_prompt(tools: &ToolRegistry, auth_denylist: &[String]) -> String {
    let mut prompt = String::from(
        "You are a research agent. Find the public, authoritative web page describing one specific \
         opportunity, so it can be checked against the full description.\n\n\
         Strategy:\n\
         - Prefer the organization's own domain and career pages over job boards and aggregators.\n\
         - Applicant-tracking pages hosted for the organization are the next best source.\n\
         - If direct searches fail, retry with synonyms of the title, including local-language titles.\n\
         - Never extract pages from domains that require a login.\n\
         - Generic job-description templates are not evidence.\n\
         - Each extracted page is validated automatically. A validated page ends the research.\n\n",
    );

    prompt.push_str("Login-walled domains: ");
    prompt.push_str(&auth_denylist.join(", "));
    prompt.push_str("\n\nTools:\n");
    for def in tools.tool_definitions() {
        prompt.push_str(&format!("- {}: {}\n  parameters: {}\n", def.name, def.description, def.parameters));
    }
    prompt.push_str(
        "- give_up: stop researching.\n  parameters: {\"reason\": string}\n\n\
         Respond with ONLY a JSON object: {\"thought\": \"...\", \"action\": \"web_search|web_extract|give_up\", \"input\": {...}}",
    );
    prompt
}

fn build_agent_user_prompt(run: &AgentRun<'_>, max_iterations: u32) -> String {
    let c = run.candidate;
    let mut prompt = String::with_capacity(2048);

    prompt.push_str(&format!("Organization: {}\n", c.organization));
    prompt.push_str(&format!("Title: {}\n", c.title));
    if let Some(loc) = &c.location {
        prompt.push_str(&format!("Location: {loc}\n"));
    }
    if let Some(url) = &c.source_url {
        prompt.push_str(&format!("Link from the email: {url}{}\n", if c.requires_auth { " (login required)" } else { "" }));
    }
    prompt.push_str(&format!(
        "Tool calls used: {} of {max_iterations}\n",
        run.iterations
    ));

    if !run.queue.is_empty() {
        prompt.push_str("\nPlanned next steps:\n");
        for task in run.queue.iter().take(5) {
            match &task.action {
                TaskAction::Search { query, .. } => prompt.push_str(&format!("- search: {query}\n")),
                TaskAction::Extract { url } => prompt.push_str(&format!("- extract: {url}\n")),
            }
        }
    }

    if !run.visited.is_empty() {
        let mut visited: Vec<&str> = run.visited.iter().map(String::as_str).collect();
        visited.sort_unstable();
        prompt.push_str("\nAlready extracted (do not repeat):\n");
        for url in visited {
            prompt.push_str(&format!("- {url}\n"));
        }
    }

    let skip = run.observations.len().saturating_sub(MAX_OBSERVATIONS_IN_PROMPT);
    if !run.observations.is_empty() {
        prompt.push_str("\nObservations:\n");
        for obs in &run.observations[skip..] {
            prompt.push_str(obs);
            prompt.push('\n');
        }
    }

    prompt.push_str("\nWhat is the next step?");
    prompt
}

fn agent_step_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "thought": {"type": "string"},
            "action": {"type": "string", "enum": ["web_search", "web_extract", "give_up"]},
            "input": {"type": "object"}
        },
        "required": ["action", "input"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::MatchDecision;
    use crate::testing::{FakeWeb, ScriptedLlm};
    use std::sync::atomic::Ordering;

    const ACME_PAGE: &str = "Acme A/S is hiring a Backend Developer in Copenhagen, Denmark.\n\n\
        Requirements:\n- 2+ years of experience with Rust\n- PostgreSQL\n\n\
        Application deadline: 1 December 2026.";

    fn candidate() -> Candidate {
        let mut c = Candidate::new(0, "Acme A/S", "Backend Developer", MatchDecision::accept(0.8, "software role"));
        c.location = Some("Copenhagen".into());
        c
    }

    fn agent(llm: ScriptedLlm, web: Arc<FakeWeb>, max_iterations: u32) -> ResearchAgent {
        let research = ResearchConfig {
            max_iterations,
            ..ResearchConfig::default()
        };
        ResearchAgent::new(Arc::new(llm), web, research, DomainFilters::default())
    }

    #[tokio::test]
    async fn plan_finds_company_page_without_model() {
        let web = Arc::new(
            FakeWeb::new()
                .with_results("careers", &["https://www.linkedin.com/jobs/1", "https://acme.dk/careers/backend"])
                .with_page("https://acme.dk/careers/backend", ACME_PAGE),
        );
        let outcome = agent(ScriptedLlm::new(&[]), web.clone(), 15).research(&candidate()).await;
        let record = outcome.record;

        assert!(record.is_found(), "{}", record.reasoning);
        let primary = record.primary_source().unwrap();
        assert_eq!(primary.url, "https://acme.dk/careers/backend");
        assert_eq!(primary.source_type, SourceType::CompanyCareerPage);
        assert_eq!(record.deadline.as_deref(), Some("1 December 2026"));
        assert!(record.technologies.iter().any(|t| t == "Rust"));
        assert_eq!(record.iterations, 2);
        // linkedin never extracted
        assert_eq!(web.extracts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn model_directs_the_search() {
        let llm = ScriptedLlm::new(&[
            r#"{"thought":"try the ATS","action":"web_search","input":{"query":"acme backend greenhouse"}}"#,
            r#"{"thought":"open it","action":"web_extract","input":{"url":"https://boards.greenhouse.io/acme/1"}}"#,
        ]);
        let web = Arc::new(
            FakeWeb::new()
                .with_results("greenhouse", &["https://boards.greenhouse.io/acme/1"])
                .with_page("https://boards.greenhouse.io/acme/1", ACME_PAGE),
        );
        let outcome = agent(llm, web, 15).research(&candidate()).await;
        assert!(outcome.record.is_found());
        assert_eq!(
            outcome.record.primary_source().unwrap().source_type,
            SourceType::ApplicantTrackingSystem
        );
        assert!(outcome.record.reasoning.contains("Thought: try the ATS"));
        assert_eq!(outcome.usage.input_tokens, 200);
    }

    #[tokio::test]
    async fn wrong_country_is_not_found() {
        let page = "Acme A/S is hiring a Backend Developer in Berlin, Germany.";
        let web = Arc::new(
            FakeWeb::new()
                .with_results("acme", &["https://acme.de/jobs/backend"])
                .with_page("https://acme.de/jobs/backend", page),
        );
        let record = agent(ScriptedLlm::new(&[]), web, 15).research(&candidate()).await.record;
        assert!(!record.is_found());
        assert!(matches!(record.failure, Some(ResearchFailure::ValidationFailed { .. })));
        assert!(record.sources.iter().any(|s| s.note.starts_with("rejected")));
    }

    #[tokio::test]
    async fn template_hits_are_never_evidence() {
        let url = "https://www.indeed.com/hire/job-description/templates/backend-developer";
        let web = Arc::new(
            FakeWeb::new()
                .with_results("backend", &[url])
                .with_page(url, ACME_PAGE),
        );
        let record = agent(ScriptedLlm::new(&[]), web.clone(), 15).research(&candidate()).await.record;
        assert!(!record.is_found());
        assert_eq!(web.extracts.load(Ordering::SeqCst), 0);
        assert!(record.sources.iter().any(|s| s.source_type == SourceType::Template));
    }

    #[tokio::test]
    async fn tool_errors_move_on_to_next_strategy() {
        let mut c = candidate();
        c.source_url = Some("https://acme.dk/jobs/broken".into());
        let web = Arc::new(
            FakeWeb::new()
                .with_failing("https://acme.dk/jobs/broken")
                .with_results("careers", &["https://acme.dk/careers/backend"])
                .with_page("https://acme.dk/careers/backend", ACME_PAGE),
        );
        let record = agent(ScriptedLlm::new(&[]), web, 15).research(&c).await.record;
        assert!(record.is_found());
        assert!(record.reasoning.contains("failed"));
        assert!(record.sources.iter().any(|s| s.url.ends_with("broken")));
    }

    #[tokio::test]
    async fn iteration_ceiling_always_terminates() {
        let urls: Vec<String> = (0..20).map(|i| format!("https://acme.dk/jobs/{i}")).collect();
        let url_refs: Vec<&str> = urls.iter().map(String::as_str).collect();
        let mut web = FakeWeb::new().with_results("", &url_refs);
        for url in &urls {
            web = web.with_page(url, "Acme A/S is hiring a Data Engineer.");
        }
        let web = Arc::new(web);
        let record = agent(ScriptedLlm::new(&[]), web.clone(), 4).research(&candidate()).await.record;
        assert!(!record.is_found());
        assert_eq!(record.iterations, 4);
        assert!(web.calls() <= 4);
    }

    #[tokio::test]
    async fn no_results_anywhere() {
        let web = Arc::new(FakeWeb::new());
        let record = agent(ScriptedLlm::new(&[]), web, 15).research(&candidate()).await.record;
        assert!(!record.is_found());
        assert_eq!(record.failure, Some(ResearchFailure::NoResults));
    }

    #[tokio::test]
    async fn give_up_is_ignored_while_plan_remains() {
        let llm = ScriptedLlm::new(&[r#"{"action":"give_up","input":{"reason":"looks hard"}}"#]);
        let web = Arc::new(
            FakeWeb::new()
                .with_results("careers", &["https://acme.dk/careers/backend"])
                .with_page("https://acme.dk/careers/backend", ACME_PAGE),
        );
        let record = agent(llm, web, 15).research(&candidate()).await.record;
        assert!(record.is_found());
        assert!(record.reasoning.contains("planned strategies remain"));
    }

    #[tokio::test]
    async fn oversized_context_is_typed_failure() {
        let research = ResearchConfig {
            max_context_chars: 10,
            ..ResearchConfig::default()
        };
        let agent = ResearchAgent::new(
            Arc::new(ScriptedLlm::new(&[])),
            Arc::new(FakeWeb::new()),
            research,
            DomainFilters::default(),
        );
        let record = agent.research(&candidate()).await.record;
        assert!(!record.is_found());
        assert!(matches!(record.failure, Some(ResearchFailure::ContextBudgetExceeded { .. })));
    }
}
