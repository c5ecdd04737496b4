//! Test doubles shared by unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use crate::tools::tool::ToolError;
use crate::tools::web::{ExtractedPage, SearchHit, SearchQuery, WebSearch};

/// LLM that replays canned replies in order and records every request.
pub(crate) struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    pub fn new(replies: &[&str]) -> Self {
        Self::with_results(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    pub fn with_results(replies: Vec<Result<String, LlmError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_user_prompt(&self) -> String {
        self.requests()
            .last()
            .and_then(|r| r.messages.last().map(|m| m.content.clone()))
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        (Decimal::ZERO, Decimal::ZERO)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        let next = self.replies.lock().unwrap().pop_front();
        let content = next.unwrap_or_else(|| {
            Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "script exhausted".into(),
            })
        })?;
        Ok(CompletionResponse {
            content,
            input_tokens: 100,
            output_tokens: 20,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

/// In-memory web: queries matched by substring, pages by exact URL.
#[derive(Default)]
pub(crate) struct FakeWeb {
    results: Vec<(String, Vec<SearchHit>)>,
    pages: HashMap<String, String>,
    failing_urls: Vec<String>,
    pub searches: AtomicUsize,
    pub extracts: AtomicUsize,
}

impl FakeWeb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any query containing `needle` (case-insensitive) returns `urls`.
    pub fn with_results(mut self, needle: &str, urls: &[&str]) -> Self {
        let hits = urls
            .iter()
            .enumerate()
            .map(|(i, url)| SearchHit {
                url: url.to_string(),
                title: format!("Result {i}"),
                snippet: String::new(),
                score: 1.0 - i as f32 * 0.1,
            })
            .collect();
        self.results.push((needle.to_lowercase(), hits));
        self
    }

    pub fn with_page(mut self, url: &str, text: &str) -> Self {
        self.pages.insert(url.to_string(), text.to_string());
        self
    }

    pub fn with_failing(mut self, url: &str) -> Self {
        self.failing_urls.push(url.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.searches.load(Ordering::SeqCst) + self.extracts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearch for FakeWeb {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, ToolError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        let q = query.query.to_lowercase();
        Ok(self
            .results
            .iter()
            .find(|(needle, _)| q.contains(needle.as_str()))
            .map(|(_, hits)| hits.clone())
            .unwrap_or_default())
    }

    async fn extract(&self, url: &str) -> Result<ExtractedPage, ToolError> {
        self.extracts.fetch_add(1, Ordering::SeqCst);
        if self.failing_urls.iter().any(|u| u == url) {
            return Err(ToolError::Network(format!("connection reset: {url}")));
        }
        self.pages
            .get(url)
            .map(|text| ExtractedPage {
                url: url.to_string(),
                title: String::new(),
                raw_text: text.clone(),
            })
            .ok_or_else(|| ToolError::EmptyResult(format!("no page at {url}")))
    }
}
