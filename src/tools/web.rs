//! Web search/extract boundary and the agent tools that wrap it.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tools::tool::{Tool, ToolError, ToolOutput, require_str};

/// A search request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    pub max_results: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_domains: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_domains: Vec<String>,
}

/// One ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub score: f32,
}

/// Full text retrieved from a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPage {
    pub url: String,
    #[serde(default)]
    pub title: String,
    pub raw_text: String,
}

/// Web search/extract service. Failures come back as `ToolError`s.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, ToolError>;

    async fn extract(&self, url: &str) -> Result<ExtractedPage, ToolError>;
}

/// Lowercased host of a URL without a leading `www.`.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

/// Whether `url`'s host is `domain` or a subdomain of it.
pub fn url_in_domain(url: &str, domain: &str) -> bool {
    let domain = domain.trim().trim_start_matches("www.").to_lowercase();
    if domain.is_empty() {
        return false;
    }
    host_of(url).is_some_and(|host| host == domain || host.ends_with(&format!(".{domain}")))
}

/// Whether `url` falls in any of `domains`.
pub fn url_in_any_domain(url: &str, domains: &[String]) -> bool {
    domains.iter().any(|d| url_in_domain(url, d))
}

// ── web_search ──────────────────────────────────────────────────────

/// Agent tool: query the web.
pub struct WebSearchTool {
    backend: Arc<dyn WebSearch>,
    max_results: usize,
    exclude_domains: Vec<String>,
}

impl WebSearchTool {
    pub fn new(backend: Arc<dyn WebSearch>, max_results: usize, exclude_domains: Vec<String>) -> Self {
        Self {
            backend,
            max_results,
            exclude_domains,
        }
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the public web. Returns ranked results with url, title, snippet and score. \
         Auth-walled domains are excluded automatically."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query, e.g. '\"Acme\" careers backend developer'"
                },
                "include_domains": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Restrict results to these domains (optional)"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let query = require_str(&params, "query")?;
        let include_domains: Vec<String> = params
            .get("include_domains")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let request = SearchQuery {
            query: query.to_string(),
            max_results: self.max_results,
            include_domains,
            exclude_domains: self.exclude_domains.clone(),
        };

        let hits: Vec<SearchHit> = self
            .backend
            .search(&request)
            .await?
            .into_iter()
            .filter(|h| !url_in_any_domain(&h.url, &self.exclude_domains))
            .collect();

        let result = serde_json::to_value(&hits)
            .map_err(|e| ToolError::ExecutionFailed(format!("serialize hits: {e}")))?;
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

// ── web_extract ─────────────────────────────────────────────────────

/// Agent tool: fetch the full text of one URL.
pub struct WebExtractTool {
    backend: Arc<dyn WebSearch>,
    auth_denylist: Vec<String>,
}

impl WebExtractTool {
    pub fn new(backend: Arc<dyn WebSearch>, auth_denylist: Vec<String>) -> Self {
        Self {
            backend,
            auth_denylist,
        }
    }
}

#[async_trait]
impl Tool for WebExtractTool {
    fn name(&self) -> &str {
        "web_extract"
    }

    fn description(&self) -> &str {
        "Retrieve the full readable text of a single public URL."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "Absolute http(s) URL to extract"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let url = require_str(&params, "url")?;

        if host_of(url).is_none() {
            return Err(ToolError::InvalidParameters(format!("not an absolute URL: {url}")));
        }
        if url_in_any_domain(url, &self.auth_denylist) {
            return Err(ToolError::NotAuthorized(format!(
                "{url} is on a domain that requires authentication"
            )));
        }

        let page = self.backend.extract(url).await?;
        if page.raw_text.trim().is_empty() {
            return Err(ToolError::EmptyResult(format!("no text extracted from {url}")));
        }

        let result = serde_json::to_value(&page)
            .map_err(|e| ToolError::ExecutionFailed(format!("serialize page: {e}")))?;
        Ok(ToolOutput::success(result, start.elapsed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticWeb;

    #[async_trait]
    impl WebSearch for StaticWeb {
        async fn search(&self, _query: &SearchQuery) -> Result<Vec<SearchHit>, ToolError> {
            Ok(vec![
                SearchHit {
                    url: "https://www.linkedin.com/jobs/view/1".into(),
                    title: "LinkedIn".into(),
                    snippet: String::new(),
                    score: 0.9,
                },
                SearchHit {
                    url: "https://acme.dk/careers/backend".into(),
                    title: "Backend Developer".into(),
                    snippet: "Join Acme".into(),
                    score: 0.8,
                },
            ])
        }

        async fn extract(&self, url: &str) -> Result<ExtractedPage, ToolError> {
            Ok(ExtractedPage {
                url: url.to_string(),
                title: String::new(),
                raw_text: if url.contains("empty") { "  ".into() } else { "text".into() },
            })
        }
    }

    #[test]
    fn host_strips_www() {
        assert_eq!(host_of("https://www.Acme.dk/jobs").as_deref(), Some("acme.dk"));
        assert_eq!(host_of("not a url"), None);
    }

    #[test]
    fn domain_matching_includes_subdomains() {
        assert!(url_in_domain("https://dk.linkedin.com/jobs/1", "linkedin.com"));
        assert!(url_in_domain("https://linkedin.com/jobs/1", "www.linkedin.com"));
        assert!(!url_in_domain("https://notlinkedin.com/", "linkedin.com"));
        assert!(!url_in_domain("https://acme.dk/", ""));
    }

    #[tokio::test]
    async fn search_tool_drops_excluded_domains() {
        let tool = WebSearchTool::new(Arc::new(StaticWeb), 5, vec!["linkedin.com".into()]);
        let out = tool
            .execute(serde_json::json!({"query": "acme backend"}))
            .await
            .unwrap();
        let hits: Vec<SearchHit> = serde_json::from_value(out.result).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://acme.dk/careers/backend");
    }

    #[tokio::test]
    async fn extract_tool_refuses_auth_domains() {
        let tool = WebExtractTool::new(Arc::new(StaticWeb), vec!["linkedin.com".into()]);
        let err = tool
            .execute(serde_json::json!({"url": "https://www.linkedin.com/jobs/view/1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotAuthorized(_)));
    }

    #[tokio::test]
    async fn extract_tool_rejects_empty_text() {
        let tool = WebExtractTool::new(Arc::new(StaticWeb), vec![]);
        let err = tool
            .execute(serde_json::json!({"url": "https://acme.dk/empty"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::EmptyResult(_)));
    }

    #[tokio::test]
    async fn extract_tool_requires_absolute_url() {
        let tool = WebExtractTool::new(Arc::new(StaticWeb), vec![]);
        let err = tool
            .execute(serde_json::json!({"url": "/careers"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParameters(_)));
    }
}
