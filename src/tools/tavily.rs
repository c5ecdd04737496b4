//! Tavily search/extract backend.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::tools::tool::ToolError;
use crate::tools::web::{ExtractedPage, SearchHit, SearchQuery, WebSearch};

const DEFAULT_BASE_URL: &str = "https://api.tavily.com";

/// Tavily connection settings.
#[derive(Debug, Clone)]
pub struct TavilyConfig {
    pub api_key: SecretString,
    pub base_url: String,
    pub timeout: Duration,
}

impl TavilyConfig {
    /// Build from `TAVILY_API_KEY` (required) and `TAVILY_BASE_URL` (optional).
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("TAVILY_API_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("TAVILY_API_KEY".into()))?;
        Ok(Self {
            api_key: SecretString::from(api_key),
            base_url: std::env::var("TAVILY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(30),
        })
    }
}

/// Tavily REST client.
pub struct TavilyClient {
    config: TavilyConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    score: f32,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    #[serde(default)]
    results: Vec<ExtractResult>,
    #[serde(default)]
    failed_results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ExtractResult {
    url: String,
    #[serde(default)]
    raw_content: String,
}

impl TavilyClient {
    pub fn new(config: TavilyConfig) -> Result<Self, ToolError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ToolError::ExecutionFailed(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/{method}", self.config.base_url.trim_end_matches('/'))
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> Result<T, ToolError> {
        let resp = self
            .client
            .post(self.api_url(method))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolError::Timeout(self.config.timeout)
                } else {
                    ToolError::Network(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(ToolError::ExecutionFailed(format!(
                "tavily {method} returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ToolError::ExecutionFailed(format!("tavily {method} decode: {e}")))
    }
}

#[async_trait]
impl WebSearch for TavilyClient {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchHit>, ToolError> {
        let mut body = serde_json::json!({
            "api_key": self.config.api_key.expose_secret(),
            "query": query.query,
            "max_results": query.max_results.max(1),
        });
        if !query.include_domains.is_empty() {
            body["include_domains"] = serde_json::json!(query.include_domains);
        }
        if !query.exclude_domains.is_empty() {
            body["exclude_domains"] = serde_json::json!(query.exclude_domains);
        }

        let response: SearchResponse = self.post("search", body).await?;
        tracing::debug!(query = %query.query, hits = response.results.len(), "Tavily search");

        Ok(response
            .results
            .into_iter()
            .map(|r| SearchHit {
                url: r.url,
                title: r.title,
                snippet: r.content,
                score: r.score,
            })
            .collect())
    }

    async fn extract(&self, url: &str) -> Result<ExtractedPage, ToolError> {
        let body = serde_json::json!({
            "api_key": self.config.api_key.expose_secret(),
            "urls": [url],
        });

        let response: ExtractResponse = self.post("extract", body).await?;
        if !response.failed_results.is_empty() {
            tracing::debug!(url, failed = ?response.failed_results, "Tavily extract failures");
        }

        response
            .results
            .into_iter()
            .next()
            .map(|r| ExtractedPage {
                url: r.url,
                title: String::new(),
                raw_text: r.raw_content,
            })
            .ok_or_else(|| ToolError::EmptyResult(format!("extraction failed for {url}")))
    }
}
