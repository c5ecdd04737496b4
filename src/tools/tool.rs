//! Tool trait and shared tool types.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Errors a tool invocation can return. All of them are observations for
/// the calling agent, never fatal to a run.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),
}

/// Output of a successful tool invocation.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub result: serde_json::Value,
    pub duration: Duration,
}

impl ToolOutput {
    pub fn success(result: serde_json::Value, duration: Duration) -> Self {
        Self { result, duration }
    }

    pub fn text(text: impl Into<String>, duration: Duration) -> Self {
        Self {
            result: serde_json::Value::String(text.into()),
            duration,
        }
    }
}

/// Tool description handed to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A capability the research agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn parameters_schema(&self) -> serde_json::Value;

    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput, ToolError>;
}

/// Pull a required, non-empty string parameter.
pub fn require_str<'a>(params: &'a serde_json::Value, name: &str) -> Result<&'a str, ToolError> {
    params
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ToolError::InvalidParameters(format!("missing '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_str_present() {
        let params = serde_json::json!({"query": "  rust jobs "});
        assert_eq!(require_str(&params, "query").unwrap(), "rust jobs");
    }

    #[test]
    fn require_str_missing_or_blank() {
        let params = serde_json::json!({"query": "   ", "n": 3});
        assert!(matches!(
            require_str(&params, "query"),
            Err(ToolError::InvalidParameters(_))
        ));
        assert!(require_str(&params, "n").is_err());
        assert!(require_str(&params, "url").is_err());
    }
}
