//! Schema-constrained completions.
//!
//! The schema travels with the request; the reply is pulled out of whatever
//! wrapping the model added and deserialized. Anything that does not
//! deserialize is an `InvalidResponse`.

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, LlmProvider, TokenUsage};

/// Run a completion and decode the reply as `T`.
pub async fn complete_structured<T: DeserializeOwned>(
    llm: &dyn LlmProvider,
    request: CompletionRequest,
) -> Result<(T, TokenUsage), LlmError> {
    let response = llm.complete(request).await?;
    let usage = response.usage();
    let json = extract_json_object(&response.content);

    match serde_json::from_str::<T>(&json) {
        Ok(value) => Ok((value, usage)),
        Err(e) => {
            warn!(
                model = llm.model_name(),
                error = %e,
                raw_len = response.content.len(),
                "Structured reply did not match schema"
            );
            Err(LlmError::InvalidResponse {
                provider: llm.model_name().to_string(),
                reason: format!("reply does not match schema: {e}"),
            })
        }
    }
}

/// Extract a JSON object from LLM output (handles markdown wrapping).
pub fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return inner.to_string();
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}
