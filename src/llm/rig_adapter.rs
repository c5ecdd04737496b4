//! Bridges rig-core completion models to `LlmProvider`.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::completion::message::{AssistantContent, Message};
use rust_decimal::Decimal;

use crate::error::LlmError;
use crate::llm::costs;
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role};
use crate::llm::retry::{RetryPolicy, with_retry};

/// Anthropic rejects requests without an explicit output budget.
const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Adapter from a rig `CompletionModel` to our `LlmProvider`.
pub struct RigAdapter<M: CompletionModel> {
    model: M,
    model_name: String,
    retry: RetryPolicy,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            retry: RetryPolicy::default(),
        }
    }

    async fn send_once(
        &self,
        preamble: Option<String>,
        history: Vec<Message>,
        prompt: Message,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let mut builder = self
            .model
            .completion_request(prompt)
            .messages(history)
            .max_tokens(request.max_tokens.map(u64::from).unwrap_or(DEFAULT_MAX_TOKENS));

        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(&self.model_name, e.to_string()))?;

        let content = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(t) => Some(t.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(CompletionResponse {
            content,
            input_tokens: u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX),
            output_tokens: u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX),
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        costs::model_cost(&self.model_name)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, mut history) = to_rig_messages(&request);
        let prompt = history.pop().ok_or_else(|| LlmError::InvalidResponse {
            provider: self.model_name.clone(),
            reason: "completion request has no user message".into(),
        })?;

        with_retry(self.retry, || {
            self.send_once(preamble.clone(), history.clone(), prompt.clone(), &request)
        })
        .await
    }
}

/// Split a request into a rig preamble and message list. System messages
/// and the response schema fold into the preamble.
fn to_rig_messages(request: &CompletionRequest) -> (Option<String>, Vec<Message>) {
    let mut system_parts: Vec<String> = Vec::new();
    let mut messages = Vec::new();

    for msg in &request.messages {
        match msg.role {
            Role::System => system_parts.push(msg.content.clone()),
            Role::User => messages.push(Message::user(msg.content.clone())),
            Role::Assistant => messages.push(Message::assistant(msg.content.clone())),
        }
    }

    if let Some(schema) = &request.response_schema {
        system_parts.push(schema_instruction(schema));
    }

    let preamble = if system_parts.is_empty() {
        None
    } else {
        Some(system_parts.join("\n\n"))
    };
    (preamble, messages)
}

/// Instruction appended to the preamble for schema-constrained replies.
fn schema_instruction(schema: &serde_json::Value) -> String {
    format!(
        "Respond with ONLY a JSON object conforming to this JSON schema. No prose, no markdown.\n{}",
        serde_json::to_string_pretty(schema).unwrap_or_else(|_| schema.to_string())
    )
}

fn classify_error(provider: &str, reason: String) -> LlmError {
    let lower = reason.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: None,
        }
    } else if lower.contains("401") || lower.contains("authentication") {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else if lower.contains("prompt is too long") || lower.contains("context length") {
        LlmError::ContextLengthExceeded { used: 0, limit: 0 }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason,
        }
    }
}
