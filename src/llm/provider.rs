//! Provider-agnostic completion types and the `LlmProvider` trait.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LlmError;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// JSON schema the reply must conform to.
    pub response_schema: Option<serde_json::Value>,
    pub metadata: HashMap<String, String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: None,
            temperature: None,
            response_schema: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_response_schema(mut self, schema: serde_json::Value) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Rough size of the prompt in characters.
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Unknown,
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub finish_reason: FinishReason,
    pub response_id: Option<String>,
}

impl CompletionResponse {
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens as u64,
            output_tokens: self.output_tokens as u64,
        }
    }
}

/// Token usage, accumulated across calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn add(&mut self, other: TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }

    /// Estimated cost given per-token (input, output) prices.
    pub fn cost(&self, prices: (Decimal, Decimal)) -> Decimal {
        Decimal::from(self.input_tokens) * prices.0 + Decimal::from(self.output_tokens) * prices.1
    }
}

/// A completion service. Treated as untrusted: every reply is either
/// well-formed data or an error.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Model identifier.
    fn model_name(&self) -> &str;

    /// Cost per (input, output) token in USD.
    fn cost_per_token(&self) -> (Decimal, Decimal);

    /// Run a single completion.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn request_builder_sets_fields() {
        let req = CompletionRequest::new(vec![ChatMessage::system("sys"), ChatMessage::user("hi")])
            .with_temperature(0.0)
            .with_max_tokens(100)
            .with_response_schema(serde_json::json!({"type": "object"}))
            .with_metadata("stage", "classify");
        assert_eq!(req.temperature, Some(0.0));
        assert_eq!(req.max_tokens, Some(100));
        assert!(req.response_schema.is_some());
        assert_eq!(req.metadata["stage"], "classify");
        assert_eq!(req.prompt_chars(), 5);
    }

    #[test]
    fn usage_accumulates_and_costs() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage {
            input_tokens: 1000,
            output_tokens: 100,
        });
        total.add(TokenUsage {
            input_tokens: 500,
            output_tokens: 50,
        });
        assert_eq!(total.total(), 1650);
        let cost = total.cost((dec!(0.000003), dec!(0.000015)));
        assert_eq!(cost, dec!(0.006750));
    }

    #[test]
    fn message_constructors_set_roles() {
        assert_eq!(ChatMessage::system("a").role, Role::System);
        assert_eq!(ChatMessage::user("a").role, Role::User);
        assert_eq!(ChatMessage::assistant("a").role, Role::Assistant);
    }
}
