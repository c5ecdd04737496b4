//! Model access for the pipeline stages.
//!
//! Anthropic and OpenAI models come from rig-core and are wrapped in
//! `RigAdapter`; everything downstream only sees `dyn LlmProvider`.

mod costs;
pub mod provider;
pub(crate) mod retry;
mod rig_adapter;
pub mod structured;

pub use provider::*;
pub use rig_adapter::RigAdapter;
pub use structured::{complete_structured, extract_json_object};

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::{ConfigError, LlmError};

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl LlmConfig {
    /// Build from `SCOUT_LLM_BACKEND`, `SCOUT_MODEL` and the backend's API key variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = match std::env::var("SCOUT_LLM_BACKEND")
            .unwrap_or_else(|_| "anthropic".to_string())
            .to_lowercase()
            .as_str()
        {
            "anthropic" => LlmBackend::Anthropic,
            "openai" => LlmBackend::OpenAi,
            other => {
                return Err(ConfigError::InvalidValue {
                    key: "SCOUT_LLM_BACKEND".into(),
                    message: format!("unknown backend '{other}' (expected anthropic or openai)"),
                });
            }
        };

        let (key_var, default_model) = match backend {
            LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-sonnet-4-20250514"),
            LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-4o"),
        };

        let api_key = std::env::var(key_var)
            .map_err(|_| ConfigError::MissingEnvVar(key_var.to_string()))?;
        let model = std::env::var("SCOUT_MODEL").unwrap_or_else(|_| default_model.to_string());

        Ok(Self {
            backend,
            api_key: secrecy::SecretString::from(api_key),
            model,
        })
    }
}

/// Build the provider for `config`. No network traffic happens here.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let key = config.api_key.expose_secret();
    let provider: Arc<dyn LlmProvider> = match config.backend {
        LlmBackend::Anthropic => {
            let client: rig::client::Client<rig::providers::anthropic::client::AnthropicExt> =
                rig::providers::anthropic::Client::new(key)
                    .map_err(|e| client_error("anthropic", e))?;
            Arc::new(RigAdapter::new(client.completion_model(&config.model), &config.model))
        }
        LlmBackend::OpenAi => {
            let client: rig::client::Client<rig::providers::openai::client::OpenAIResponsesExt> =
                rig::providers::openai::Client::new(key).map_err(|e| client_error("openai", e))?;
            Arc::new(RigAdapter::new(client.completion_model(&config.model), &config.model))
        }
    };
    tracing::info!(backend = ?config.backend, model = %config.model, "LLM provider ready");
    Ok(provider)
}

fn client_error(provider: &str, err: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        reason: format!("client construction failed: {err}"),
    }
}
