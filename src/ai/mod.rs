//! AI service integration.
//!
//! Supports:
//! - **Anthropic**: direct API access via rig-core
//! - **OpenAI**: direct API access via rig-core
//!
//! Uses the rig-core crate for HTTP transport and [`RigAdapter`] to
//! bridge rig's `CompletionModel` trait to our [`AiProvider`] trait.
//!
//! Credential absence is decided here, once: `AiConfig::from_env`
//! returns `None` when no key is set, and everything downstream runs in
//! heuristic-only mode without attempting network I/O.

pub mod provider;
mod rig_adapter;

pub use provider::{AiProvider, ChatMessage, CompletionRequest, CompletionResponse, Role};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::AiError;

/// Supported AI backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AiBackend {
    Anthropic,
    OpenAi,
}

/// Configuration for creating an AI provider.
#[derive(Debug, Clone)]
pub struct AiConfig {
    pub backend: AiBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

impl AiConfig {
    /// Read provider configuration from the environment.
    ///
    /// Returns `None` when no API key is set — the single place where
    /// missing credentials are detected.
    pub fn from_env() -> Option<Self> {
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            let model = std::env::var("CALLBRIEF_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-20250514".to_string());
            return Some(Self {
                backend: AiBackend::Anthropic,
                api_key: secrecy::SecretString::from(key),
                model,
            });
        }
        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            let model =
                std::env::var("CALLBRIEF_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
            return Some(Self {
                backend: AiBackend::OpenAi,
                api_key: secrecy::SecretString::from(key),
                model,
            });
        }
        None
    }
}

/// Create an AI provider from configuration.
pub fn create_provider(config: &AiConfig) -> Result<Arc<dyn AiProvider>, AiError> {
    match config.backend {
        AiBackend::Anthropic => create_anthropic_provider(config),
        AiBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_anthropic_provider(config: &AiConfig) -> Result<Arc<dyn AiProvider>, AiError> {
    use rig::providers::anthropic;

    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret()).map_err(|e| {
            AiError::RequestFailed {
                provider: "anthropic".to_string(),
                reason: format!("Failed to create Anthropic client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using Anthropic (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}

fn create_openai_provider(config: &AiConfig) -> Result<Arc<dyn AiProvider>, AiError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret()).map_err(|e| {
            AiError::RequestFailed {
                provider: "openai".to_string(),
                reason: format!("Failed to create OpenAI client: {}", e),
            }
        })?;

    let model = client.completion_model(&config.model);
    tracing::info!("Using OpenAI (model: {})", config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model)))
}
