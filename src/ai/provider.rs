//! Provider-agnostic completion interface.
//!
//! The categorizer and the script synthesizer only ever see this trait;
//! concrete backends (rig-core Anthropic/OpenAI) are bridged in via
//! [`crate::ai::RigAdapter`], and tests substitute fakes.

use async_trait::async_trait;

use crate::error::AiError;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
}

/// A single chat message in a completion request.
#[derive(Debug, Clone)]
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
}

/// A completion request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            max_tokens: 1024,
            temperature: 0.2,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A completion response.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
}

/// Language-model backend used for categorization and script rewriting.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Model identifier, for logs.
    fn model_name(&self) -> &str;

    /// Run a completion request.
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AiError>;
}
