//! Bridges a rig-core `CompletionModel` to our [`AiProvider`] trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel};

use crate::ai::provider::{AiProvider, CompletionRequest, CompletionResponse, Role};
use crate::error::AiError;

/// Adapter wrapping any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    name: String,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, name: &str) -> Self {
        Self {
            model,
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl<M: CompletionModel> AiProvider for RigAdapter<M> {
    fn model_name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, AiError> {
        // rig models take a single prompt plus an optional preamble, so
        // fold our role-tagged messages into those two slots.
        let preamble = join_by_role(&request, Role::System, "\n");
        let prompt = join_by_role(&request, Role::User, "\n\n");

        let mut builder = self
            .model
            .completion_request(prompt)
            .temperature(f64::from(request.temperature))
            .max_tokens(u64::from(request.max_tokens));
        if !preamble.is_empty() {
            builder = builder.preamble(preamble);
        }

        let response = builder.send().await.map_err(|e| AiError::RequestFailed {
            provider: self.name.clone(),
            reason: e.to_string(),
        })?;

        match response.choice.first() {
            AssistantContent::Text(text) => Ok(CompletionResponse { content: text.text }),
            other => Err(AiError::BadResponse {
                provider: self.name.clone(),
                reason: format!("non-text completion content: {other:?}"),
            }),
        }
    }
}

fn join_by_role(request: &CompletionRequest, role: Role, sep: &str) -> String {
    request
        .messages
        .iter()
        .filter(|m| m.role == role)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::provider::ChatMessage;

    #[test]
    fn join_by_role_splits_messages() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("be terse"),
            ChatMessage::user("hello"),
            ChatMessage::user("world"),
        ]);
        assert_eq!(join_by_role(&request, Role::System, "\n"), "be terse");
        assert_eq!(join_by_role(&request, Role::User, "\n\n"), "hello\n\nworld");
    }
}
