//! Bridges rig's `CompletionModel` to our `LlmProvider` trait.

use std::time::Duration;

use async_trait::async_trait;
use rig::completion::{CompletionError, CompletionModel};
use rig::message::{AssistantContent, Message};
use tracing::debug;

use super::provider::{ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role};
use crate::error::LlmError;

/// Wraps any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: String,
    timeout: Option<Duration>,
}

impl<M: CompletionModel> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider: provider.to_string(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_failed(&self, reason: impl std::fmt::Display) -> LlmError {
        LlmError::RequestFailed {
            provider: self.provider.clone(),
            reason: reason.to_string(),
        }
    }
}

/// Split our flat message list into rig's shape: system text becomes the
/// preamble, the last user message is the prompt, the rest is history.
fn split_messages(
    messages: Vec<ChatMessage>,
) -> Option<(Option<String>, Vec<Message>, Message)> {
    let mut system = Vec::new();
    let mut history = Vec::new();
    for message in messages {
        match message.role {
            Role::System => system.push(message.content),
            Role::User => history.push(Message::user(message.content)),
            Role::Assistant => history.push(Message::assistant(message.content)),
        }
    }
    let prompt = history.pop()?;
    let preamble = (!system.is_empty()).then(|| system.join("\n\n"));
    Some((preamble, history, prompt))
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + Send + Sync + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (preamble, history, prompt) = split_messages(request.messages)
            .ok_or_else(|| self.request_failed("request has no user or assistant message"))?;

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let send = builder.send();
        let result = match self.timeout {
            Some(after) => tokio::time::timeout(after, send)
                .await
                .map_err(|_| LlmError::Timeout {
                    provider: self.provider.clone(),
                    after,
                })?,
            None => send.await,
        };
        let response = result.map_err(|e| match e {
            CompletionError::ProviderError(message) => LlmError::Upstream {
                provider: self.provider.clone(),
                message,
            },
            other => self.request_failed(other),
        })?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|part| match part {
                AssistantContent::Text(text) => Some(text.text.as_str()),
                _ => None,
            })
            .collect();

        let input_tokens = u32::try_from(response.usage.input_tokens).unwrap_or(u32::MAX);
        let output_tokens = u32::try_from(response.usage.output_tokens).unwrap_or(u32::MAX);
        debug!(
            model = %self.model_name,
            input_tokens,
            output_tokens,
            "Completion received"
        );

        Ok(CompletionResponse {
            content,
            input_tokens,
            output_tokens,
        })
    }
}
