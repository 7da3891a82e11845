//! Canned `LlmProvider` for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::error::LlmError;

pub struct StubLlm {
    reply: Result<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl StubLlm {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            reply: Err(reason.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.requests.lock().unwrap().push(request);
        match &self.reply {
            Ok(text) => Ok(CompletionResponse {
                content: text.clone(),
                input_tokens: 0,
                output_tokens: 0,
            }),
            Err(reason) => Err(LlmError::Upstream {
                provider: "stub".to_string(),
                message: reason.clone(),
            }),
        }
    }
}
