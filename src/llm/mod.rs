//! LLM integration for FitCraft.
//!
//! The coach dialogue and workout generator talk to the `LlmProvider` trait.
//! Transport is rig-core's OpenAI-compatible chat completions client, bridged
//! by `RigAdapter`, so any compatible host (Groq by default) works through
//! `base_url`.

pub mod provider;
mod rig_adapter;
#[cfg(test)]
pub(crate) mod stub;

pub use provider::*;
pub use rig_adapter::RigAdapter;

use std::sync::Arc;
use std::time::Duration;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

const PROVIDER: &str = "openai_compatible";

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub base_url: String,
    pub model: String,
    /// Request timeout. `None` waits as long as the transport does.
    pub timeout: Option<Duration>,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let client: rig::client::Client<openai::client::OpenAICompletionsExt> =
        openai::CompletionsClient::builder()
            .api_key(config.api_key.expose_secret())
            .base_url(&config.base_url)
            .build()
            .map_err(|e| LlmError::RequestFailed {
                provider: PROVIDER.to_string(),
                reason: format!("Failed to create client: {e}"),
            })?;

    let model = client.completion_model(&config.model);
    tracing::info!(model = %config.model, base_url = %config.base_url, "Using OpenAI-compatible chat completions");
    Ok(Arc::new(
        RigAdapter::new(model, &config.model, PROVIDER).with_timeout(config.timeout),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_provider_constructs_without_network() {
        // rig clients accept any key at construction; auth fails on first request.
        let config = LlmConfig {
            api_key: secrecy::SecretString::from("test-key"),
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.1-8b-instant".to_string(),
            timeout: Some(Duration::from_secs(30)),
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.model_name(), "llama-3.1-8b-instant");
    }
}
