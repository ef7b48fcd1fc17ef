//! Narration from the hosted chat-completion API.

use super::{NarrativeProvider, NarrativeRequest, ProviderError};
use crate::config::{Credential, GameConfig, DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use async_trait::async_trait;
use openai::{OpenAi, Request};

/// Provider backed by the OpenAI Chat Completions endpoint.
pub struct LiveProvider {
    client: OpenAi,
    temperature: f32,
    max_tokens: usize,
}

impl LiveProvider {
    /// Build a provider for the given credential using the configured
    /// model, endpoint, sampling and timeout settings.
    pub fn new(credential: &Credential, config: &GameConfig) -> Self {
        let mut client = OpenAi::new(credential.as_str())
            .with_model(&config.model)
            .with_timeout(config.request_timeout());
        if let Some(base_url) = &config.base_url {
            client = client.with_base_url(base_url);
        }

        Self {
            client,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Wrap an already configured client with the default sampling settings.
    pub fn from_client(client: OpenAi) -> Self {
        Self {
            client,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl NarrativeProvider for LiveProvider {
    async fn generate(&self, request: NarrativeRequest<'_>) -> Result<String, ProviderError> {
        let messages = request.conversation.iter().map(Into::into).collect();
        let api_request = Request::new(messages)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens);

        log::debug!(
            "Submitting {} messages to {}",
            request.conversation.len(),
            self.client.model()
        );

        let response = self.client.complete(api_request).await?;
        let text = response.content.trim();
        if text.is_empty() {
            return Err(ProviderError::new("model returned an empty reply"));
        }
        Ok(text.to_string())
    }

    fn name(&self) -> &str {
        "live"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_config() {
        let credential = Credential::parse("sk-test").unwrap();
        let provider = LiveProvider::new(&credential, &GameConfig::default());
        assert_eq!(provider.temperature, 0.8);
        assert_eq!(provider.max_tokens, 1000);
        assert_eq!(provider.client.model(), "gpt-3.5-turbo");
    }

    #[test]
    fn test_builder_overrides() {
        let provider = LiveProvider::from_client(OpenAi::new("sk-test"))
            .with_temperature(0.2)
            .with_max_tokens(64);
        assert_eq!(provider.temperature, 0.2);
        assert_eq!(provider.max_tokens, 64);
    }
}
