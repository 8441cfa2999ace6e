mod client;
pub(crate) mod types;

use async_trait::async_trait;

use crate::error::AiError;
use crate::traits::{CompletionOptions, TextCompletion};

use client::OpenRouterClient;

// =============================================================================
// OpenRouter
// =============================================================================

#[derive(Clone)]
pub struct OpenRouter {
    api_key: String,
    pub(crate) model: String,
    base_url: Option<String>,
    app_name: Option<String>,
    site_url: Option<String>,
    http: reqwest::Client,
}

impl OpenRouter {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            app_name: None,
            site_url: None,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn with_site_url(mut self, url: impl Into<String>) -> Self {
        self.site_url = Some(url.into());
        self
    }

    /// Share a configured `reqwest::Client` (timeouts, proxies) with this agent.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    /// Get the model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    pub(crate) fn client(&self) -> OpenRouterClient {
        let mut client = OpenRouterClient::new(&self.api_key, self.http.clone());
        if let Some(ref url) = self.base_url {
            client = client.with_base_url(url);
        }
        if let Some(ref name) = self.app_name {
            client = client.with_app_name(name);
        }
        if let Some(ref url) = self.site_url {
            client = client.with_site_url(url);
        }
        client
    }
}

#[async_trait]
impl TextCompletion for OpenRouter {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        options: &CompletionOptions,
    ) -> Result<String, AiError> {
        let request = types::ChatRequest::new(&self.model)
            .message(types::WireMessage::system(system_prompt))
            .message(types::WireMessage::user(user_prompt))
            .temperature(options.temperature)
            .max_tokens(options.max_tokens)
            .json_mode(&options.json_mode);

        self.client().chat(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openrouter_new() {
        let or = OpenRouter::new("or-test", "openai/gpt-4o-mini");
        assert_eq!(or.model(), "openai/gpt-4o-mini");
        assert_eq!(or.api_key, "or-test");
    }

    #[test]
    fn test_openrouter_with_app_name() {
        let or = OpenRouter::new("or-test", "openai/gpt-4o-mini")
            .with_app_name("Room Scout")
            .with_site_url("https://roomscout.vn");
        assert_eq!(or.app_name, Some("Room Scout".to_string()));
        assert_eq!(or.site_url, Some("https://roomscout.vn".to_string()));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_network_error() {
        let or = OpenRouter::new("or-test", "m").with_base_url("http://127.0.0.1:9");
        let err = or
            .complete("sys", "user", &CompletionOptions::json(0.3))
            .await
            .unwrap_err();
        assert!(matches!(err, AiError::Network(_)), "got {err:?}");
        assert!(!err.is_rate_limited());
    }
}
