//! Text generation used to answer GraphRAG questions.
//!
//! The generator is optional: when `LLM_API_URL` or `LLM_MODEL` is not configured the client is
//! still constructed, and every call fails with a configuration error instead of aborting start-up.

use crate::config::Config;
use crate::upstream::{ChatCompletionResponse, RetryingClient, UpstreamError};
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const GENERATION_TIMEOUT: Duration = Duration::from_secs(120);
const GENERATION_TEMPERATURE: f32 = 0.2;

/// Errors surfaced while generating an answer.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// Endpoint or model was not configured.
    #[error("Text generation unavailable: {0} is not configured")]
    NotConfigured(&'static str),
    /// The provider call failed.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Interface implemented by text-generation providers.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Chat-completions backed generator.
pub struct ChatCompletionGenerator {
    http: RetryingClient,
    url: Option<String>,
    model: Option<String>,
}

impl ChatCompletionGenerator {
    /// Create a generator; either setting may be absent.
    pub fn new(http: RetryingClient, url: Option<String>, model: Option<String>) -> Self {
        Self { http, url, model }
    }

    /// Create a generator from `LLM_API_URL` / `LLM_MODEL`.
    pub fn from_config(config: &Config, http: RetryingClient) -> Self {
        Self::new(http, config.llm_api_url.clone(), config.llm_model.clone())
    }
}

#[async_trait]
impl TextGenerator for ChatCompletionGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = self
            .url
            .as_deref()
            .ok_or(GenerationError::NotConfigured("LLM_API_URL"))?;
        let model = self
            .model
            .as_deref()
            .ok_or(GenerationError::NotConfigured("LLM_MODEL"))?;

        let payload = json!({
            "model": model,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": GENERATION_TEMPERATURE,
        });
        let response: ChatCompletionResponse = self
            .http
            .post_json(url, &payload, GENERATION_TIMEOUT)
            .await?;
        Ok(response.into_content(url)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::RetryPolicy;
    use httpmock::{Method::POST, MockServer};

    fn http() -> RetryingClient {
        RetryingClient::new(RetryPolicy {
            attempts: 1,
            base_delay: Duration::from_millis(1),
        })
        .expect("http client")
    }

    #[tokio::test]
    async fn missing_endpoint_is_a_configuration_error() {
        let generator = ChatCompletionGenerator::new(http(), None, Some("model".into()));
        let error = generator.generate("hello").await.expect_err("unconfigured");
        assert!(matches!(error, GenerationError::NotConfigured("LLM_API_URL")));
    }

    #[tokio::test]
    async fn missing_model_is_a_configuration_error() {
        let generator =
            ChatCompletionGenerator::new(http(), Some("http://localhost:1".into()), None);
        let error = generator.generate("hello").await.expect_err("unconfigured");
        assert!(matches!(error, GenerationError::NotConfigured("LLM_MODEL")));
    }

    #[tokio::test]
    async fn returns_first_choice_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_contains("\"model\":\"qwen\"")
                    .body_contains("Explain invoices");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "Invoices are bills." } }]
                }));
            })
            .await;

        let generator = ChatCompletionGenerator::new(
            http(),
            Some(server.url("/v1/chat/completions")),
            Some("qwen".into()),
        );
        let answer = generator.generate("Explain invoices").await.expect("answer");

        mock.assert();
        assert_eq!(answer, "Invoices are bills.");
    }
}
