use crate::config::Config;
use crate::upstream::{RetryingClient, UpstreamError};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

const EMBED_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// The embedding service could not be reached or rejected the request.
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce an embedding vector for each supplied chunk of text.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embedding client for services accepting `{texts, task_description, normalize}`.
pub struct HttpEmbeddingClient {
    http: RetryingClient,
    url: String,
    task_description: String,
    normalize: bool,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl HttpEmbeddingClient {
    /// Construct a client targeting `url`.
    pub fn new(
        http: RetryingClient,
        url: impl Into<String>,
        task_description: impl Into<String>,
        normalize: bool,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            task_description: task_description.into(),
            normalize,
        }
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!(url = %self.url, texts = texts.len(), "Generating embeddings");
        let body = json!({
            "texts": texts,
            "task_description": self.task_description,
            "normalize": self.normalize,
        });
        let response: EmbedResponse = self.http.post_json(&self.url, &body, EMBED_TIMEOUT).await?;

        if response.embeddings.iter().any(Vec::is_empty) {
            return Err(EmbeddingClientError::GenerationFailed(
                "service returned an empty vector".to_string(),
            ));
        }
        Ok(response.embeddings)
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client(
    config: &Config,
    http: RetryingClient,
) -> Box<dyn EmbeddingClient> {
    Box::new(HttpEmbeddingClient::new(
        http,
        config.embed_api_url.clone(),
        config.embed_task_description.clone(),
        config.embed_normalize,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::RetryPolicy;
    use httpmock::{Method::POST, MockServer};

    fn client(url: String) -> HttpEmbeddingClient {
        let http = RetryingClient::new(RetryPolicy {
            attempts: 1,
            base_delay: Duration::from_millis(1),
        })
        .expect("http client");
        HttpEmbeddingClient::new(http, url, "retrieve technical documents", true)
    }

    #[tokio::test]
    async fn posts_texts_and_reads_embeddings() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed").json_body(json!({
                    "texts": ["alpha", "beta"],
                    "task_description": "retrieve technical documents",
                    "normalize": true,
                }));
                then.status(200).json_body(json!({
                    "embeddings": [[0.1, 0.2], [0.3, 0.4]]
                }));
            })
            .await;

        let vectors = client(server.url("/embed"))
            .generate_embeddings(vec!["alpha".into(), "beta".into()])
            .await
            .expect("embeddings");

        mock.assert();
        assert_eq!(vectors, vec![vec![0.1, 0.2], vec![0.3, 0.4]]);
    }

    #[tokio::test]
    async fn empty_input_skips_the_request() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(200).json_body(json!({ "embeddings": [] }));
            })
            .await;

        let vectors = client(server.url("/embed"))
            .generate_embeddings(Vec::new())
            .await
            .expect("empty");

        assert!(vectors.is_empty());
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn upstream_failure_is_surfaced() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(422).body("bad payload");
            })
            .await;

        let error = client(server.url("/embed"))
            .generate_embeddings(vec!["alpha".into()])
            .await
            .expect_err("422");
        assert!(matches!(error, EmbeddingClientError::Upstream(_)));
    }
}
