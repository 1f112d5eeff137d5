//! Retry-wrapped HTTP transport shared by the OCR, vision, embedding, and generation clients.
//!
//! Gateway-class failures (502/503/504) and network-level errors are retried with exponential
//! backoff; every other non-success status propagates immediately. After the last attempt the
//! most recent failure is returned.

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors returned by calls to volatile upstream services.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// Upstream answered with a non-success status.
    #[error("Upstream {url} returned {status}: {body}")]
    Status {
        /// Endpoint that produced the response.
        url: String,
        /// HTTP status returned by the upstream.
        status: StatusCode,
        /// Response body captured for diagnostics.
        body: String,
    },
    /// Request failed before a response was received.
    #[error("Request to {url} failed: {source}")]
    Network {
        /// Endpoint that could not be reached.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// Upstream answered successfully but the body did not have the expected shape.
    #[error("Malformed response from {url}: {message}")]
    InvalidResponse {
        /// Endpoint that produced the response.
        url: String,
        /// Description of the mismatch.
        message: String,
    },
    /// A required endpoint or model was not configured.
    #[error("{0} is not configured")]
    ConfigurationMissing(String),
}

impl UpstreamError {
    /// Whether the failure is worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => is_gateway_status(*status),
            Self::Network { .. } => true,
            Self::InvalidResponse { .. } | Self::ConfigurationMissing(_) => false,
        }
    }
}

fn is_gateway_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts including the first one; values below one are treated as one.
    pub attempts: u32,
    /// Delay after the first failed attempt, doubled for each following attempt.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the zero-based `attempt` failed.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// HTTP client that posts JSON and retries transient upstream failures.
#[derive(Clone)]
pub struct RetryingClient {
    http: Client,
    policy: RetryPolicy,
}

impl RetryingClient {
    /// Build a client with the given retry policy.
    pub fn new(policy: RetryPolicy) -> Result<Self, UpstreamError> {
        let http = Client::builder()
            .user_agent("idp-pipeline/0.1")
            .build()
            .map_err(|source| UpstreamError::Network {
                url: String::new(),
                source,
            })?;
        Ok(Self { http, policy })
    }

    /// Retry policy applied to every call.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// POST a JSON body and decode the JSON response into `T`.
    pub async fn post_json<T>(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<T, UpstreamError>
    where
        T: DeserializeOwned,
    {
        let response = self.post_with_retry(url, body, timeout).await?;
        response
            .json::<T>()
            .await
            .map_err(|error| UpstreamError::InvalidResponse {
                url: url.to_string(),
                message: error.to_string(),
            })
    }

    async fn post_with_retry(
        &self,
        url: &str,
        body: &Value,
        timeout: Duration,
    ) -> Result<reqwest::Response, UpstreamError> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            let error = match self.http.post(url).timeout(timeout).json(body).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    UpstreamError::Status {
                        url: url.to_string(),
                        status,
                        body,
                    }
                }
                Err(source) => UpstreamError::Network {
                    url: url.to_string(),
                    source,
                },
            };

            if !error.is_transient() || attempt + 1 >= attempts {
                return Err(error);
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                url,
                attempt = attempt + 1,
                attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient upstream failure; retrying"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// OpenAI-style chat-completions response body.
#[derive(Debug, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCompletionResponse {
    /// Extract `choices[0].message.content`.
    pub(crate) fn into_content(self, url: &str) -> Result<String, UpstreamError> {
        self.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| UpstreamError::InvalidResponse {
                url: url.to_string(),
                message: "response contained no choices".into(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    fn fast_client(attempts: u32) -> RetryingClient {
        RetryingClient::new(RetryPolicy {
            attempts,
            base_delay: Duration::from_millis(1),
        })
        .expect("client")
    }

    #[test]
    fn backoff_doubles_each_attempt() {
        let policy = RetryPolicy {
            attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[tokio::test]
    async fn gateway_failures_are_retried_until_exhausted() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(503).body("busy");
            })
            .await;

        let error = fast_client(3)
            .post_json::<Value>(
                &server.url("/v1/chat/completions"),
                &json!({ "ping": true }),
                Duration::from_secs(5),
            )
            .await
            .expect_err("exhausted retries");

        mock.assert_hits(3);
        assert!(error.is_transient());
        assert!(
            matches!(error, UpstreamError::Status { status, .. } if status == StatusCode::SERVICE_UNAVAILABLE)
        );
    }

    #[tokio::test]
    async fn every_gateway_status_is_retried() {
        for code in [502, 504] {
            let server = MockServer::start_async().await;
            let mock = server
                .mock_async(|when, then| {
                    when.method(POST).path("/embed");
                    then.status(code).body("upstream unavailable");
                })
                .await;

            let error = fast_client(2)
                .post_json::<Value>(&server.url("/embed"), &json!({}), Duration::from_secs(5))
                .await
                .expect_err("exhausted retries");

            mock.assert_hits(2);
            assert!(
                matches!(&error, UpstreamError::Status { status, .. } if status.as_u16() == code)
            );
            assert!(error.is_transient());
        }
    }

    #[tokio::test]
    async fn connection_failures_are_retried_with_backoff() {
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|listener| listener.local_addr())
            .expect("free port")
            .port();
        let base_delay = Duration::from_millis(50);
        let client = RetryingClient::new(RetryPolicy {
            attempts: 3,
            base_delay,
        })
        .expect("client");

        let started = std::time::Instant::now();
        let error = client
            .post_json::<Value>(
                &format!("http://127.0.0.1:{port}/embed"),
                &json!({}),
                Duration::from_secs(2),
            )
            .await
            .expect_err("nothing is listening");

        assert!(matches!(error, UpstreamError::Network { .. }));
        assert!(error.is_transient());
        assert!(started.elapsed() >= base_delay + base_delay * 2);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/embed");
                then.status(400).body("bad input");
            })
            .await;

        let error = fast_client(3)
            .post_json::<Value>(&server.url("/embed"), &json!({}), Duration::from_secs(5))
            .await
            .expect_err("permanent failure");

        mock.assert_hits(1);
        assert!(!error.is_transient());
    }

    #[tokio::test]
    async fn successful_response_is_decoded() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "hello" } }]
                }));
            })
            .await;

        let url = server.url("/v1/chat/completions");
        let response: ChatCompletionResponse = fast_client(2)
            .post_json(&url, &json!({}), Duration::from_secs(5))
            .await
            .expect("response");
        assert_eq!(response.into_content(&url).expect("content"), "hello");
    }

    #[test]
    fn empty_choices_are_reported_as_malformed() {
        let response = ChatCompletionResponse { choices: vec![] };
        let error = response.into_content("http://upstream").expect_err("no choices");
        assert!(matches!(error, UpstreamError::InvalidResponse { .. }));
    }
}
