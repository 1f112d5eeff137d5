//! OCR and vision-language extraction over OpenAI-style chat-completions endpoints.

use super::ImageTranscriber;
use crate::upstream::{ChatCompletionResponse, RetryingClient, UpstreamError};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use std::time::Duration;

const OCR_PROMPT: &str = "請對這張圖片做 OCR，輸出乾淨的純文字（不要多餘解釋）。";
const VISION_PROMPT: &str = "請理解這份文件/圖片內容，輸出結構化 Markdown（保留標題、列表、表格）。";

/// Behaviour preset for a chat-completions image client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptionMode {
    /// Plain-text OCR: deterministic sampling, 60 second timeout.
    Ocr,
    /// Layout-aware markdown extraction: temperature 0.2, 180 second timeout.
    Vision,
}

impl TranscriptionMode {
    fn prompt(self) -> &'static str {
        match self {
            Self::Ocr => OCR_PROMPT,
            Self::Vision => VISION_PROMPT,
        }
    }

    fn temperature(self) -> f32 {
        match self {
            Self::Ocr => 0.0,
            Self::Vision => 0.2,
        }
    }

    fn timeout(self) -> Duration {
        match self {
            Self::Ocr => Duration::from_secs(60),
            Self::Vision => Duration::from_secs(180),
        }
    }
}

/// Sends images as base64 data URLs to a multimodal chat model.
pub struct ChatImageClient {
    http: RetryingClient,
    url: String,
    model: String,
    mode: TranscriptionMode,
}

impl ChatImageClient {
    /// Create a client for `model` served at `url`.
    pub fn new(
        http: RetryingClient,
        url: impl Into<String>,
        model: impl Into<String>,
        mode: TranscriptionMode,
    ) -> Self {
        Self {
            http,
            url: url.into(),
            model: model.into(),
            mode,
        }
    }
}

fn data_url(image: &[u8], mime: &str) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(image))
}

#[async_trait]
impl ImageTranscriber for ChatImageClient {
    async fn transcribe(&self, image: &[u8], mime: &str) -> Result<String, UpstreamError> {
        let body = json!({
            "model": self.model,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": self.mode.prompt() },
                    { "type": "image_url", "image_url": { "url": data_url(image, mime) } },
                ],
            }],
            "temperature": self.mode.temperature(),
        });

        tracing::debug!(
            url = %self.url,
            mode = ?self.mode,
            bytes = image.len(),
            "Requesting image transcription"
        );
        let response: ChatCompletionResponse = self
            .http
            .post_json(&self.url, &body, self.mode.timeout())
            .await?;
        Ok(response.into_content(&self.url)?.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::RetryPolicy;
    use httpmock::{Method::POST, MockServer};

    fn client(url: String, mode: TranscriptionMode) -> ChatImageClient {
        let http = RetryingClient::new(RetryPolicy {
            attempts: 2,
            base_delay: Duration::from_millis(1),
        })
        .expect("http client");
        ChatImageClient::new(http, url, "ocr-model", mode)
    }

    #[test]
    fn data_url_embeds_mime_and_base64() {
        assert_eq!(data_url(b"abc", "image/png"), "data:image/png;base64,YWJj");
    }

    #[tokio::test]
    async fn ocr_request_carries_model_image_and_zero_temperature() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_contains("\"model\":\"ocr-model\"")
                    .body_contains(OCR_PROMPT)
                    .body_contains("data:image/jpeg;base64,YWJj")
                    .body_contains("\"temperature\":0.0");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "  Invoice 2024\n" } }]
                }));
            })
            .await;

        let text = client(server.url("/v1/chat/completions"), TranscriptionMode::Ocr)
            .transcribe(b"abc", "image/jpeg")
            .await
            .expect("transcription");

        mock.assert();
        assert_eq!(text, "Invoice 2024");
    }

    #[tokio::test]
    async fn vision_request_asks_for_structured_markdown() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/chat/completions")
                    .body_contains(VISION_PROMPT)
                    .body_contains("\"temperature\":0.2");
                then.status(200).json_body(json!({
                    "choices": [{ "message": { "content": "# 發票\n\n| 品項 | 金額 |" } }]
                }));
            })
            .await;

        let text = client(server.url("/v1/chat/completions"), TranscriptionMode::Vision)
            .transcribe(b"abc", "image/png")
            .await
            .expect("transcription");

        mock.assert();
        assert!(text.starts_with("# 發票"));
    }

    #[tokio::test]
    async fn persistent_gateway_errors_surface_after_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/chat/completions");
                then.status(502);
            })
            .await;

        let error = client(server.url("/v1/chat/completions"), TranscriptionMode::Vision)
            .transcribe(b"abc", "image/png")
            .await
            .expect_err("gateway failure");

        mock.assert_hits(2);
        assert!(error.is_transient());
    }
}
