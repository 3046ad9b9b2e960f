//! VLM interaction: build the vision request and call the model.
//!
//! The pipeline only talks to the [`VisionModel`] trait. The production
//! implementation, [`OpenAiCompatibleClient`], speaks the OpenAI
//! chat-completions protocol, which DashScope (Qwen-VL), OpenAI, vLLM,
//! LiteLLM and Ollama all expose. Tests swap in a fake model through
//! [`crate::config::ConversionConfigBuilder::provider`].
//!
//! ## Retry Strategy
//!
//! By default a request is attempted exactly once. With `max_retries > 0`,
//! transient failures (timeouts, connection errors, HTTP 429 and 5xx) are
//! retried with exponential backoff (`retry_backoff_ms * 2^(attempt-1)`).
//! Authentication errors, other 4xx responses and malformed bodies are never
//! retried.

use crate::config::ConversionConfig;
use crate::error::Img2XlsxError;
use crate::prompts::{DEFAULT_USER_PROMPT, TABLE_EXTRACTION_PROMPT};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Everything the model needs for one extraction call.
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    pub system_prompt: String,
    pub user_prompt: String,
    /// `data:image/<mime>;base64,...`
    pub image_data_uri: String,
}

impl ExtractionRequest {
    /// Build a request with the prompts from `config` (or the defaults).
    pub fn new(image_data_uri: String, config: &ConversionConfig) -> Self {
        Self {
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| TABLE_EXTRACTION_PROMPT.to_string()),
            user_prompt: config
                .user_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_USER_PROMPT.to_string()),
            image_data_uri,
        }
    }
}

/// A vision-capable model: given an image and a prompt, returns free-form text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Run one extraction.
    ///
    /// `Ok(None)` means the model answered without content; that is not a
    /// request failure.
    async fn extract(&self, request: &ExtractionRequest) -> Result<Option<String>, Img2XlsxError>;
}

// ── OpenAI-compatible client ─────────────────────────────────────────────

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl OpenAiCompatibleClient {
    /// Create a client from the endpoint settings in `config`.
    pub fn from_config(config: &ConversionConfig) -> Result<Self, Img2XlsxError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                Img2XlsxError::InvalidConfig(
                    "no API key configured.\nSet IMG2XLSX_API_KEY (or OPENAI_API_KEY) or pass --api-key."
                        .into(),
                )
            })?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.api_timeout_secs))
            .build()
            .map_err(|e| Img2XlsxError::Internal(format!("HTTP client: {e}")))?;

        Ok(Self {
            http,
            url: config.completions_url(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    /// JSON body for `POST /chat/completions`.
    fn build_body(&self, request: &ExtractionRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                {
                    "role": "user",
                    "content": [
                        { "type": "image_url", "image_url": { "url": request.image_data_uri } },
                        { "type": "text", "text": request.user_prompt }
                    ]
                }
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": false
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<Option<String>, Attempt> {
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("request to {} timed out", self.url)
                } else {
                    format!("request to {} failed: {e}", self.url)
                };
                Attempt {
                    reason,
                    transient: e.is_timeout() || e.is_connect(),
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Attempt {
                reason: format!("HTTP {status}: {}", truncate(&text, 300)),
                transient: status.as_u16() == 429 || status.is_server_error(),
            });
        }

        let parsed: ChatCompletionResponse = response.json().await.map_err(|e| Attempt {
            reason: format!("malformed response body: {e}"),
            transient: false,
        })?;

        if let Some(usage) = &parsed.usage {
            debug!(
                "{} input tokens, {} output tokens",
                usage.prompt_tokens, usage.completion_tokens
            );
        }

        let choice = parsed.choices.into_iter().next().ok_or_else(|| Attempt {
            reason: "response contained no choices".into(),
            transient: false,
        })?;
        Ok(choice.message.content)
    }
}

#[async_trait]
impl VisionModel for OpenAiCompatibleClient {
    async fn extract(&self, request: &ExtractionRequest) -> Result<Option<String>, Img2XlsxError> {
        let start = Instant::now();
        let body = self.build_body(request);
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Extraction retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.send_once(&body).await {
                Ok(content) => {
                    debug!(
                        "Model {} answered in {:?} ({} chars)",
                        self.model,
                        start.elapsed(),
                        content.as_deref().map_or(0, str::len)
                    );
                    return Ok(content);
                }
                Err(failure) => {
                    warn!("Extraction attempt {} failed — {}", attempt + 1, failure.reason);
                    let transient = failure.transient;
                    last_err = Some(failure.reason);
                    if !transient {
                        break;
                    }
                }
            }
        }

        Err(Img2XlsxError::ExtractionRequestFailed {
            reason: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Outcome of a single failed attempt.
struct Attempt {
    reason: String,
    transient: bool,
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    const URI: &str = "data:image/png;base64,iVBORw0KGgo=";

    fn config_for(server: &MockServer) -> ConversionConfig {
        ConversionConfig::builder()
            .api_key("test-key")
            .base_url(server.base_url())
            .model("qwen-vl-max-latest")
            .retry_backoff_ms(1)
            .build()
            .unwrap()
    }

    fn completion(content: serde_json::Value) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
            ],
            "usage": { "prompt_tokens": 812, "completion_tokens": 40, "total_tokens": 852 }
        })
    }

    #[test]
    fn request_uses_default_prompts() {
        let req = ExtractionRequest::new(URI.into(), &ConversionConfig::default());
        assert_eq!(req.system_prompt, TABLE_EXTRACTION_PROMPT);
        assert_eq!(req.user_prompt, DEFAULT_USER_PROMPT);
    }

    #[test]
    fn body_carries_image_and_cue() {
        let config = ConversionConfig::builder()
            .api_key("k")
            .user_prompt("Read the table")
            .build()
            .unwrap();
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        let body = client.build_body(&ExtractionRequest::new(URI.into(), &config));

        assert_eq!(body["model"], "qwen-vl-max-latest");
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        let parts = &body["messages"][1]["content"];
        assert_eq!(parts[0]["type"], "image_url");
        assert_eq!(parts[0]["image_url"]["url"], URI);
        assert_eq!(parts[1]["text"], "Read the table");
    }

    #[test]
    fn missing_api_key_is_config_error() {
        let err = OpenAiCompatibleClient::from_config(&ConversionConfig::default())
            .err()
            .expect("should fail without a key");
        assert!(matches!(err, Img2XlsxError::InvalidConfig(_)));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé…");
        assert_eq!(truncate("ok", 10), "ok");
    }

    #[tokio::test]
    async fn returns_message_content() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/chat/completions")
                    .header("authorization", "Bearer test-key")
                    .body_includes(URI);
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(completion(json!("| A | B |\n| --- | --- |\n| 1 | 2 |")));
            })
            .await;

        let config = config_for(&server);
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        let text = client
            .extract(&ExtractionRequest::new(URI.into(), &config))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(text.as_deref(), Some("| A | B |\n| --- | --- |\n| 1 | 2 |"));
    }

    #[tokio::test]
    async fn null_content_is_none() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).json_body(completion(serde_json::Value::Null));
            })
            .await;

        let config = config_for(&server);
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        let text = client
            .extract(&ExtractionRequest::new(URI.into(), &config))
            .await
            .unwrap();
        assert!(text.is_none());
    }

    #[tokio::test]
    async fn unauthorized_fails_without_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(401)
                    .json_body(json!({ "error": { "message": "Incorrect API key provided" } }));
            })
            .await;

        let mut config = config_for(&server);
        config.max_retries = 3;
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        let err = client
            .extract(&ExtractionRequest::new(URI.into(), &config))
            .await
            .unwrap_err();

        mock.assert_calls_async(1).await;
        match err {
            Img2XlsxError::ExtractionRequestFailed { reason } => {
                assert!(reason.contains("401"), "got: {reason}")
            }
            other => panic!("expected ExtractionRequestFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn server_errors_retry_until_exhausted() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(503).body("overloaded");
            })
            .await;

        let mut config = config_for(&server);
        config.max_retries = 2;
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        let err = client
            .extract(&ExtractionRequest::new(URI.into(), &config))
            .await
            .unwrap_err();

        mock.assert_calls_async(3).await;
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn default_config_does_not_retry() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(500);
            })
            .await;

        let config = config_for(&server);
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        assert!(client
            .extract(&ExtractionRequest::new(URI.into(), &config))
            .await
            .is_err());
        mock.assert_calls_async(1).await;
    }

    #[tokio::test]
    async fn connection_refused_is_retried() {
        // Port 1 is reserved and nothing listens there.
        let config = ConversionConfig::builder()
            .api_key("test-key")
            .base_url("http://127.0.0.1:1")
            .max_retries(1)
            .retry_backoff_ms(150)
            .build()
            .unwrap();
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();

        let start = Instant::now();
        let err = client
            .extract(&ExtractionRequest::new(URI.into(), &config))
            .await
            .unwrap_err();

        // One backoff sleep means the second attempt ran.
        assert!(start.elapsed() >= Duration::from_millis(150));
        match err {
            Img2XlsxError::ExtractionRequestFailed { reason } => {
                assert!(reason.contains("127.0.0.1:1"), "got: {reason}")
            }
            other => panic!("expected ExtractionRequestFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn timeout_is_retried() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200)
                    .delay(Duration::from_secs(3))
                    .json_body(completion(json!("| A |")));
            })
            .await;

        let mut config = config_for(&server);
        config.api_timeout_secs = 1;
        config.max_retries = 1;
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        let start = Instant::now();
        let err = client
            .extract(&ExtractionRequest::new(URI.into(), &config))
            .await
            .unwrap_err();

        // Two one-second timeouts.
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert!(err.to_string().contains("timed out"), "got: {err}");
    }

    #[tokio::test]
    async fn malformed_body_is_request_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/chat/completions");
                then.status(200).body("<html>gateway</html>");
            })
            .await;

        let config = config_for(&server);
        let client = OpenAiCompatibleClient::from_config(&config).unwrap();
        let err = client
            .extract(&ExtractionRequest::new(URI.into(), &config))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("malformed"), "got: {err}");
    }
}
