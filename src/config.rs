//! Configuration types for image-to-spreadsheet conversion.
//!
//! All conversion behaviour is controlled through [`ConversionConfig`], built
//! via its [`ConversionConfigBuilder`] or read once from the environment with
//! [`ConversionConfig::from_env`]. The config is constructed explicitly and
//! handed to [`crate::convert`]; nothing is read from process-wide state
//! afterwards, so tests can point a config at a fake endpoint or inject a
//! fake [`VisionModel`] without touching environment variables.

use crate::error::Img2XlsxError;
use crate::pipeline::llm::VisionModel;
use crate::progress::ProgressCallback;
use std::fmt;
use std::sync::Arc;

/// Default OpenAI-compatible endpoint (DashScope compatible mode).
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/compatible-mode/v1";

/// Default vision model.
pub const DEFAULT_MODEL: &str = "qwen-vl-max-latest";

/// Configuration for an image-to-spreadsheet conversion.
///
/// Built via [`ConversionConfig::builder()`] or using
/// [`ConversionConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_img2xlsx::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .api_key("sk-test")
///     .base_url("https://api.openai.com/v1")
///     .model("gpt-4.1-mini")
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// API credential sent as a bearer token. Never printed by `Debug`.
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API; `/chat/completions` is appended.
    pub base_url: String,

    /// Vision model identifier. Default: `qwen-vl-max-latest`.
    pub model: String,

    /// Pre-constructed vision model. Takes precedence over the endpoint
    /// settings above.
    pub provider: Option<Arc<dyn VisionModel>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Transcription wants the model to copy what it sees, not to be creative.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    ///
    /// A dense table can run past 2 000 tokens; a truncated reply loses its
    /// last rows silently.
    pub max_tokens: usize,

    /// Custom system prompt. If None, uses [`crate::prompts::TABLE_EXTRACTION_PROMPT`].
    pub system_prompt: Option<String>,

    /// Custom user cue. If None, uses [`crate::prompts::DEFAULT_USER_PROMPT`].
    pub user_prompt: Option<String>,

    /// Per-request timeout in seconds. Default: 120.
    pub api_timeout_secs: u64,

    /// Retry attempts on a transient failure. Default: 0 (single attempt).
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Optional per-stage progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            system_prompt: None,
            user_prompt: None,
            api_timeout_secs: 120,
            max_retries: 0,
            retry_backoff_ms: 500,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn VisionModel>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Reopen a built config for further overrides; `build()` validates again.
    pub fn into_builder(self) -> ConversionConfigBuilder {
        ConversionConfigBuilder { config: self }
    }

    /// Build a config from environment variables.
    ///
    /// | Variable | Fallback | Field |
    /// |----------|----------|-------|
    /// | `IMG2XLSX_API_KEY` | `OPENAI_API_KEY` | `api_key` |
    /// | `IMG2XLSX_API_BASE` | `OPENAI_BASE_URL` | `base_url` |
    /// | `IMG2XLSX_MODEL` | — | `model` |
    pub fn from_env() -> Result<Self, Img2XlsxError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Img2XlsxError> {
        let var = |primary: &str, fallback: Option<&str>| {
            lookup(primary)
                .or_else(|| fallback.and_then(&lookup))
                .filter(|v| !v.trim().is_empty())
        };

        let mut builder = Self::builder();
        if let Some(key) = var("IMG2XLSX_API_KEY", Some("OPENAI_API_KEY")) {
            builder = builder.api_key(key);
        }
        if let Some(base) = var("IMG2XLSX_API_BASE", Some("OPENAI_BASE_URL")) {
            builder = builder.base_url(base);
        }
        if let Some(model) = var("IMG2XLSX_MODEL", None) {
            builder = builder.model(model);
        }
        builder.build()
    }

    /// The chat-completions URL derived from `base_url`.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

/// Builder for [`ConversionConfig`].
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl fmt::Debug for ConversionConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfigBuilder")
            .field("config", &self.config)
            .finish()
    }
}

impl ConversionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn provider(mut self, provider: Arc<dyn VisionModel>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn user_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.user_prompt = Some(prompt.into());
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Img2XlsxError> {
        let c = &self.config;
        if c.provider.is_none() {
            let base = c.base_url.trim();
            if !(base.starts_with("http://") || base.starts_with("https://")) {
                return Err(Img2XlsxError::InvalidConfig(format!(
                    "base URL must start with http:// or https://, got '{}'",
                    c.base_url
                )));
            }
            if c.model.trim().is_empty() {
                return Err(Img2XlsxError::InvalidConfig("model must not be empty".into()));
            }
        }
        if c.max_tokens == 0 {
            return Err(Img2XlsxError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        if c.api_timeout_secs == 0 {
            return Err(Img2XlsxError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ConversionConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.max_retries, 0);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn builder_rejects_non_http_base_url() {
        let err = ConversionConfig::builder()
            .base_url("ftp://example.com")
            .build()
            .unwrap_err();
        assert!(matches!(err, Img2XlsxError::InvalidConfig(_)));
    }

    #[test]
    fn builder_rejects_zero_timeout() {
        let err = ConversionConfig::builder()
            .api_timeout_secs(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn builder_clamps_temperature() {
        let config = ConversionConfig::builder().temperature(9.0).build().unwrap();
        assert_eq!(config.temperature, 2.0);
    }

    #[test]
    fn completions_url_joins_without_double_slash() {
        let config = ConversionConfig::builder()
            .base_url("http://localhost:8080/v1/")
            .build()
            .unwrap();
        assert_eq!(config.completions_url(), "http://localhost:8080/v1/chat/completions");
    }

    #[test]
    fn env_prefers_img2xlsx_vars() {
        let config = ConversionConfig::from_lookup(lookup_from(&[
            ("IMG2XLSX_API_KEY", "primary"),
            ("OPENAI_API_KEY", "fallback"),
            ("IMG2XLSX_MODEL", "gpt-4.1-mini"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("primary"));
        assert_eq!(config.model, "gpt-4.1-mini");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn env_falls_back_to_openai_vars() {
        let config = ConversionConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("OPENAI_BASE_URL", "https://api.openai.com/v1"),
        ]))
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.base_url, "https://api.openai.com/v1");
    }

    #[test]
    fn env_ignores_blank_values() {
        let config =
            ConversionConfig::from_lookup(lookup_from(&[("IMG2XLSX_API_KEY", "  ")])).unwrap();
        assert!(config.api_key.is_none());
    }

    #[test]
    fn overrides_layer_on_env_config() {
        let base = ConversionConfig::from_lookup(lookup_from(&[
            ("OPENAI_API_KEY", "sk-openai"),
            ("OPENAI_BASE_URL", "https://api.openai.com/v1"),
        ]))
        .unwrap();
        let config = base.into_builder().model("gpt-4.1-mini").build().unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-openai"));
        assert_eq!(config.base_url, "https://api.openai.com/v1");
        assert_eq!(config.model, "gpt-4.1-mini");
    }

    #[test]
    fn reopened_builder_still_validates() {
        let err = ConversionConfig::default()
            .into_builder()
            .base_url("localhost:8080")
            .build()
            .unwrap_err();
        assert!(matches!(err, Img2XlsxError::InvalidConfig(_)));
    }

    #[test]
    fn debug_redacts_api_key() {
        let config = ConversionConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{config:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
