use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::truncate_utf8;

const DEFAULT_MODEL: &str = "gemini-1.5-flash";
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone, Debug)]
pub struct GeminiClientConfig {
    /// `None` makes every generation request fail with [`ModelError::MissingApiKey`].
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub max_error_body_bytes: usize,
}

impl Default for GeminiClientConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(20_000),
            temperature: 0.2,
            max_output_tokens: 512,
            max_error_body_bytes: 8 * 1024,
        }
    }
}

impl GeminiClientConfig {
    /// Build the config from an arbitrary variable lookup. Unparseable numbers
    /// keep their defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_key = var("GEMINI_API_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let model = var("GEMINI_MODEL")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.model);

        let base_url = var("GEMINI_BASE_URL").unwrap_or(defaults.base_url);

        let timeout = parse_or_warn(&var, "GEMINI_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout);

        let temperature =
            parse_or_warn(&var, "GEMINI_TEMPERATURE").unwrap_or(defaults.temperature);

        let max_output_tokens =
            parse_or_warn(&var, "GEMINI_MAX_OUTPUT_TOKENS").unwrap_or(defaults.max_output_tokens);

        Self {
            api_key,
            model,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            temperature,
            max_output_tokens,
            max_error_body_bytes: defaults.max_error_body_bytes,
        }
    }
}

fn parse_or_warn<T: std::str::FromStr>(
    var: &impl Fn(&str) -> Option<String>,
    name: &str,
) -> Option<T> {
    let raw = var(name)?;
    let parsed = raw.trim().parse::<T>().ok();
    if parsed.is_none() {
        warn!(variable = name, value = %raw, "ignoring unparseable value, using default");
    }
    parsed
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model provider API key is not configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("model request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("model request failed: {0}")]
    Request(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct Content {
    pub role: String,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Part {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

/// Single-shot client for a `generateContent` style endpoint.
///
/// The response is handed back as raw JSON: providers move the generated text
/// between several nested shapes, so destructuring is left to the caller.
/// Non-2xx responses are not errors here; their body is returned as-is so the
/// caller can degrade on it. Only misconfiguration, timeouts and transport
/// failures surface as [`ModelError`]. No retries are attempted.
#[derive(Clone)]
pub struct GeminiClient {
    config: GeminiClientConfig,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(config: GeminiClientConfig) -> Result<Self, ModelError> {
        let http = reqwest::Client::builder()
            .user_agent("product-advisor")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    pub fn request_for(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user".to_string(),
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.config.temperature,
                max_output_tokens: self.config.max_output_tokens,
            },
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<Value, ModelError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(ModelError::MissingApiKey)?;

        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url, self.config.model
        );
        debug!(model = %self.config.model, prompt_len = prompt.len(), "sending generation request");

        let resp = self
            .http
            .post(&url)
            .query(&[("key", api_key)])
            .timeout(self.config.timeout)
            .json(&self.request_for(prompt))
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            warn!(
                status = %status,
                body = %truncate_utf8(&body, self.config.max_error_body_bytes),
                "model provider returned an error status"
            );
        }

        Ok(serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body)))
    }

    fn classify(&self, err: reqwest::Error) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(self.config.timeout)
        } else {
            ModelError::Request(err)
        }
    }
}
