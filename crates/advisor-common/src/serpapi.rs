use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::truncate_utf8;

const DEFAULT_BASE_URL: &str = "https://serpapi.com";

#[derive(Clone, Debug)]
pub struct SerpApiConfig {
    /// `None` disables search; queries then yield an empty result set.
    pub api_key: Option<String>,
    pub base_url: String,
    pub engine: String,
    pub timeout: Duration,
    pub max_error_body_bytes: usize,
}

impl Default for SerpApiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            engine: "google".to_string(),
            timeout: Duration::from_millis(8_000),
            max_error_body_bytes: 2 * 1024,
        }
    }
}

impl SerpApiConfig {
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_key = var("SERPAPI_KEY")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let base_url = var("SERPAPI_BASE_URL").unwrap_or(defaults.base_url);

        let timeout = match var("SEARCH_TIMEOUT_MS") {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(Duration::from_millis)
                .unwrap_or_else(|_| {
                    warn!(value = %raw, "ignoring unparseable SEARCH_TIMEOUT_MS, using default");
                    defaults.timeout
                }),
            None => defaults.timeout,
        };

        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            engine: defaults.engine,
            timeout,
            max_error_body_bytes: defaults.max_error_body_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("search request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("search request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("search provider returned status {status}: {body}")]
    Upstream { status: StatusCode, body: String },

    #[error("invalid search response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Subset of a SerpAPI response body. Every field is optional upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub organic_results: Option<Vec<OrganicResult>>,
}

impl SearchResponse {
    pub fn results(&self) -> &[OrganicResult] {
        self.organic_results.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganicResult {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Clone)]
pub struct SerpApiClient {
    config: SerpApiConfig,
    http: reqwest::Client,
}

impl SerpApiClient {
    pub fn new(config: SerpApiConfig) -> Result<Self, SearchError> {
        let http = reqwest::Client::builder()
            .user_agent("product-advisor")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn is_enabled(&self) -> bool {
        self.config.api_key.is_some()
    }

    /// Run one web search. A missing API key is not an error: search is simply
    /// disabled and the response is empty.
    pub async fn search(&self, query: &str) -> Result<SearchResponse, SearchError> {
        let Some(api_key) = self.config.api_key.as_deref() else {
            debug!("search disabled, no API key configured");
            return Ok(SearchResponse::default());
        };

        let url = format!("{}/search.json", self.config.base_url);
        debug!(query, engine = %self.config.engine, "performing web search");

        let resp = self
            .http
            .get(&url)
            .query(&[
                ("engine", self.config.engine.as_str()),
                ("q", query),
                ("api_key", api_key),
            ])
            .timeout(self.config.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| self.classify(e))?;

        if !status.is_success() {
            let body = truncate_utf8(&body, self.config.max_error_body_bytes).to_string();
            return Err(SearchError::Upstream { status, body });
        }

        let parsed = serde_json::from_str::<SearchResponse>(&body)?;
        debug!(result_count = parsed.results().len(), "web search completed");
        Ok(parsed)
    }

    fn classify(&self, err: reqwest::Error) -> SearchError {
        if err.is_timeout() {
            SearchError::Timeout(self.config.timeout)
        } else {
            SearchError::Request(err)
        }
    }
}
