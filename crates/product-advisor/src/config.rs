use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use advisor_common::gemini::GeminiClientConfig;
use advisor_common::serpapi::SerpApiConfig;

use crate::error::AppError;

const DEFAULT_PORT: u16 = 3000;

/// Process configuration, read once at start-up.
///
/// Neither provider key is required to start: without `SERPAPI_KEY` search is
/// skipped, without `GEMINI_API_KEY` every recommendation request fails.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub search: SerpApiConfig,
    pub gemini: GeminiClientConfig,
}

impl Config {
    /// Optional:
    /// - `HOST` (default: 0.0.0.0), `PORT` (default: 3000)
    /// - `SERPAPI_KEY`, `SERPAPI_BASE_URL`, `SEARCH_TIMEOUT_MS`
    /// - `GEMINI_API_KEY`, `GEMINI_MODEL`, `GEMINI_BASE_URL`, `GEMINI_TIMEOUT_MS`,
    ///   `GEMINI_TEMPERATURE`, `GEMINI_MAX_OUTPUT_TOKENS`
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let port = match var("PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                AppError::Config(format!("PORT must be a port number, got {raw:?}"))
            })?,
            None => DEFAULT_PORT,
        };

        let host = match var("HOST") {
            Some(raw) => raw.trim().parse::<IpAddr>().map_err(|_| {
                AppError::Config(format!("HOST must be an IP address, got {raw:?}"))
            })?,
            None => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        };

        Ok(Self {
            host,
            port,
            search: SerpApiConfig::from_vars(&var),
            gemini: GeminiClientConfig::from_vars(&var),
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
