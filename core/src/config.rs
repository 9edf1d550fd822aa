//! Runtime configuration.
//!
//! Every section defaults from environment variables; binaries may overlay a
//! file and command-line flags on top.

use crate::rate::RateConfig;
use crate::session::ControllerConfig;
use crate::{Result, RillError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    pub base_url: String, // e.g., http://localhost:8080
    pub api_key: Option<String>,
    /// Connect timeout. Streams themselves are long-lived and have no
    /// overall deadline.
    pub request_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: std::env::var("RILL_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:8080".to_string()),
            api_key: std::env::var("RILL_API_KEY").ok().filter(|s| !s.is_empty()),
            request_timeout_ms: std::env::var("REQUEST_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30_000),
        }
    }
}

impl HttpConfig {
    /// Join `path` onto the base URL. Absolute URLs pass through unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }

    /// Build an HTTP client suitable for long-lived streaming responses
    pub fn client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(self.request_timeout_ms))
            .build()
            .map_err(|e| RillError::Config(format!("Failed to build HTTP client: {e}")))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RillConfig {
    pub rate: RateConfig,
    pub controller: ControllerConfig,
    pub http: HttpConfig,
}

impl RillConfig {
    pub fn from_env() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.controller.decoder.max_line_bytes == 0 {
            return Err(RillError::Config("decoder.max_line_bytes must be > 0".into()));
        }
        if self.rate.history_capacity == 0 {
            return Err(RillError::Config("rate.history_capacity must be > 0".into()));
        }
        if self.rate.timestamp_field.is_empty() {
            return Err(RillError::Config("rate.timestamp_field must not be empty".into()));
        }
        for ratio in &self.rate.ratios {
            if ratio.hit == ratio.read {
                return Err(RillError::Config(format!(
                    "ratio '{}' uses the same counter for hits and reads",
                    ratio.name
                )));
            }
        }
        Ok(())
    }
}
