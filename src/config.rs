use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, StreamError};
use crate::metrics::buffer::MAX_WINDOW;

/// Knobs for streaming one job's results.
///
/// Every field has a default, so an empty TOML file (or none at all) gives
/// the reference behavior: 50k pages, no retry.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StreamConfig {
    /// Samples requested per poll
    #[serde(default = "default_page_size")]
    pub page_size: u64,

    /// Points kept for the live chart (capped at 50,000)
    #[serde(default = "default_window")]
    pub window: usize,

    /// Per-request timeout; a timeout counts as a transport failure
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Extra attempts after a transport failure (0 = surface immediately)
    #[serde(default)]
    pub max_retries: u32,

    /// Base delay between retries; doubled on every attempt
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Pause between polls of an unpaged job (correctness runs)
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_page_size() -> u64 {
    50_000
}
fn default_window() -> usize {
    MAX_WINDOW
}
fn default_request_timeout_ms() -> u64 {
    30_000
}
fn default_retry_backoff_ms() -> u64 {
    250
}
fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            window: default_window(),
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl StreamConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(s).map_err(|e| StreamError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| StreamError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(StreamError::Config("page_size must be at least 1".into()));
        }
        if self.window == 0 || self.window > MAX_WINDOW {
            return Err(StreamError::Config(format!(
                "window must be between 1 and {MAX_WINDOW}"
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(StreamError::Config(
                "request_timeout_ms must be at least 1".into(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(StreamError::Config(
                "poll_interval_ms must be at least 1".into(),
            ));
        }
        if self.max_retries > 10 {
            return Err(StreamError::Config(
                "max_retries must be between 0 and 10".into(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
