//! Client configuration.

use std::time::Duration;

use backoff::ExponentialBackoff;

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://10.0.0.5:8080`.
    pub base_url: String,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Extra attempts after the first for retryable calls.
    pub max_retries: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: "http://localhost:8080".to_string(),
            timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> ClientResult<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }

    pub(crate) fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            multiplier: 2.0,
            // attempts are bounded by max_retries instead
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}
