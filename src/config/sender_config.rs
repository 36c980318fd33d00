use serde::Deserialize;
use std::time::Duration;

use crate::config::ConfigError;
use crate::sender::RetryPolicy;

/// Worker pool and retry settings for a send run
#[derive(Debug, Clone, Deserialize)]
pub struct SenderConfig {
    /// Number of studies sent concurrently
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Consecutive zero-progress attempts before a study is left for the next run
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,

    /// Wait after a zero-progress attempt, in seconds
    #[serde(default = "default_backoff_secs")]
    pub backoff_secs: u64,

    /// Upper bound on how long a backoff wait takes to notice cancellation
    #[serde(default = "default_cancel_poll_ms")]
    pub cancel_poll_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            retry_limit: default_retry_limit(),
            backoff_secs: default_backoff_secs(),
            cancel_poll_ms: default_cancel_poll_ms(),
        }
    }
}

impl SenderConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == 0 {
            return Err(ConfigError::InvalidSender(
                "threads must be at least 1".to_string(),
            ));
        }
        if self.retry_limit == 0 {
            return Err(ConfigError::InvalidSender(
                "retry_limit must be at least 1".to_string(),
            ));
        }
        if self.cancel_poll_ms == 0 {
            return Err(ConfigError::InvalidSender(
                "cancel_poll_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_limit: self.retry_limit,
            backoff: Duration::from_secs(self.backoff_secs),
            poll_interval: Duration::from_millis(self.cancel_poll_ms),
        }
    }
}

fn default_threads() -> usize {
    5
}

fn default_retry_limit() -> u32 {
    10_000
}

fn default_backoff_secs() -> u64 {
    60
}

fn default_cancel_poll_ms() -> u64 {
    200
}
