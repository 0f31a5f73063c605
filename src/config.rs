//! Configuration for the locker client
//!
//! [`ClientConfig`] is the library-facing struct; [`ClientArgs`] exposes the
//! same settings as CLI flags with environment fallbacks.

use crate::error::{LockerError, Result};
use crate::retry::RetryPolicy;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the locker API
    pub api_base_url: String,
    /// Per-request timeout in milliseconds
    pub request_timeout_ms: u64,
    /// Retries after the first rate-limited attempt
    pub max_retries: u32,
    /// Delay before the first retry; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Pause between two queued registration tasks
    pub queue_spacing_ms: u64,
    /// Pause before redirecting to login after a teardown
    pub redirect_delay_ms: u64,
    /// Directory holding the persisted session
    pub session_dir: PathBuf,
    /// Per-student storage quota
    pub storage_quota_bytes: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".to_string(),
            request_timeout_ms: 30_000,
            max_retries: crate::retry::DEFAULT_MAX_RETRIES,
            retry_base_delay_ms: 1000,
            queue_spacing_ms: 1000,
            redirect_delay_ms: 1000,
            session_dir: PathBuf::from(".locker"),
            storage_quota_bytes: crate::accounting::STUDENT_QUOTA_BYTES,
        }
    }
}

impl ClientConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_base_delay_ms),
        )
    }

    pub fn queue_spacing(&self) -> Duration {
        Duration::from_millis(self.queue_spacing_ms)
    }

    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.api_base_url.trim();
        if url.is_empty() {
            return Err(LockerError::Config("API base URL is empty".into()));
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(LockerError::Config(format!(
                "API base URL must start with http:// or https://, got {}",
                url
            )));
        }
        if self.retry_base_delay_ms == 0 {
            return Err(LockerError::Config(
                "retry base delay must be greater than zero".into(),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(LockerError::Config("request timeout must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Connection flags shared by every CLI command
#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Base URL of the locker API
    #[arg(long, env = "API_BASE_URL", default_value = "http://localhost:3000")]
    pub api_base_url: String,

    /// Request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "30000")]
    pub request_timeout_ms: u64,

    /// Retries for rate-limited registration attempts
    #[arg(long, env = "MAX_RETRIES", default_value = "3")]
    pub max_retries: u32,

    /// First retry delay in milliseconds (doubles per attempt)
    #[arg(long, env = "RETRY_BASE_DELAY_MS", default_value = "1000")]
    pub retry_base_delay_ms: u64,

    /// Pause between queued registration requests in milliseconds
    #[arg(long, env = "QUEUE_SPACING_MS", default_value = "1000")]
    pub queue_spacing_ms: u64,

    /// Delay before redirecting to login after the session is lost
    #[arg(long, env = "REDIRECT_DELAY_MS", default_value = "1000")]
    pub redirect_delay_ms: u64,

    /// Directory where the session token and user are stored
    #[arg(long, env = "SESSION_DIR", default_value = ".locker")]
    pub session_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl ClientArgs {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_base_url: self.api_base_url.clone(),
            request_timeout_ms: self.request_timeout_ms,
            max_retries: self.max_retries,
            retry_base_delay_ms: self.retry_base_delay_ms,
            queue_spacing_ms: self.queue_spacing_ms,
            redirect_delay_ms: self.redirect_delay_ms,
            session_dir: self.session_dir.clone(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.queue_spacing(), Duration::from_secs(1));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = ClientConfig {
            api_base_url: "localhost:3000".into(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ClientConfig {
            retry_base_delay_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
