//! Client configuration.
//!
//! All settings are optional and default to the values below. Durations are
//! expressed in milliseconds when (de)serialized.
//!
//! | Setting | Default |
//! |---|---|
//! | `base_url` | `http://localhost:8000/api/v1` |
//! | `timeout` | 30 000 ms per attempt |
//! | `retry_attempts` | 3 |
//! | `retry_delay` | 1 000 ms (backoff base) |
//! | `max_retry_delay` | 10 000 ms |
//! | `enable_logging` | `true` |
//! | `rate_limit_enabled` | `true` |
//! | `rate_limit_window` | 60 000 ms |
//! | `rate_limit_max_requests` | 100 |

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, serde_as};

use crate::error::ConfigError;
use crate::rate_limit::RateLimitConfig;
use crate::retry::RetryPolicy;

/// Default backend location.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000/api/v1";

/// Prefix of the environment variables read by [`ClientConfig::from_env`].
pub const ENV_PREFIX: &str = "PENGUIN_API_";

/// Construction-time settings for [`ApiClient`](crate::ApiClient).
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Prefix for relative request URLs.
    pub base_url: String,
    /// Timeout of one physical attempt.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    /// Base delay of the exponential backoff.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub retry_delay: Duration,
    /// Cap on a single backoff delay.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub max_retry_delay: Duration,
    /// Emit the pipeline's per-request log lines.
    pub enable_logging: bool,
    /// Enforce the client-side rate limit.
    pub rate_limit_enabled: bool,
    /// Sliding window length.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub rate_limit_window: Duration,
    /// Requests admitted per window.
    pub rate_limit_max_requests: u32,
    /// Custom `User-Agent`.
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        let rate_limit = RateLimitConfig::default();
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_millis(30_000),
            retry_attempts: retry.max_retries,
            retry_delay: retry.base_delay,
            max_retry_delay: retry.max_delay,
            enable_logging: true,
            rate_limit_enabled: rate_limit.enabled,
            rate_limit_window: rate_limit.window,
            rate_limit_max_requests: rate_limit.max_requests,
            user_agent: None,
        }
    }
}

impl ClientConfig {
    /// Load settings from `PENGUIN_API_*` environment variables.
    ///
    /// Unset variables keep their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load settings through an arbitrary variable lookup.
    ///
    /// `lookup` receives full variable names such as `PENGUIN_API_BASE_URL`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |suffix: &str| {
            let name = format!("{ENV_PREFIX}{suffix}");
            lookup(&name).map(|value| (name, value))
        };

        if let Some((_, value)) = get("BASE_URL") {
            config.base_url = value;
        }
        if let Some(ms) = parse_var::<u64>(get("TIMEOUT_MS"))? {
            config.timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = parse_var(get("RETRY_ATTEMPTS"))? {
            config.retry_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>(get("RETRY_DELAY_MS"))? {
            config.retry_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(get("MAX_RETRY_DELAY_MS"))? {
            config.max_retry_delay = Duration::from_millis(ms);
        }
        if let Some(enabled) = parse_var(get("ENABLE_LOGGING"))? {
            config.enable_logging = enabled;
        }
        if let Some(enabled) = parse_var(get("RATE_LIMIT_ENABLED"))? {
            config.rate_limit_enabled = enabled;
        }
        if let Some(ms) = parse_var::<u64>(get("RATE_LIMIT_WINDOW_MS"))? {
            config.rate_limit_window = Duration::from_millis(ms);
        }
        if let Some(max) = parse_var(get("RATE_LIMIT_MAX_REQUESTS"))? {
            config.rate_limit_max_requests = max;
        }
        if let Some((_, value)) = get("USER_AGENT") {
            config.user_agent = Some(value);
        }

        Ok(config)
    }

    /// The rate limiter settings.
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            enabled: self.rate_limit_enabled,
            window: self.rate_limit_window,
            max_requests: self.rate_limit_max_requests,
        }
    }

    /// The retry policy derived from these settings.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_attempts,
            base_delay: self.retry_delay,
            max_delay: self.max_retry_delay,
            ..RetryPolicy::default()
        }
    }
}

fn parse_var<T: FromStr>(var: Option<(String, String)>) -> Result<Option<T>, ConfigError> {
    let Some((name, value)) = var else {
        return Ok(None);
    };
    value
        .trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(1_000));
        assert!(config.enable_logging);
        assert!(config.rate_limit_enabled);
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.rate_limit_max_requests, 100);
    }

    #[test]
    fn test_from_lookup() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("PENGUIN_API_BASE_URL", "https://api.penguin.example/api/v1"),
            ("PENGUIN_API_TIMEOUT_MS", "5000"),
            ("PENGUIN_API_RATE_LIMIT_ENABLED", "false"),
            ("PENGUIN_API_RATE_LIMIT_MAX_REQUESTS", " 20 "),
        ]))
        .unwrap();

        assert_eq!(config.base_url, "https://api.penguin.example/api/v1");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.rate_limit_enabled);
        assert_eq!(config.rate_limit_max_requests, 20);
        assert_eq!(config.retry_attempts, 3);
    }

    #[test]
    fn test_from_lookup_rejects_garbage() {
        let err = ClientConfig::from_lookup(lookup(&[("PENGUIN_API_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        match err {
            ConfigError::InvalidEnv { name, value } => {
                assert_eq!(name, "PENGUIN_API_TIMEOUT_MS");
                assert_eq!(value, "soon");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_partial_json() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"base_url": "http://127.0.0.1:9000", "retry_delay": 250, "rate_limit_window": 1000}"#,
        )
        .unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.retry_delay, Duration::from_millis(250));
        assert_eq!(config.rate_limit_window, Duration::from_secs(1));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_derived_policies() {
        let config = ClientConfig {
            retry_attempts: 5,
            retry_delay: Duration::from_millis(10),
            ..ClientConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.compute_delay(1), Duration::from_millis(10));
        assert_eq!(config.rate_limit().max_requests, 100);
    }
}
