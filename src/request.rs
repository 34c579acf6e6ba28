//! Per-call request options.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;

use crate::error::ConfigError;

/// Options for a single call, passed to the `*_with` verb methods.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use penguin_api_client::RequestConfig;
///
/// let options = RequestConfig::new()
///     .query(&[("page", "2"), ("limit", "50")])?
///     .timeout(Duration::from_secs(5));
/// # Ok::<(), penguin_api_client::ConfigError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    pub(crate) headers: HeaderMap,
    pub(crate) query: Option<String>,
    pub(crate) idempotency_key: Option<String>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) skip_auth: bool,
}

impl RequestConfig {
    /// Empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header, replacing any standard header with the same name.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// URL-encode `params` into the query string.
    pub fn query<Q: Serialize + ?Sized>(mut self, params: &Q) -> Result<Self, ConfigError> {
        let encoded = serde_urlencoded::to_string(params)?;
        self.query = (!encoded.is_empty()).then_some(encoded);
        Ok(self)
    }

    /// Mark a mutating call as safe to retry by sending an `Idempotency-Key`.
    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Override the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Do not attach the bearer token.
    pub fn without_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }

    /// Check if an idempotency key is set.
    pub fn has_idempotency_key(&self) -> bool {
        self.idempotency_key.is_some()
    }
}
