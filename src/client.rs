//! Penguin X REST client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use url::Url;

use crate::auth::{CredentialStore, MemoryCredentialStore, Navigator, NoopNavigator};
use crate::config::ClientConfig;
use crate::error::{ClassifiedError, ConfigError};
use crate::pipeline::Pipeline;
use crate::rate_limit::{RateLimitStatus, SlidingWindowLimiter};
use crate::request::RequestConfig;
use crate::retry::RetryPolicy;
use crate::telemetry::{TelemetrySink, TracingSink};
use crate::transport::{HttpTransport, Transport};

/// The Penguin X REST API client.
///
/// Every call is rate limited, retried on transient failures, and fails with
/// a [`ClassifiedError`] whose message is safe to show to users. Verb methods
/// return the decoded response payload directly.
///
/// Clones share one rate limiter and one set of collaborators.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use penguin_api_client::ApiClient;
/// use penguin_api_client::auth::MemoryCredentialStore;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = ApiClient::builder()
///         .base_url("https://penguin.example/api/v1")
///         .credentials(Arc::new(MemoryCredentialStore::with_token("access-token")))
///         .build()?;
///
///     let summary: serde_json::Value = client.get("/summary").await?;
///     println!("Summary: {summary}");
///
///     Ok(())
/// }
/// ```
pub struct ApiClient<T = HttpTransport> {
    config: Arc<ClientConfig>,
    base_url: Url,
    pipeline: Arc<Pipeline<T>>,
}

impl ApiClient {
    /// Create a client with default settings.
    pub fn new() -> Result<Self, ConfigError> {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }
}

impl<T: Transport> ApiClient<T> {
    /// GET `url` and decode the response.
    pub async fn get<R>(&self, url: &str) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
    {
        self.get_with(url, &RequestConfig::default()).await
    }

    /// GET with per-call options.
    pub async fn get_with<R>(&self, url: &str, options: &RequestConfig) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
    {
        self.request(Method::GET, url, None::<&()>, options).await
    }

    /// POST `data` as JSON.
    ///
    /// Not retried unless the options carry an idempotency key, see
    /// [`post_with`](Self::post_with).
    pub async fn post<R, B>(&self, url: &str, data: &B) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.post_with(url, data, &RequestConfig::default()).await
    }

    /// POST with per-call options.
    pub async fn post_with<R, B>(
        &self,
        url: &str,
        data: &B,
        options: &RequestConfig,
    ) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::POST, url, Some(data), options).await
    }

    /// PUT `data` as JSON.
    pub async fn put<R, B>(&self, url: &str, data: &B) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.put_with(url, data, &RequestConfig::default()).await
    }

    /// PUT with per-call options.
    pub async fn put_with<R, B>(
        &self,
        url: &str,
        data: &B,
        options: &RequestConfig,
    ) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PUT, url, Some(data), options).await
    }

    /// PATCH `data` as JSON.
    pub async fn patch<R, B>(&self, url: &str, data: &B) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.patch_with(url, data, &RequestConfig::default()).await
    }

    /// PATCH with per-call options.
    pub async fn patch_with<R, B>(
        &self,
        url: &str,
        data: &B,
        options: &RequestConfig,
    ) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        self.request(Method::PATCH, url, Some(data), options).await
    }

    /// DELETE `url`.
    pub async fn delete<R>(&self, url: &str) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
    {
        self.delete_with(url, &RequestConfig::default()).await
    }

    /// DELETE with per-call options.
    pub async fn delete_with<R>(
        &self,
        url: &str,
        options: &RequestConfig,
    ) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
    {
        self.request(Method::DELETE, url, None::<&()>, options).await
    }

    /// Current rate limiter state.
    pub async fn rate_limit_status(&self) -> RateLimitStatus {
        self.pipeline.rate_limit_status().await
    }

    /// Clear all rate limiter state, including server-signalled blocks.
    pub async fn reset_rate_limit(&self) {
        self.pipeline.reset_rate_limit().await;
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The base URL relative paths are resolved against.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The retry policy in effect.
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.pipeline.retry
    }

    /// The credential store used for bearer tokens.
    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.pipeline.credentials
    }

    /// Resolve `url` against the base URL and append `query`.
    ///
    /// Absolute `http(s)://` URLs are used as-is.
    pub fn resolve_url(&self, url: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
        let mut resolved = if url.starts_with("http://") || url.starts_with("https://") {
            Url::parse(url)?
        } else {
            let base = self.base_url.as_str().trim_end_matches('/');
            Url::parse(&format!("{}/{}", base, url.trim_start_matches('/')))?
        };

        if let Some(query) = query.filter(|query| !query.is_empty()) {
            let merged = match resolved.query() {
                Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
                _ => query.to_string(),
            };
            resolved.set_query(Some(&merged));
        }

        Ok(resolved)
    }

    async fn request<R, B>(
        &self,
        method: Method,
        url: &str,
        data: Option<&B>,
        options: &RequestConfig,
    ) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let resolved = match self.resolve_url(url, options.query.as_deref()) {
            Ok(resolved) => resolved,
            Err(error) => {
                return Err(self
                    .pipeline
                    .reject_unbuildable(method, url, &error.to_string()));
            }
        };

        // Serialized once; retries resend these exact bytes.
        let body = match data.map(serde_json::to_vec).transpose() {
            Ok(body) => body,
            Err(error) => {
                return Err(self
                    .pipeline
                    .reject_unbuildable(method, resolved.as_str(), &error.to_string()));
            }
        };

        self.pipeline.execute(method, resolved, body, options).await
    }
}

impl<T> Clone for ApiClient<T> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            base_url: self.base_url.clone(),
            pipeline: Arc::clone(&self.pipeline),
        }
    }
}

impl<T> std::fmt::Debug for ApiClient<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url.as_str())
            .field("timeout", &self.config.timeout)
            .field("retry", &self.pipeline.retry)
            .field("rate_limit", &self.config.rate_limit())
            .finish()
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    retry_policy: Option<RetryPolicy>,
    credentials: Option<Arc<dyn CredentialStore>>,
    telemetry: Option<Arc<dyn TelemetrySink>>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl ApiClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            retry_policy: None,
            credentials: None,
            telemetry: None,
            navigator: None,
        }
    }

    /// Replace all settings at once, e.g. with [`ClientConfig::from_env`].
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the base URL (useful for testing with a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    /// Set the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set the maximum number of retries for transient failures.
    pub fn retry_attempts(mut self, retries: u32) -> Self {
        self.config.retry_attempts = retries;
        self
    }

    /// Set the base delay of the exponential backoff.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Set the cap on a single backoff delay.
    pub fn max_retry_delay(mut self, delay: Duration) -> Self {
        self.config.max_retry_delay = delay;
        self
    }

    /// Use a fully custom retry policy. Takes precedence over the
    /// `retry_*` settings.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Enable or disable the pipeline's per-request log lines.
    pub fn enable_logging(mut self, enabled: bool) -> Self {
        self.config.enable_logging = enabled;
        self
    }

    /// Enable or disable client-side rate limiting.
    pub fn rate_limit_enabled(mut self, enabled: bool) -> Self {
        self.config.rate_limit_enabled = enabled;
        self
    }

    /// Set the rate limit window and the requests admitted per window.
    pub fn rate_limit(mut self, window: Duration, max_requests: u32) -> Self {
        self.config.rate_limit_window = window;
        self.config.rate_limit_max_requests = max_requests;
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Set the credential store for bearer tokens.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set the telemetry sink.
    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set the navigator invoked on 401 responses.
    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    /// Build a client on the default reqwest transport.
    pub fn build(self) -> Result<ApiClient, ConfigError> {
        let transport = HttpTransport::new(self.config.user_agent.as_deref());
        self.build_with_transport(transport)
    }

    /// Build a client on a custom transport.
    pub fn build_with_transport<T: Transport>(
        self,
        transport: T,
    ) -> Result<ApiClient<T>, ConfigError> {
        let base_url =
            Url::parse(&self.config.base_url).map_err(|source| ConfigError::InvalidBaseUrl {
                url: self.config.base_url.clone(),
                source,
            })?;

        let retry = self
            .retry_policy
            .unwrap_or_else(|| self.config.retry_policy());

        let pipeline = Pipeline {
            transport,
            limiter: Mutex::new(SlidingWindowLimiter::new(self.config.rate_limit())),
            retry,
            timeout: self.config.timeout,
            enable_logging: self.config.enable_logging,
            credentials: self
                .credentials
                .unwrap_or_else(|| Arc::new(MemoryCredentialStore::new())),
            telemetry: self.telemetry.unwrap_or_else(|| Arc::new(TracingSink)),
            navigator: self.navigator.unwrap_or_else(|| Arc::new(NoopNavigator)),
        };

        Ok(ApiClient {
            config: Arc::new(self.config),
            base_url,
            pipeline: Arc::new(pipeline),
        })
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
