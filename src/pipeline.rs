//! The request/response interceptor pipeline.
//!
//! Each physical attempt goes through the same steps:
//!
//! 1. build headers (bearer token, request id, content negotiation)
//! 2. rate-limit admission, recorded atomically with the check
//! 3. dispatch through the [`Transport`]
//! 4. on success, decode the body; on failure, ask the [`RetryPolicy`]
//!    whether to wait and re-send the same attempt
//! 5. on terminal failure, classify and perform the required effect
//!
//! Telemetry is emitted at every step with scrubbed properties.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::header::{
    ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue,
};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

use crate::auth::{CredentialStore, Navigator};
use crate::classify::{Classification, RequiredEffect, TransportOutcome, classify, messages};
use crate::error::{ClassifiedError, ErrorKind};
use crate::rate_limit::{RateLimitStatus, ServerRateLimit, SlidingWindowLimiter};
use crate::request::RequestConfig;
use crate::retry::RetryPolicy;
use crate::scrub::{scrub, scrub_map};
use crate::telemetry::{TelemetrySink, events};
use crate::transport::{PreparedRequest, Transport, TransportError, TransportResponse};

/// Header carrying the per-call request id.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_KEY_HEADER: HeaderName = HeaderName::from_static("idempotency-key");

/// One logical call, alive until it settles.
///
/// Retries re-send the same attempt: same id, same body. Only `retry_count`
/// changes.
#[derive(Debug, Clone)]
pub(crate) struct RequestAttempt {
    pub(crate) request_id: String,
    pub(crate) method: Method,
    /// Scrubbed, for logs and telemetry only.
    pub(crate) url: String,
    pub(crate) started_at: Instant,
    pub(crate) retry_count: u32,
}

impl RequestAttempt {
    pub(crate) fn new(method: Method, url: &str) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            method,
            url: scrub(url),
            started_at: Instant::now(),
            retry_count: 0,
        }
    }

    /// Base telemetry properties merged with `extra`.
    fn properties(&self, extra: Value) -> Map<String, Value> {
        let mut properties = Map::new();
        properties.insert("request_id".into(), Value::from(self.request_id.clone()));
        properties.insert("method".into(), Value::from(self.method.as_str()));
        properties.insert("url".into(), Value::from(self.url.clone()));
        properties.insert("retry_count".into(), Value::from(self.retry_count));
        if let Value::Object(extra) = extra {
            properties.extend(extra);
        }
        properties
    }

    fn total_ms(&self) -> u64 {
        millis(self.started_at.elapsed())
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Shared state and collaborators of one client.
pub(crate) struct Pipeline<T> {
    pub(crate) transport: T,
    pub(crate) limiter: Mutex<SlidingWindowLimiter>,
    pub(crate) retry: RetryPolicy,
    pub(crate) timeout: Duration,
    pub(crate) enable_logging: bool,
    pub(crate) credentials: Arc<dyn CredentialStore>,
    pub(crate) telemetry: Arc<dyn TelemetrySink>,
    pub(crate) navigator: Arc<dyn Navigator>,
}

impl<T: Transport> Pipeline<T> {
    /// Run a call to completion.
    pub(crate) async fn execute<R>(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
        options: &RequestConfig,
    ) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
    {
        let mut attempt = RequestAttempt::new(method, url.as_str());

        loop {
            let request = match self.prepare(&attempt, &url, body.as_ref(), options) {
                Ok(request) => request,
                Err(error) => {
                    if self.enable_logging {
                        tracing::warn!(
                            request_id = %attempt.request_id,
                            error = %scrub(&error.to_string()),
                            "failed to build request"
                        );
                    }
                    return Err(self.fail(&attempt, error.outcome(), Duration::ZERO).await);
                }
            };

            self.admit(&attempt).await?;

            self.emit(events::API_REQUEST, attempt.properties(Value::Null));
            if self.enable_logging {
                tracing::debug!(
                    request_id = %attempt.request_id,
                    method = %attempt.method,
                    url = %attempt.url,
                    retry_count = attempt.retry_count,
                    "sending request"
                );
            }

            let sent_at = Instant::now();
            let result = self.transport.send(request).await;
            let elapsed = sent_at.elapsed();

            let outcome = match result {
                Ok(response) if response.status.is_success() => {
                    return self.succeed(&attempt, response, elapsed).await;
                }
                Ok(response) => TransportOutcome::Response {
                    status: response.status.as_u16(),
                    headers: response.headers,
                },
                Err(error) => {
                    self.network_error(&attempt, &error, elapsed);
                    error.outcome()
                }
            };

            let decision = self.retry.decide(
                &outcome,
                attempt.retry_count,
                &attempt.method,
                options.has_idempotency_key(),
            );
            if !decision.should_retry {
                return Err(self.fail(&attempt, outcome, elapsed).await);
            }

            self.emit(
                events::API_RETRY,
                attempt.properties(json!({
                    "attempt": attempt.retry_count + 1,
                    "delay_ms": millis(decision.delay),
                    "status": outcome.http_status(),
                })),
            );
            if self.enable_logging {
                tracing::warn!(
                    request_id = %attempt.request_id,
                    url = %attempt.url,
                    status = ?outcome.http_status(),
                    attempt = attempt.retry_count + 1,
                    delay_ms = millis(decision.delay),
                    "retrying request"
                );
            }

            tokio::time::sleep(decision.delay).await;
            attempt.retry_count += 1;
        }
    }

    /// Current limiter state.
    pub(crate) async fn rate_limit_status(&self) -> RateLimitStatus {
        self.limiter.lock().await.status()
    }

    /// Clear all limiter state.
    pub(crate) async fn reset_rate_limit(&self) {
        self.limiter.lock().await.reset();
    }

    /// Report a call that could not even be turned into a URL or body.
    pub(crate) fn reject_unbuildable(&self, method: Method, url: &str, reason: &str) -> ClassifiedError {
        let attempt = RequestAttempt::new(method, url);
        if self.enable_logging {
            tracing::warn!(
                request_id = %attempt.request_id,
                url = %attempt.url,
                reason = %scrub(reason),
                "failed to build request"
            );
        }
        let Classification { error, .. } = classify(&TransportOutcome::RequestBuildFailed);
        self.emit(
            events::API_RESPONSE_ERROR,
            attempt.properties(json!({
                "kind": error.kind().as_str(),
                "status": Value::Null,
                "duration_ms": 0,
            })),
        );
        error.with_request_id(attempt.request_id)
    }

    fn prepare(
        &self,
        attempt: &RequestAttempt,
        url: &Url,
        body: Option<&Vec<u8>>,
        options: &RequestConfig,
    ) -> Result<PreparedRequest, TransportError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if body.is_some() {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers.insert(REQUEST_ID_HEADER, header_value(&attempt.request_id, "request id")?);
        if let Some(key) = &options.idempotency_key {
            headers.insert(IDEMPOTENCY_KEY_HEADER, header_value(key, "idempotency key")?);
        }
        if !options.skip_auth {
            if let Some(token) = self.credentials.auth_token() {
                let mut value =
                    header_value(&format!("Bearer {}", token.expose_secret()), "bearer token")?;
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
        }
        for (name, value) in &options.headers {
            headers.insert(name.clone(), value.clone());
        }

        Ok(PreparedRequest {
            method: attempt.method.clone(),
            url: url.clone(),
            headers,
            body: body.cloned(),
            timeout: options.timeout.unwrap_or(self.timeout),
        })
    }

    /// Admission check and record in one lock scope.
    async fn admit(&self, attempt: &RequestAttempt) -> Result<(), ClassifiedError> {
        let refused = {
            let mut limiter = self.limiter.lock().await;
            match limiter.try_admit() {
                Ok(()) => None,
                Err(wait) => Some((wait, limiter.status())),
            }
        };
        let Some((wait, status)) = refused else {
            return Ok(());
        };

        self.emit(
            events::API_RATE_LIMIT_EXCEEDED,
            attempt.properties(json!({
                "requests_in_window": status.requests_in_window,
                "max_requests": status.max_requests,
                "reset_in_ms": millis(wait),
            })),
        );
        if self.enable_logging {
            tracing::warn!(
                request_id = %attempt.request_id,
                url = %attempt.url,
                requests_in_window = status.requests_in_window,
                max_requests = status.max_requests,
                reset_in_ms = millis(wait),
                "client-side rate limit exceeded"
            );
        }

        Err(ClassifiedError::new(ErrorKind::RateLimited, messages::RATE_LIMITED)
            .with_request_id(attempt.request_id.clone())
            .with_retry_after(wait))
    }

    async fn succeed<R>(
        &self,
        attempt: &RequestAttempt,
        response: TransportResponse,
        elapsed: Duration,
    ) -> Result<R, ClassifiedError>
    where
        R: DeserializeOwned,
    {
        if let Some(limit) = ServerRateLimit::from_headers(&response.headers) {
            if limit.is_exhausted() {
                self.limiter.lock().await.apply_server_limit(&limit, false);
            }
        }

        let status = response.status.as_u16();
        self.emit(
            events::API_RESPONSE_SUCCESS,
            attempt.properties(json!({
                "status": status,
                "duration_ms": millis(elapsed),
                "total_ms": attempt.total_ms(),
            })),
        );
        if self.enable_logging {
            tracing::debug!(
                request_id = %attempt.request_id,
                status,
                duration_ms = millis(elapsed),
                "request succeeded"
            );
        }

        // Empty bodies (204, bare 201) decode as JSON null so `()` and
        // `Option<T>` work.
        let body: &[u8] = if response.body.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &response.body
        };
        serde_json::from_slice(body).map_err(|error| {
            if self.enable_logging {
                tracing::warn!(
                    request_id = %attempt.request_id,
                    status,
                    error = %scrub(&error.to_string()),
                    "failed to decode response body"
                );
            }
            classify(&TransportOutcome::status(status))
                .error
                .with_request_id(attempt.request_id.clone())
        })
    }

    fn network_error(&self, attempt: &RequestAttempt, error: &TransportError, elapsed: Duration) {
        if matches!(error, TransportError::Build(_)) {
            return;
        }
        self.emit(
            events::API_NETWORK_ERROR,
            attempt.properties(json!({
                "error": error.to_string(),
                "timed_out": *error == TransportError::Timeout,
                "duration_ms": millis(elapsed),
            })),
        );
        if self.enable_logging {
            tracing::warn!(
                request_id = %attempt.request_id,
                url = %attempt.url,
                error = %scrub(&error.to_string()),
                "no response received"
            );
        }
    }

    /// Classify a terminal failure and perform its side effect.
    async fn fail(
        &self,
        attempt: &RequestAttempt,
        outcome: TransportOutcome,
        elapsed: Duration,
    ) -> ClassifiedError {
        let Classification { error, effect } = classify(&outcome);

        self.emit(
            events::API_RESPONSE_ERROR,
            attempt.properties(json!({
                "status": error.http_status(),
                "kind": error.kind().as_str(),
                "message": error.user_message(),
                "duration_ms": millis(elapsed),
                "total_ms": attempt.total_ms(),
            })),
        );
        if self.enable_logging {
            tracing::warn!(
                request_id = %attempt.request_id,
                url = %attempt.url,
                status = ?error.http_status(),
                kind = %error.kind(),
                retries = attempt.retry_count,
                "request failed"
            );
        }

        match effect {
            Some(RequiredEffect::RequiresReauth) => {
                self.credentials.clear_auth_token();
                self.navigator.redirect_to_login();
            }
            Some(RequiredEffect::ApplyServerRateLimit(limit)) => {
                self.limiter.lock().await.apply_server_limit(&limit, true);
            }
            None => {}
        }

        error.with_request_id(attempt.request_id.clone())
    }

    fn emit(&self, name: &str, properties: Map<String, Value>) {
        self.telemetry.track_event(name, &scrub_map(&properties));
    }
}

fn header_value(value: &str, what: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|_| TransportError::Build(format!("{what} is not a valid header value")))
}
