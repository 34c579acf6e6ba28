//! Error types for the Penguin X client library.
//!
//! Every verb method on [`ApiClient`](crate::ApiClient) fails with a
//! [`ClassifiedError`]: transport and decoding failures never reach the caller
//! raw. Configuration problems detected while building a client or a request
//! surface as [`ConfigError`].

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// The failure taxonomy shared by the classifier, telemetry and callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The server rejected the request payload (400, 422).
    Validation,
    /// The caller is not authenticated (401).
    Auth,
    /// The caller is authenticated but not allowed (403).
    Forbidden,
    /// The resource does not exist (404).
    NotFound,
    /// Too many requests, either refused locally or by the server (429).
    RateLimited,
    /// The server failed (5xx).
    Server,
    /// No response was received.
    Network,
    /// Anything the table above does not cover.
    Unknown,
}

impl ErrorKind {
    /// All kinds, in taxonomy order.
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::Validation,
        ErrorKind::Auth,
        ErrorKind::Forbidden,
        ErrorKind::NotFound,
        ErrorKind::RateLimited,
        ErrorKind::Server,
        ErrorKind::Network,
        ErrorKind::Unknown,
    ];

    /// Stable name used in telemetry payloads.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::Auth => "AuthError",
            ErrorKind::Forbidden => "ForbiddenError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::RateLimited => "RateLimitedError",
            ErrorKind::Server => "ServerError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Unknown => "UnknownError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal request failure, safe to show to an end user.
///
/// The message never contains response bodies, tokens or stack traces.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {user_message}")]
pub struct ClassifiedError {
    kind: ErrorKind,
    user_message: String,
    is_network_error: bool,
    http_status: Option<u16>,
    request_id: Option<String>,
    retry_after: Option<Duration>,
}

impl ClassifiedError {
    /// Create a new classified error.
    pub fn new(kind: ErrorKind, user_message: impl Into<String>) -> Self {
        Self {
            kind,
            user_message: user_message.into(),
            is_network_error: kind == ErrorKind::Network,
            http_status: None,
            request_id: None,
            retry_after: None,
        }
    }

    /// Attach the HTTP status that produced this error.
    pub fn with_status(mut self, status: u16) -> Self {
        self.http_status = Some(status);
        self
    }

    /// Attach the id of the request that failed.
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Attach a suggested wait before trying again.
    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// The failure kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// A message suitable for direct display.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Whether the failure happened before any response was received.
    pub fn is_network_error(&self) -> bool {
        self.is_network_error
    }

    /// The HTTP status, when a response was received.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    /// The `X-Request-ID` of the failed call, if it got that far.
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// How long to wait before the rate limiter admits calls again.
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Check if this is a rate limit error.
    pub fn is_rate_limited(&self) -> bool {
        self.kind == ErrorKind::RateLimited
    }

    /// Check if the caller has to authenticate again.
    pub fn requires_login(&self) -> bool {
        self.kind == ErrorKind::Auth
    }
}

/// Errors raised while building a client, loading configuration or
/// preparing request options.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The base URL could not be parsed.
    #[error("invalid base URL `{url}`: {source}")]
    InvalidBaseUrl {
        /// The rejected URL
        url: String,
        /// The parse failure
        #[source]
        source: url::ParseError,
    },

    /// An environment variable held a value of the wrong shape.
    #[error("invalid value `{value}` for environment variable {name}")]
    InvalidEnv {
        /// Variable name
        name: String,
        /// The raw value that failed to parse
        value: String,
    },

    /// Query parameters could not be URL-encoded.
    #[error("invalid query parameters: {0}")]
    Query(#[from] serde_urlencoded::ser::Error),
}
