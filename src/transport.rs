//! The seam between the request pipeline and the network.
//!
//! [`Transport`] sends one fully prepared request and reports what happened
//! as a tagged result. [`HttpTransport`] is the production implementation,
//! a reqwest client wrapped in `reqwest-middleware` with tracing spans.
//! Tests plug in scripted transports.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Method, StatusCode};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;
use thiserror::Error;
use url::Url;

use crate::classify::TransportOutcome;

/// A request ready to go on the wire.
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute URL including the query string
    pub url: Url,
    /// Complete header set
    pub headers: HeaderMap,
    /// Serialized JSON body, unchanged across retries
    pub body: Option<Vec<u8>>,
    /// Timeout for this single attempt
    pub timeout: Duration,
}

/// A received response with its body fully read.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    /// Response status
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl TransportResponse {
    /// Build a response, mostly useful for test transports.
    pub fn new(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Build a JSON response.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }
}

/// Failures in which no response was obtained.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The per-attempt timeout elapsed.
    #[error("request timed out")]
    Timeout,
    /// Connection failed, was reset, or the body could not be read.
    #[error("no response received: {0}")]
    NoResponse(String),
    /// The request could not be constructed.
    #[error("request could not be built: {0}")]
    Build(String),
}

impl TransportError {
    /// The outcome this failure classifies as.
    pub fn outcome(&self) -> TransportOutcome {
        match self {
            TransportError::Timeout => TransportOutcome::NoResponse { timed_out: true },
            TransportError::NoResponse(_) => TransportOutcome::NoResponse { timed_out: false },
            TransportError::Build(_) => TransportOutcome::RequestBuildFailed,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_builder() {
            TransportError::Build(error.to_string())
        } else {
            TransportError::NoResponse(error.to_string())
        }
    }
}

impl From<reqwest_middleware::Error> for TransportError {
    fn from(error: reqwest_middleware::Error) -> Self {
        match error {
            reqwest_middleware::Error::Reqwest(error) => error.into(),
            reqwest_middleware::Error::Middleware(error) => {
                TransportError::NoResponse(error.to_string())
            }
        }
    }
}

/// Sends prepared requests.
///
/// Implementations must not retry on their own; the pipeline owns retries.
pub trait Transport: Send + Sync + 'static {
    /// Send one request and wait for its complete response.
    fn send(
        &self,
        request: PreparedRequest,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// reqwest-backed transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    http_client: ClientWithMiddleware,
}

impl HttpTransport {
    /// Create a transport with the given user agent.
    pub fn new(user_agent: Option<&str>) -> Self {
        let mut headers = HeaderMap::new();
        let user_agent = user_agent
            .map(str::to_string)
            .unwrap_or_else(|| format!("penguin-api-client/{}", env!("CARGO_PKG_VERSION")));
        let header_value = HeaderValue::from_str(&user_agent)
            .unwrap_or_else(|_| HeaderValue::from_static("penguin-api-client"));
        headers.insert(USER_AGENT, header_value);

        let reqwest_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self::from_client(reqwest_client)
    }

    /// Wrap an existing reqwest client.
    pub fn from_client(client: reqwest::Client) -> Self {
        let http_client = ClientBuilder::new(client)
            .with(TracingMiddleware::default())
            .build();
        Self { http_client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: PreparedRequest) -> Result<TransportResponse, TransportError> {
        let mut builder = self
            .http_client
            .request(request.method, request.url)
            .headers(request.headers)
            .timeout(request.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}
