//! Classification of transport outcomes into user-facing errors.
//!
//! [`classify`] is a pure, total mapping: every outcome yields exactly one
//! [`ErrorKind`] and never panics. Side effects implied by an outcome (clearing
//! credentials on 401, honouring server rate-limit headers on 429) are returned
//! as a [`RequiredEffect`] for the pipeline to perform.

use reqwest::header::HeaderMap;

use crate::error::{ClassifiedError, ErrorKind};
use crate::rate_limit::ServerRateLimit;

/// What happened to one physical request attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportOutcome {
    /// The server answered.
    Response {
        /// HTTP status code
        status: u16,
        /// Response headers
        headers: HeaderMap,
    },
    /// The request went out but no response arrived.
    NoResponse {
        /// Whether the per-attempt timeout elapsed
        timed_out: bool,
    },
    /// The request could not be built (bad URL, unserializable body, ...).
    RequestBuildFailed,
}

impl TransportOutcome {
    /// Shorthand for a response without interesting headers.
    pub fn status(status: u16) -> Self {
        Self::Response {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// The HTTP status, if a response was received.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Response { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Side effect the caller-facing boundary has to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredEffect {
    /// Drop stored credentials and send the user to the login surface.
    RequiresReauth,
    /// Update the local limiter from server rate-limit headers.
    ApplyServerRateLimit(ServerRateLimit),
}

/// Result of classifying a terminal failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// The error handed to the caller.
    pub error: ClassifiedError,
    /// Effect to perform before returning the error.
    pub effect: Option<RequiredEffect>,
}

/// User-facing messages, one per outcome class.
pub mod messages {
    /// 400 and 422.
    pub const VALIDATION: &str = "Invalid request. Please check your input and try again.";
    /// 401, the session is gone.
    pub const AUTH: &str = "Please log in to continue.";
    /// 403.
    pub const FORBIDDEN: &str = "You do not have permission to perform this action.";
    /// 404.
    pub const NOT_FOUND: &str = "The requested resource was not found.";
    /// 429, or refused by the local limiter.
    pub const RATE_LIMITED: &str = "Too many requests. Please wait a moment and try again.";
    /// Any 5xx.
    pub const SERVER: &str = "A server error occurred. Please try again later.";
    /// No response received.
    pub const NETWORK: &str = "Network error. Please check your connection and try again.";
    /// The per-attempt timeout elapsed.
    pub const TIMEOUT: &str = "The request timed out. Please try again.";
    /// Everything else, including undecodable 2xx bodies.
    pub const UNKNOWN: &str = "An unexpected error occurred. Please try again.";
}

/// Map an HTTP status to its kind and message.
pub fn status_kind(status: u16) -> (ErrorKind, &'static str) {
    match status {
        400 | 422 => (ErrorKind::Validation, messages::VALIDATION),
        401 => (ErrorKind::Auth, messages::AUTH),
        403 => (ErrorKind::Forbidden, messages::FORBIDDEN),
        404 => (ErrorKind::NotFound, messages::NOT_FOUND),
        429 => (ErrorKind::RateLimited, messages::RATE_LIMITED),
        500..=599 => (ErrorKind::Server, messages::SERVER),
        _ => (ErrorKind::Unknown, messages::UNKNOWN),
    }
}

/// Classify a terminal outcome.
pub fn classify(outcome: &TransportOutcome) -> Classification {
    match outcome {
        TransportOutcome::Response { status, headers } => {
            let (kind, message) = status_kind(*status);
            let effect = match kind {
                ErrorKind::Auth => Some(RequiredEffect::RequiresReauth),
                ErrorKind::RateLimited => ServerRateLimit::from_headers(headers)
                    .map(RequiredEffect::ApplyServerRateLimit),
                _ => None,
            };
            let mut error = ClassifiedError::new(kind, message).with_status(*status);
            if let Some(RequiredEffect::ApplyServerRateLimit(ServerRateLimit {
                retry_after: Some(retry_after),
                ..
            })) = effect
            {
                error = error.with_retry_after(retry_after);
            }
            Classification { error, effect }
        }
        TransportOutcome::NoResponse { timed_out } => {
            let message = if *timed_out {
                messages::TIMEOUT
            } else {
                messages::NETWORK
            };
            Classification {
                error: ClassifiedError::new(ErrorKind::Network, message),
                effect: None,
            }
        }
        TransportOutcome::RequestBuildFailed => Classification {
            error: ClassifiedError::new(ErrorKind::Unknown, messages::UNKNOWN),
            effect: None,
        },
    }
}
