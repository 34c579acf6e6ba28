//! Rate-limit information carried by response headers.
//!
//! The backend may report its own limits with the conventional headers:
//! - `X-RateLimit-Remaining`: requests left in the current server window
//! - `X-RateLimit-Reset`: Unix timestamp (seconds) when the window resets
//! - `Retry-After`: seconds to wait, sent with 429 responses

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

/// Header carrying the remaining request count.
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
/// Header carrying the reset timestamp.
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Server-reported rate-limit state extracted from a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerRateLimit {
    /// Requests the server still accepts in its window.
    pub remaining: Option<u32>,
    /// When the server window resets, as Unix seconds.
    pub reset_at_epoch_seconds: Option<i64>,
    /// Wait suggested by `Retry-After`.
    pub retry_after: Option<Duration>,
}

impl ServerRateLimit {
    /// Parse rate-limit headers.
    ///
    /// Returns `None` when none of the headers are present or parsable.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let limit = Self {
            remaining: parse_header(headers, REMAINING_HEADER),
            reset_at_epoch_seconds: parse_header(headers, RESET_HEADER),
            retry_after: parse_header::<u64>(headers, RETRY_AFTER.as_str())
                .map(Duration::from_secs),
        };
        (limit != Self::default()).then_some(limit)
    }

    /// Check if the server reports no remaining capacity.
    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

fn parse_header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse().ok())
}
