//! Client-side rate limiting.
//!
//! Every outbound request passes an admission check against a sliding window
//! of recent dispatch timestamps. The window defaults to 100 requests per
//! 60 seconds. Rate-limit headers returned by the server can force an
//! additional block that lasts until the server's reset time.
//!
//! The limiter is owned by the [`ApiClient`](crate::ApiClient) that created it;
//! clones of a client share one limiter, separate clients never do.
//!
//! ## Example
//!
//! ```rust
//! use penguin_api_client::rate_limit::{RateLimitConfig, SlidingWindowLimiter};
//!
//! let mut limiter = SlidingWindowLimiter::new(RateLimitConfig::default());
//! if limiter.check_admission() {
//!     limiter.record_request();
//! }
//! assert_eq!(limiter.status().requests_in_window, 1);
//! ```

mod headers;
mod window;

pub use headers::{REMAINING_HEADER, RESET_HEADER, ServerRateLimit};
pub use window::SlidingWindowLimiter;

use std::time::Duration;

use tokio::time::Instant;

/// Rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Whether to enable rate limiting.
    pub enabled: bool,
    /// Length of the sliding window.
    pub window: Duration,
    /// Requests admitted per window.
    pub max_requests: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window: Duration::from_millis(limits::WINDOW_MS),
            max_requests: limits::MAX_REQUESTS,
        }
    }
}

/// Point-in-time view of the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    /// Whether a server block is active, or an admission was refused and
    /// the window is still full.
    pub blocked: bool,
    /// Requests dispatched inside the current window.
    pub requests_in_window: u32,
    /// Configured maximum per window.
    pub max_requests: u32,
    /// When admission becomes possible again, if currently blocked.
    pub reset_time: Option<Instant>,
}

impl RateLimitStatus {
    /// Time left until `reset_time`, if blocked.
    pub fn reset_in(&self) -> Option<Duration> {
        self.reset_time
            .map(|reset| reset.saturating_duration_since(Instant::now()))
    }
}

/// Default limits.
pub mod limits {
    /// Sliding window length in milliseconds.
    pub const WINDOW_MS: u64 = 60_000;
    /// Maximum requests per window.
    pub const MAX_REQUESTS: u32 = 100;
    /// Longest block a server signal can impose, in seconds.
    pub const MAX_SERVER_BLOCK_SECS: u64 = 86_400;
}
