//! Sliding-window admission control.
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use penguin_api_client::rate_limit::{RateLimitConfig, SlidingWindowLimiter};
//!
//! let mut limiter = SlidingWindowLimiter::new(RateLimitConfig {
//!     enabled: true,
//!     window: Duration::from_secs(1),
//!     max_requests: 2,
//! });
//!
//! assert!(limiter.try_admit().is_ok());
//! assert!(limiter.try_admit().is_ok());
//! assert!(limiter.try_admit().is_err());
//! ```

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::rate_limit::{RateLimitConfig, RateLimitStatus, ServerRateLimit, limits};

/// Client-side rate limiter counting requests inside a sliding window.
///
/// The server may additionally force an explicit block through rate-limit
/// response headers; that block takes precedence over local counting until
/// its reset instant passes.
///
/// A full window refuses the next admission, but [`status`](Self::status)
/// only reports `blocked` once such a refusal happened: `max_requests`
/// admitted calls leave the limiter unblocked.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    /// Dispatch timestamps, oldest first
    requests: VecDeque<Instant>,
    window: Duration,
    max_requests: u32,
    enabled: bool,
    /// Server-signalled block and when it lifts
    explicit_block: Option<Instant>,
    /// An admission was refused because the window was full
    saturated: bool,
}

impl SlidingWindowLimiter {
    /// Create a limiter from its configuration.
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            requests: VecDeque::with_capacity(config.max_requests.min(1024) as usize),
            window: config.window,
            max_requests: config.max_requests,
            enabled: config.enabled,
            explicit_block: None,
            saturated: false,
        }
    }

    /// Decide whether a new request may go out now.
    ///
    /// Purges expired timestamps and lifts an expired server block first.
    /// Does not record anything.
    pub fn check_admission(&mut self) -> bool {
        if !self.enabled {
            return true;
        }
        let now = Instant::now();
        self.purge(now);
        if self.window_full() {
            self.saturated = true;
        }
        !self.is_blocked()
    }

    /// Record a dispatched request.
    ///
    /// Call only after admission was granted and the request actually goes out.
    pub fn record_request(&mut self) {
        if self.enabled {
            self.requests.push_back(Instant::now());
        }
    }

    /// Check admission and record in one step.
    ///
    /// Returns `Err(wait_time)` with the time until a slot frees up when the
    /// request is refused.
    pub fn try_admit(&mut self) -> Result<(), Duration> {
        if self.check_admission() {
            self.record_request();
            Ok(())
        } else {
            let now = Instant::now();
            Err(self
                .next_reset()
                .map(|reset| reset.saturating_duration_since(now))
                .unwrap_or_default())
        }
    }

    /// Force a block from a server-supplied limit.
    ///
    /// A block is only set when `remaining` is zero. `reset_at_epoch_seconds`
    /// is a Unix timestamp; a reset that already passed is ignored.
    pub fn on_server_signal(&mut self, remaining: u32, reset_at_epoch_seconds: i64) {
        if !self.enabled || remaining > 0 {
            return;
        }
        let now_epoch = time::OffsetDateTime::now_utc().unix_timestamp();
        let Some(seconds) = reset_at_epoch_seconds
            .checked_sub(now_epoch)
            .and_then(|delta| u64::try_from(delta).ok())
        else {
            return;
        };
        if seconds > 0 {
            self.block_for(Duration::from_secs(seconds));
        }
    }

    /// Apply whatever the rate-limit headers of a response say.
    ///
    /// `rate_limited` is true for a 429 response, in which case a missing
    /// `remaining` count is taken as zero.
    pub fn apply_server_limit(&mut self, limit: &ServerRateLimit, rate_limited: bool) {
        let remaining = match limit.remaining {
            Some(remaining) => remaining,
            None if rate_limited => 0,
            None => return,
        };
        if remaining > 0 {
            return;
        }
        if let Some(reset) = limit.reset_at_epoch_seconds {
            self.on_server_signal(remaining, reset);
        } else if let Some(retry_after) = limit.retry_after {
            self.block_for(retry_after);
        }
    }

    /// Block all admissions for `duration`, extending any current block.
    ///
    /// Durations are capped at [`limits::MAX_SERVER_BLOCK_SECS`].
    pub fn block_for(&mut self, duration: Duration) {
        if !self.enabled || duration.is_zero() {
            return;
        }
        let duration = duration.min(Duration::from_secs(limits::MAX_SERVER_BLOCK_SECS));
        let Some(until) = Instant::now().checked_add(duration) else {
            return;
        };
        self.explicit_block = Some(self.explicit_block.map_or(until, |current| current.max(until)));
    }

    /// Snapshot of the limiter state.
    pub fn status(&self) -> RateLimitStatus {
        let now = Instant::now();
        let requests_in_window = self.in_window(now);
        let block_active = self.explicit_block.is_some_and(|until| now <= until);
        let saturated = self.saturated && requests_in_window >= self.max_requests;
        let blocked = self.enabled && (block_active || saturated);
        RateLimitStatus {
            blocked,
            requests_in_window,
            max_requests: self.max_requests,
            reset_time: if blocked { self.next_reset() } else { None },
        }
    }

    /// Clear all state, including any server-signalled block.
    pub fn reset(&mut self) {
        self.requests.clear();
        self.explicit_block = None;
        self.saturated = false;
    }

    fn is_blocked(&self) -> bool {
        self.explicit_block.is_some() || self.window_full()
    }

    fn window_full(&self) -> bool {
        self.requests.len() as u32 >= self.max_requests
    }

    /// The instant admission becomes possible again.
    fn next_reset(&self) -> Option<Instant> {
        let now = Instant::now();
        if let Some(until) = self.explicit_block.filter(|until| now <= *until) {
            return Some(until);
        }
        let overflow = (self.in_window(now) + 1).saturating_sub(self.max_requests) as usize;
        self.requests
            .iter()
            .filter(|ts| now.duration_since(**ts) < self.window)
            .nth(overflow.saturating_sub(1))
            .map(|ts| *ts + self.window)
    }

    fn in_window(&self, now: Instant) -> u32 {
        self.requests
            .iter()
            .filter(|ts| now.duration_since(**ts) < self.window)
            .count() as u32
    }

    /// Drop timestamps outside the window and an expired server block.
    fn purge(&mut self, now: Instant) {
        while let Some(oldest) = self.requests.front() {
            if now.duration_since(*oldest) >= self.window {
                self.requests.pop_front();
            } else {
                break;
            }
        }
        if self.explicit_block.is_some_and(|until| now > until) {
            self.explicit_block = None;
        }
        if !self.window_full() {
            self.saturated = false;
        }
    }
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}
