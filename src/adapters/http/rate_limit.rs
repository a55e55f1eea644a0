//! Per-provider request throttle
//!
//! Fixed one-minute window plus a minimum spacing between requests.

use std::time::Duration;
use tokio::time::Instant;

const WINDOW: Duration = Duration::from_secs(60);

/// Simple rate limiter: requests-per-minute window with minimum interval
#[derive(Debug)]
pub struct RateLimiter {
    /// Maximum requests per minute
    rpm_limit: u32,
    /// Minimum spacing between consecutive requests
    min_interval: Duration,
    /// Timestamp of last request
    last_request: Option<Instant>,
    /// Requests made in current window
    requests_in_window: u32,
    /// Window start time
    window_start: Instant,
}

impl RateLimiter {
    pub fn new(rpm_limit: u32, min_interval: Duration) -> Self {
        Self {
            rpm_limit: rpm_limit.max(1),
            min_interval,
            last_request: None,
            requests_in_window: 0,
            window_start: Instant::now(),
        }
    }

    /// Check if a request can be made now, returns the wait time if not
    pub fn check_rate_limit(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.window_start);

        // Reset window if a minute has passed
        if elapsed >= WINDOW {
            self.window_start = now;
            self.requests_in_window = 0;
        } else if self.requests_in_window >= self.rpm_limit {
            return Some(WINDOW - elapsed);
        }

        // Ensure minimum interval between requests
        if let Some(last) = self.last_request {
            let since_last = now.duration_since(last);
            if since_last < self.min_interval {
                return Some(self.min_interval - since_last);
            }
        }

        None
    }

    /// Record that a request was made
    pub fn record_request(&mut self) {
        self.last_request = Some(Instant::now());
        self.requests_in_window += 1;
    }

    /// Wait until a request can be made, then record it
    pub async fn wait_if_needed(&mut self) {
        while let Some(wait) = self.check_rate_limit() {
            tracing::trace!("Rate limiter waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.record_request();
    }

    pub fn requests_in_window(&self) -> u32 {
        self.requests_in_window
    }
}
