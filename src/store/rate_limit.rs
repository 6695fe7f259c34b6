//! Upstream request budget
//!
//! GitHub reports the remaining request budget on every response through
//! `X-RateLimit-Remaining` / `X-RateLimit-Reset`. The REST store records them
//! and pauses before the budget runs dry, so a large blob batch slows down
//! instead of tripping the remote's abuse protection.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info};

/// Budget is unknown until the first response arrives
const UNKNOWN: u64 = u64::MAX;

#[derive(Debug, Clone)]
pub struct RateLimitState {
    remaining: Arc<AtomicU64>,
    /// Unix timestamp at which the budget refills
    reset_at: Arc<AtomicU64>,
}

impl Default for RateLimitState {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimitState {
    pub fn new() -> Self {
        Self {
            remaining: Arc::new(AtomicU64::new(UNKNOWN)),
            reset_at: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        match self.remaining.load(Ordering::Relaxed) {
            UNKNOWN => None,
            remaining => Some(remaining),
        }
    }

    pub fn reset_at(&self) -> u64 {
        self.reset_at.load(Ordering::Relaxed)
    }

    /// Record the budget reported by a response.
    pub fn observe(&self, headers: &reqwest::header::HeaderMap) {
        let read = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
        };

        if let Some(remaining) = read("X-RateLimit-Remaining") {
            self.remaining.store(remaining, Ordering::Relaxed);
        }
        if let Some(reset) = read("X-RateLimit-Reset") {
            self.reset_at.store(reset, Ordering::Relaxed);
        }
    }

    /// Whether the last response reported an empty budget
    pub fn is_exhausted(&self) -> bool {
        self.remaining() == Some(0)
    }

    /// How long to pause before the next request, given `now` as a Unix timestamp.
    ///
    /// `None` while more than `buffer` requests remain or once the window has reset.
    pub fn pause_needed(&self, buffer: u64, now: u64) -> Option<Duration> {
        let remaining = self.remaining()?;
        let reset = self.reset_at();

        if remaining < buffer && reset > now {
            Some(Duration::from_secs(reset - now))
        } else {
            None
        }
    }

    /// Sleep until the window resets when fewer than `buffer` requests remain.
    /// Returns `true` if the caller had to wait.
    pub async fn wait_if_needed(&self, buffer: u64) -> bool {
        let now = chrono::Utc::now().timestamp().max(0) as u64;

        match self.pause_needed(buffer, now) {
            Some(pause) => {
                info!(
                    remaining = self.remaining(),
                    reset_in_secs = pause.as_secs(),
                    buffer,
                    "self-throttling: rate limit approaching"
                );
                tokio::time::sleep(pause).await;
                true
            }
            None => {
                debug!(remaining = self.remaining(), buffer, "rate limit OK");
                false
            }
        }
    }
}
