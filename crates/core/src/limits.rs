//! Client-side search limiter
//!
//! Caps how many search requests a client may issue inside a rolling window.
//! The limiter only counts; it never sleeps. Callers decide whether to wait
//! for `retry_after` or surface the limit to the user.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Returned when the window is already full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Search limit of {limit} reached, retry in {retry_after:?}")]
pub struct LimitExceeded {
    /// Requests allowed per window
    pub limit: u32,
    /// Time until the oldest counted request leaves the window
    pub retry_after: Duration,
}

/// Rolling-window request counter
#[derive(Debug)]
pub struct SearchLimiter {
    max_requests: u32,
    window: Duration,
    hits: Mutex<VecDeque<Instant>>,
}

impl SearchLimiter {
    /// Create a limiter allowing `max_requests` per `window`
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            hits: Mutex::new(VecDeque::with_capacity(max_requests as usize)),
        }
    }

    /// Requests allowed per window
    pub fn limit(&self) -> u32 {
        self.max_requests
    }

    /// Record one request if the window has room
    ///
    /// Returns the number of requests still available in the current window.
    ///
    /// # Errors
    ///
    /// Returns `LimitExceeded` when the window is full; nothing is recorded.
    pub fn try_acquire(&self) -> Result<u32, LimitExceeded> {
        let now = Instant::now();
        let mut hits = self.hits();
        self.evict(&mut hits, now);

        if hits.len() >= self.max_requests as usize {
            let retry_after = hits
                .front()
                .map_or(self.window, |oldest| {
                    (*oldest + self.window).saturating_duration_since(now)
                });
            ::tracing::debug!(limit = self.max_requests, ?retry_after, "Search limit reached");
            return Err(LimitExceeded {
                limit: self.max_requests,
                retry_after,
            });
        }

        hits.push_back(now);
        Ok(self.available(&hits))
    }

    /// Requests still available in the current window
    pub fn remaining(&self) -> u32 {
        let mut hits = self.hits();
        self.evict(&mut hits, Instant::now());
        self.available(&hits)
    }

    /// Forget every recorded request
    pub fn reset(&self) {
        self.hits().clear();
    }

    fn available(&self, hits: &VecDeque<Instant>) -> u32 {
        let used = u32::try_from(hits.len()).unwrap_or(u32::MAX);
        self.max_requests.saturating_sub(used)
    }

    fn evict(&self, hits: &mut VecDeque<Instant>, now: Instant) {
        while hits
            .front()
            .is_some_and(|oldest| now.saturating_duration_since(*oldest) >= self.window)
        {
            hits.pop_front();
        }
    }

    fn hits(&self) -> MutexGuard<'_, VecDeque<Instant>> {
        self.hits.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
