//! Fixed-window counter keyed by client.

use ahash::AHashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

/// Result of a rate limit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitResult {
    /// Request is allowed to proceed.
    Allowed {
        /// Maximum number of requests allowed in the window
        limit: u32,
        /// Number of requests remaining in the current window
        remaining: u32,
        /// Time until the window resets
        reset_after: Duration,
    },
    /// Request is rate limited and should be rejected.
    Limited {
        /// Maximum number of requests allowed in the window
        limit: u32,
        /// Time until the window resets
        reset_after: Duration,
    },
}

impl RateLimitResult {
    /// Returns true if the request is allowed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed { .. })
    }

    /// Returns true if the request is limited.
    pub fn is_limited(&self) -> bool {
        matches!(self, RateLimitResult::Limited { .. })
    }

    /// Get the limit value.
    pub fn limit(&self) -> u32 {
        match self {
            RateLimitResult::Allowed { limit, .. } => *limit,
            RateLimitResult::Limited { limit, .. } => *limit,
        }
    }

    /// Get the remaining count.
    pub fn remaining(&self) -> u32 {
        match self {
            RateLimitResult::Allowed { remaining, .. } => *remaining,
            RateLimitResult::Limited { .. } => 0,
        }
    }

    pub fn reset_after(&self) -> Duration {
        match self {
            RateLimitResult::Allowed { reset_after, .. } => *reset_after,
            RateLimitResult::Limited { reset_after, .. } => *reset_after,
        }
    }

    /// Whole seconds until the window resets, rounded up
    pub fn retry_after_secs(&self) -> u64 {
        ceil_secs(self.reset_after())
    }
}

fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs.saturating_add(1)
    } else {
        secs
    }
}

#[derive(Debug, Clone, Copy)]
struct WindowState {
    started: Instant,
    count: u32,
}

/// Exact fixed-window counter.
///
/// A key's window opens on its first request and resets once `window` has
/// elapsed. Rejected requests do not consume the window.
///
/// # Example
/// ```ignore
/// let limiter = FixedWindowLimiter::new(Duration::from_secs(900));
///
/// match limiter.check("192.168.1.1", 5) {
///     RateLimitResult::Allowed { remaining, .. } => println!("{remaining} left"),
///     RateLimitResult::Limited { reset_after, .. } => println!("retry in {reset_after:?}"),
/// }
/// ```
pub struct FixedWindowLimiter {
    window: Duration,
    windows: Mutex<AHashMap<String, WindowState>>,
}

impl FixedWindowLimiter {
    pub fn new(window: Duration) -> Self {
        Self { window, windows: Mutex::new(AHashMap::new()) }
    }

    /// Count one request for `key` against `max`.
    ///
    /// `max` is passed per call since the effective limit changes with memory
    /// pressure; already admitted requests are never revisited.
    pub fn check(&self, key: &str, max: u32) -> RateLimitResult {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        let state =
            windows.entry(key.to_string()).or_insert(WindowState { started: now, count: 0 });
        if now.duration_since(state.started) >= self.window {
            *state = WindowState { started: now, count: 0 };
        }

        let reset_after = self.window.saturating_sub(now.duration_since(state.started));
        if state.count < max {
            state.count += 1;
            RateLimitResult::Allowed { limit: max, remaining: max - state.count, reset_after }
        } else {
            RateLimitResult::Limited { limit: max, reset_after }
        }
    }

    /// Requests counted for `key` in its current window
    pub fn current(&self, key: &str) -> u32 {
        let now = Instant::now();
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows
            .get(key)
            .filter(|s| now.duration_since(s.started) < self.window)
            .map(|s| s.count)
            .unwrap_or(0)
    }

    /// Drop keys whose window has elapsed. Returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = windows.len();
        windows.retain(|_, s| now.duration_since(s.started) < self.window);
        before - windows.len()
    }

    /// Number of keys currently tracked
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
