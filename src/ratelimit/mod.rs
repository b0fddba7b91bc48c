//! Per-identity fixed-window rate limiting.
//!
//! Each identity owns one [`RateWindow`]: a counter and the instant its
//! window started. A request is admitted while the counter is below the
//! limit; once `started + window` has passed, the next request resets the
//! counter and starts a new window.
//!
//! ```text
//!   window 1 (60s)              window 2 (60s)
//! |--x--x--x--X------------|--x-------------------|
//!    1  2  3  4 (429)         1 (counter reset)
//! ```
//!
//! Up to `2 * limit` requests can land across a window seam. This policy
//! keeps O(1) state per identity.
//!
//! # Atomicity
//!
//! Check, reset and increment run inside one `DashMap::entry` call, which
//! holds the write lock of the shard that owns the identity. Two concurrent
//! requests for the same identity are serialized; requests for identities in
//! other shards proceed in parallel.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::auth::Identity;
use crate::config::RateLimitConfig;
use crate::verdict::{Denial, Verdict};

/// Counter state for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateWindow {
    /// Requests admitted in the current window
    pub count: u32,
    /// When the current window started
    pub started: Instant,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            started: now,
        }
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.started) >= window
    }

    /// Time left until this window resets, rounded up to whole seconds (min 1s).
    fn retry_after(&self, now: Instant, window: Duration) -> Duration {
        let remaining = (self.started + window).saturating_duration_since(now);
        let secs = remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0);
        Duration::from_secs(secs.max(1))
    }
}

/// Fixed-window rate limiter keyed by identity.
pub struct RateLimiter {
    windows: DashMap<Identity, RateWindow>,
    limit: u32,
    window: Duration,
    max_identities: usize,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limit", &self.limit)
            .field("window", &self.window)
            .field("tracked", &self.windows.len())
            .finish_non_exhaustive()
    }
}

impl RateLimiter {
    /// Create a limiter admitting `limit` requests per `window`
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            windows: DashMap::new(),
            limit,
            window,
            max_identities: RateLimitConfig::default().max_identities,
            clock: Arc::new(SystemClock),
        }
    }

    /// Create from configuration
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.limit, config.window()).with_max_identities(config.max_identities)
    }

    /// Replace the time source
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Cap the number of tracked identities
    pub fn with_max_identities(mut self, max: usize) -> Self {
        self.max_identities = max.max(1);
        self
    }

    /// Requests allowed per window
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Window length
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Atomically admit or deny one request for `identity`.
    pub fn check_and_increment(&self, identity: &Identity) -> Verdict<()> {
        let now = self.clock.now();

        if !self.windows.contains_key(identity) && self.windows.len() >= self.max_identities {
            self.evict(now);
        }

        let mut window = self
            .windows
            .entry(identity.clone())
            .or_insert_with(|| RateWindow::new(now));

        if window.is_expired(now, self.window) {
            *window = RateWindow::new(now);
        }

        if window.count >= self.limit {
            let retry_after = window.retry_after(now, self.window);
            drop(window);
            tracing::debug!(identity = %identity, ?retry_after, "rate limit exceeded");
            return Verdict::Denied(Denial::rate_limited(retry_after));
        }

        window.count += 1;
        Verdict::Allowed(())
    }

    /// Snapshot of an identity's window, if tracked
    pub fn window_of(&self, identity: &Identity) -> Option<RateWindow> {
        self.windows.get(identity).map(|w| *w)
    }

    /// Number of tracked identities
    pub fn tracked(&self) -> usize {
        self.windows.len()
    }

    /// Drop windows that have already rolled over; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now, self.window));
        before.saturating_sub(self.windows.len())
    }

    fn evict(&self, now: Instant) {
        self.windows.retain(|_, w| !w.is_expired(now, self.window));
        if self.windows.len() < self.max_identities {
            return;
        }

        let oldest = self
            .windows
            .iter()
            .min_by_key(|entry| entry.value().started)
            .map(|entry| entry.key().clone());
        if let Some(identity) = oldest {
            tracing::debug!(identity = %identity, "evicting rate window at capacity");
            self.windows.remove(&identity);
        }
    }
}
