//! Gateway statistics tracking.
//!
//! Tracks request counts, denials, upstream failures and streaming traffic.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::Serialize;

/// Thread-safe gateway statistics
#[derive(Debug)]
pub struct GatewayStats {
    requests: AtomicU64,
    unauthenticated: AtomicU64,
    rate_limited: AtomicU64,
    not_found: AtomicU64,
    bad_input: AtomicU64,
    upstream_failures: AtomicU64,
    internal_faults: AtomicU64,
    streaming_sessions: AtomicU64,
    frames_to_upstream: AtomicU64,
    frames_to_client: AtomicU64,
    started_at: Instant,
}

impl Default for GatewayStats {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            unauthenticated: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            not_found: AtomicU64::new(0),
            bad_input: AtomicU64::new(0),
            upstream_failures: AtomicU64::new(0),
            internal_faults: AtomicU64::new(0),
            streaming_sessions: AtomicU64::new(0),
            frames_to_upstream: AtomicU64::new(0),
            frames_to_client: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Record an inbound request
    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an error response by its reason code
    pub fn record_error(&self, reason: &str) {
        let counter = match reason {
            "unauthenticated" => &self.unauthenticated,
            "rate_limited" => &self.rate_limited,
            "not_found" => &self.not_found,
            "bad_input" => &self.bad_input,
            "upstream_failure" => &self.upstream_failures,
            _ => &self.internal_faults,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a started streaming session
    pub fn record_streaming_session(&self) {
        self.streaming_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame relayed client → upstream
    pub fn record_frame_to_upstream(&self) {
        self.frames_to_upstream.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a frame relayed upstream → client
    pub fn record_frame_to_client(&self) {
        self.frames_to_client.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total requests
    pub fn total_requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Get a summary of all stats
    pub fn summary(&self) -> StatsSummary {
        StatsSummary {
            requests: self.requests.load(Ordering::Relaxed),
            unauthenticated: self.unauthenticated.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            not_found: self.not_found.load(Ordering::Relaxed),
            bad_input: self.bad_input.load(Ordering::Relaxed),
            upstream_failures: self.upstream_failures.load(Ordering::Relaxed),
            internal_faults: self.internal_faults.load(Ordering::Relaxed),
            streaming_sessions: self.streaming_sessions.load(Ordering::Relaxed),
            frames_to_upstream: self.frames_to_upstream.load(Ordering::Relaxed),
            frames_to_client: self.frames_to_client.load(Ordering::Relaxed),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

/// Serializable stats summary
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    /// Total requests received
    pub requests: u64,
    /// Requests denied for missing or invalid credentials
    pub unauthenticated: u64,
    /// Requests denied by the rate limiter
    pub rate_limited: u64,
    /// Requests with no matching route
    pub not_found: u64,
    /// Malformed requests
    pub bad_input: u64,
    /// Failed upstream calls
    pub upstream_failures: u64,
    /// Internal faults
    pub internal_faults: u64,
    /// Streaming sessions started
    pub streaming_sessions: u64,
    /// Frames relayed client → upstream
    pub frames_to_upstream: u64,
    /// Frames relayed upstream → client
    pub frames_to_client: u64,
    /// Seconds since start
    pub uptime_secs: u64,
}
