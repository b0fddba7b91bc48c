//! Shared gateway state.

use std::sync::Arc;

use reqwest::Client;

use crate::analytics::{Analytics, NoopAnalytics};
use crate::auth::AuthValidator;
use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::proxy::BatchProxy;
use crate::ratelimit::{Clock, RateLimiter};
use crate::router::RouteTable;
use crate::stats::GatewayStats;
use crate::stream::{SessionRegistry, StreamingBridge};

/// Application state shared across requests
pub struct AppState {
    /// Gateway configuration
    pub config: Config,
    /// Validated route table
    pub routes: RouteTable,
    /// Credential checks
    pub auth: AuthValidator,
    /// Per-identity rate limiter
    pub limiter: RateLimiter,
    /// One-shot upstream calls
    pub proxy: BatchProxy,
    /// Live transcription sessions
    pub bridge: Arc<StreamingBridge>,
    /// Registry shared with the bridge
    pub sessions: Arc<SessionRegistry>,
    /// Counters
    pub stats: Arc<GatewayStats>,
    /// Usage events
    pub analytics: Arc<dyn Analytics>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("routes", &self.routes)
            .field("auth", &self.auth)
            .field("limiter", &self.limiter)
            .field("active_sessions", &self.sessions.active())
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Create new application state.
    ///
    /// Fails on invalid configuration or route table.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .timeout(config.upstream.timeout())
            .connect_timeout(config.upstream.connect_timeout())
            .build()
            .map_err(|e| GatewayError::Config(format!("Failed to create HTTP client: {e}")))?;

        let routes = RouteTable::from_config(&config.routes)?;
        let auth = AuthValidator::from_config(&config.auth, client.clone())?;
        let limiter = RateLimiter::from_config(&config.rate_limit);
        let proxy = BatchProxy::new(client, config.upstream.clone());

        let stats = Arc::new(GatewayStats::new());
        let sessions = Arc::new(SessionRegistry::new());
        let bridge = Arc::new(StreamingBridge::from_config(
            &config.upstream,
            Arc::clone(&sessions),
            Arc::clone(&stats),
        ));

        Ok(Self {
            config,
            routes,
            auth,
            limiter,
            proxy,
            bridge,
            sessions,
            stats,
            analytics: Arc::new(NoopAnalytics),
        })
    }

    /// Drive the rate limiter from `clock`
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.limiter = self.limiter.with_clock(clock);
        self
    }

    /// Replace the analytics sink
    pub fn with_analytics(mut self, analytics: Arc<dyn Analytics>) -> Self {
        self.analytics = analytics;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_creation() {
        let state = AppState::new(Config::default()).unwrap();
        assert_eq!(state.stats.total_requests(), 0);
        assert_eq!(state.sessions.active(), 0);
        assert_eq!(state.limiter.limit(), 60);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.rate_limit.limit = 0;
        assert!(AppState::new(config).is_err());

        let mut config = Config::default();
        config.routes.models = "/health".to_string();
        assert!(AppState::new(config).is_err());
    }
}
