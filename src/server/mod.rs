//! Gateway server.
//!
//! Wires the [`AppState`] into an Axum router whose only handler is the
//! gateway state machine, then serves it on a [`Transport`].
//!
//! # Example
//!
//! ```rust,ignore
//! use gateway::{Config, Gateway};
//!
//! let gateway = Gateway::new(Config::load(None)?)?;
//! gateway.run(Box::pin(async { let _ = tokio::signal::ctrl_c().await; })).await?;
//! ```

mod state;

pub use state::AppState;

use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::envelope::cors_headers;
use crate::error::Result;
use crate::router::handle;
use crate::stats::StatsSummary;
use crate::transport::{Shutdown, TcpTransport, Transport};

/// The edge gateway
#[derive(Debug, Clone)]
pub struct Gateway {
    state: Arc<AppState>,
}

impl Gateway {
    /// Create a gateway from configuration
    pub fn new(config: Config) -> Result<Self> {
        Ok(Self::from_state(AppState::new(config)?))
    }

    /// Create a gateway from prepared state
    pub fn from_state(state: AppState) -> Self {
        Self {
            state: Arc::new(state),
        }
    }

    /// Shared state
    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Get the router for the gateway
    pub fn router(&self) -> Router {
        let router = Router::new()
            .fallback(handle)
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http());

        if self.state.config.server.cors_enabled {
            router.layer(middleware::map_response(cors_headers))
        } else {
            router
        }
    }

    /// Serve over TCP until `shutdown` resolves. Live streaming sessions are
    /// then told to close and given the drain timeout to finish.
    pub async fn run(&self, shutdown: Shutdown) -> Result<()> {
        let config = &self.state.config;
        let transport = TcpTransport::new(config.server.listen_addr()?);

        tracing::info!("Speech gateway starting...");
        for route in self.state.routes.routes() {
            tracing::info!("Route: {} {} -> {}", route.method, route.path, route.handler.name());
        }
        tracing::info!(
            "Rate limit: {} requests per {}s",
            config.rate_limit.limit,
            config.rate_limit.window_secs
        );
        tracing::info!("Transport: {} on {}", transport.name(), transport.listen_addr());

        let sessions = Arc::clone(&self.state.sessions);
        let shutdown: Shutdown = Box::pin(async move {
            shutdown.await;
            sessions.shutdown();
        });
        transport.serve(self.router(), shutdown).await?;

        let drain = config.upstream.drain_timeout();
        if !self.state.sessions.wait_idle(drain).await {
            tracing::warn!(
                "{} streaming sessions still open after {:?}",
                self.state.sessions.active(),
                drain
            );
        }
        tracing::info!("Speech gateway stopped");
        Ok(())
    }

    /// Get statistics
    pub fn stats(&self) -> StatsSummary {
        self.state.stats.summary()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;

    #[tokio::test]
    async fn test_health_endpoint() {
        let gateway = Gateway::new(Config::default()).unwrap();

        let response = gateway
            .router()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(gateway.stats().requests, 1);
    }
}
