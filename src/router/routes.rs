//! Explicit route table.
//!
//! Built once from [`RoutesConfig`] at startup. Resolution is a pure lookup
//! with no side effects, so the router can answer 404 before touching auth or
//! the rate limiter.

use std::fmt;

use axum::http::Method;
use serde::Serialize;

use crate::config::RoutesConfig;
use crate::error::{GatewayError, Result};

/// Handler a route dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerKind {
    /// Chat completion via the batch proxy
    ChatCompletions,
    /// Upstream model catalog
    ModelListing,
    /// File transcription, raw provider result
    FileTranscription,
    /// Voice clip transcription, summarised result
    VoiceTranscription,
    /// Live transcription over WebSocket
    StreamingListen,
    /// Gateway counters
    Stats,
}

impl HandlerKind {
    /// Stable name used in logs and analytics events
    pub fn name(self) -> &'static str {
        match self {
            Self::ChatCompletions => "chat_completions",
            Self::ModelListing => "model_listing",
            Self::FileTranscription => "file_transcription",
            Self::VoiceTranscription => "voice_transcription",
            Self::StreamingListen => "streaming_listen",
            Self::Stats => "stats",
        }
    }
}

/// How a route is reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteMethod {
    /// Plain HTTP request with this method
    Http(Method),
    /// WebSocket upgrade
    WebSocket,
}

impl fmt::Display for RouteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(method) => write!(f, "{method}"),
            Self::WebSocket => write!(f, "WS"),
        }
    }
}

/// One entry of the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Exact request path
    pub path: String,
    /// Method or upgrade
    pub method: RouteMethod,
    /// Target handler
    pub handler: HandlerKind,
}

impl Route {
    fn http(path: &str, method: Method, handler: HandlerKind) -> Self {
        Self {
            path: path.to_string(),
            method: RouteMethod::Http(method),
            handler,
        }
    }
}

/// Validated route table.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
    health: String,
}

impl RouteTable {
    /// Build the table from configured paths.
    pub fn from_config(config: &RoutesConfig) -> Result<Self> {
        let routes = vec![
            Route::http(&config.chat_completions, Method::POST, HandlerKind::ChatCompletions),
            Route::http(&config.models, Method::GET, HandlerKind::ModelListing),
            Route::http(&config.listen, Method::POST, HandlerKind::FileTranscription),
            Route::http(
                &config.voice_transcription,
                Method::POST,
                HandlerKind::VoiceTranscription,
            ),
            Route {
                path: config.listen.clone(),
                method: RouteMethod::WebSocket,
                handler: HandlerKind::StreamingListen,
            },
            Route::http(&config.stats, Method::GET, HandlerKind::Stats),
        ];
        Self::new(routes, config.health.clone())
    }

    /// Validate an explicit list of routes.
    ///
    /// Paths must be absolute; `(path, method)` pairs must be unique and must
    /// not shadow the health path.
    pub fn new(routes: Vec<Route>, health: String) -> Result<Self> {
        check_path(&health)?;

        for (i, route) in routes.iter().enumerate() {
            check_path(&route.path)?;

            if route.path == health {
                return Err(GatewayError::Config(format!(
                    "route {} {} collides with the health path",
                    route.method, route.path
                )));
            }

            let duplicate = routes[..i]
                .iter()
                .any(|other| other.path == route.path && other.method == route.method);
            if duplicate {
                return Err(GatewayError::Config(format!(
                    "duplicate route {} {}",
                    route.method, route.path
                )));
            }
        }

        Ok(Self { routes, health })
    }

    /// Find the route for a request.
    pub fn resolve(&self, method: &Method, path: &str, upgrade: bool) -> Option<&Route> {
        self.routes.iter().find(|route| {
            route.path == path
                && match &route.method {
                    RouteMethod::WebSocket => upgrade,
                    RouteMethod::Http(m) => !upgrade && m == method,
                }
        })
    }

    /// Path of the streaming listen route, if configured
    pub fn streaming_path(&self) -> Option<&str> {
        self.routes
            .iter()
            .find(|r| r.handler == HandlerKind::StreamingListen)
            .map(|r| r.path.as_str())
    }

    /// Health path
    pub fn health_path(&self) -> &str {
        &self.health
    }

    /// All routes in table order
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

fn check_path(path: &str) -> Result<()> {
    if !path.starts_with('/') {
        return Err(GatewayError::Config(format!(
            "route path must start with '/': {path:?}"
        )));
    }
    Ok(())
}
