//! Gateway error types.
//!
//! Every failure a request can hit maps onto one variant of [`GatewayError`].
//! The variant decides the HTTP status and the machine-readable reason code
//! carried in the error envelope (see [`crate::envelope`]).
//!
//! | Variant          | Status | Reason             | Retried by gateway |
//! |------------------|--------|--------------------|--------------------|
//! | `BadInput`       | 400    | `bad_input`        | no                 |
//! | `Unauthenticated`| 401    | `unauthenticated`  | no                 |
//! | `NotFound`       | 404    | `not_found`        | no                 |
//! | `RateLimited`    | 429    | `rate_limited`     | no (client may)    |
//! | `Upstream`       | 502    | `upstream_failure` | no                 |
//! | everything else  | 500    | `internal_fault`   | no                 |

use std::time::Duration;

use axum::http::StatusCode;
use thiserror::Error;

/// Gateway errors.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Malformed request or missing required field/header.
    #[error("Bad input: {0}")]
    BadInput(String),

    /// Missing, invalid or expired credential.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Identity exceeded its request quota for the current window.
    #[error("Rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited {
        /// Time left until the current window resets.
        retry_after: Duration,
    },

    /// No route matches the request's path and method.
    #[error("Not found: {method} {path}")]
    NotFound {
        /// Request method.
        method: String,
        /// Request path.
        path: String,
    },

    /// Upstream provider call failed, timed out or returned an error status.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// Unexpected fault inside the gateway.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// Server-side error (bind, serve).
    #[error("Server error: {0}")]
    Server(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// HTTP status this error is surfaced as.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadInput(_) => StatusCode::BAD_REQUEST,
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_)
            | Self::Config(_)
            | Self::Server(_)
            | Self::Json(_)
            | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::BadInput(_) => "bad_input",
            Self::Unauthenticated(_) => "unauthenticated",
            Self::RateLimited { .. } => "rate_limited",
            Self::NotFound { .. } => "not_found",
            Self::Upstream(_) => "upstream_failure",
            Self::Internal(_)
            | Self::Config(_)
            | Self::Server(_)
            | Self::Json(_)
            | Self::Io(_) => "internal_fault",
        }
    }

    /// Whether the error is an internal fault whose detail must stay in the logs.
    pub fn is_internal(&self) -> bool {
        self.status() == StatusCode::INTERNAL_SERVER_ERROR
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Upstream(format!("upstream call timed out: {err}"))
        } else {
            GatewayError::Upstream(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::Upstream(format!("upstream socket: {err}"))
    }
}
