//! Uniform response envelope.
//!
//! Handlers return plain payloads or [`GatewayError`]s; this module is the
//! only place that turns them into HTTP responses.
//!
//! ```json
//! {"success": true,  "data": { ... }}
//! {"success": false, "error": {"reason": "rate_limited", "message": "...", "retry_after": 42}}
//! ```

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::error::GatewayError;

/// Message sent to clients in place of internal fault detail.
pub const INTERNAL_FAULT_MESSAGE: &str = "an internal error occurred";

/// Successful handler result.
#[derive(Debug, Clone)]
pub struct Success<T>(pub T);

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "data": self.0,
            })),
        )
            .into_response()
    }
}

/// Build the success envelope for a JSON payload.
pub fn success<T: Serialize>(data: T) -> Response {
    Success(data).into_response()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if self.is_internal() {
            tracing::error!(error = %self, "internal fault");
            INTERNAL_FAULT_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let mut error = json!({
            "reason": self.reason(),
            "message": message,
        });

        let retry_after = match &self {
            GatewayError::RateLimited { retry_after } => Some(retry_after.as_secs()),
            _ => None,
        };
        if let Some(secs) = retry_after {
            error["retry_after"] = json!(secs);
        }

        let mut response = (
            status,
            Json(json!({
                "success": false,
                "error": error,
            })),
        )
            .into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

/// Answer a pre-flight request: 204, CORS headers, no body.
pub fn preflight() -> Response {
    let mut response = StatusCode::NO_CONTENT.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static("*"));
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from_static("86400"));
    response
}

/// Add CORS headers to a response when enabled in configuration.
///
/// Pre-flight requests never get here; the router answers them with
/// [`preflight`].
pub async fn cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_EXPOSE_HEADERS,
        HeaderValue::from_static("retry-after"),
    );
    response
}
