//! Uniform view of an inbound request.

use axum::body::Body;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request};
use axum::http::{header, HeaderMap, Method};
use bytes::Bytes;

use crate::error::{GatewayError, Result};

/// What the request carries besides its head.
pub enum Payload {
    /// Body not read yet.
    Unread(Body),
    /// Body already buffered.
    Buffered(Bytes),
    /// Completed WebSocket upgrade extraction; yields a duplex socket.
    Upgrade(WebSocketUpgrade),
    /// The upgrade handle was handed to a handler.
    Taken,
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unread(_) => f.write_str("Unread"),
            Self::Buffered(bytes) => write!(f, "Buffered({} bytes)", bytes.len()),
            Self::Upgrade(_) => f.write_str("Upgrade"),
            Self::Taken => f.write_str("Taken"),
        }
    }
}

/// Method, path, headers and payload of one inbound request.
///
/// Header lookups are case-insensitive and return the first value only.
#[derive(Debug)]
pub struct RequestDescriptor {
    method: Method,
    path: String,
    headers: HeaderMap,
    payload: Payload,
}

/// Check for an `Upgrade: websocket` header, case-insensitively.
pub fn is_websocket_upgrade(headers: &HeaderMap) -> bool {
    headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("websocket"))
}

impl RequestDescriptor {
    /// Describe a plain HTTP request; the body stays unread.
    pub fn from_http(request: Request) -> Self {
        let (parts, body) = request.into_parts();
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            headers: parts.headers,
            payload: Payload::Unread(body),
        }
    }

    /// Describe a request, completing the WebSocket upgrade extraction when
    /// the request targets `streaming_path` with `Upgrade: websocket`.
    ///
    /// A malformed upgrade (wrong method, missing key or version, connection
    /// not upgradable) is `BadInput`; no socket is created in that case.
    pub async fn from_request(request: Request, streaming_path: &str) -> Result<Self> {
        if request.uri().path() != streaming_path || !is_websocket_upgrade(request.headers()) {
            return Ok(Self::from_http(request));
        }

        let (mut parts, _body) = request.into_parts();
        let upgrade = WebSocketUpgrade::from_request_parts(&mut parts, &())
            .await
            .map_err(|rejection| {
                GatewayError::BadInput(format!("malformed websocket upgrade: {rejection}"))
            })?;

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            headers: parts.headers,
            payload: Payload::Upgrade(upgrade),
        })
    }

    /// Request method
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request path (no query)
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw header map
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Check if the request carries a WebSocket upgrade handle
    pub fn is_upgrade(&self) -> bool {
        matches!(self.payload, Payload::Upgrade(_))
    }

    /// Hand the upgrade handle to a streaming handler
    pub fn take_upgrade(&mut self) -> Option<WebSocketUpgrade> {
        match std::mem::replace(&mut self.payload, Payload::Taken) {
            Payload::Upgrade(upgrade) => Some(upgrade),
            other => {
                self.payload = other;
                None
            },
        }
    }

    /// Buffer the body, failing with `BadInput` past `limit` bytes.
    pub async fn read_body(&mut self, limit: usize) -> Result<Bytes> {
        let body = match std::mem::replace(&mut self.payload, Payload::Taken) {
            Payload::Unread(body) => body,
            Payload::Buffered(bytes) => {
                self.payload = Payload::Buffered(bytes.clone());
                return Ok(bytes);
            },
            other => {
                self.payload = other;
                return Err(GatewayError::BadInput(
                    "request has no readable body".to_string(),
                ));
            },
        };

        let bytes = axum::body::to_bytes(body, limit).await.map_err(|e| {
            GatewayError::BadInput(format!(
                "request body unreadable or larger than {limit} bytes: {e}"
            ))
        })?;
        self.payload = Payload::Buffered(bytes.clone());
        Ok(bytes)
    }
}
