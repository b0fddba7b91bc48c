//! Per-request state machine.
//!
//! ```text
//! OPTIONS ─────────────────────────────────────────────> 204 preflight
//! upgrade on streaming path ───────────────────────────> StreamingBridge
//! health path ─────────────────────────────────────────> 200
//! resolve route ──none──> 404
//!     └─> auth ──denied──> 401
//!           └─> rate limit ──denied──> 429 + Retry-After
//!                 └─> handler ──> success envelope | error envelope
//! ```
//!
//! Panics anywhere below [`handle`] are caught and answered with a generic 500.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, Method},
    response::{IntoResponse, Response},
};
use futures::FutureExt;
use serde::Serialize;
use serde_json::json;

use super::routes::HandlerKind;
use crate::auth::Identity;
use crate::envelope::{preflight, success};
use crate::error::{GatewayError, Result};
use crate::proxy::validate;
use crate::server::AppState;
use crate::stats::StatsSummary;
use crate::stream::{SessionInfo, SessionParams};
use crate::transport::RequestDescriptor;

/// Axum fallback handler running every request through the gateway.
pub async fn handle(State(state): State<Arc<AppState>>, request: Request) -> Response {
    state.stats.record_request();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match AssertUnwindSafe(process(&state, request)).catch_unwind().await {
        Ok(Ok(response)) => response,
        Ok(Err(err)) => {
            state.stats.record_error(err.reason());
            match &err {
                GatewayError::Upstream(_) => {
                    tracing::warn!(%method, %path, "upstream failure: {}", err);
                },
                e if e.is_internal() => {},
                _ => tracing::debug!(%method, %path, reason = err.reason(), "request rejected"),
            }
            err.into_response()
        },
        Err(panic) => {
            let err = GatewayError::Internal(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            ));
            state.stats.record_error(err.reason());
            tracing::error!(%method, %path, "{}", err);
            err.into_response()
        },
    }
}

async fn process(state: &AppState, request: Request) -> Result<Response> {
    if request.method() == Method::OPTIONS {
        return Ok(preflight());
    }

    let streaming_path = state.routes.streaming_path().unwrap_or_default();
    let mut request = RequestDescriptor::from_request(request, streaming_path).await?;

    if request.is_upgrade() {
        return open_stream(state, &mut request);
    }

    if request.path() == state.routes.health_path() {
        return Ok(health());
    }

    let handler = state
        .routes
        .resolve(request.method(), request.path(), false)
        .map(|route| route.handler)
        .ok_or_else(|| GatewayError::NotFound {
            method: request.method().to_string(),
            path: request.path().to_string(),
        })?;

    let identity = state
        .auth
        .validate(&request)
        .await?
        .into_result()
        .inspect_err(|e| tracing::warn!(path = request.path(), "authentication denied: {}", e))?;

    state
        .limiter
        .check_and_increment(&identity)
        .into_result()
        .inspect_err(|_| tracing::warn!(%identity, path = request.path(), "rate limited"))?;

    tracing::debug!(%identity, handler = handler.name(), "dispatching");
    state.analytics.capture(
        handler.name(),
        json!({ "identity": identity.as_str(), "path": request.path() }),
    );

    dispatch(state, handler, &identity, request).await
}

async fn dispatch(
    state: &AppState,
    handler: HandlerKind,
    identity: &Identity,
    mut request: RequestDescriptor,
) -> Result<Response> {
    let limit = state.config.server.max_body_size;

    match handler {
        HandlerKind::ChatCompletions => {
            let body = request.read_body(limit).await?;
            let payload = validate::chat_request(&body)?;
            Ok(success(state.proxy.chat_completions(&payload).await?))
        },
        HandlerKind::ModelListing => Ok(success(state.proxy.list_models().await?)),
        HandlerKind::FileTranscription => {
            let params = SessionParams::from_request(&request)?;
            let content_type = content_type(&request);
            let body = request.read_body(limit).await?;
            let audio = validate::audio_upload(content_type.as_deref(), body)?;
            tracing::debug!(%identity, bytes = audio.len(), "forwarding file transcription");
            let result = state
                .proxy
                .transcribe(audio, content_type.as_deref(), &params)
                .await?;
            Ok(success(result))
        },
        HandlerKind::VoiceTranscription => {
            let params = SessionParams::from_request(&request)?;
            let content_type = content_type(&request);
            let body = request.read_body(limit).await?;
            let audio = validate::audio_upload(content_type.as_deref(), body)?;
            let summary = state
                .proxy
                .transcribe_voice(audio, content_type.as_deref(), &params)
                .await?;
            Ok(success(summary))
        },
        HandlerKind::Stats => {
            if !is_admin(state, identity) {
                // Non-admins see the same answer as for an unregistered route.
                return Err(GatewayError::NotFound {
                    method: request.method().to_string(),
                    path: request.path().to_string(),
                });
            }
            Ok(success(StatsReport {
                stats: state.stats.summary(),
                tracked_identities: state.limiter.tracked(),
                sessions: state.sessions.list(),
            }))
        },
        HandlerKind::StreamingListen => Err(GatewayError::Internal(
            "streaming route dispatched without an upgrade".to_string(),
        )),
    }
}

/// Hand an upgrade to the bridge. Streaming bypasses auth and rate limiting.
fn open_stream(state: &AppState, request: &mut RequestDescriptor) -> Result<Response> {
    let params = SessionParams::from_request(request)?;
    let upgrade = request.take_upgrade().ok_or_else(|| {
        GatewayError::Internal("upgrade handle already taken".to_string())
    })?;

    tracing::info!(
        path = request.path(),
        model = %params.model,
        sample_rate = params.sample_rate,
        "accepting streaming session"
    );
    state.analytics.capture(
        HandlerKind::StreamingListen.name(),
        json!({ "path": request.path(), "model": params.model }),
    );

    Ok(state.bridge.accept(upgrade, params))
}

fn is_admin(state: &AppState, identity: &Identity) -> bool {
    state
        .config
        .auth
        .admin_identities
        .iter()
        .any(|admin| admin == identity.as_str())
}

fn content_type(request: &RequestDescriptor) -> Option<String> {
    request
        .header(header::CONTENT_TYPE.as_str())
        .map(str::to_string)
}

fn health() -> Response {
    success(json!({
        "status": "healthy",
        "service": "speech-gateway",
        "version": crate::VERSION,
    }))
}

/// Body of the stats route.
#[derive(Debug, Serialize)]
struct StatsReport {
    stats: StatsSummary,
    tracked_identities: usize,
    sessions: Vec<SessionInfo>,
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic payload"
    }
}
