//! # Speech Gateway - Edge gateway for speech and chat providers
//!
//! Sits in front of third-party speech-to-text and chat-completion providers,
//! authenticates clients, applies per-identity rate limits, and relays
//! requests over HTTP and WebSocket.
//!
//! ## Features
//!
//! - **Explicit route table**: validated at startup, unknown routes answered
//!   with 404 before any credential check
//! - **Pluggable authentication**: static keys (constant-time comparison) or a
//!   remote verification endpoint
//! - **Fixed-window rate limiting**: atomic per-identity check-and-increment
//! - **Streaming bridge**: live transcription relayed between a client
//!   WebSocket and the provider's WebSocket
//! - **Batch proxy**: one upstream call per request, no retries
//! - **Uniform envelopes**: every response is `{"success": ..., ...}`
//!
//! ## Architecture
//!
//! ```text
//! Client ──HTTP/WS──> Transport ──> RequestDescriptor ──> Router
//!                                                           │
//!              ┌────────────────────────────────────────────┤
//!              │ OPTIONS / health / WS upgrade (bypass)     │ everything else
//!              v                                            v
//!        preflight, 200,                     AuthValidator ──> RateLimiter
//!        StreamingBridge ──WS──> STT                        │
//!                                                           v
//!                                        BatchProxy ──HTTP──> chat / STT
//! ```
//!
//! ### Request State Machine
//!
//! ```text
//! [Received] ──OPTIONS──> 204
//!     │ ──upgrade on streaming path──> [Streaming]
//!     │ ──health path──> 200
//!     v
//! [Resolved] ──no route──> 404
//!     v
//! [Authenticated] ──denied──> 401
//!     v
//! [Admitted] ──over limit──> 429 + Retry-After
//!     v
//! [Dispatched] ──> success envelope | error envelope
//! ```
//!
//! ### Envelopes
//!
//! | Outcome          | Status | Body                                                     |
//! |------------------|--------|----------------------------------------------------------|
//! | Success          | 200    | `{"success":true,"data":...}`                             |
//! | Bad input        | 400    | `{"success":false,"error":{"reason":"bad_input",...}}`    |
//! | Unauthenticated  | 401    | `reason: "unauthenticated"`                               |
//! | No route         | 404    | `reason: "not_found"`                                     |
//! | Rate limited     | 429    | `reason: "rate_limited"`, `retry_after`, `Retry-After`    |
//! | Internal fault   | 500    | `reason: "internal_fault"`, generic message               |
//! | Upstream failure | 502    | `reason: "upstream_failure"`                              |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gateway::{Config, Gateway};
//!
//! let config = Config::load(None)?;
//! let gateway = Gateway::new(config)?;
//!
//! // Serve until Ctrl-C
//! gateway
//!     .run(Box::pin(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }))
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`router`]: Route table and request state machine
//! - [`auth`]: Credential validation and trust stores
//! - [`ratelimit`]: Fixed-window per-identity limiter
//! - [`stream`]: Live transcription bridge
//! - [`proxy`]: Batch upstream calls and input validation
//! - [`transport`]: Request normalization and network backends
//! - [`server`]: Gateway wiring and shared state
//! - [`envelope`]: Response envelopes and CORS
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod analytics;
pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod proxy;
pub mod ratelimit;
pub mod router;
pub mod server;
pub mod stats;
pub mod stream;
pub mod transport;
pub mod verdict;

// Re-exports for convenience
pub use analytics::{Analytics, NoopAnalytics};
pub use auth::{AuthValidator, Identity, TrustStore};
pub use config::Config;
pub use error::{GatewayError, Result};
pub use proxy::BatchProxy;
pub use ratelimit::{Clock, ManualClock, RateLimiter, SystemClock};
pub use router::{HandlerKind, RouteTable};
pub use server::{AppState, Gateway};
pub use stats::{GatewayStats, StatsSummary};
pub use stream::{SessionParams, SessionRegistry, StreamingBridge};
pub use transport::{RequestDescriptor, TcpTransport, Transport};
pub use verdict::{Denial, DenyReason, Verdict};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
