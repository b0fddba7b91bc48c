//! Transport layer.
//!
//! Two halves:
//! - [`Transport`]: serves the gateway's Axum router on a network backend
//!   (TCP today)
//! - [`RequestDescriptor`]: the transport adapter that turns an inbound HTTP
//!   request or WebSocket upgrade into a uniform view for the router
//!
//! ```text
//!  TCP connection ──> hyper/axum ──> RequestDescriptor ──> Router
//!                                     │
//!                                     ├─ Unread body (batch handlers buffer it)
//!                                     └─ WebSocket upgrade handle (streaming)
//! ```

mod descriptor;
mod tcp;

pub use descriptor::{is_websocket_upgrade, Payload, RequestDescriptor};
pub use tcp::TcpTransport;

use std::future::Future;
use std::pin::Pin;

use axum::Router;

use crate::error::Result;

/// Future that resolves when the server should stop accepting connections.
pub type Shutdown = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Transport trait for pluggable network backends.
///
/// Implementations handle the low-level network protocol while
/// the gateway remains transport-agnostic.
pub trait Transport: Send + Sync {
    /// Serve the given Axum router until `shutdown` resolves.
    fn serve(
        &self,
        router: Router,
        shutdown: Shutdown,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;

    /// Get the listen address as a string.
    fn listen_addr(&self) -> String;
}
