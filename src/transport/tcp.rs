//! TCP transport implementation.
//!
//! HTTP/1.1 over TCP using Axum's built-in server, which also carries the
//! WebSocket upgrades for streaming transcription.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;

use axum::Router;
use tokio::net::TcpListener;

use super::{Shutdown, Transport};
use crate::error::{GatewayError, Result};

/// TCP/HTTP transport using Axum's built-in server.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    /// Address to listen on.
    listen_addr: SocketAddr,
}

impl TcpTransport {
    /// Create a new TCP transport.
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self { listen_addr }
    }

    /// Create with default localhost address.
    pub fn localhost(port: u16) -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    /// Serve on an already bound listener.
    pub async fn serve_listener(
        listener: TcpListener,
        router: Router,
        shutdown: Shutdown,
    ) -> Result<()> {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::Server(format!("TCP server error: {e}")))
    }
}

impl Default for TcpTransport {
    fn default() -> Self {
        Self::localhost(8080)
    }
}

impl Transport for TcpTransport {
    fn serve(
        &self,
        router: Router,
        shutdown: Shutdown,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let addr = self.listen_addr;

        Box::pin(async move {
            let listener = TcpListener::bind(addr).await.map_err(|e| {
                GatewayError::Server(format!("Failed to bind TCP to {addr}: {e}"))
            })?;
            tracing::info!("TCP transport listening on {}", addr);

            Self::serve_listener(listener, router, shutdown).await
        })
    }

    fn name(&self) -> &'static str {
        "TCP/HTTP"
    }

    fn listen_addr(&self) -> String {
        format!("http://{}", self.listen_addr)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::routing::get;

    use super::*;

    #[test]
    fn test_tcp_transport_default() {
        let transport = TcpTransport::default();
        assert_eq!(transport.listen_addr.port(), 8080);
        assert_eq!(transport.name(), "TCP/HTTP");
    }

    #[test]
    fn test_tcp_transport_localhost() {
        let transport = TcpTransport::localhost(3000);
        assert_eq!(transport.listen_addr(), "http://127.0.0.1:3000");
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let router = Router::new().route("/ping", get(|| async { "pong" }));

        let server = tokio::spawn(TcpTransport::serve_listener(
            listener,
            router,
            Box::pin(async move {
                let _ = rx.await;
            }),
        ));

        let body = reqwest::get(format!("http://{addr}/ping"))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "pong");

        tx.send(()).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server did not stop")
            .unwrap();
        assert!(result.is_ok());
    }
}
