//! Duplex relay between a client WebSocket and an upstream transcription socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use futures::SinkExt;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request as UpstreamRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use super::params::SessionParams;
use super::registry::{BridgeState, SessionGuard, SessionRegistry};
use crate::config::UpstreamConfig;
use crate::error::{GatewayError, Result};
use crate::stats::GatewayStats;

type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ClientSink = SplitSink<WebSocket, Message>;
type ClientStream = SplitStream<WebSocket>;
type UpstreamSink = SplitSink<UpstreamSocket, UpstreamMessage>;
type UpstreamStream = SplitStream<UpstreamSocket>;

/// Why the active relay stopped.
#[derive(Debug)]
enum Ending {
    /// Client sent a close frame.
    ClientClosed,
    /// Client socket dropped or errored.
    ClientGone,
    /// Upstream sent a close frame or ended the stream.
    UpstreamClosed(Option<UpstreamCloseFrame<'static>>),
    /// Upstream socket errored.
    UpstreamFailed(String),
    /// Gateway is shutting down.
    Shutdown,
}

/// Structured error frame sent to the client.
pub fn error_frame(reason: &str, message: &str) -> Message {
    Message::Text(
        json!({
            "type": "error",
            "reason": reason,
            "message": message,
        })
        .to_string(),
    )
}

/// Owns live transcription sessions.
///
/// Each accepted upgrade runs one session task:
///
/// ```text
/// Connecting ──dial ok──> Active ──close from either side──> Draining ──> Closed
///     │                     │       └──gateway shutdown──────┘
///     └──dial failed────────┴──socket broken──────────────────────────> Closed
/// ```
///
/// Frames in each direction are relayed by one sequential loop, so order is
/// preserved per direction.
#[derive(Debug)]
pub struct StreamingBridge {
    streaming_url: String,
    api_key: Option<String>,
    connect_timeout: Duration,
    drain_timeout: Duration,
    sessions: Arc<SessionRegistry>,
    stats: Arc<GatewayStats>,
}

impl StreamingBridge {
    /// Create from upstream configuration
    pub fn from_config(
        config: &UpstreamConfig,
        sessions: Arc<SessionRegistry>,
        stats: Arc<GatewayStats>,
    ) -> Self {
        Self {
            streaming_url: config.streaming_url.clone(),
            api_key: config.stt_api_key.clone(),
            connect_timeout: config.connect_timeout(),
            drain_timeout: config.drain_timeout(),
            sessions,
            stats,
        }
    }

    /// Complete the client upgrade and run the session in the connection task.
    pub fn accept(self: &Arc<Self>, upgrade: WebSocketUpgrade, params: SessionParams) -> Response {
        let bridge = Arc::clone(self);
        self.stats.record_streaming_session();
        upgrade.on_upgrade(move |socket| async move {
            bridge.run(socket, params).await;
        })
    }

    /// Build the upstream handshake request for `params`.
    pub fn upstream_request(&self, params: &SessionParams) -> Result<UpstreamRequest> {
        let mut url = reqwest::Url::parse(&self.streaming_url)
            .map_err(|e| GatewayError::Config(format!("Invalid streaming_url: {e}")))?;
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params.query_pairs() {
                query.append_pair(key, &value);
            }
            query.append_pair("encoding", "linear16");
        }

        let mut request = url.as_str().into_client_request()?;
        if let Some(key) = &self.api_key {
            let value = HeaderValue::from_str(&format!("Token {key}"))
                .map_err(|e| GatewayError::Config(format!("Invalid stt_api_key: {e}")))?;
            request.headers_mut().insert("authorization", value);
        }
        Ok(request)
    }

    async fn dial(&self, params: &SessionParams) -> Result<UpstreamSocket> {
        let request = self.upstream_request(params)?;
        let (socket, response) =
            tokio::time::timeout(self.connect_timeout, tokio_tungstenite::connect_async(request))
                .await
                .map_err(|_| GatewayError::Upstream("upstream dial timed out".to_string()))??;
        tracing::debug!(status = %response.status(), "upstream socket connected");
        Ok(socket)
    }

    /// Run one session to completion.
    async fn run(&self, client: WebSocket, params: SessionParams) {
        let session = self.sessions.open(params.clone());
        let (mut client_tx, mut client_rx) = client.split();

        tracing::info!(
            session = %session.id(),
            model = %params.model,
            sample_rate = params.sample_rate,
            diarize = params.diarize,
            "streaming session opened"
        );

        let upstream = match self.dial(&params).await {
            Ok(socket) => socket,
            Err(e) => {
                tracing::warn!(session = %session.id(), error = %e, "upstream dial failed");
                let _ = client_tx
                    .send(error_frame("upstream_failure", &e.to_string()))
                    .await;
                let _ = client_tx
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::ERROR,
                        reason: "upstream unavailable".into(),
                    })))
                    .await;
                session.transition(BridgeState::Closed);
                return;
            },
        };

        session.transition(BridgeState::Active);
        let (mut upstream_tx, mut upstream_rx) = upstream.split();

        let ending = self
            .relay(
                session.cancel_token(),
                &mut client_tx,
                &mut client_rx,
                &mut upstream_tx,
                &mut upstream_rx,
            )
            .await;
        tracing::debug!(session = %session.id(), ?ending, "relay stopped");

        self.finish(
            &session,
            ending,
            &mut client_tx,
            &mut client_rx,
            &mut upstream_tx,
            &mut upstream_rx,
        )
        .await;

        session.transition(BridgeState::Closed);
        tracing::info!(session = %session.id(), "streaming session closed");
    }

    /// Relay frames both ways until either side stops.
    async fn relay(
        &self,
        cancel: &CancellationToken,
        client_tx: &mut ClientSink,
        client_rx: &mut ClientStream,
        upstream_tx: &mut UpstreamSink,
        upstream_rx: &mut UpstreamStream,
    ) -> Ending {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break Ending::Shutdown,
                frame = client_rx.next() => match frame {
                    Some(Ok(Message::Binary(audio))) => {
                        if let Err(e) = upstream_tx.send(UpstreamMessage::Binary(audio)).await {
                            break Ending::UpstreamFailed(e.to_string());
                        }
                        self.stats.record_frame_to_upstream();
                    },
                    Some(Ok(Message::Text(text))) => {
                        if serde_json::from_str::<Value>(&text).is_ok() {
                            if let Err(e) = upstream_tx.send(UpstreamMessage::Text(text)).await {
                                break Ending::UpstreamFailed(e.to_string());
                            }
                            self.stats.record_frame_to_upstream();
                        } else if client_tx
                            .send(error_frame("bad_frame", "text frames must be JSON control messages"))
                            .await
                            .is_err()
                        {
                            break Ending::ClientGone;
                        }
                    },
                    Some(Ok(Message::Close(_))) => break Ending::ClientClosed,
                    Some(Ok(_)) => {},
                    Some(Err(e)) => {
                        tracing::debug!(error = %e, "client socket error");
                        break Ending::ClientGone;
                    },
                    None => break Ending::ClientGone,
                },
                frame = upstream_rx.next() => match frame {
                    Some(Ok(UpstreamMessage::Text(text))) => {
                        if client_tx.send(Message::Text(text)).await.is_err() {
                            break Ending::ClientGone;
                        }
                        self.stats.record_frame_to_client();
                    },
                    Some(Ok(UpstreamMessage::Binary(data))) => {
                        if client_tx.send(Message::Binary(data)).await.is_err() {
                            break Ending::ClientGone;
                        }
                        self.stats.record_frame_to_client();
                    },
                    Some(Ok(UpstreamMessage::Close(frame))) => break Ending::UpstreamClosed(frame),
                    Some(Ok(_)) => {},
                    Some(Err(e)) => break Ending::UpstreamFailed(e.to_string()),
                    None => break Ending::UpstreamClosed(None),
                },
            }
        }
    }

    /// Close both sides according to how the relay ended.
    async fn finish(
        &self,
        session: &SessionGuard,
        ending: Ending,
        client_tx: &mut ClientSink,
        client_rx: &mut ClientStream,
        upstream_tx: &mut UpstreamSink,
        upstream_rx: &mut UpstreamStream,
    ) {
        match ending {
            Ending::ClientClosed => {
                session.transition(BridgeState::Draining);
                let _ = client_tx.close().await;
                let _ = upstream_tx.send(UpstreamMessage::Close(None)).await;

                // The client can no longer receive; wait for the upstream close
                // handshake and drop whatever results are still in flight.
                let drained = tokio::time::timeout(self.drain_timeout, async {
                    let mut dropped = 0usize;
                    while let Some(Ok(frame)) = upstream_rx.next().await {
                        if frame.is_close() {
                            break;
                        }
                        if frame.is_text() || frame.is_binary() {
                            dropped += 1;
                        }
                    }
                    dropped
                })
                .await;
                match drained {
                    Ok(dropped) if dropped > 0 => {
                        tracing::debug!(session = %session.id(), dropped, "upstream frames dropped after client close");
                    },
                    Ok(_) => {},
                    Err(_) => {
                        tracing::debug!(session = %session.id(), "upstream close handshake timed out");
                    },
                }
            },
            Ending::ClientGone => {
                let _ = upstream_tx.send(UpstreamMessage::Close(None)).await;
            },
            Ending::UpstreamClosed(frame) => {
                session.transition(BridgeState::Draining);
                let _ = upstream_tx.close().await;
                let _ = client_tx
                    .send(Message::Close(Some(client_close_frame(frame))))
                    .await;

                let _ = tokio::time::timeout(self.drain_timeout, async {
                    while let Some(Ok(frame)) = client_rx.next().await {
                        if matches!(frame, Message::Close(_)) {
                            break;
                        }
                    }
                })
                .await;
            },
            Ending::Shutdown => {
                session.transition(BridgeState::Draining);
                let _ = upstream_tx.send(UpstreamMessage::Close(None)).await;
                let _ = client_tx
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::AWAY,
                        reason: "gateway shutting down".into(),
                    })))
                    .await;
            },
            Ending::UpstreamFailed(reason) => {
                tracing::warn!(session = %session.id(), error = %reason, "upstream socket failed");
                let _ = client_tx
                    .send(error_frame("upstream_failure", &reason))
                    .await;
                let _ = client_tx
                    .send(Message::Close(Some(CloseFrame {
                        code: close_code::ERROR,
                        reason: "upstream failure".into(),
                    })))
                    .await;
            },
        }
    }
}

/// Translate the upstream close frame for the client.
fn client_close_frame(frame: Option<UpstreamCloseFrame<'static>>) -> CloseFrame<'static> {
    match frame {
        Some(frame) => {
            let code = u16::from(frame.code);
            // 1005, 1006 and 1015 must never appear on the wire.
            let code = if matches!(code, 1005 | 1006 | 1015) {
                close_code::NORMAL
            } else {
                code
            };
            CloseFrame {
                code,
                reason: frame.reason,
            }
        },
        None => CloseFrame {
            code: close_code::NORMAL,
            reason: "upstream closed".into(),
        },
    }
}

#[cfg(test)]
mod tests {
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    use super::*;

    fn bridge(url: &str, key: Option<&str>) -> StreamingBridge {
        let config = UpstreamConfig {
            streaming_url: url.to_string(),
            stt_api_key: key.map(str::to_string),
            ..Default::default()
        };
        StreamingBridge::from_config(
            &config,
            Arc::new(SessionRegistry::new()),
            Arc::new(GatewayStats::new()),
        )
    }

    #[test]
    fn test_upstream_request_carries_params_and_key() {
        let bridge = bridge("wss://stt.example.com/v1/listen", Some("dg-secret"));
        let params = SessionParams {
            diarize: true,
            ..Default::default()
        };

        let request = bridge.upstream_request(&params).unwrap();
        let uri = request.uri().to_string();
        assert!(uri.starts_with("wss://stt.example.com/v1/listen?"));
        assert!(uri.contains("model=nova-3"));
        assert!(uri.contains("diarize=true"));
        assert!(uri.contains("language=en"));
        assert!(uri.contains("encoding=linear16"));
        assert_eq!(request.headers()["authorization"], "Token dg-secret");
    }

    #[test]
    fn test_upstream_request_rejects_bad_url() {
        let bridge = bridge("not a url", None);
        let err = bridge.upstream_request(&SessionParams::default()).unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_error_frame_shape() {
        let Message::Text(text) = error_frame("bad_frame", "nope") else {
            panic!("error frames are text");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["reason"], "bad_frame");
    }

    #[test]
    fn test_client_close_frame_mapping() {
        let frame = client_close_frame(Some(UpstreamCloseFrame {
            code: CloseCode::Away,
            reason: "bye".into(),
        }));
        assert_eq!(frame.code, close_code::AWAY);
        assert_eq!(frame.reason, "bye");

        let frame = client_close_frame(Some(UpstreamCloseFrame {
            code: CloseCode::Status,
            reason: "".into(),
        }));
        assert_eq!(frame.code, close_code::NORMAL);

        assert_eq!(client_close_frame(None).code, close_code::NORMAL);
    }
}
