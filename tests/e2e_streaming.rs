//! End-to-end streaming bridge tests.
//!
//! A real gateway listens on an ephemeral port; the transcription provider is
//! a tokio-tungstenite server that answers every audio frame with a numbered
//! result, acknowledges JSON control messages, and closes on `CloseStream`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use gateway::{transport::TcpTransport, Config, Gateway};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type ClientSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Clone, Default)]
struct MockStt {
    /// `(uri, authorization)` of every accepted handshake
    handshakes: Arc<Mutex<Vec<(String, Option<String>)>>>,
    /// Close frames received from the gateway
    closes: Arc<AtomicUsize>,
}

impl MockStt {
    fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn handshakes(&self) -> Vec<(String, Option<String>)> {
        self.handshakes.lock().unwrap().clone()
    }
}

async fn spawn_stt() -> (String, MockStt) {
    let mock = MockStt::default();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = mock.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let mock = server.clone();
            tokio::spawn(async move {
                let handshakes = Arc::clone(&mock.handshakes);
                let record = move |request: &Request, response: Response| {
                    let auth = request
                        .headers()
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    handshakes
                        .lock()
                        .unwrap()
                        .push((request.uri().to_string(), auth));
                    Ok::<_, ErrorResponse>(response)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, record).await else {
                    return;
                };

                let mut seq = 0;
                while let Some(Ok(message)) = ws.next().await {
                    match message {
                        Message::Binary(audio) => {
                            seq += 1;
                            let result = json!({"type": "Results", "seq": seq, "bytes": audio.len()});
                            let _ = ws.send(Message::Text(result.to_string())).await;
                        },
                        Message::Text(text) if text.contains("CloseStream") => {
                            let _ = ws
                                .close(Some(CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: "done".into(),
                                }))
                                .await;
                        },
                        Message::Text(text) => {
                            let ack = json!({"type": "Ack", "echo": text});
                            let _ = ws.send(Message::Text(ack.to_string())).await;
                        },
                        Message::Close(_) => {
                            mock.closes.fetch_add(1, Ordering::SeqCst);
                        },
                        _ => {},
                    }
                }
            });
        }
    });

    (format!("ws://{addr}/v1/listen"), mock)
}

fn test_config(streaming_url: &str) -> Config {
    let mut config = Config::default();
    config.rate_limit.limit = 1;
    config.upstream.streaming_url = streaming_url.to_string();
    config.upstream.stt_api_key = Some("dg-test".to_string());
    config.upstream.connect_timeout_secs = 2;
    config.upstream.drain_timeout_secs = 2;
    config
}

async fn spawn_gateway(config: Config) -> (SocketAddr, Gateway) {
    let gateway = Gateway::new(config).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(TcpTransport::serve_listener(
        listener,
        gateway.router(),
        Box::pin(std::future::pending()),
    ));
    (addr, gateway)
}

async fn connect(addr: SocketAddr, headers: &[(&'static str, &str)]) -> ClientSocket {
    let mut request = format!("ws://{addr}/v1/listen").into_client_request().unwrap();
    for (name, value) in headers {
        request
            .headers_mut()
            .insert(*name, value.parse().unwrap());
    }
    let (socket, _) = timeout(Duration::from_secs(5), tokio_tungstenite::connect_async(request))
        .await
        .expect("connect timed out")
        .expect("upgrade failed");
    socket
}

async fn next_json(socket: &mut ClientSocket) -> Value {
    loop {
        let message = timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame from gateway")
            .expect("socket ended")
            .expect("socket error");
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn next_close(socket: &mut ClientSocket) -> Option<CloseFrame<'static>> {
    loop {
        match timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("gateway never closed")
        {
            Some(Ok(Message::Close(frame))) => return frame,
            Some(Ok(_)) => {},
            Some(Err(e)) => panic!("socket error before close: {e}"),
            None => return None,
        }
    }
}

#[tokio::test]
async fn test_streaming_relays_in_order_without_auth_or_quota() {
    let (stt_url, stt) = spawn_stt().await;
    let (addr, gateway) = spawn_gateway(test_config(&stt_url)).await;

    // Three sessions against a limit of one: streaming never touches the limiter
    for _ in 0..3 {
        let mut socket = connect(addr, &[("sample_rate", "8000"), ("diarize", "true")]).await;

        for len in 1..=5_usize {
            socket.send(Message::Binary(vec![0; len * 10])).await.unwrap();
        }
        for expected in 1..=5_u64 {
            let result = next_json(&mut socket).await;
            assert_eq!(result["type"], "Results");
            assert_eq!(result["seq"], expected);
            assert_eq!(result["bytes"], expected * 10);
        }

        socket.close(None).await.unwrap();
    }

    assert!(gateway.state().sessions.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(gateway.state().limiter.tracked(), 0);

    let stats = gateway.stats();
    assert_eq!(stats.streaming_sessions, 3);
    assert_eq!(stats.frames_to_upstream, 15);
    assert_eq!(stats.frames_to_client, 15);

    let handshakes = stt.handshakes();
    assert_eq!(handshakes.len(), 3);
    let (uri, auth) = &handshakes[0];
    assert!(uri.contains("sample_rate=8000"), "uri: {uri}");
    assert!(uri.contains("diarize=true"), "uri: {uri}");
    assert!(uri.contains("encoding=linear16"), "uri: {uri}");
    assert_eq!(auth.as_deref(), Some("Token dg-test"));
}

#[tokio::test]
async fn test_text_frames_must_be_json() {
    let (stt_url, _stt) = spawn_stt().await;
    let (addr, _gateway) = spawn_gateway(test_config(&stt_url)).await;
    let mut socket = connect(addr, &[]).await;

    socket.send(Message::Text("hello".to_string())).await.unwrap();
    let error = next_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["reason"], "bad_frame");

    // The session continues
    socket
        .send(Message::Text(json!({"type": "KeepAlive"}).to_string()))
        .await
        .unwrap();
    let ack = next_json(&mut socket).await;
    assert_eq!(ack["type"], "Ack");

    socket.send(Message::Binary(vec![1; 32])).await.unwrap();
    let result = next_json(&mut socket).await;
    assert_eq!(result["seq"], 1);
}

#[tokio::test]
async fn test_client_close_closes_upstream_and_clears_registry() {
    let (stt_url, stt) = spawn_stt().await;
    let (addr, gateway) = spawn_gateway(test_config(&stt_url)).await;
    let mut socket = connect(addr, &[]).await;

    socket.send(Message::Binary(vec![1; 16])).await.unwrap();
    next_json(&mut socket).await;
    assert_eq!(gateway.state().sessions.active(), 1);

    socket.close(None).await.unwrap();
    next_close(&mut socket).await;

    assert!(gateway.state().sessions.wait_idle(Duration::from_secs(5)).await);
    assert_eq!(stt.closes(), 1);
}

#[tokio::test]
async fn test_abrupt_client_loss_closes_upstream() {
    let (stt_url, stt) = spawn_stt().await;
    let (addr, gateway) = spawn_gateway(test_config(&stt_url)).await;
    let mut socket = connect(addr, &[]).await;

    socket.send(Message::Binary(vec![1; 16])).await.unwrap();
    next_json(&mut socket).await;
    drop(socket);

    assert!(gateway.state().sessions.wait_idle(Duration::from_secs(5)).await);
    timeout(Duration::from_secs(5), async {
        while stt.closes() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upstream never saw a close");
}

#[tokio::test]
async fn test_upstream_close_is_forwarded() {
    let (stt_url, _stt) = spawn_stt().await;
    let (addr, gateway) = spawn_gateway(test_config(&stt_url)).await;
    let mut socket = connect(addr, &[]).await;

    socket
        .send(Message::Text(json!({"type": "CloseStream"}).to_string()))
        .await
        .unwrap();

    let frame = next_close(&mut socket).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1000);
    assert_eq!(frame.reason, "done");

    assert!(gateway.state().sessions.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_dial_failure_sends_error_and_closes() {
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead_addr = dead.local_addr().unwrap();
    drop(dead);

    let (addr, gateway) = spawn_gateway(test_config(&format!("ws://{dead_addr}/v1/listen"))).await;
    let mut socket = connect(addr, &[]).await;

    let error = next_json(&mut socket).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["reason"], "upstream_failure");

    let frame = next_close(&mut socket).await.expect("close frame");
    assert_eq!(u16::from(frame.code), 1011);

    assert!(gateway.state().sessions.wait_idle(Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_invalid_sample_rate_rejects_upgrade() {
    let (stt_url, stt) = spawn_stt().await;
    let (addr, _gateway) = spawn_gateway(test_config(&stt_url)).await;

    let mut request = format!("ws://{addr}/v1/listen").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("sample_rate", "fast".parse().unwrap());

    let err = tokio_tungstenite::connect_async(request).await.unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 400);
        },
        other => panic!("expected HTTP 400, got {other}"),
    }
    assert!(stt.handshakes().is_empty());
}

#[tokio::test]
async fn test_malformed_upgrade_is_bad_input() {
    let (stt_url, _stt) = spawn_stt().await;
    let (addr, _gateway) = spawn_gateway(test_config(&stt_url)).await;

    // Upgrade header without the WebSocket key
    let response = reqwest::Client::new()
        .get(format!("http://{addr}/v1/listen"))
        .header("connection", "upgrade")
        .header("upgrade", "websocket")
        .header("sec-websocket-version", "13")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["reason"], "bad_input");
}

#[tokio::test]
async fn test_gateway_run_stops_on_shutdown() {
    let mut config = test_config("ws://127.0.0.1:9/v1/listen");
    config.server.port = 0;
    let gateway = Gateway::new(config).unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        gateway
            .run(Box::pin(async {
                let _ = rx.await;
            }))
            .await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(()).unwrap();

    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("gateway did not stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_closes_live_sessions() {
    let (stt_url, stt) = spawn_stt().await;
    let mut config = test_config(&stt_url);
    config.server.port = {
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        free.local_addr().unwrap().port()
    };
    let addr: SocketAddr = format!("127.0.0.1:{}", config.server.port).parse().unwrap();
    let gateway = Gateway::new(config).unwrap();
    let state = Arc::clone(gateway.state());

    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        gateway
            .run(Box::pin(async {
                let _ = rx.await;
            }))
            .await
    });

    let mut socket = timeout(Duration::from_secs(5), async {
        loop {
            if TcpStream::connect(addr).await.is_ok() {
                break connect(addr, &[]).await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("gateway never started listening");

    socket.send(Message::Binary(vec![1; 16])).await.unwrap();
    next_json(&mut socket).await;
    assert_eq!(state.sessions.active(), 1);

    tx.send(()).unwrap();

    let frame = next_close(&mut socket).await.expect("close frame carries a code");
    assert_eq!(frame.code, CloseCode::Away);

    let result = timeout(Duration::from_secs(5), handle)
        .await
        .expect("gateway did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(state.sessions.active(), 0);

    timeout(Duration::from_secs(5), async {
        while stt.closes() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("upstream never saw a close");
}
