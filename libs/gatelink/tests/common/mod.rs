//! Common test utilities for gatelink integration tests
//!
//! The mock gateway hands every accepted WebSocket to the test, which then
//! scripts the server side of the conversation frame by frame.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use gatelink::*;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

pub const TOKEN: &str = "test-token";

/// How long a test waits for the client before failing
pub const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// A gateway whose connections are driven by the test
pub struct MockGateway {
    pub addr: SocketAddr,
    connections: mpsc::UnboundedReceiver<GatewayConn>,
    shutdown: Arc<Notify>,
}

impl MockGateway {
    /// Bind to an ephemeral port and start accepting
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());
        let shutdown_clone = shutdown.clone();
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        match result {
                            Ok((stream, _)) => {
                                let tx = tx.clone();
                                tokio::spawn(async move {
                                    match accept_async(stream).await {
                                        Ok(ws) => {
                                            let _ = tx.send(GatewayConn { ws });
                                        }
                                        Err(e) => eprintln!("WebSocket handshake failed: {}", e),
                                    }
                                });
                            }
                            Err(e) => {
                                eprintln!("Accept error: {}", e);
                                break;
                            }
                        }
                    }
                    _ = shutdown_clone.notified() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            connections,
            shutdown,
        }
    }

    /// Get the WebSocket URL for this gateway
    pub fn ws_url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Wait for the client's next connection
    pub async fn accept(&mut self) -> GatewayConn {
        tokio::time::timeout(STEP_TIMEOUT, self.connections.recv())
            .await
            .expect("client did not connect in time")
            .expect("gateway stopped")
    }

    /// True if the client does not connect within `window`
    pub async fn no_connection_within(&mut self, window: Duration) -> bool {
        tokio::time::timeout(window, self.connections.recv())
            .await
            .is_err()
    }

    /// Stop accepting connections
    pub fn shutdown(&self) {
        self.shutdown.notify_waiters();
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Server side of one client connection
pub struct GatewayConn {
    ws: WebSocketStream<TcpStream>,
}

impl GatewayConn {
    /// Next JSON frame from the client, skipping control frames
    pub async fn recv_json(&mut self) -> Value {
        loop {
            let message = tokio::time::timeout(STEP_TIMEOUT, self.ws.next())
                .await
                .expect("no frame from client in time")
                .expect("client closed the connection")
                .expect("transport error");
            match message {
                Message::Text(text) => {
                    verbose_println!("  client -> {}", text);
                    return serde_json::from_str(&text).unwrap();
                }
                Message::Close(frame) => panic!("client closed the connection: {:?}", frame),
                _ => continue,
            }
        }
    }

    /// True if the client sends no JSON frame within `window`; a close
    /// from the client ends the wait early
    pub async fn no_json_within(&mut self, window: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Ok(Some(Ok(Message::Text(text)))) => {
                    verbose_println!("  client -> {}", text);
                    return false;
                }
                Ok(Some(Ok(_))) => continue,
                Ok(Some(Err(_))) | Ok(None) | Err(_) => return true,
            }
        }
    }

    /// Next frame with opcode `op`, skipping everything else (heartbeats, mostly)
    pub async fn recv_op(&mut self, op: u64) -> Value {
        loop {
            let frame = self.recv_json().await;
            if frame["op"] == op {
                return frame;
            }
        }
    }

    pub async fn send_json(&mut self, value: Value) {
        verbose_println!("  gateway -> {}", value);
        self.ws.send(Message::Text(value.to_string())).await.unwrap();
    }

    pub async fn send_binary(&mut self, data: Vec<u8>) {
        self.ws.send(Message::Binary(data)).await.unwrap();
    }

    /// Answer the client's Identify with READY
    pub async fn accept_identify(&mut self, session_id: &str) -> Value {
        let identify = self.recv_op(2).await;
        self.send_json(json!({
            "op": 0,
            "t": "READY",
            "s": 1,
            "d": {"session_id": session_id, "v": 6}
        }))
        .await;
        identify
    }

    /// Answer the client's Resume with RESUMED
    pub async fn accept_resume(&mut self) -> Value {
        let resume = self.recv_op(6).await;
        self.send_json(json!({"op": 0, "t": "RESUMED", "d": {}})).await;
        resume
    }

    pub async fn dispatch(&mut self, sequence: u64, event: &str, data: Value) {
        self.send_json(json!({"op": 0, "s": sequence, "t": event, "d": data}))
            .await;
    }

    /// Close with a close frame carrying `code`
    pub async fn close_with(mut self, code: u16, reason: &str) {
        let _ = self
            .ws
            .close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.to_string().into(),
            }))
            .await;
        // drain until the client acknowledges
        let _ = tokio::time::timeout(Duration::from_secs(1), async {
            while let Some(Ok(_)) = self.ws.next().await {}
        })
        .await;
    }
}

/// Builder pointed at `gateway` with a short fixed reconnect delay
pub fn client_for(gateway: &MockGateway) -> GatewayClientBuilder<states::HasToken> {
    gatelink::builder()
        .token(TOKEN)
        .gateway_url(gateway.ws_url())
        .timeout(Duration::from_secs(2))
        .reconnect_strategy(FixedDelay::new(Duration::from_millis(10), None))
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Next error from the client's error stream, polling without blocking the runtime
pub async fn next_error(client: &GatewayClient, timeout: Duration) -> Option<GatewayError> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(err) = client.try_recv_error() {
            return Some(err);
        }
        if tokio::time::Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
