//! Integration tests for the gateway session lifecycle
//!
//! Each test scripts the gateway side against a real client over
//! loopback TCP.

mod common;

use async_trait::async_trait;
use common::*;
use gatelink::events::handler;
use gatelink::*;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Dials normally, then stalls before handing over the transport
struct SlowDialer {
    inner: TungsteniteDialer,
    delay: Duration,
}

#[async_trait]
impl Dialer for SlowDialer {
    async fn dial(&self, url: &str, headers: &Headers) -> gatelink::Result<WsStream> {
        let ws = self.inner.dial(url, headers).await?;
        tokio::time::sleep(self.delay).await;
        Ok(ws)
    }
}

/// Collects every payload delivered for `event`
fn recorder(client: &GatewayClient, event: &str) -> Arc<Mutex<Vec<Value>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    client.on(handler(event, move |data| {
        sink.lock().push(data.clone());
        Ok(())
    }));
    seen
}

#[tokio::test]
async fn test_new_session_identifies_and_publishes_ready() {
    verbose_println!("Testing new session...");
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();
    let ready = recorder(&client, "READY");

    let mut conn = gateway.accept().await;
    let identify = conn.accept_identify("abc").await;

    assert_eq!(identify["d"]["token"], TOKEN);
    assert_eq!(identify["d"]["compress"], true);
    assert!(eventually(STEP_TIMEOUT, || client.is_connected()).await);
    assert!(eventually(STEP_TIMEOUT, || ready.lock().len() == 1).await);
    assert_eq!(client.session_id().as_deref(), Some("abc"));
    // the handshake event does not move the watermark
    assert_eq!(client.sequence(), None);
    assert!(client.try_recv_error().is_none());
}

#[tokio::test]
async fn test_dispatch_reaches_subscribers_and_advances_watermark() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();
    let messages = recorder(&client, "MSG");

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    conn.dispatch(42, "MSG", json!({"content": "hi"})).await;

    assert!(eventually(STEP_TIMEOUT, || messages.lock().len() == 1).await);
    assert_eq!(messages.lock()[0], json!({"content": "hi"}));
    assert!(eventually(STEP_TIMEOUT, || client.sequence() == Some(42)).await);
    // READY is consumed by the handshake, not the read pump
    assert_eq!(client.metrics().messages_received, 1);
}

#[tokio::test]
async fn test_compressed_frames_are_inflated() {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();
    let messages = recorder(&client, "MSG");

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;

    let plain = json!({"op": 0, "s": 7, "t": "MSG", "d": {"n": 1}}).to_string();
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plain.as_bytes()).unwrap();
    conn.send_binary(encoder.finish().unwrap()).await;

    assert!(eventually(STEP_TIMEOUT, || messages.lock().len() == 1).await);
    assert_eq!(messages.lock()[0], json!({"n": 1}));
    assert_eq!(client.sequence(), Some(7));
}

#[tokio::test]
async fn test_send_is_delivered() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;

    let status = json!({"idle_since": null, "game": {"name": "tests"}});
    client.send(Operation::StatusUpdate, &status).await.unwrap();

    let frame = conn.recv_op(3).await;
    assert_eq!(frame, json!({"op": 3, "d": status}));
    assert_eq!(client.metrics().messages_sent, 1);
}

#[tokio::test]
async fn test_messages_sent_before_connect_follow_the_handshake() {
    let mut gateway = MockGateway::start().await;
    let client = Arc::new(client_for(&gateway).build().await.unwrap());

    let sender = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .send(Operation::StatusUpdate, &json!({"early": true}))
                .await
        })
    };

    let mut conn = gateway.accept().await;
    let first = conn.recv_json().await;
    assert_eq!(first["op"], 2, "identify must be the first frame");
    conn.send_json(json!({"op": 0, "t": "READY", "d": {"session_id": "abc"}}))
        .await;

    let frame = conn.recv_op(3).await;
    assert_eq!(frame["d"]["early"], true);
    assert_eq!(sender.await.unwrap(), Ok(()));
}

#[tokio::test]
async fn test_resumes_after_transport_loss() {
    verbose_println!("Testing resume after drop...");
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();
    let resumed = recorder(&client, "RESUMED");

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    conn.dispatch(42, "MSG", json!({})).await;
    assert!(eventually(STEP_TIMEOUT, || client.sequence() == Some(42)).await);
    drop(conn);

    let mut conn = gateway.accept().await;
    let resume = conn.accept_resume().await;
    assert_eq!(
        resume["d"],
        json!({"token": TOKEN, "session_id": "abc", "seq": 42})
    );

    assert!(eventually(STEP_TIMEOUT, || resumed.lock().len() == 1).await);
    assert!(eventually(STEP_TIMEOUT, || client.is_connected()).await);
    let err = next_error(&client, STEP_TIMEOUT).await.unwrap();
    assert!(matches!(err, GatewayError::Disruption(_)), "got {:?}", err);
    assert_eq!(client.metrics().reconnect_count, 1);
    assert_eq!(client.session_id().as_deref(), Some("abc"));
}

#[tokio::test]
async fn test_invalid_resume_falls_back_to_identify_on_same_transport() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.accept_identify("old").await;
    drop(conn);

    let mut conn = gateway.accept().await;
    conn.recv_op(6).await;
    conn.send_json(json!({"op": 9, "d": false})).await;
    conn.accept_identify("new").await;

    assert!(eventually(STEP_TIMEOUT, || client.session_id().as_deref() == Some("new")).await);
    assert!(eventually(STEP_TIMEOUT, || client.is_connected()).await);
    assert!(gateway.no_connection_within(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_invalid_session_midstream_identifies_anew() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.accept_identify("old").await;
    conn.send_json(json!({"op": 9, "d": false})).await;

    let mut conn = gateway.accept().await;
    conn.accept_identify("new").await;

    assert!(eventually(STEP_TIMEOUT, || client.session_id().as_deref() == Some("new")).await);
    let err = next_error(&client, STEP_TIMEOUT).await.unwrap();
    assert_eq!(
        err,
        GatewayError::Disruption(Box::new(GatewayError::InvalidSession))
    );
}

#[tokio::test]
async fn test_authentication_failure_is_fatal() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.recv_op(2).await;
    conn.close_with(4004, "Authentication failed.").await;

    let err = next_error(&client, STEP_TIMEOUT).await.unwrap();
    assert!(
        matches!(err.cause(), GatewayError::AuthenticationFailed(_)),
        "got {:?}",
        err
    );
    assert!(matches!(err, GatewayError::Fatal(_)));

    assert!(eventually(STEP_TIMEOUT, || client.connection_state() == ConnectionState::Failed).await);
    assert!(gateway.no_connection_within(Duration::from_millis(200)).await);
    assert!(next_error(&client, Duration::from_millis(50)).await.is_none());
    assert_eq!(
        client.send(Operation::StatusUpdate, &json!({})).await,
        Err(GatewayError::Closed)
    );
}

#[tokio::test]
async fn test_reconnect_request_is_not_an_error() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    conn.send_json(json!({"op": 7, "d": null})).await;

    let mut next = gateway.accept().await;
    next.accept_resume().await;
    assert!(eventually(STEP_TIMEOUT, || client.is_connected()).await);
    assert!(next_error(&client, Duration::from_millis(100)).await.is_none());
    assert_eq!(client.metrics().reconnect_count, 0);
}

#[tokio::test]
async fn test_heartbeat_carries_watermark() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.recv_op(2).await;
    conn.send_json(json!({
        "op": 0,
        "t": "READY",
        "d": {"session_id": "abc", "heartbeat_interval": 50}
    }))
    .await;
    conn.dispatch(5, "MSG", json!({})).await;

    let found = tokio::time::timeout(STEP_TIMEOUT, async {
        loop {
            let beat = conn.recv_op(1).await;
            if beat["d"] == 5 {
                break;
            }
        }
    })
    .await;
    assert!(found.is_ok());
    assert!(client.metrics().heartbeats_sent >= 1);
}

#[tokio::test]
async fn test_server_heartbeat_request_is_answered_immediately() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    assert!(eventually(STEP_TIMEOUT, || client.is_connected()).await);

    conn.send_json(json!({"op": 1, "d": null})).await;
    let beat = tokio::time::timeout(Duration::from_secs(1), conn.recv_op(1))
        .await
        .expect("heartbeat not sent on request");
    assert_eq!(beat["d"], Value::Null);
}

#[tokio::test]
async fn test_unacknowledged_heartbeats_restart_the_connection() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway)
        .heartbeat_ack_timeout(Duration::from_millis(30))
        .build()
        .await
        .unwrap();

    let mut conn = gateway.accept().await;
    conn.recv_op(2).await;
    conn.send_json(json!({
        "op": 0,
        "t": "READY",
        "d": {"session_id": "abc", "heartbeat_interval": 50}
    }))
    .await;

    // never acknowledge; the second beat finds the first one stale
    let mut next = gateway.accept().await;
    next.accept_resume().await;
    let err = next_error(&client, STEP_TIMEOUT).await.unwrap();
    assert!(
        matches!(err.cause(), GatewayError::HeartbeatTimeout(_)),
        "got {:?}",
        err
    );
    drop(conn);
}

#[tokio::test]
async fn test_close_is_idempotent_and_rejects_sends() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    assert!(eventually(STEP_TIMEOUT, || client.is_connected()).await);

    client.close().unwrap();
    client.close().unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Closed);
    assert_eq!(client.metrics().generation, None);
    assert_eq!(
        client.send(Operation::StatusUpdate, &json!({})).await,
        Err(GatewayError::Closed)
    );
    assert!(gateway.no_connection_within(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_close_while_reconnecting_stops_retries() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway)
        .reconnect_strategy(FixedDelay::new(Duration::from_millis(200), None))
        .build()
        .await
        .unwrap();

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    assert!(eventually(STEP_TIMEOUT, || client.is_connected()).await);
    drop(conn);

    assert!(matches!(
        next_error(&client, STEP_TIMEOUT).await,
        Some(GatewayError::Disruption(_))
    ));
    client.close().unwrap();
    assert!(gateway.no_connection_within(Duration::from_millis(400)).await);
    assert_eq!(client.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_handler_failure_is_reported_without_disruption() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();
    client.on(handler("MSG", |_| {
        Err(GatewayError::Parse("bad message".to_string()))
    }));

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    conn.dispatch(2, "MSG", json!({})).await;

    let err = next_error(&client, STEP_TIMEOUT).await.unwrap();
    assert!(matches!(err, GatewayError::Dispatch(_)), "got {:?}", err);
    assert!(client.is_connected());
    assert!(gateway.no_connection_within(Duration::from_millis(100)).await);
}

#[tokio::test]
async fn test_once_subscription_fires_once() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();
    let hits = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&hits);
    client.once(handler("MSG", move |_| {
        *counter.lock() += 1;
        Ok(())
    }));

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    conn.dispatch(2, "MSG", json!({})).await;
    conn.dispatch(3, "MSG", json!({})).await;

    assert!(eventually(STEP_TIMEOUT, || client.sequence() == Some(3)).await);
    assert_eq!(*hits.lock(), 1);
}

#[tokio::test]
async fn test_concurrent_dispatch_delivers_events_and_records_sequence() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway)
        .dispatch_mode(DispatchMode::Concurrent)
        .build()
        .await
        .unwrap();
    assert_eq!(client.config().dispatch_mode(), DispatchMode::Concurrent);
    let seen = recorder(&client, "MSG");

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    for sequence in 2..=9 {
        conn.dispatch(sequence, "MSG", json!({"n": sequence})).await;
    }

    assert!(eventually(STEP_TIMEOUT, || seen.lock().len() == 8).await);
    let mut delivered: Vec<u64> = seen
        .lock()
        .iter()
        .map(|data| data["n"].as_u64().unwrap())
        .collect();
    delivered.sort_unstable();
    assert_eq!(delivered, (2..=9).collect::<Vec<u64>>());

    // completion order decides which sequence lands last
    let sequence = client.sequence().unwrap();
    assert!((2..=9).contains(&sequence), "sequence {}", sequence);
    assert_eq!(client.metrics().messages_received, 8);
}

#[tokio::test]
async fn test_send_while_disconnected_is_delivered_once_after_resume() {
    let mut gateway = MockGateway::start().await;
    let client = Arc::new(
        client_for(&gateway)
            .reconnect_strategy(FixedDelay::new(Duration::from_millis(50), None))
            .build()
            .await
            .unwrap(),
    );

    let mut conn = gateway.accept().await;
    conn.accept_identify("abc").await;
    assert!(eventually(STEP_TIMEOUT, || client.is_connected()).await);
    drop(conn);
    assert!(matches!(
        next_error(&client, STEP_TIMEOUT).await,
        Some(GatewayError::Disruption(_))
    ));

    let sender = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.send(Operation::StatusUpdate, &json!({"n": 1})).await })
    };

    let mut conn = gateway.accept().await;
    conn.accept_resume().await;
    let frame = conn.recv_op(3).await;
    assert_eq!(frame, json!({"op": 3, "d": {"n": 1}}));
    assert_eq!(sender.await.unwrap(), Ok(()));

    assert!(conn.no_json_within(Duration::from_millis(200)).await, "message sent twice");
    assert_eq!(client.metrics().messages_sent, 1);
}

#[tokio::test]
async fn test_send_pending_at_close_is_rejected() {
    let mut gateway = MockGateway::start().await;
    let client = Arc::new(client_for(&gateway).build().await.unwrap());

    // leave the handshake unanswered so the message stays queued
    let mut conn = gateway.accept().await;
    conn.recv_op(2).await;

    let sender = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.send(Operation::StatusUpdate, &json!({"n": 1})).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    client.close().unwrap();

    let outcome = tokio::time::timeout(STEP_TIMEOUT, sender).await.unwrap().unwrap();
    assert_eq!(outcome, Err(GatewayError::Closed));
    assert!(conn.no_json_within(Duration::from_millis(200)).await);
}

#[tokio::test]
async fn test_close_while_dialing_sends_nothing() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway)
        .dialer(SlowDialer {
            inner: TungsteniteDialer::new(STEP_TIMEOUT),
            delay: Duration::from_millis(300),
        })
        .build()
        .await
        .unwrap();

    // the upgrade has completed; the dialer is still holding the transport
    let mut conn = gateway.accept().await;
    client.close().unwrap();

    assert!(
        conn.no_json_within(Duration::from_millis(600)).await,
        "identify sent after close"
    );
    assert_eq!(client.connection_state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_close_during_handshake_drops_transport() {
    let mut gateway = MockGateway::start().await;
    let client = client_for(&gateway).build().await.unwrap();

    let mut conn = gateway.accept().await;
    conn.recv_op(2).await;
    client.close().unwrap();

    assert!(conn.no_json_within(Duration::from_millis(300)).await);
    assert_eq!(client.connection_state(), ConnectionState::Closed);
    assert!(next_error(&client, Duration::from_millis(100)).await.is_none());
    assert!(gateway.no_connection_within(Duration::from_millis(100)).await);
}
