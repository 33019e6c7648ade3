//! Session handshake
//!
//! Runs on a freshly dialed transport before any pump starts. Without a
//! session id the client identifies; with one it tries to resume, and if
//! the gateway answers Resume with InvalidSession it identifies on the
//! same transport instead of dropping it.

use crate::core::codec;
use crate::core::model::{
    Frame, Handshake, Operation, Payload, Ready, ResumeRequest, Resumed,
    DEFAULT_HEARTBEAT_INTERVAL,
};
use crate::traits::events::{READY, RESUMED};
use crate::traits::{Debugger, GatewayError, Result};
use futures::{Sink, SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info};

/// Anything the handshake can talk over
pub trait Transport:
    Stream<Item = std::result::Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin + Send
{
}

impl<T> Transport for T where
    T: Stream<Item = std::result::Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Unpin
        + Send
{
}

/// What a successful handshake established
#[derive(Debug, Clone, PartialEq)]
pub struct SessionDetails {
    pub session_id: String,
    pub heartbeat_interval: Duration,
    /// Name of the event that completed the handshake (READY or RESUMED)
    pub event: String,
    /// Its payload, forwarded to subscribers once the connection is published
    pub data: Value,
}

/// The first frame after our request that is neither Hello nor an ack
struct Response {
    payload: Payload,
    hello_interval: Option<Duration>,
}

/// Performs Identify or Resume on one transport
pub struct Handshaker<'a> {
    handshake: &'a Handshake,
    session_id: Option<&'a str>,
    sequence: Option<u64>,
    timeout: Duration,
    debugger: &'a dyn Debugger,
}

impl<'a> Handshaker<'a> {
    pub fn new(handshake: &'a Handshake, timeout: Duration, debugger: &'a dyn Debugger) -> Self {
        Self {
            handshake,
            session_id: None,
            sequence: None,
            timeout,
            debugger,
        }
    }

    /// Resume `session_id` from `sequence` instead of identifying
    pub fn resuming(mut self, session_id: &'a str, sequence: Option<u64>) -> Self {
        self.session_id = Some(session_id);
        self.sequence = sequence;
        self
    }

    pub async fn run<S: Transport>(&self, ws: &mut S) -> Result<SessionDetails> {
        match self.session_id {
            Some(session_id) => self.resume(ws, session_id).await,
            None => self.identify(ws).await,
        }
    }

    async fn identify<S: Transport>(&self, ws: &mut S) -> Result<SessionDetails> {
        debug!("Identifying");
        let request = Payload::from_data(Operation::Identify, self.handshake)?;
        let response = self.invoke(ws, request).await?;
        let payload = response.payload;

        if payload.operation != Operation::Dispatch || payload.event.as_deref() != Some(READY) {
            return Err(GatewayError::Protocol(format!(
                "expected {} in response to identify, got op {} ({:?})",
                READY,
                u8::from(payload.operation),
                payload.event
            )));
        }

        let ready = Ready::deserialize(&payload.data)
            .map_err(|e| GatewayError::Protocol(format!("malformed {}: {}", READY, e)))?;
        info!(session_id = %ready.session_id, "Session established");

        Ok(SessionDetails {
            heartbeat_interval: pick_interval(ready.heartbeat_interval, response.hello_interval),
            session_id: ready.session_id,
            event: READY.to_string(),
            data: payload.data,
        })
    }

    async fn resume<S: Transport>(&self, ws: &mut S, session_id: &str) -> Result<SessionDetails> {
        debug!(session_id, sequence = ?self.sequence, "Resuming");
        let request = Payload::from_data(
            Operation::Resume,
            &ResumeRequest {
                token: self.handshake.token.clone(),
                session_id: session_id.to_string(),
                seq: self.sequence.unwrap_or(0),
            },
        )?;
        let response = self.invoke(ws, request).await?;
        let payload = response.payload;

        match payload.operation {
            Operation::Dispatch if payload.event.as_deref() == Some(RESUMED) => {
                let resumed = Resumed::deserialize(&payload.data)
                    .map_err(|e| GatewayError::Protocol(format!("malformed {}: {}", RESUMED, e)))?;
                info!(session_id, "Session resumed");

                Ok(SessionDetails {
                    session_id: session_id.to_string(),
                    heartbeat_interval: pick_interval(
                        resumed.heartbeat_interval,
                        response.hello_interval,
                    ),
                    event: RESUMED.to_string(),
                    data: payload.data,
                })
            }
            Operation::InvalidSession => {
                info!(session_id, "Session rejected, identifying instead");
                self.identify(ws).await
            }
            other => Err(GatewayError::Protocol(format!(
                "expected {} in response to resume, got op {} ({:?})",
                RESUMED,
                u8::from(other),
                payload.event
            ))),
        }
    }

    /// Write `request` and read until the gateway answers it
    async fn invoke<S: Transport>(&self, ws: &mut S, request: Payload) -> Result<Response> {
        let text = codec::encode(&request, self.debugger)?;
        match tokio::time::timeout(self.timeout, ws.send(Message::Text(text))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(GatewayError::Timeout("writing handshake".to_string())),
        }

        let deadline = Instant::now() + self.timeout;
        let mut hello_interval = None;

        loop {
            let next = tokio::time::timeout_at(deadline, ws.next())
                .await
                .map_err(|_| GatewayError::Timeout("waiting for handshake response".to_string()))?;

            let raw = match next {
                Some(Ok(Message::Text(text))) => text.into_bytes(),
                Some(Ok(Message::Binary(data))) => data,
                Some(Ok(Message::Close(Some(frame)))) => {
                    return Err(GatewayError::from_close(frame.code.into(), frame.reason.to_string()))
                }
                Some(Ok(Message::Close(None))) => {
                    return Err(GatewayError::ConnectionClosed(
                        "closed during handshake".to_string(),
                    ))
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
                None => {
                    return Err(GatewayError::ConnectionClosed(
                        "stream ended during handshake".to_string(),
                    ))
                }
            };

            let payload = codec::decode(&raw, self.debugger)?;
            match payload.operation {
                Operation::Hello => {
                    if let Frame::Hello { heartbeat_interval } = Frame::try_from(payload)? {
                        hello_interval = Some(heartbeat_interval);
                    }
                }
                Operation::HeartbeatAck => {}
                _ => {
                    return Ok(Response {
                        payload,
                        hello_interval,
                    })
                }
            }
        }
    }
}

/// Interval from the handshake event, else from Hello, else the default
fn pick_interval(announced: Option<u64>, hello: Option<Duration>) -> Duration {
    announced
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .or(hello.filter(|interval| !interval.is_zero()))
        .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL)
}
