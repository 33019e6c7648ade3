//! Read and write pumps
//!
//! Each connected generation runs one of each. They stop when their
//! generation is closed, and on any transport failure they hand the error
//! to the supervisor's restart, keyed on their own generation.

use crate::core::codec;
use crate::core::dispatcher::DispatchJob;
use crate::core::generation::Generation;
use crate::core::model::Payload;
use crate::core::supervisor::Supervisor;
use crate::traits::{GatewayError, Result, WsStream};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

/// Forward inbound frames to the dispatcher until the transport fails or
/// the generation is closed
pub(crate) async fn read_pump(
    supervisor: Arc<Supervisor>,
    generation: Arc<Generation>,
    mut stream: WsSource,
) {
    debug!(generation = generation.id(), "Read pump started");

    let failure = {
        let closed = generation.closed();
        tokio::pin!(closed);

        loop {
            let raw = tokio::select! {
                _ = &mut closed => {
                    debug!(generation = generation.id(), "Read pump stopped");
                    return;
                }
                next = stream.next() => match next {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => GatewayError::from_close(frame.code.into(), frame.reason.to_string()),
                            None => GatewayError::ConnectionClosed("closed by gateway".to_string()),
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break GatewayError::from(e),
                    None => break GatewayError::ConnectionClosed("stream ended".to_string()),
                }
            };

            supervisor.metrics().increment_received();
            supervisor.submit(DispatchJob::Frame {
                raw,
                generation: Arc::clone(&generation),
            });
        }
    };

    warn!(generation = generation.id(), error = %failure, "Read pump failed");
    drop(stream);
    supervisor.restart(Some(failure), generation).await;
}

/// Write heartbeats and queued messages until the transport fails or the
/// queue is closed
pub(crate) async fn write_pump(
    supervisor: Arc<Supervisor>,
    generation: Arc<Generation>,
    mut sink: WsSink,
    heartbeat_interval: Duration,
) {
    debug!(
        generation = generation.id(),
        ?heartbeat_interval,
        "Write pump started"
    );

    let mut ticker = tokio::time::interval_at(Instant::now() + heartbeat_interval, heartbeat_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let failure = loop {
        let result = tokio::select! {
            _ = ticker.tick() => heartbeat(&supervisor, &generation, &mut sink).await,
            _ = generation.heartbeat_requested() => heartbeat(&supervisor, &generation, &mut sink).await,
            message = generation.queue().poll() => match message {
                Some(message) => {
                    let outcome = write(&supervisor, &mut sink, &message.payload).await;
                    if outcome.is_ok() {
                        supervisor.metrics().increment_sent();
                    }
                    message.resolve(outcome.clone());
                    outcome
                }
                None => {
                    debug!(generation = generation.id(), "Write pump stopped");
                    let timeout = supervisor.config().timeout();
                    let _ = tokio::time::timeout(timeout, sink.close()).await;
                    return;
                }
            },
        };

        if let Err(e) = result {
            break e;
        }
    };

    warn!(generation = generation.id(), error = %failure, "Write pump failed");
    drop(sink);
    supervisor.restart(Some(failure), generation).await;
}

/// Send a heartbeat carrying the sequence watermark
async fn heartbeat(supervisor: &Supervisor, generation: &Generation, sink: &mut WsSink) -> Result<()> {
    if let Some(acks) = generation.acks() {
        if !acks.is_healthy() {
            return Err(GatewayError::HeartbeatTimeout(acks.timeout()));
        }
    }

    let sequence = supervisor.session().sequence();
    write(supervisor, sink, &Payload::heartbeat(sequence)).await?;
    debug!(generation = generation.id(), ?sequence, "Heartbeat sent");

    if let Some(acks) = generation.acks() {
        acks.record_heartbeat_sent();
    }
    supervisor.metrics().increment_heartbeats();
    Ok(())
}

async fn write(supervisor: &Supervisor, sink: &mut WsSink, payload: &Payload) -> Result<()> {
    let config = supervisor.config();
    let text = codec::encode(payload, config.debugger())?;
    match tokio::time::timeout(config.timeout(), sink.send(Message::Text(text))).await {
        Ok(result) => result.map_err(GatewayError::from),
        Err(_) => Err(GatewayError::Timeout("writing frame".to_string())),
    }
}
