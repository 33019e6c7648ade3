use crate::core::config::ClientConfig;
use crate::core::connection_state::ConnectionState;
use crate::core::emitter::HandlerId;
use crate::core::model::{Operation, Payload};
use crate::core::queue::PendingMessage;
use crate::core::supervisor::Supervisor;
use crate::traits::*;
use crossbeam_channel::Receiver;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Client metrics snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub heartbeats_sent: u64,
    pub reconnect_count: u64,
    /// Id of the current generation; None once closed or failed
    pub generation: Option<u64>,
    pub connection_state: ConnectionState,
}

/// Unread errors kept before the oldest is dropped
pub const ERROR_BUFFER_CAPACITY: usize = 1024;

/// Resilient gateway client
///
/// Keeps one logical session alive across any number of transports:
/// - Reconnects with backoff and resumes the session where possible
/// - Buffers outbound messages while disconnected and delivers each once
/// - Heartbeats with the last observed sequence number
/// - Publishes every error on a bounded crossbeam channel
///
/// Dropping the client closes it.
pub struct GatewayClient {
    inner: Arc<Supervisor>,
    errors: Receiver<GatewayError>,
}

impl GatewayClient {
    /// Create a client from configuration without connecting
    ///
    /// This is called by the builder's `build()` method.
    /// Use `gatelink::builder()` to create a client.
    pub(crate) fn new(config: ClientConfig, reconnect_strategy: Box<dyn ReconnectionStrategy>) -> Self {
        let inner = Supervisor::new(config, reconnect_strategy, ERROR_BUFFER_CAPACITY);
        let errors = inner.error_stream();
        Self { inner, errors }
    }

    /// Begin the first connection attempt in the background
    pub(crate) fn start(&self) {
        self.inner.start();
    }

    /// Queue a message and wait until it has been written
    ///
    /// Messages sent while the client is reconnecting wait in the queue and
    /// go out on the next connection. Fails with [`GatewayError::Closed`]
    /// once the client is closed, and with the write error if the
    /// transport failed while this message was being written.
    pub async fn send<T: Serialize + ?Sized>(&self, operation: Operation, data: &T) -> Result<()> {
        let payload = Payload::from_data(operation, data)?;
        let (message, outcome) = PendingMessage::new(payload);

        // pushing under the slot's read lock keeps a restart from forking
        // the queue between the lookup and the push
        match self.inner.slot().with_current(|generation| generation.queue().push(message)) {
            Some(Ok(())) => {}
            Some(Err(_)) | None => return Err(GatewayError::Closed),
        }

        outcome.await.unwrap_or(Err(GatewayError::Closed))
    }

    /// Subscribe to every occurrence of the handler's event
    pub fn on(&self, handler: impl EventHandler) -> HandlerId {
        self.inner.emitter().on(handler)
    }

    /// Subscribe to the next occurrence of the handler's event only
    pub fn once(&self, handler: impl EventHandler) -> HandlerId {
        self.inner.emitter().once(handler)
    }

    /// Remove a subscription; false if it was already gone
    pub fn off(&self, id: HandlerId) -> bool {
        self.inner.emitter().off(id)
    }

    /// The error stream
    ///
    /// Disruptions arrive wrapped in [`GatewayError::Disruption`], the error
    /// that stopped the client in [`GatewayError::Fatal`]. Everything else is
    /// reported as-is. Receivers are clones of one channel, so each error
    /// is delivered to only one of them.
    ///
    /// The stream keeps at most [`ERROR_BUFFER_CAPACITY`] unread errors;
    /// beyond that the oldest are dropped, so a client whose errors are
    /// never read does not grow without bound.
    pub fn errors(&self) -> Receiver<GatewayError> {
        self.errors.clone()
    }

    /// Try to receive an error (non-blocking)
    pub fn try_recv_error(&self) -> Option<GatewayError> {
        self.errors.try_recv().ok()
    }

    /// Receive an error, blocking up to `timeout`
    pub fn recv_error_timeout(&self, timeout: Duration) -> Option<GatewayError> {
        self.errors.recv_timeout(timeout).ok()
    }

    /// Get current connection state
    #[inline]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.state().get()
    }

    /// Check if connected
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.inner.state().is_connected()
    }

    /// Current session id, if a handshake has completed
    pub fn session_id(&self) -> Option<String> {
        self.inner.session().id().map(|id| id.to_string())
    }

    /// Last observed dispatch sequence number
    pub fn sequence(&self) -> Option<u64> {
        self.inner.session().sequence()
    }

    /// Get current metrics
    pub fn metrics(&self) -> Metrics {
        let metrics = self.inner.metrics();
        Metrics {
            messages_sent: metrics.messages_sent(),
            messages_received: metrics.messages_received(),
            heartbeats_sent: metrics.heartbeats_sent(),
            reconnect_count: metrics.reconnect_count(),
            generation: self.inner.current_generation(),
            connection_state: self.connection_state(),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.inner.config()
    }

    /// Close the client
    ///
    /// Stops the current connection, rejects every queued message with
    /// [`GatewayError::Closed`] and prevents any further reconnect.
    /// Idempotent; a client stopped by a fatal error is already closed.
    pub fn close(&self) -> Result<()> {
        if !self.inner.close() {
            debug!("Client already closed");
        }
        Ok(())
    }
}

impl Drop for GatewayClient {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for GatewayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayClient")
            .field("state", &self.connection_state())
            .field("session_id", &self.session_id())
            .field("sequence", &self.sequence())
            .finish()
    }
}
