use crate::core::model::Handshake;
use crate::traits::*;
use std::sync::Arc;
use std::time::Duration;

/// Default bound for dialing, handshake round-trips and writes
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How inbound frames are handed to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One worker handles frames in receipt order; the sequence watermark
    /// always reflects the most recently received dispatch
    #[default]
    Ordered,
    /// Every frame is handled on its own task; handlers for back-to-back
    /// frames may run, and update the watermark, out of order
    Concurrent,
}

/// Configuration for a [`GatewayClient`](crate::core::client::GatewayClient)
///
/// Built by the type-state builder; every collaborator has a default.
pub struct ClientConfig {
    /// Identify payload (token, client properties, compression flag)
    pub(crate) handshake: Handshake,

    /// Applies to dialing, each handshake round-trip and every write
    pub(crate) timeout: Duration,

    /// Finds the address to dial before every attempt
    pub(crate) resolver: Arc<dyn GatewayResolver>,

    /// Opens the transport
    pub(crate) dialer: Arc<dyn Dialer>,

    /// Headers for the upgrade request
    pub(crate) headers: Arc<dyn HeaderProvider>,

    /// Sink for raw traffic and errors
    pub(crate) debugger: Arc<dyn Debugger>,

    pub(crate) dispatch_mode: DispatchMode,

    /// Restart when a heartbeat stays unacknowledged this long (None = never)
    pub(crate) heartbeat_ack_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn dispatch_mode(&self) -> DispatchMode {
        self.dispatch_mode
    }

    pub fn heartbeat_ack_timeout(&self) -> Option<Duration> {
        self.heartbeat_ack_timeout
    }

    pub fn debugger(&self) -> &dyn Debugger {
        self.debugger.as_ref()
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("timeout", &self.timeout)
            .field("compress", &self.handshake.compress)
            .field("dispatch_mode", &self.dispatch_mode)
            .field("heartbeat_ack_timeout", &self.heartbeat_ack_timeout)
            .finish_non_exhaustive()
    }
}
