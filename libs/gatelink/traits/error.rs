use thiserror::Error;

/// Close codes after which reconnecting cannot help.
///
/// 4004 is an authentication failure, 4010-4014 reject the shard, API
/// version or intents carried by the identify payload.
pub const FATAL_CLOSE_CODES: [u16; 6] = [4004, 4010, 4011, 4012, 4013, 4014];

/// Close code sent by the gateway when the token is rejected
pub const AUTHENTICATION_FAILED_CODE: u16 = 4004;

/// Main error type for gatelink
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Connection closed by the remote end
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The gateway rejected our credentials
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The gateway closed the connection with a non-recoverable code
    #[error("Connection rejected with code {code}: {reason}")]
    Rejected { code: u16, reason: String },

    /// Unexpected opcode, event or shape
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Envelope or event payload could not be (de)serialized
    #[error("Parse error: {0}")]
    Parse(String),

    /// Outbound envelope could not be serialized
    #[error("Encode error: {0}")]
    Encode(String),

    /// Frame could not be inflated
    #[error("Compression error: {0}")]
    Compression(String),

    /// Gateway endpoint lookup failed
    #[error("Gateway resolution failed: {0}")]
    Resolve(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The server invalidated our session
    #[error("Invalid session detected")]
    InvalidSession,

    /// A heartbeat went unacknowledged for too long
    #[error("Heartbeat not acknowledged within {0:?}")]
    HeartbeatTimeout(std::time::Duration),

    /// Reconnection strategy gave up
    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectionFailed { attempts: usize },

    /// A subscriber failed to handle an event
    #[error("Error dispatching event: {0}")]
    Dispatch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The client has been closed
    #[error("Client is closed")]
    Closed,

    /// Recoverable failure; the client is reconnecting
    #[error("Reconnecting due to: {0}")]
    Disruption(Box<GatewayError>),

    /// Unrecoverable failure; the client stopped for good
    #[error("Fatal error: {0}")]
    Fatal(Box<GatewayError>),
}

impl GatewayError {
    /// Build the error for a close frame received from the gateway
    pub fn from_close(code: u16, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if code == AUTHENTICATION_FAILED_CODE {
            GatewayError::AuthenticationFailed(reason)
        } else if FATAL_CLOSE_CODES.contains(&code) {
            GatewayError::Rejected { code, reason }
        } else {
            GatewayError::ConnectionClosed(format!("code {}: {}", code, reason))
        }
    }

    /// Whether reconnecting after this error is pointless
    pub fn is_fatal(&self) -> bool {
        match self {
            GatewayError::AuthenticationFailed(_)
            | GatewayError::Rejected { .. }
            | GatewayError::ReconnectionFailed { .. }
            | GatewayError::Encode(_)
            | GatewayError::Fatal(_) => true,
            _ => false,
        }
    }

    /// Strip the Disruption/Fatal wrapper, if any
    pub fn cause(&self) -> &GatewayError {
        match self {
            GatewayError::Disruption(inner) | GatewayError::Fatal(inner) => inner.cause(),
            other => other,
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for GatewayError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        GatewayError::WebSocket(e.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::Parse(e.to_string())
    }
}

/// Result type for gatelink operations
pub type Result<T> = std::result::Result<T, GatewayError>;
