//! Wire envelope and handshake payloads
//!
//! Every frame on the gateway is a single JSON object:
//!
//! ```text
//! { "op": <int>, "d": <any>, "s": <uint, dispatch only>, "t": <string, dispatch only> }
//! ```

use crate::traits::{GatewayError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::time::Duration;

/// Heartbeat interval used when the gateway never announces one
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(41_250);

/// Gateway operation code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Dispatch,
    Heartbeat,
    Identify,
    StatusUpdate,
    VoiceStateUpdate,
    VoicePing,
    Resume,
    Reconnect,
    RequestGuildMembers,
    InvalidSession,
    Hello,
    HeartbeatAck,
    /// An opcode this client does not know about
    Other(u8),
}

impl From<u8> for Operation {
    fn from(op: u8) -> Self {
        match op {
            0 => Operation::Dispatch,
            1 => Operation::Heartbeat,
            2 => Operation::Identify,
            3 => Operation::StatusUpdate,
            4 => Operation::VoiceStateUpdate,
            5 => Operation::VoicePing,
            6 => Operation::Resume,
            7 => Operation::Reconnect,
            8 => Operation::RequestGuildMembers,
            9 => Operation::InvalidSession,
            10 => Operation::Hello,
            11 => Operation::HeartbeatAck,
            other => Operation::Other(other),
        }
    }
}

impl From<Operation> for u8 {
    fn from(op: Operation) -> Self {
        match op {
            Operation::Dispatch => 0,
            Operation::Heartbeat => 1,
            Operation::Identify => 2,
            Operation::StatusUpdate => 3,
            Operation::VoiceStateUpdate => 4,
            Operation::VoicePing => 5,
            Operation::Resume => 6,
            Operation::Reconnect => 7,
            Operation::RequestGuildMembers => 8,
            Operation::InvalidSession => 9,
            Operation::Hello => 10,
            Operation::HeartbeatAck => 11,
            Operation::Other(other) => other,
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8((*self).into())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        u8::deserialize(deserializer).map(Operation::from)
    }
}

/// The wire envelope, shared by inbound and outbound frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(rename = "op")]
    pub operation: Operation,

    #[serde(rename = "d", default)]
    pub data: Value,

    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,

    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl Payload {
    /// Outbound envelope: operation and data only
    pub fn new(operation: Operation, data: Value) -> Self {
        Self {
            operation,
            data,
            sequence: None,
            event: None,
        }
    }

    /// Outbound envelope from any serializable value
    pub fn from_data<T: Serialize + ?Sized>(operation: Operation, data: &T) -> Result<Self> {
        let data = serde_json::to_value(data).map_err(|e| GatewayError::Encode(e.to_string()))?;
        Ok(Self::new(operation, data))
    }

    /// Heartbeat carrying the sequence watermark (null until one is observed)
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self::new(Operation::Heartbeat, sequence.map_or(Value::Null, Value::from))
    }
}

/// An inbound envelope, classified by operation
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// A named event, optionally sequenced
    Dispatch {
        sequence: Option<u64>,
        event: String,
        data: Value,
    },
    /// The server asks for an immediate heartbeat
    Heartbeat,
    /// The server asks us to reconnect
    Reconnect,
    /// The session is no longer valid
    InvalidSession { resumable: bool },
    /// Server greeting
    Hello { heartbeat_interval: Duration },
    /// Acknowledgement of our last heartbeat
    HeartbeatAck,
    /// Anything else, kept as-is
    Unknown(Payload),
}

impl TryFrom<Payload> for Frame {
    type Error = GatewayError;

    fn try_from(payload: Payload) -> Result<Self> {
        match payload.operation {
            Operation::Dispatch => {
                let event = payload.event.ok_or_else(|| {
                    GatewayError::Protocol("dispatch without event name".to_string())
                })?;
                Ok(Frame::Dispatch {
                    sequence: payload.sequence,
                    event,
                    data: payload.data,
                })
            }
            Operation::Heartbeat => Ok(Frame::Heartbeat),
            Operation::Reconnect => Ok(Frame::Reconnect),
            Operation::InvalidSession => Ok(Frame::InvalidSession {
                resumable: payload.data.as_bool().unwrap_or(false),
            }),
            Operation::Hello => {
                let hello = Hello::deserialize(&payload.data)
                    .map_err(|e| GatewayError::Protocol(format!("malformed hello: {}", e)))?;
                Ok(Frame::Hello {
                    heartbeat_interval: Duration::from_millis(hello.heartbeat_interval),
                })
            }
            Operation::HeartbeatAck => Ok(Frame::HeartbeatAck),
            _ => Ok(Frame::Unknown(payload)),
        }
    }
}

/// Client properties sent with Identify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeProperties {
    #[serde(rename = "$os")]
    pub os: String,
    #[serde(rename = "$browser")]
    pub browser: String,
    #[serde(rename = "$device", default)]
    pub device: String,
    #[serde(rename = "$referrer", default)]
    pub referrer: String,
    #[serde(rename = "$referring_domain", default)]
    pub referring_domain: String,
}

impl Default for HandshakeProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: concat!("gatelink ", env!("CARGO_PKG_VERSION")).to_string(),
            device: String::new(),
            referrer: String::new(),
            referring_domain: String::new(),
        }
    }
}

/// Identify payload for a new session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Handshake {
    pub token: String,
    pub properties: HandshakeProperties,
    pub compress: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub large_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub shard: Option<[u32; 2]>,
}

impl Handshake {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            properties: HandshakeProperties::default(),
            compress: true,
            large_threshold: None,
            shard: None,
        }
    }
}

/// Resume payload for an existing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub token: String,
    pub session_id: String,
    pub seq: u64,
}

/// Payload of the READY event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Ready {
    pub session_id: String,
    #[serde(default)]
    pub heartbeat_interval: Option<u64>,
    #[serde(rename = "v", default)]
    pub version: Option<u32>,
}

/// Payload of the RESUMED event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Resumed {
    #[serde(default)]
    pub heartbeat_interval: Option<u64>,
}

/// Payload of the Hello frame
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hello {
    pub heartbeat_interval: u64,
}
