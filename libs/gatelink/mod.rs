//! # gatelink
//!
//! A resilient client for Discord-style gateway websockets.
//!
//! ## Features
//!
//! - **Self-healing sessions**: reconnects with backoff and resumes where the gateway allows
//! - **No lost messages**: sends made while disconnected are queued and delivered exactly once
//! - **Single restart per failure**: generations are swapped by compare-and-swap
//! - **Heartbeats**: carry the last sequence number, with optional zombie detection
//! - **Typed errors**: disruptions and fatal errors are told apart on one error stream

pub mod traits;
pub mod core;

// Re-export all traits
pub use traits::*;

// Re-export core client functionality
pub use self::core::{
    builder, client, codec, config, connection_state, model,
    builder::{states, GatewayClientBuilder},
    client::{GatewayClient, Metrics},
    config::{ClientConfig, DispatchMode},
    connection_state::ConnectionState,
    emitter::HandlerId,
    model::{Handshake, HandshakeProperties, Operation, Payload},
};

/// Type alias for Result with GatewayError
pub type Result<T> = std::result::Result<T, traits::GatewayError>;
