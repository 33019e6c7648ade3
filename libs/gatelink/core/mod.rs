//! # gatelink core
//!
//! The client and everything it runs on:
//!
//! - **supervisor**: generation slot, restart loop and connection setup
//! - **handshake**: Identify / Resume with invalid-session fallback
//! - **pumps**: per-connection read and write tasks, heartbeats
//! - **dispatcher**: ordered or concurrent routing of inbound frames
//! - **queue**: pending messages, forked across reconnects
//! - **codec**: JSON envelopes, zlib detection
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatelink::*;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = gatelink::builder()
//!         .token(std::env::var("GATELINK_TOKEN").unwrap_or_default())
//!         .reconnect_strategy(ExponentialBackoff::new(
//!             Duration::from_secs(1),
//!             Duration::from_secs(60),
//!             None, // unlimited retries
//!         ))
//!         .build()
//!         .await?;
//!
//!     client.on(events::handler("MESSAGE_CREATE", |data| {
//!         println!("{}", data);
//!         Ok(())
//!     }));
//!
//!     client
//!         .send(Operation::StatusUpdate, &serde_json::json!({"idle_since": null, "game": null}))
//!         .await?;
//!
//!     while let Ok(err) = client.errors().recv() {
//!         println!("gateway error: {}", err);
//!     }
//!     Ok(())
//! }
//! ```

pub mod ack_tracker;
pub mod builder;
pub mod client;
pub mod codec;
pub mod config;
pub mod connection_state;
pub(crate) mod dispatcher;
pub mod emitter;
pub mod generation;
pub mod handshake;
pub mod model;
pub(crate) mod pumps;
pub mod queue;
pub(crate) mod supervisor;

// Re-export main types
pub use ack_tracker::AckTracker;
pub use builder::{states, GatewayClientBuilder};
pub use client::{GatewayClient, Metrics};
pub use config::{ClientConfig, DispatchMode, DEFAULT_TIMEOUT};
pub use connection_state::{AtomicConnectionState, AtomicMetrics, ConnectionState};
pub use emitter::{Emitter, HandlerId};
pub use model::{
    Frame, Handshake, HandshakeProperties, Operation, Payload, Ready, ResumeRequest, Resumed,
    DEFAULT_HEARTBEAT_INTERVAL,
};

/// Create a new gateway client builder
///
/// # Example
/// ```ignore
/// let client = gatelink::builder()
///     .token("my-token")
///     .heartbeat_ack_timeout(Duration::from_secs(60))
///     .build()
///     .await?;
/// ```
pub fn builder() -> GatewayClientBuilder<builder::states::NoToken> {
    GatewayClientBuilder::new()
}
