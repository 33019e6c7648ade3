//! # gatelink traits
//!
//! Pluggable collaborators and shared types used by the gateway client:
//!
//! - **GatewayResolver**: Find the WebSocket address before each dial
//! - **Dialer**: Open the WebSocket transport
//! - **HeaderProvider**: Headers sent with the upgrade request
//! - **ReconnectionStrategy**: Delay between reconnection attempts
//! - **Debugger**: Best-effort sink for raw traffic and errors
//! - **EventHandler**: Subscriber for named dispatch events
//!
//! ## Example
//!
//! ```rust,ignore
//! use gatelink::*;
//!
//! struct LocalGateway;
//!
//! #[async_trait::async_trait]
//! impl GatewayResolver for LocalGateway {
//!     async fn resolve(&self) -> Result<String> {
//!         Ok("ws://127.0.0.1:9000".to_string())
//!     }
//! }
//! ```

pub mod debug;
pub mod dialer;
pub mod error;
pub mod events;
pub mod headers;
pub mod reconnect;
pub mod resolver;

// Re-export commonly used types
pub use debug::{Debugger, NoDebugger, TracingDebugger};
pub use dialer::{Dialer, TungsteniteDialer, WsStream};
pub use error::{GatewayError, Result};
pub use events::{EventHandler, FnHandler, TypedHandler};
pub use headers::{HeaderProvider, Headers, NoHeaders, StaticHeaders};
pub use reconnect::{ExponentialBackoff, FixedDelay, NeverReconnect, ReconnectionStrategy};
pub use resolver::{GatewayResolver, HttpGatewayResolver, StaticGateway};
