//! Event subscription
//!
//! Subscribers are keyed by the `t` field of dispatch envelopes. A handler
//! receives the raw `d` payload; [`typed`] wraps a closure so the payload is
//! decoded with serde first.
//!
//! ```ignore
//! client.on(gatelink::events::typed("MESSAGE_CREATE", |msg: MyMessage| {
//!     println!("{}", msg.content);
//! }));
//! ```

use crate::core::model::{Ready, Resumed};
use crate::error::{GatewayError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Event name of the new-session handshake response
pub const READY: &str = "READY";

/// Event name of the resume handshake response
pub const RESUMED: &str = "RESUMED";

/// Handler for one named gateway event
///
/// Handlers run on the client's dispatch worker (or a spawned task in
/// concurrent mode), so they should return quickly.
///
/// # Errors
/// An error is published on the client's error stream as a non-fatal
/// `Dispatch` error; the connection is left intact.
pub trait EventHandler: Send + Sync + 'static {
    /// The event name this handler subscribes to
    fn event(&self) -> &str;

    /// Handle one occurrence of the event
    fn handle(&self, data: &Value) -> Result<()>;
}

/// Handler backed by a closure over the raw payload
pub struct FnHandler<F> {
    event: String,
    f: F,
}

impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
{
    fn event(&self) -> &str {
        &self.event
    }

    fn handle(&self, data: &Value) -> Result<()> {
        (self.f)(data)
    }
}

/// Subscribe a closure to the raw payload of `event`
pub fn handler<F>(event: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(&Value) -> Result<()> + Send + Sync + 'static,
{
    FnHandler {
        event: event.into(),
        f,
    }
}

/// Handler that decodes the payload into `T` before calling the closure
pub struct TypedHandler<T, F> {
    event: String,
    f: F,
    _payload: PhantomData<fn() -> T>,
}

impl<T, F> EventHandler for TypedHandler<T, F>
where
    T: DeserializeOwned + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    fn event(&self) -> &str {
        &self.event
    }

    fn handle(&self, data: &Value) -> Result<()> {
        let payload = T::deserialize(data).map_err(|e| {
            GatewayError::Parse(format!("{} payload: {}", self.event, e))
        })?;
        (self.f)(payload);
        Ok(())
    }
}

/// Subscribe a closure to the decoded payload of `event`
pub fn typed<T, F>(event: impl Into<String>, f: F) -> TypedHandler<T, F>
where
    T: DeserializeOwned + 'static,
    F: Fn(T) + Send + Sync + 'static,
{
    TypedHandler {
        event: event.into(),
        f,
        _payload: PhantomData,
    }
}

/// Subscribe to the READY event
pub fn ready<F>(f: F) -> TypedHandler<Ready, F>
where
    F: Fn(Ready) + Send + Sync + 'static,
{
    typed(READY, f)
}

/// Subscribe to the RESUMED event
pub fn resumed<F>(f: F) -> TypedHandler<Resumed, F>
where
    F: Fn(Resumed) + Send + Sync + 'static,
{
    typed(RESUMED, f)
}
