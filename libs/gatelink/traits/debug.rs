//! Debug sink for raw gateway traffic
//!
//! Every hook is best-effort: nothing the sink does can affect the
//! connection, and all methods default to no-ops.

use crate::error::GatewayError;
use tracing::trace;

/// Receives raw traffic and errors for inspection
pub trait Debugger: Send + Sync {
    /// A dial to `url` is about to start
    fn connecting(&self, _url: &str) {}

    /// An inbound frame, after decompression and before parsing
    fn incoming(&self, _raw: &[u8]) {}

    /// An outbound frame, right before it is written
    fn outgoing(&self, _raw: &[u8]) {}

    /// An error about to be published on the error stream
    fn error(&self, _err: &GatewayError) {}
}

/// Discards everything
pub struct NoDebugger;

impl Debugger for NoDebugger {}

/// Logs traffic through `tracing` at trace level
pub struct TracingDebugger;

impl Debugger for TracingDebugger {
    fn connecting(&self, url: &str) {
        trace!(url, "connecting to gateway");
    }

    fn incoming(&self, raw: &[u8]) {
        trace!("<- {}", String::from_utf8_lossy(raw));
    }

    fn outgoing(&self, raw: &[u8]) {
        trace!("-> {}", String::from_utf8_lossy(raw));
    }

    fn error(&self, err: &GatewayError) {
        trace!(error = %err, "gateway error");
    }
}
