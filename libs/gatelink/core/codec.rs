//! Payload codec
//!
//! Frames whose first byte is neither `{` nor `[` are zlib-compressed as a
//! whole and inflated before parsing. Outbound frames are always plain JSON.

use crate::core::model::Payload;
use crate::traits::{Debugger, GatewayError, Result};
use flate2::read::ZlibDecoder;
use std::borrow::Cow;
use std::io::Read;

/// Whether `raw` must be inflated before it can be parsed
#[inline]
pub fn is_compressed(raw: &[u8]) -> bool {
    !matches!(raw.first(), None | Some(b'{') | Some(b'['))
}

/// Inflate a zlib-compressed frame
pub fn inflate(raw: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(raw.len() * 4);
    ZlibDecoder::new(raw)
        .read_to_end(&mut out)
        .map_err(|e| GatewayError::Compression(e.to_string()))?;
    Ok(out)
}

/// Decode an inbound frame into an envelope
pub fn decode(raw: &[u8], debugger: &dyn Debugger) -> Result<Payload> {
    let bytes: Cow<'_, [u8]> = if is_compressed(raw) {
        Cow::Owned(inflate(raw)?)
    } else {
        Cow::Borrowed(raw)
    };

    debugger.incoming(&bytes);

    serde_json::from_slice(&bytes).map_err(|e| GatewayError::Parse(format!("envelope: {}", e)))
}

/// Encode an outbound envelope
pub fn encode(payload: &Payload, debugger: &dyn Debugger) -> Result<String> {
    let text = serde_json::to_string(payload).map_err(|e| GatewayError::Encode(e.to_string()))?;
    debugger.outgoing(text.as_bytes());
    Ok(text)
}
