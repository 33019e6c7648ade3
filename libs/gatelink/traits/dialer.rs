use crate::error::{GatewayError, Result};
use crate::headers::Headers;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

/// The transport produced by a [`Dialer`]
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Trait for opening the WebSocket transport
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Open a WebSocket to `url`, sending `headers` with the upgrade request
    async fn dial(&self, url: &str, headers: &Headers) -> Result<WsStream>;
}

/// Dials with tokio-tungstenite, bounded by a timeout
#[derive(Debug, Clone)]
pub struct TungsteniteDialer {
    timeout: Duration,
}

impl TungsteniteDialer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Dialer for TungsteniteDialer {
    async fn dial(&self, url: &str, headers: &Headers) -> Result<WsStream> {
        let mut request = url
            .into_client_request()
            .map_err(|e| GatewayError::WebSocket(format!("Invalid gateway URL {}: {}", url, e)))?;

        for (key, value) in headers {
            match (
                key.parse::<http::header::HeaderName>(),
                value.parse::<http::header::HeaderValue>(),
            ) {
                (Ok(name), Ok(value)) => {
                    request.headers_mut().insert(name, value);
                }
                (Err(_), _) => warn!("Invalid header name: {}", key),
                (_, Err(_)) => warn!("Invalid header value for key '{}': {}", key, value),
            }
        }

        debug!(url, headers = headers.len(), "Dialing gateway");
        match tokio::time::timeout(self.timeout, connect_async(request)).await {
            Ok(Ok((stream, _response))) => Ok(stream),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(GatewayError::Timeout(format!("dialing {}", url))),
        }
    }
}
