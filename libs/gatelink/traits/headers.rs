use async_trait::async_trait;
use std::collections::HashMap;

/// HTTP headers to send with the WebSocket upgrade request
pub type Headers = HashMap<String, String>;

/// Trait for providing upgrade-request headers
///
/// Called on every dial, so reconnects can carry fresh values.
///
/// # Example
/// ```ignore
/// struct UserAgent(String);
///
/// #[async_trait::async_trait]
/// impl HeaderProvider for UserAgent {
///     async fn get_headers(&self) -> Headers {
///         let mut headers = Headers::new();
///         headers.insert("User-Agent".to_string(), self.0.clone());
///         headers
///     }
/// }
/// ```
#[async_trait]
pub trait HeaderProvider: Send + Sync {
    /// Generate headers for the next connection attempt
    async fn get_headers(&self) -> Headers;
}

/// A no-op header provider that doesn't add any headers
pub struct NoHeaders;

#[async_trait]
impl HeaderProvider for NoHeaders {
    async fn get_headers(&self) -> Headers {
        HashMap::new()
    }
}

/// The same set of headers on every connection
#[derive(Debug, Clone, Default)]
pub struct StaticHeaders(pub Headers);

impl StaticHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl HeaderProvider for StaticHeaders {
    async fn get_headers(&self) -> Headers {
        self.0.clone()
    }
}
