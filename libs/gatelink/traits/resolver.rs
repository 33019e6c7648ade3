use crate::error::{GatewayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Default REST base used to look up the gateway address
pub const DEFAULT_API_BASE: &str = "https://discordapp.com/api";

/// Query string appended to the resolved gateway address
pub const DEFAULT_GATEWAY_QUERY: &str = "v=6&encoding=json";

/// Trait for finding the WebSocket address to dial
///
/// Called before every connection attempt. A failure is treated as a
/// disruption: it is reported and retried after backoff.
#[async_trait]
pub trait GatewayResolver: Send + Sync {
    /// Resolve the gateway WebSocket URL
    async fn resolve(&self) -> Result<String>;
}

/// Always resolves to the same address
#[derive(Debug, Clone)]
pub struct StaticGateway {
    url: String,
}

impl StaticGateway {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl GatewayResolver for StaticGateway {
    async fn resolve(&self) -> Result<String> {
        Ok(self.url.clone())
    }
}

#[derive(Debug, Deserialize)]
struct GatewayResponse {
    url: String,
}

/// Looks the gateway up with `GET {base_url}/gateway`
#[derive(Debug, Clone)]
pub struct HttpGatewayResolver {
    client: reqwest::Client,
    base_url: String,
    query: Option<String>,
}

impl HttpGatewayResolver {
    /// Create a resolver against `base_url` whose requests time out after `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            query: Some(DEFAULT_GATEWAY_QUERY.to_string()),
        })
    }

    /// Replace the query appended to the resolved address (None = leave it as is)
    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/gateway", self.base_url.trim_end_matches('/'))
    }

    fn decorate(&self, url: String) -> String {
        match &self.query {
            Some(query) if !url.contains('?') => {
                format!("{}/?{}", url.trim_end_matches('/'), query)
            }
            _ => url,
        }
    }
}

#[async_trait]
impl GatewayResolver for HttpGatewayResolver {
    async fn resolve(&self) -> Result<String> {
        let response = self
            .client
            .get(self.endpoint())
            .send()
            .await
            .map_err(|e| GatewayError::Resolve(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GatewayError::Resolve(format!(
                "gateway lookup returned HTTP {}",
                status
            )));
        }

        let body: GatewayResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Resolve(e.to_string()))?;

        Ok(self.decorate(body.url))
    }
}
