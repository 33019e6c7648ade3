pub mod states;

use crate::core::client::GatewayClient;
use crate::core::config::{ClientConfig, DispatchMode, DEFAULT_TIMEOUT};
use crate::core::model::{Handshake, HandshakeProperties};
use crate::traits::resolver::DEFAULT_API_BASE;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`GatewayClient`]
///
/// The token must be set before the client can be built; everything else
/// falls back to a default:
///
/// - resolver: `GET https://discordapp.com/api/gateway`
/// - dialer: tokio-tungstenite, bounded by the timeout
/// - timeout: 10 seconds
/// - reconnect strategy: [`ExponentialBackoff::default`]
/// - dispatch: ordered
pub struct GatewayClientBuilder<T>
where
    T: TokenState,
{
    _state: TypeState<T>,
    token: String,
    properties: Option<HandshakeProperties>,
    compress: bool,
    large_threshold: Option<u32>,
    shard: Option<[u32; 2]>,
    timeout: Duration,
    api_base: Option<String>,
    resolver: Option<Arc<dyn GatewayResolver>>,
    dialer: Option<Arc<dyn Dialer>>,
    headers: Option<Arc<dyn HeaderProvider>>,
    debugger: Option<Arc<dyn Debugger>>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    dispatch_mode: DispatchMode,
    heartbeat_ack_timeout: Option<Duration>,
}

impl GatewayClientBuilder<NoToken> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            token: String::new(),
            properties: None,
            compress: true,
            large_threshold: None,
            shard: None,
            timeout: DEFAULT_TIMEOUT,
            api_base: None,
            resolver: None,
            dialer: None,
            headers: None,
            debugger: None,
            reconnect_strategy: None,
            dispatch_mode: DispatchMode::default(),
            heartbeat_ack_timeout: None,
        }
    }

    /// Authentication token sent with Identify and Resume
    pub fn token(self, token: impl Into<String>) -> GatewayClientBuilder<HasToken> {
        GatewayClientBuilder {
            _state: TypeState::new(),
            token: token.into(),
            properties: self.properties,
            compress: self.compress,
            large_threshold: self.large_threshold,
            shard: self.shard,
            timeout: self.timeout,
            api_base: self.api_base,
            resolver: self.resolver,
            dialer: self.dialer,
            headers: self.headers,
            debugger: self.debugger,
            reconnect_strategy: self.reconnect_strategy,
            dispatch_mode: self.dispatch_mode,
            heartbeat_ack_timeout: self.heartbeat_ack_timeout,
        }
    }
}

impl Default for GatewayClientBuilder<NoToken> {
    fn default() -> Self {
        Self::new()
    }
}

// Optional configuration methods
impl<T> GatewayClientBuilder<T>
where
    T: TokenState,
{
    /// Client properties sent with Identify
    pub fn properties(mut self, properties: HandshakeProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Ask the gateway to compress payloads (default: true)
    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = Some(threshold);
        self
    }

    /// Identify as shard `id` of `count`
    pub fn shard(mut self, id: u32, count: u32) -> Self {
        self.shard = Some([id, count]);
        self
    }

    /// Bound for dialing, each handshake round-trip and every write
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// REST base for the default HTTP resolver
    ///
    /// Ignored when a resolver or fixed gateway URL is set.
    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = Some(base.into());
        self
    }

    /// Skip discovery and always dial `url`
    pub fn gateway_url(mut self, url: impl Into<String>) -> Self {
        self.resolver = Some(Arc::new(StaticGateway::new(url)));
        self
    }

    pub fn resolver(mut self, resolver: impl GatewayResolver + 'static) -> Self {
        self.resolver = Some(Arc::new(resolver));
        self
    }

    pub fn dialer(mut self, dialer: impl Dialer + 'static) -> Self {
        self.dialer = Some(Arc::new(dialer));
        self
    }

    pub fn headers(mut self, provider: impl HeaderProvider + 'static) -> Self {
        self.headers = Some(Arc::new(provider));
        self
    }

    pub fn debugger(mut self, debugger: impl Debugger + 'static) -> Self {
        self.debugger = Some(Arc::new(debugger));
        self
    }

    pub fn reconnect_strategy(mut self, strategy: impl ReconnectionStrategy + 'static) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }

    pub fn dispatch_mode(mut self, mode: DispatchMode) -> Self {
        self.dispatch_mode = mode;
        self
    }

    /// Restart the connection when a heartbeat goes unacknowledged this long
    ///
    /// Recommended value: somewhat more than the heartbeat interval. Without
    /// it, a half-open connection is only noticed when a write fails.
    pub fn heartbeat_ack_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_ack_timeout = Some(timeout);
        self
    }
}

// Build method - only available once the token is set
impl GatewayClientBuilder<HasToken> {
    pub(crate) fn into_parts(self) -> Result<(ClientConfig, Box<dyn ReconnectionStrategy>)> {
        if self.token.trim().is_empty() {
            return Err(GatewayError::Configuration("token must not be empty".to_string()));
        }
        if self.timeout.is_zero() {
            return Err(GatewayError::Configuration("timeout must be positive".to_string()));
        }

        let resolver: Arc<dyn GatewayResolver> = match self.resolver {
            Some(resolver) => resolver,
            None => {
                let base = self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE);
                Arc::new(HttpGatewayResolver::new(base, self.timeout)?)
            }
        };

        let mut handshake = Handshake::new(self.token);
        handshake.properties = self.properties.unwrap_or_default();
        handshake.compress = self.compress;
        handshake.large_threshold = self.large_threshold;
        handshake.shard = self.shard;

        let reconnect_strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(ExponentialBackoff::default()));

        let config = ClientConfig {
            handshake,
            timeout: self.timeout,
            resolver,
            dialer: self
                .dialer
                .unwrap_or_else(|| Arc::new(TungsteniteDialer::new(self.timeout))),
            headers: self.headers.unwrap_or_else(|| Arc::new(NoHeaders)),
            debugger: self.debugger.unwrap_or_else(|| Arc::new(NoDebugger)),
            dispatch_mode: self.dispatch_mode,
            heartbeat_ack_timeout: self.heartbeat_ack_timeout,
        };

        Ok((config, reconnect_strategy))
    }

    /// Build the client and start connecting in the background
    ///
    /// Must be called within a Tokio runtime. Returns as soon as the first
    /// attempt has been scheduled; connection progress is visible through
    /// [`GatewayClient::connection_state`] and the error stream.
    pub async fn build(self) -> Result<GatewayClient> {
        let (config, reconnect_strategy) = self.into_parts()?;
        let client = GatewayClient::new(config, reconnect_strategy);
        client.start();
        Ok(client)
    }
}
