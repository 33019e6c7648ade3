//! Settings for the gateway binaries
//!
//! Loaded from an optional YAML file, then overridden from the
//! environment:
//!
//! ```yaml
//! token: "..."                 # or GATELINK_TOKEN
//! gateway_url: wss://...       # or GATELINK_GATEWAY_URL; skips discovery
//! api_base: https://discordapp.com/api
//! timeout_ms: 10000            # or GATELINK_TIMEOUT_MS
//! heartbeat_ack_timeout_ms: 60000
//! compress: true
//! dispatch: ordered            # or concurrent
//! events: [READY, RESUMED, MESSAGE_CREATE]
//! reconnect:
//!   initial_ms: 500
//!   max_ms: 10000
//!   max_attempts: ~
//! ```

use anyhow::{bail, Context, Result};
use gatelink::states::HasToken;
use gatelink::{DispatchMode, ExponentialBackoff, GatewayClientBuilder};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const TOKEN_VAR: &str = "GATELINK_TOKEN";
pub const GATEWAY_URL_VAR: &str = "GATELINK_GATEWAY_URL";
pub const TIMEOUT_VAR: &str = "GATELINK_TIMEOUT_MS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchSetting {
    #[default]
    Ordered,
    Concurrent,
}

impl From<DispatchSetting> for DispatchMode {
    fn from(setting: DispatchSetting) -> Self {
        match setting {
            DispatchSetting::Ordered => DispatchMode::Ordered,
            DispatchSetting::Concurrent => DispatchMode::Concurrent,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_ms: u64,
    pub max_ms: u64,
    pub max_attempts: Option<usize>,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        Self {
            initial_ms: 500,
            max_ms: 10_000,
            max_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub token: Option<String>,
    pub gateway_url: Option<String>,
    pub api_base: Option<String>,
    pub timeout_ms: u64,
    pub heartbeat_ack_timeout_ms: Option<u64>,
    pub compress: bool,
    pub dispatch: DispatchSetting,
    /// Events the tail binary logs
    pub events: Vec<String>,
    pub reconnect: ReconnectSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            token: None,
            gateway_url: None,
            api_base: None,
            timeout_ms: 10_000,
            heartbeat_ack_timeout_ms: None,
            compress: true,
            dispatch: DispatchSetting::default(),
            events: vec![
                "READY".to_string(),
                "RESUMED".to_string(),
                "MESSAGE_CREATE".to_string(),
            ],
            reconnect: ReconnectSettings::default(),
        }
    }
}

impl Settings {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml).context("invalid settings YAML")
    }

    /// Read `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No settings file, using defaults");
            return Ok(Self::default());
        }
        let yaml = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_yaml_str(&yaml).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply overrides looked up by variable name
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(token) = lookup(TOKEN_VAR) {
            self.token = Some(token);
        }
        if let Some(url) = lookup(GATEWAY_URL_VAR) {
            self.gateway_url = Some(url);
        }
        if let Some(timeout) = lookup(TIMEOUT_VAR) {
            self.timeout_ms = timeout
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of milliseconds", TIMEOUT_VAR))?;
        }
        Ok(self)
    }

    /// Load from the configured path and apply environment overrides
    pub fn from_env() -> Result<Self> {
        let path = super::load_config_from_env(super::ConfigType::Gateway);
        Self::load(&path)?.with_overrides(|name| std::env::var(name).ok())
    }

    /// Client builder carrying these settings
    pub fn client_builder(&self) -> Result<GatewayClientBuilder<HasToken>> {
        let token = match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => bail!("no token configured; set {} or `token` in the settings file", TOKEN_VAR),
        };
        if self.reconnect.initial_ms == 0 || self.reconnect.max_ms < self.reconnect.initial_ms {
            bail!("reconnect.initial_ms must be positive and at most reconnect.max_ms");
        }

        let backoff = ExponentialBackoff::new(
            Duration::from_millis(self.reconnect.initial_ms),
            Duration::from_millis(self.reconnect.max_ms),
            self.reconnect.max_attempts,
        )
        .with_randomization_factor(1.0);

        let mut builder = gatelink::builder()
            .token(token)
            .timeout(Duration::from_millis(self.timeout_ms))
            .compress(self.compress)
            .dispatch_mode(self.dispatch.into())
            .reconnect_strategy(backoff);

        if let Some(ms) = self.heartbeat_ack_timeout_ms {
            builder = builder.heartbeat_ack_timeout(Duration::from_millis(ms));
        }
        if let Some(base) = &self.api_base {
            builder = builder.api_base(base.clone());
        }
        if let Some(url) = &self.gateway_url {
            builder = builder.gateway_url(url.clone());
        }
        Ok(builder)
    }
}
