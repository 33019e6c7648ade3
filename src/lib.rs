//! gatelink tools - binaries and shared utilities around the gatelink client
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (settings, logging)
//! - **gatelink**: Gateway client library (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use gatelink_tools::bin_common::{init_tracing, Settings};
//!
//! let settings = Settings::from_env()?;
//! let client = settings.client_builder()?.build().await?;
//! ```

// Re-export workspace libraries for convenience
pub use gatelink;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod logging;
    pub mod settings;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use logging::init_tracing;
    pub use settings::{DispatchSetting, ReconnectSettings, Settings};
}
