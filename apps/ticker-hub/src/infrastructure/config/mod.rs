//! Configuration Module
//!
//! Environment-driven settings for the hub server and the viewer.

mod settings;

pub use settings::{
    ConfigError, RelayConfig, ServerSettings, UpstreamSettings, ViewerConfig,
    DEFAULT_UPSTREAM_URL,
};
