//! Configuration for the quill provider core
//!
//! A [`Config`] is an explicit value handed to the provider registry. It is
//! built from TOML text (with `{{ env.VAR }}` placeholders) or from a snapshot
//! of the process environment; nothing here touches the filesystem.

#![allow(clippy::must_use_candidate)]

mod env;
mod environment;
mod loader;
pub mod logging;
pub mod providers;
pub mod retry;

use serde::Deserialize;

pub use logging::{LogFormat, LoggingConfig};
pub use providers::*;
pub use retry::RetryConfig;

/// Default per-request timeout in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Top-level quill configuration
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Provider to prefer when it is configured
    #[serde(default)]
    pub preferred_provider: Option<String>,
    /// Timeout applied to every vendor request
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    /// Rate-limit backoff tuning
    #[serde(default)]
    pub retry: RetryConfig,
    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Per-backend credentials and endpoints
    #[serde(default)]
    pub providers: ProvidersConfig,
}

impl Config {
    /// Effective request timeout
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS))
    }
}
