use serde::Deserialize;

/// Rate-limit backoff settings shared by all adapters
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Delay before the first retry, doubled on every further attempt
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Retries after the initial attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_retries: default_max_retries(),
        }
    }
}

const fn default_base_delay_ms() -> u64 {
    1000
}

const fn default_max_retries() -> u32 {
    3
}
