use thiserror::Error;

/// Errors surfaced by adapters, the registry and the completion service
#[derive(Debug, Error)]
pub enum LlmError {
    /// Adapter lacks the credentials or endpoint it needs
    #[error("provider not configured: {provider}")]
    NotConfigured { provider: String },

    /// Requested model is not served by the backend
    #[error("model not found: {model} (try: {})", alternatives.join(", "))]
    ModelNotFound {
        model: String,
        /// Suggested replacements, best first; never empty
        alternatives: Vec<String>,
    },

    /// Backend kept rejecting the call for quota reasons
    #[error("rate limit exceeded")]
    RateLimited {
        /// Seconds the backend asked to wait, when it said so
        retry_after: Option<u64>,
    },

    /// Any other backend failure, vendor message preserved
    #[error("upstream error: {0}")]
    Upstream(String),

    /// No adapter is configured
    #[error("no provider available")]
    NoProviderAvailable,

    /// Caller cancelled the call
    #[error("request cancelled")]
    Cancelled,

    /// Unexpected internal error
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl LlmError {
    /// Whether the error is a transient quota rejection
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Whether the caller should treat the feature as unavailable rather than failed
    pub const fn is_unavailable(&self) -> bool {
        matches!(self, Self::NotConfigured { .. } | Self::NoProviderAvailable)
    }
}
