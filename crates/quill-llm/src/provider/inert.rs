//! Sentinel adapter used when no backend is configured

use async_trait::async_trait;

use super::{ConnectionReport, ModelValidation, Provider};
use crate::capabilities::CapabilityRule;
use crate::error::LlmError;
use crate::fallback::ModelFallbacks;
use crate::retry::RetryPolicy;
use crate::selector::{Threshold, TierModels, TierTable};
use crate::types::{CallContext, CompletionRequest, CompletionResponse};

/// Reports unavailability from every operation instead of failing hard
pub struct InertProvider {
    tiers: TierTable,
    fallbacks: ModelFallbacks,
    retry: RetryPolicy,
}

impl InertProvider {
    pub const NAME: &'static str = "none";

    pub fn new() -> Self {
        Self {
            tiers: TierTable {
                large: Threshold::new(usize::MAX, usize::MAX),
                medium: Threshold::new(usize::MAX, usize::MAX),
                models: TierModels::uniform(""),
            },
            fallbacks: ModelFallbacks::new(&[], ""),
            retry: RetryPolicy {
                max_retries: 0,
                ..RetryPolicy::default()
            },
        }
    }
}

impl Default for InertProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Provider for InertProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_configured(&self) -> bool {
        false
    }

    fn required_config(&self) -> &'static [&'static str] {
        &[]
    }

    fn default_model(&self) -> &str {
        ""
    }

    fn capability_rules(&self) -> &'static [CapabilityRule] {
        &[]
    }

    fn tier_table(&self) -> &TierTable {
        &self.tiers
    }

    fn fallbacks(&self) -> &ModelFallbacks {
        &self.fallbacks
    }

    fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn dispatch(
        &self,
        _request: &CompletionRequest,
        _model: &str,
        _context: &CallContext,
    ) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::NoProviderAvailable)
    }

    async fn complete(&self, _request: &CompletionRequest, _context: &CallContext) -> Result<CompletionResponse, LlmError> {
        Err(LlmError::NoProviderAvailable)
    }

    async fn validate_model(&self, model: &str, _context: &CallContext) -> ModelValidation {
        ModelValidation::from_outcome(self, model, Err(LlmError::NoProviderAvailable))
    }

    async fn test_connection(&self, _context: &CallContext) -> ConnectionReport {
        ConnectionReport::from_outcome(self, "", Err(LlmError::NoProviderAvailable))
    }
}
