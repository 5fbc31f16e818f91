//! Completion façade over the provider registry
//!
//! The active adapter is resolved once per service and cached until the
//! service is reconfigured.

use std::sync::{Arc, OnceLock};

use quill_config::Config;

use crate::error::LlmError;
use crate::provider::inert::InertProvider;
use crate::provider::{ConnectionReport, ModelValidation, Provider};
use crate::registry::{ProviderRegistry, Registration};
use crate::selector::{ChangeSignals, ModelRecommendation, ModelSelector};
use crate::types::{CallContext, CompletionRequest, CompletionResponse};

/// Entry point for callers that need completions
pub struct LlmService {
    registry: ProviderRegistry,
    active: OnceLock<Arc<dyn Provider>>,
}

impl LlmService {
    pub fn new(config: &Config) -> Self {
        Self {
            registry: ProviderRegistry::load_adapters(config),
            active: OnceLock::new(),
        }
    }

    /// Rebuild the registry from a new configuration and forget the cached resolution
    pub fn reconfigure(&mut self, config: &Config) {
        self.registry = ProviderRegistry::load_adapters(config);
        self.active = OnceLock::new();
        tracing::info!("provider configuration reloaded");
    }

    /// Adapter serving calls, resolved on first use
    pub fn active_provider(&self) -> Arc<dyn Provider> {
        Arc::clone(self.active.get_or_init(|| {
            let active = self.registry.resolve_active();
            tracing::info!(provider = %active.name(), model = %active.default_model(), "resolved active provider");
            active
        }))
    }

    /// Whether a real backend is active
    pub fn is_available(&self) -> bool {
        self.active_provider().name() != InertProvider::NAME
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.registry.registrations()
    }

    /// Run a completion on the active adapter
    pub async fn complete(&self, request: &CompletionRequest, context: &CallContext) -> Result<CompletionResponse, LlmError> {
        let active = self.active_provider();
        if active.name() == InertProvider::NAME {
            return Err(LlmError::NoProviderAvailable);
        }
        active.complete(request, context).await
    }

    /// Model recommendation from the active adapter, `None` without one
    pub fn recommend_model(&self, signals: &ChangeSignals) -> Option<ModelRecommendation> {
        ModelSelector::new(self.active_provider()).recommend(signals)
    }

    pub async fn validate_model(&self, model: &str, context: &CallContext) -> ModelValidation {
        self.active_provider().validate_model(model, context).await
    }

    pub async fn test_connection(&self, context: &CallContext) -> ConnectionReport {
        self.active_provider().test_connection(context).await
    }
}
