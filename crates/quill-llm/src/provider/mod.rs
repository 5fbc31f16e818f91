//! Provider trait and the adapters for each LLM backend
//!
//! Adapters implement [`Provider::dispatch`], a single vendor call for a
//! concrete model. The shared [`Provider::complete`] wraps it with model id
//! checks, rate-limit backoff and a single fallback attempt.

pub mod anthropic;
pub mod azure;
pub mod gemini;
pub(crate) mod http;
pub mod inert;
pub mod ollama;
pub mod openai;
pub mod vertex;

use async_trait::async_trait;
use serde::Serialize;

use crate::capabilities::{CapabilityDescriptor, CapabilityRule, describe};
use crate::error::LlmError;
use crate::fallback::ModelFallbacks;
use crate::retry::RetryPolicy;
use crate::selector::{ChangeSignals, ModelRecommendation, TierTable};
use crate::types::{CallContext, CompletionRequest, CompletionResponse, Message};

/// Outcome of checking whether a backend serves a model
#[derive(Debug, Clone, Serialize)]
pub struct ModelValidation {
    /// Model that was checked
    pub model: String,
    /// Whether the backend accepted the model
    pub available: bool,
    /// Capabilities the adapter attributes to the model
    pub capabilities: CapabilityDescriptor,
    /// Suggested replacements when the model is unavailable
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<String>,
    /// Failure details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationError>,
}

/// Why a model failed validation
#[derive(Debug, Clone, Serialize)]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// The backend does not know the model
    ModelNotFound,
    /// Any other failure (auth, network, quota)
    ApiError,
}

impl ModelValidation {
    /// Build a validation result from the outcome of a lookup or probe
    pub fn from_outcome(provider: &(impl Provider + ?Sized), model: &str, outcome: Result<(), LlmError>) -> Self {
        let capabilities = provider.capabilities(model);

        let Err(error) = outcome else {
            return Self {
                model: model.to_owned(),
                available: true,
                capabilities,
                alternatives: Vec::new(),
                error: None,
            };
        };

        let message = error.to_string();
        let (kind, alternatives) = match error {
            LlmError::ModelNotFound { alternatives, .. } => (ValidationErrorKind::ModelNotFound, alternatives),
            _ if http::is_not_found_message(&message) => (
                ValidationErrorKind::ModelNotFound,
                provider.fallbacks().alternatives(model),
            ),
            _ => (ValidationErrorKind::ApiError, Vec::new()),
        };

        Self {
            model: model.to_owned(),
            available: false,
            capabilities,
            alternatives,
            error: Some(ValidationError { kind, message }),
        }
    }
}

/// Result of a diagnostic round trip against the default model
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub success: bool,
    pub provider: String,
    pub model: String,
    /// Backend version, where the backend reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Capabilities detected for the default model
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectionReport {
    pub fn from_outcome(
        provider: &(impl Provider + ?Sized),
        model: &str,
        outcome: Result<Option<String>, LlmError>,
    ) -> Self {
        let features = provider
            .capabilities(model)
            .features()
            .into_iter()
            .map(str::to_owned)
            .collect();

        let (success, version, error) = match outcome {
            Ok(version) => (true, version, None),
            Err(e) => (false, None, Some(e.to_string())),
        };

        Self {
            success,
            provider: provider.name().to_owned(),
            model: model.to_owned(),
            version,
            features,
            error,
        }
    }
}

/// Smallest request that proves a model answers
pub fn probe_request(model: &str) -> CompletionRequest {
    let mut request = CompletionRequest::new(vec![Message::user("ping")]).with_model(model);
    request.params.max_tokens = Some(1);
    request
}

/// Trait implemented by each LLM backend adapter
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable lowercase identifier
    fn name(&self) -> &str;

    /// Whether the credentials and endpoint the backend needs are present
    fn is_configured(&self) -> bool;

    /// Configuration keys the adapter reads
    fn required_config(&self) -> &'static [&'static str];

    /// Model used when a request names none
    fn default_model(&self) -> &str;

    /// Capability rules evaluated against model ids
    fn capability_rules(&self) -> &'static [CapabilityRule];

    /// Change-size recommendation table
    fn tier_table(&self) -> &TierTable;

    /// Replacement models offered when a model is rejected
    fn fallbacks(&self) -> &ModelFallbacks;

    /// Backoff applied to rate-limited calls
    fn retry_policy(&self) -> &RetryPolicy;

    /// One vendor call for a concrete model, without retry or fallback
    async fn dispatch(
        &self,
        request: &CompletionRequest,
        model: &str,
        context: &CallContext,
    ) -> Result<CompletionResponse, LlmError>;

    /// Capabilities of `model` on this backend; unknown models get none
    fn capabilities(&self, model: &str) -> CapabilityDescriptor {
        describe(self.capability_rules(), model)
    }

    /// Pick a model for a change of the given size
    fn recommend_model(&self, signals: &ChangeSignals) -> ModelRecommendation {
        self.tier_table().recommend(signals)
    }

    /// Run a completion
    ///
    /// Rate-limited calls are retried with backoff. A rejected model is
    /// replaced once by the best-ranked alternative. The response's `model`
    /// is the id that actually answered.
    async fn complete(&self, request: &CompletionRequest, context: &CallContext) -> Result<CompletionResponse, LlmError> {
        if !self.is_configured() {
            return Err(LlmError::NotConfigured {
                provider: self.name().to_owned(),
            });
        }

        let requested = request.model.as_deref().unwrap_or_else(|| self.default_model());

        match attempt(self, request, requested, context).await {
            Err(LlmError::ModelNotFound { model, alternatives }) => {
                match alternatives.first().filter(|alt| alt.as_str() != requested).cloned() {
                    Some(fallback) => {
                        tracing::warn!(
                            provider = %self.name(),
                            requested = %requested,
                            fallback = %fallback,
                            "model not found, retrying with fallback"
                        );
                        attempt(self, request, &fallback, context).await
                    }
                    None => Err(LlmError::ModelNotFound { model, alternatives }),
                }
            }
            other => other,
        }
    }

    /// Check that the backend serves `model`
    ///
    /// The default sends a one-token probe. Adapters with a model lookup
    /// endpoint override this. Cancelling the context aborts the check.
    async fn validate_model(&self, model: &str, context: &CallContext) -> ModelValidation {
        let outcome = if self.is_configured() {
            probe(self, model, context).await
        } else {
            Err(LlmError::NotConfigured {
                provider: self.name().to_owned(),
            })
        };

        ModelValidation::from_outcome(self, model, outcome)
    }

    /// Diagnostic round trip against the default model
    async fn test_connection(&self, context: &CallContext) -> ConnectionReport {
        let model = self.default_model().to_owned();
        let outcome = self
            .complete(&probe_request(&model), context)
            .await
            .map(|_| None);

        ConnectionReport::from_outcome(self, &model, outcome)
    }
}

/// One model, with id checks and backoff but no fallback
async fn attempt<P: Provider + ?Sized>(
    provider: &P,
    request: &CompletionRequest,
    model: &str,
    context: &CallContext,
) -> Result<CompletionResponse, LlmError> {
    provider.fallbacks().check_model_id(model)?;

    let mut response = provider
        .retry_policy()
        .run(provider.name(), context.cancellation(), || {
            provider.dispatch(request, model, context)
        })
        .await?;

    model.clone_into(&mut response.model);
    Ok(response)
}

/// One-token completion against `model`, without fallback
pub async fn probe<P: Provider + ?Sized>(provider: &P, model: &str, context: &CallContext) -> Result<(), LlmError> {
    attempt(provider, &probe_request(model), model, context)
        .await
        .map(|_| ())
}
