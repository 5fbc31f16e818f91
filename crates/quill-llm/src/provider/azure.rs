//! Azure `OpenAI` adapter
//!
//! Azure routes by deployment rather than by model name, so the deployment
//! doubles as the default model and every recommendation tier resolves to it.

use async_trait::async_trait;
use quill_config::{Config, DEFAULT_AZURE_API_VERSION};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::openai::read_openai_response;
use super::{Provider, http};
use crate::capabilities::{CapabilityDelta, CapabilityRule};
use crate::error::LlmError;
use crate::fallback::{FallbackRule, ModelFallbacks};
use crate::protocol::openai::OpenAiRequest;
use crate::retry::RetryPolicy;
use crate::selector::{Threshold, TierModels, TierTable};
use crate::types::{CallContext, CompletionRequest, CompletionResponse};

const REQUIRED_CONFIG: &[&str] = &[
    "providers.azure.api_key",
    "providers.azure.endpoint",
    "providers.azure.deployment",
];

const CAPABILITIES: &[CapabilityRule] = &[
    CapabilityRule::new("gpt", CapabilityDelta::NONE.tool_use(true).json_mode(true).streaming(true)),
    CapabilityRule::new("gpt-4o", CapabilityDelta::NONE.vision(true).large_context(true)),
    CapabilityRule::new("gpt-4-turbo", CapabilityDelta::NONE.vision(true).large_context(true)),
    CapabilityRule::new("gpt-4.1", CapabilityDelta::NONE.vision(true).large_context(true)),
    CapabilityRule::new(
        "o1",
        CapabilityDelta::NONE.reasoning(true).large_context(true).streaming(true),
    ),
    CapabilityRule::new(
        "o3",
        CapabilityDelta::NONE.reasoning(true).large_context(true).tool_use(true).streaming(true),
    ),
];

const FALLBACKS: &[FallbackRule] = &[
    FallbackRule::new("gpt-4o", &["gpt-4o-mini"]),
    FallbackRule::new("gpt-4", &["gpt-4o-mini", "gpt-35-turbo"]),
];

/// Azure `OpenAI` deployment adapter
pub struct AzureProvider {
    client: Client,
    endpoint: Option<Url>,
    api_key: Option<SecretString>,
    deployment: Option<String>,
    api_version: String,
    tiers: TierTable,
    fallbacks: ModelFallbacks,
    retry: RetryPolicy,
}

impl AzureProvider {
    /// Create from configuration; an absent section yields an unconfigured adapter
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let section = config.providers.azure.clone().unwrap_or_default();
        let deployment = section.deployment.filter(|d| !d.trim().is_empty());
        let default_model = deployment.clone().unwrap_or_default();

        Ok(Self {
            client: http::build_client(config.request_timeout())?,
            endpoint: section.endpoint,
            api_key: section.api_key,
            api_version: section
                .api_version
                .unwrap_or_else(|| DEFAULT_AZURE_API_VERSION.to_owned()),
            tiers: TierTable {
                large: Threshold::new(15, 800),
                medium: Threshold::new(5, 200),
                models: TierModels::uniform(&default_model),
            },
            fallbacks: ModelFallbacks::new(FALLBACKS, default_model),
            deployment,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// `{endpoint}/openai/deployments/{deployment}/chat/completions?api-version=...`
    fn completions_url(&self, deployment: &str) -> Result<Url, LlmError> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| self.not_configured())?;

        let mut url = http::join_segments(endpoint, ["openai", "deployments", deployment, "chat", "completions"])?;
        url.query_pairs_mut().append_pair("api-version", &self.api_version);
        Ok(url)
    }

    fn not_configured(&self) -> LlmError {
        LlmError::NotConfigured {
            provider: self.name().to_owned(),
        }
    }
}

#[async_trait]
impl Provider for AzureProvider {
    fn name(&self) -> &str {
        "azure"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some() && self.endpoint.is_some() && self.deployment.is_some()
    }

    fn required_config(&self) -> &'static [&'static str] {
        REQUIRED_CONFIG
    }

    fn default_model(&self) -> &str {
        self.deployment.as_deref().unwrap_or_default()
    }

    fn capability_rules(&self) -> &'static [CapabilityRule] {
        CAPABILITIES
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
        request: &CompletionRequest,
        model: &str,
        context: &CallContext,
    ) -> Result<CompletionResponse, LlmError> {
        let api_key = self.api_key.as_ref().ok_or_else(|| self.not_configured())?;

        let mut wire_request = OpenAiRequest::from(request);
        model.clone_into(&mut wire_request.model);

        let builder = self
            .client
            .post(self.completions_url(model)?)
            .header("api-key", api_key.expose_secret())
            .header("x-ms-client-request-id", uuid::Uuid::new_v4().to_string())
            .json(&wire_request);

        let response = http::send(self.name(), builder, context.cancellation(), &self.fallbacks, model).await?;
        read_openai_response(response, request, model, context).await
    }
}
