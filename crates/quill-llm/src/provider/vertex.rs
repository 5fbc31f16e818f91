//! Google Vertex AI adapter
//!
//! Speaks the same `generateContent` wire format as the Gemini API but is
//! addressed by project and region and authenticated with an OAuth bearer
//! token. Credentials JSON, when given, is parsed at construction so a
//! malformed file keeps the adapter out of the registry.

use async_trait::async_trait;
use quill_config::{Config, DEFAULT_VERTEX_LOCATION};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use url::Url;

use super::gemini::{CAPABILITIES, EndpointCache, FALLBACKS, generate_endpoint, read_google_response};
use super::{Provider, http};
use crate::capabilities::CapabilityRule;
use crate::error::LlmError;
use crate::fallback::ModelFallbacks;
use crate::protocol::google::GoogleRequest;
use crate::retry::RetryPolicy;
use crate::selector::{Threshold, TierModels, TierTable};
use crate::types::{CallContext, CompletionRequest, CompletionResponse};

const DEFAULT_MODEL: &str = "gemini-2.0-flash-001";

const REQUIRED_CONFIG: &[&str] = &["providers.vertex.project_id", "providers.vertex.access_token"];

/// The parts of a Google credentials file the adapter reads
#[derive(Debug, Deserialize)]
struct GoogleCredentials {
    /// "`service_account`" or "`authorized_user`"
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    project_id: Option<String>,
    #[serde(default)]
    quota_project_id: Option<String>,
}

impl GoogleCredentials {
    fn parse(raw: &str) -> Result<Self, LlmError> {
        serde_json::from_str(raw).map_err(|e| LlmError::Internal(anyhow::anyhow!("invalid vertex credentials: {e}")))
    }

    fn project(self) -> Option<String> {
        self.project_id.or(self.quota_project_id)
    }
}

/// Vertex AI adapter
pub struct VertexProvider {
    client: Client,
    base_url: Url,
    project_id: Option<String>,
    location: String,
    access_token: Option<SecretString>,
    default_model: String,
    endpoints: EndpointCache,
    tiers: TierTable,
    fallbacks: ModelFallbacks,
    retry: RetryPolicy,
}

impl VertexProvider {
    /// Create from configuration; an absent section yields an unconfigured adapter
    ///
    /// # Errors
    ///
    /// Fails when the credentials JSON cannot be parsed.
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let section = config.providers.vertex.clone().unwrap_or_default();

        let credentials = section
            .credentials
            .as_ref()
            .map(|raw| GoogleCredentials::parse(raw.expose_secret()))
            .transpose()?;
        if let Some(credentials) = &credentials {
            tracing::debug!(kind = %credentials.kind, "loaded vertex credentials");
        }

        let project_id = section
            .project_id
            .filter(|p| !p.trim().is_empty())
            .or_else(|| credentials.and_then(GoogleCredentials::project));
        let location = section
            .location
            .unwrap_or_else(|| DEFAULT_VERTEX_LOCATION.to_owned());

        let base_url = match section.base_url {
            Some(url) => url,
            None => Url::parse(&format!("https://{location}-aiplatform.googleapis.com/v1"))
                .map_err(|e| LlmError::Internal(e.into()))?,
        };
        let default_model = section.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned());

        Ok(Self {
            client: http::build_client(config.request_timeout())?,
            base_url,
            project_id,
            location,
            access_token: section.access_token,
            endpoints: EndpointCache::default(),
            tiers: TierTable {
                large: Threshold::new(20, 1000),
                medium: Threshold::new(6, 250),
                models: TierModels::new(&default_model, &default_model, "gemini-1.5-pro-002", "gemini-2.5-pro"),
            },
            fallbacks: ModelFallbacks::new(FALLBACKS, &default_model),
            default_model,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    fn generate_url(&self, model: &str, streaming: bool) -> Result<Url, LlmError> {
        let project = self.project_id.as_deref().ok_or_else(|| self.not_configured())?;
        let prefix = [
            "projects",
            project,
            "locations",
            self.location.as_str(),
            "publishers",
            "google",
            "models",
        ];

        self.endpoints.get_or_build(model, streaming, || {
            generate_endpoint(&self.base_url, &prefix, model, streaming)
        })
    }

    fn not_configured(&self) -> LlmError {
        LlmError::NotConfigured {
            provider: self.name().to_owned(),
        }
    }
}

#[async_trait]
impl Provider for VertexProvider {
    fn name(&self) -> &str {
        "vertex"
    }

    fn is_configured(&self) -> bool {
        self.project_id.is_some() && self.access_token.is_some()
    }

    fn required_config(&self) -> &'static [&'static str] {
        REQUIRED_CONFIG
    }

    fn default_model(&self) -> &str {
        &self.default_model
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
        let token = self.access_token.as_ref().ok_or_else(|| self.not_configured())?;
        let wire_request = GoogleRequest::from(request);

        let builder = self
            .client
            .post(self.generate_url(model, request.stream)?)
            .bearer_auth(token.expose_secret())
            .json(&wire_request);

        let response = http::send(self.name(), builder, context.cancellation(), &self.fallbacks, model).await?;
        read_google_response(response, request, model, context).await
    }
}
