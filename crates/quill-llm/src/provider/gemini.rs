//! Google Generative Language (Gemini API) adapter

use async_trait::async_trait;
use dashmap::DashMap;
use quill_config::Config;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ModelValidation, Provider, http};
use crate::capabilities::{CapabilityDelta, CapabilityRule};
use crate::convert::google::GoogleStreamState;
use crate::error::LlmError;
use crate::fallback::{FallbackRule, ModelFallbacks};
use crate::protocol::google::{GoogleModelInfo, GoogleRequest, GoogleResponse};
use crate::retry::RetryPolicy;
use crate::selector::{Threshold, TierModels, TierTable};
use crate::types::{CallContext, CompletionRequest, CompletionResponse, StreamEvent};

/// Default Gemini API base URL
const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const DEFAULT_MODEL: &str = "gemini-2.0-flash";

const REQUIRED_CONFIG: &[&str] = &["providers.gemini.api_key"];

/// Shared with the Vertex adapter, which serves the same model family
pub(crate) const CAPABILITIES: &[CapabilityRule] = &[
    CapabilityRule::new(
        "gemini",
        CapabilityDelta::NONE
            .vision(true)
            .tool_use(true)
            .json_mode(true)
            .large_context(true)
            .streaming(true),
    ),
    CapabilityRule::new("gemini-1.0", CapabilityDelta::NONE.large_context(false).json_mode(false)),
    CapabilityRule::new("gemini-2.5", CapabilityDelta::NONE.reasoning(true)),
    CapabilityRule::new("thinking", CapabilityDelta::NONE.reasoning(true)),
];

pub(crate) const FALLBACKS: &[FallbackRule] = &[
    FallbackRule::new("ultra", &["gemini-1.5-pro", "gemini-2.0-flash"]),
    FallbackRule::new("pro", &["gemini-2.0-flash", "gemini-1.5-flash"]),
    FallbackRule::new("flash", &["gemini-1.5-flash", "gemini-1.5-flash-8b"]),
];

/// Per-model endpoint cache keyed by `(model, streaming)`
///
/// Entries are never evicted.
#[derive(Debug, Default)]
pub(crate) struct EndpointCache {
    urls: DashMap<(String, bool), Url>,
}

impl EndpointCache {
    /// Cached URL for the pair, building it on first use
    pub(crate) fn get_or_build(
        &self,
        model: &str,
        streaming: bool,
        build: impl FnOnce() -> Result<Url, LlmError>,
    ) -> Result<Url, LlmError> {
        let key = (model.to_owned(), streaming);
        if let Some(url) = self.urls.get(&key) {
            return Ok(url.clone());
        }

        let url = build()?;
        self.urls.insert(key, url.clone());
        Ok(url)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.urls.len()
    }
}

/// `{base}/{prefix..}/{model}:generateContent`, or its SSE variant
pub(crate) fn generate_endpoint(base: &Url, prefix: &[&str], model: &str, streaming: bool) -> Result<Url, LlmError> {
    let method = if streaming {
        "streamGenerateContent"
    } else {
        "generateContent"
    };
    let call = format!("{model}:{method}");

    let mut url = http::join_segments(base, prefix.iter().copied().chain([call.as_str()]))?;
    if streaming {
        url.query_pairs_mut().append_pair("alt", "sse");
    }
    Ok(url)
}

/// Decode a Google SSE data field
fn decode_google_sse(state: &mut GoogleStreamState, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    match serde_json::from_str::<GoogleResponse>(data) {
        Ok(chunk) => Ok(state.convert_chunk(&chunk)),
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
            Ok(Vec::new())
        }
    }
}

/// Turn a `generateContent` response into a completion, streamed or not
///
/// A stream ends with the chunk carrying a finish reason.
pub(crate) async fn read_google_response(
    response: Response,
    request: &CompletionRequest,
    model: &str,
    context: &CallContext,
) -> Result<CompletionResponse, LlmError> {
    if request.stream {
        let mut state = GoogleStreamState::new();
        let events = http::sse_events(response, move |data| decode_google_sse(&mut state, data));
        http::drain(events, context, model).await
    } else {
        let wire: GoogleResponse = http::read_json(response, context.cancellation()).await?;
        Ok(wire.into())
    }
}

/// Gemini API adapter
pub struct GeminiProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: String,
    endpoints: EndpointCache,
    tiers: TierTable,
    fallbacks: ModelFallbacks,
    retry: RetryPolicy,
}

impl GeminiProvider {
    /// Create from configuration; an absent section yields an unconfigured adapter
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let section = config.providers.gemini.clone().unwrap_or_default();

        let base_url = match section.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| LlmError::Internal(e.into()))?,
        };
        let default_model = section.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned());

        Ok(Self {
            client: http::build_client(config.request_timeout())?,
            base_url,
            api_key: section.api_key,
            endpoints: EndpointCache::default(),
            tiers: TierTable {
                large: Threshold::new(20, 1000),
                medium: Threshold::new(6, 250),
                models: TierModels::new(&default_model, &default_model, "gemini-1.5-pro", "gemini-2.5-pro"),
            },
            fallbacks: ModelFallbacks::new(FALLBACKS, &default_model),
            default_model,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    fn generate_url(&self, model: &str, streaming: bool) -> Result<Url, LlmError> {
        self.endpoints.get_or_build(model, streaming, || {
            generate_endpoint(&self.base_url, &["models"], model, streaming)
        })
    }

    fn api_key(&self) -> Result<&SecretString, LlmError> {
        self.api_key.as_ref().ok_or_else(|| LlmError::NotConfigured {
            provider: self.name().to_owned(),
        })
    }

    /// Look the model up with `GET /models/{id}`
    async fn lookup_model(&self, model: &str, context: &CallContext) -> Result<(), LlmError> {
        self.fallbacks.check_model_id(model)?;

        let builder = self
            .client
            .get(http::join_segments(&self.base_url, ["models", model])?)
            .header("x-goog-api-key", self.api_key()?.expose_secret());
        let cancel = context.cancellation();
        let response = http::send(self.name(), builder, cancel, &self.fallbacks, model).await?;
        let info: GoogleModelInfo = http::read_json(response, cancel).await?;

        if !info.supported_generation_methods.is_empty()
            && !info.supported_generation_methods.iter().any(|m| m == "generateContent")
        {
            return Err(LlmError::Upstream(format!(
                "model {} does not support generateContent",
                info.name
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
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
        let wire_request = GoogleRequest::from(request);

        let builder = self
            .client
            .post(self.generate_url(model, request.stream)?)
            .header("x-goog-api-key", self.api_key()?.expose_secret())
            .json(&wire_request);

        let response = http::send(self.name(), builder, context.cancellation(), &self.fallbacks, model).await?;
        read_google_response(response, request, model, context).await
    }

    async fn validate_model(&self, model: &str, context: &CallContext) -> ModelValidation {
        let outcome = if self.is_configured() {
            self.lookup_model(model, context).await
        } else {
            Err(LlmError::NotConfigured {
                provider: self.name().to_owned(),
            })
        };

        ModelValidation::from_outcome(self, model, outcome)
    }
}
