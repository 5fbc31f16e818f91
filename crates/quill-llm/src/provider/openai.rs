//! `OpenAI` (or compatible) chat completions adapter

use async_trait::async_trait;
use quill_config::Config;
use reqwest::{Client, Response};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{ModelValidation, Provider, http};
use crate::capabilities::{CapabilityDelta, CapabilityRule};
use crate::convert::openai::openai_chunk_to_events;
use crate::error::LlmError;
use crate::fallback::{FallbackRule, ModelFallbacks};
use crate::protocol::openai::{OpenAiModel, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiStreamOptions};
use crate::retry::RetryPolicy;
use crate::selector::{Threshold, TierModels, TierTable};
use crate::types::{CallContext, CompletionRequest, CompletionResponse, StreamEvent};

/// Default `OpenAI` API base URL
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

const DEFAULT_MODEL: &str = "gpt-4o-mini";

const REQUIRED_CONFIG: &[&str] = &["providers.openai.api_key"];

const CAPABILITIES: &[CapabilityRule] = &[
    CapabilityRule::new("gpt", CapabilityDelta::NONE.tool_use(true).json_mode(true).streaming(true)),
    CapabilityRule::new("gpt-4o", CapabilityDelta::NONE.vision(true).large_context(true)),
    CapabilityRule::new("gpt-4-turbo", CapabilityDelta::NONE.vision(true).large_context(true)),
    CapabilityRule::new("gpt-4.1", CapabilityDelta::NONE.vision(true).large_context(true)),
    CapabilityRule::new("gpt-4.5", CapabilityDelta::NONE.vision(true).large_context(true)),
    CapabilityRule::new(
        "o1",
        CapabilityDelta::NONE.reasoning(true).large_context(true).json_mode(true).streaming(true),
    ),
    CapabilityRule::new(
        "o3",
        CapabilityDelta::NONE
            .reasoning(true)
            .large_context(true)
            .tool_use(true)
            .json_mode(true)
            .streaming(true),
    ),
];

const FALLBACKS: &[FallbackRule] = &[
    FallbackRule::new("gpt-4.5", &["gpt-4o", "gpt-4o-mini"]),
    FallbackRule::new("o1", &["o3-mini", "gpt-4o"]),
    FallbackRule::new("o3", &["o3-mini", "gpt-4o"]),
    FallbackRule::new("gpt-4o", &["gpt-4o-mini"]),
    FallbackRule::new("gpt-4", &["gpt-4o-mini", "gpt-3.5-turbo"]),
];

/// Whether the base URL is the canonical `OpenAI` API rather than a compatible one
fn is_canonical_openai(base_url: &Url) -> bool {
    base_url.host_str().is_some_and(|h| h == "api.openai.com")
}

/// `OpenAI` chat completions adapter
pub struct OpenAiProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: String,
    tiers: TierTable,
    fallbacks: ModelFallbacks,
    retry: RetryPolicy,
}

impl OpenAiProvider {
    /// Create from configuration; an absent section yields an unconfigured adapter
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let section = config.providers.openai.clone().unwrap_or_default();

        let base_url = match section.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| LlmError::Internal(e.into()))?,
        };
        let default_model = section.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned());

        Ok(Self {
            client: http::build_client(config.request_timeout())?,
            base_url,
            api_key: section.api_key,
            tiers: TierTable {
                large: Threshold::new(15, 800),
                medium: Threshold::new(5, 200),
                models: TierModels::new(&default_model, "gpt-4o", "gpt-4o", "o3-mini"),
            },
            fallbacks: ModelFallbacks::new(FALLBACKS, &default_model),
            default_model,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, LlmError> {
        http::join_segments(&self.base_url, segments.iter().copied())
    }

    fn api_key(&self) -> Result<&SecretString, LlmError> {
        self.api_key.as_ref().ok_or_else(|| LlmError::NotConfigured {
            provider: self.name().to_owned(),
        })
    }

    /// Look the model up in the model listing
    async fn lookup_model(&self, model: &str, context: &CallContext) -> Result<(), LlmError> {
        self.fallbacks.check_model_id(model)?;

        let builder = self
            .client
            .get(self.url(&["models", model])?)
            .bearer_auth(self.api_key()?.expose_secret());
        let cancel = context.cancellation();
        let response = http::send(self.name(), builder, cancel, &self.fallbacks, model).await?;
        let entry: OpenAiModel = http::read_json(response, cancel).await?;

        tracing::debug!(provider = %self.name(), model = %entry.id, owned_by = %entry.owned_by, "model found");
        Ok(())
    }
}

/// Decode an `OpenAI` SSE data field
pub(crate) fn decode_openai_sse(data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    if data == "[DONE]" {
        return Ok(vec![StreamEvent::Done]);
    }

    match serde_json::from_str::<OpenAiStreamChunk>(data) {
        Ok(chunk) => Ok(openai_chunk_to_events(&chunk)),
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "skipping unparseable SSE chunk");
            Ok(Vec::new())
        }
    }
}

/// Turn an `OpenAI`-style response into a completion, streamed or not
pub(crate) async fn read_openai_response(
    response: Response,
    request: &CompletionRequest,
    model: &str,
    context: &CallContext,
) -> Result<CompletionResponse, LlmError> {
    if request.stream {
        http::drain(http::sse_events(response, decode_openai_sse), context, model).await
    } else {
        let wire: OpenAiResponse = http::read_json(response, context.cancellation()).await?;
        Ok(wire.into())
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
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
        let mut wire_request = OpenAiRequest::from(request);
        model.clone_into(&mut wire_request.model);

        // Compatible APIs often reject the unsupported parameter
        if request.stream && is_canonical_openai(&self.base_url) {
            wire_request.stream_options = Some(OpenAiStreamOptions { include_usage: true });
        }

        let builder = self
            .client
            .post(self.url(&["chat", "completions"])?)
            .bearer_auth(self.api_key()?.expose_secret())
            .json(&wire_request);

        let response = http::send(self.name(), builder, context.cancellation(), &self.fallbacks, model).await?;
        read_openai_response(response, request, model, context).await
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

#[cfg(test)]
mod tests {
    use quill_config::ApiKeyConfig;

    use super::*;
    use crate::selector::{ChangeSignals, Tier};

    fn configured() -> OpenAiProvider {
        let mut config = Config::default();
        config.providers.openai = Some(ApiKeyConfig {
            api_key: Some(SecretString::from("sk-test")),
            ..ApiKeyConfig::default()
        });
        OpenAiProvider::new(&config).unwrap()
    }

    #[test]
    fn unconfigured_without_key() {
        let provider = OpenAiProvider::new(&Config::default()).unwrap();
        assert!(!provider.is_configured());
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model(), DEFAULT_MODEL);
    }

    #[tokio::test]
    async fn complete_requires_configuration() {
        let provider = OpenAiProvider::new(&Config::default()).unwrap();
        let request = CompletionRequest::new(vec![crate::types::Message::user("hi")]);

        let err = provider.complete(&request, &CallContext::default()).await.unwrap_err();
        assert!(matches!(err, LlmError::NotConfigured { provider } if provider == "openai"));
    }

    #[test]
    fn capabilities_follow_model_family() {
        let provider = configured();

        let gpt4o = provider.capabilities("gpt-4o-2024-08-06");
        assert!(gpt4o.vision && gpt4o.tool_use && gpt4o.large_context);
        assert!(!gpt4o.reasoning);

        let o3 = provider.capabilities("o3-mini");
        assert!(o3.reasoning && o3.tool_use);
        assert!(!o3.vision);

        assert_eq!(provider.capabilities("text-davinci-003").features(), Vec::<&str>::new());
    }

    #[test]
    fn breaking_changes_get_reasoning_model() {
        let rec = configured().recommend_model(&ChangeSignals {
            files_changed: 1,
            lines_changed: 1,
            breaking: true,
        });
        assert_eq!(rec.tier, Tier::Breaking);
        assert_eq!(rec.model, "o3-mini");
    }

    #[test]
    fn preview_models_fall_back_to_gpt4o() {
        assert_eq!(configured().fallbacks().alternatives("gpt-4.5-preview")[0], "gpt-4o");
    }

    #[test]
    fn canonical_host_detection() {
        assert!(is_canonical_openai(&Url::parse("https://api.openai.com/v1").unwrap()));
        assert!(!is_canonical_openai(&Url::parse("http://127.0.0.1:8080/v1").unwrap()));
    }
}
