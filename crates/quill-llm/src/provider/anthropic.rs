//! Anthropic Messages API adapter

use async_trait::async_trait;
use quill_config::Config;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use super::{Provider, http};
use crate::capabilities::{CapabilityDelta, CapabilityRule};
use crate::convert::anthropic::AnthropicStreamState;
use crate::error::LlmError;
use crate::fallback::{FallbackRule, ModelFallbacks};
use crate::protocol::anthropic::{AnthropicRequest, AnthropicResponse, AnthropicStreamEvent};
use crate::retry::RetryPolicy;
use crate::selector::{Threshold, TierModels, TierTable};
use crate::types::{CallContext, CompletionRequest, CompletionResponse, StreamEvent};

/// Default Anthropic API base URL
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";

const REQUIRED_CONFIG: &[&str] = &["providers.anthropic.api_key"];

const CAPABILITIES: &[CapabilityRule] = &[
    CapabilityRule::new(
        "claude",
        CapabilityDelta::NONE
            .vision(true)
            .tool_use(true)
            .large_context(true)
            .streaming(true),
    ),
    CapabilityRule::new("claude-2", CapabilityDelta::NONE.vision(false).tool_use(false)),
    CapabilityRule::new("claude-instant", CapabilityDelta::NONE.vision(false).tool_use(false)),
    CapabilityRule::new("claude-3-7", CapabilityDelta::NONE.reasoning(true)),
    CapabilityRule::new("sonnet-4", CapabilityDelta::NONE.reasoning(true)),
    CapabilityRule::new("opus-4", CapabilityDelta::NONE.reasoning(true)),
];

const FALLBACKS: &[FallbackRule] = &[
    FallbackRule::new("opus", &["claude-3-5-sonnet-latest", "claude-3-5-haiku-latest"]),
    FallbackRule::new("sonnet", &["claude-3-5-haiku-latest"]),
    FallbackRule::new("haiku", &["claude-3-haiku-20240307"]),
];

/// Anthropic Messages API adapter
pub struct AnthropicProvider {
    client: Client,
    base_url: Url,
    api_key: Option<SecretString>,
    default_model: String,
    tiers: TierTable,
    fallbacks: ModelFallbacks,
    retry: RetryPolicy,
}

impl AnthropicProvider {
    /// Create from configuration; an absent section yields an unconfigured adapter
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let section = config.providers.anthropic.clone().unwrap_or_default();

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
                large: Threshold::new(12, 600),
                medium: Threshold::new(4, 150),
                models: TierModels::new(
                    "claude-3-5-haiku-latest",
                    &default_model,
                    &default_model,
                    "claude-3-opus-latest",
                ),
            },
            fallbacks: ModelFallbacks::new(FALLBACKS, &default_model),
            default_model,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    /// Build the messages endpoint URL
    fn messages_url(&self) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/messages")
    }
}

/// Decode an Anthropic SSE data field
fn decode_anthropic_sse(state: &mut AnthropicStreamState, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    match serde_json::from_str::<AnthropicStreamEvent>(data) {
        Ok(event) => state.convert_event(&event),
        Err(e) => {
            tracing::debug!(error = %e, data = %data, "skipping unparseable SSE event");
            Ok(Vec::new())
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
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
        let api_key = self.api_key.as_ref().ok_or_else(|| LlmError::NotConfigured {
            provider: self.name().to_owned(),
        })?;

        let mut wire_request = AnthropicRequest::from(request);
        model.clone_into(&mut wire_request.model);

        let builder = self
            .client
            .post(self.messages_url())
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&wire_request);

        let response = http::send(self.name(), builder, context.cancellation(), &self.fallbacks, model).await?;

        if request.stream {
            let mut state = AnthropicStreamState::new();
            let events = http::sse_events(response, move |data| decode_anthropic_sse(&mut state, data));
            http::drain(events, context, model).await
        } else {
            let wire_response: AnthropicResponse = http::read_json(response, context.cancellation()).await?;
            Ok(wire_response.into())
        }
    }
}
