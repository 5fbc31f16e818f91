//! Local Ollama runtime adapter
//!
//! Uses the prompt-style `/api/generate` endpoint. Streaming responses are
//! newline-delimited JSON rather than server-sent events.

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use quill_config::Config;
use reqwest::{Client, Response};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{ConnectionReport, ModelValidation, Provider, http, probe_request};
use crate::capabilities::{CapabilityDelta, CapabilityRule};
use crate::convert::ollama::ollama_chunk_to_events;
use crate::error::LlmError;
use crate::fallback::{FallbackRule, ModelFallbacks};
use crate::protocol::ollama::{OllamaGenerateRequest, OllamaGenerateResponse, OllamaTags, OllamaVersion};
use crate::retry::RetryPolicy;
use crate::selector::{Threshold, TierModels, TierTable};
use crate::types::{CallContext, CompletionRequest, CompletionResponse, StreamEvent};

/// Default Ollama address
const DEFAULT_BASE_URL: &str = "http://localhost:11434";

const DEFAULT_MODEL: &str = "llama3.1";

const REQUIRED_CONFIG: &[&str] = &["providers.ollama.base_url"];

const LOCAL: CapabilityDelta = CapabilityDelta::NONE.local(true).streaming(true).json_mode(true);

const CAPABILITIES: &[CapabilityRule] = &[
    CapabilityRule::new("llama", LOCAL),
    CapabilityRule::new("llava", LOCAL),
    CapabilityRule::new("mistral", LOCAL),
    CapabilityRule::new("mixtral", LOCAL),
    CapabilityRule::new("qwen", LOCAL),
    CapabilityRule::new("qwq", LOCAL),
    CapabilityRule::new("gemma", LOCAL),
    CapabilityRule::new("phi", LOCAL),
    CapabilityRule::new("deepseek", LOCAL),
    CapabilityRule::new("llava", CapabilityDelta::NONE.vision(true)),
    CapabilityRule::new("vision", CapabilityDelta::NONE.vision(true)),
    CapabilityRule::new("llama3.1", CapabilityDelta::NONE.large_context(true)),
    CapabilityRule::new("llama3.2", CapabilityDelta::NONE.large_context(true)),
    CapabilityRule::new("qwen2.5", CapabilityDelta::NONE.large_context(true)),
    CapabilityRule::new("deepseek-r1", CapabilityDelta::NONE.reasoning(true)),
    CapabilityRule::new("qwq", CapabilityDelta::NONE.reasoning(true)),
];

const FALLBACKS: &[FallbackRule] = &[
    FallbackRule::new("405b", &["llama3.1:70b", "llama3.1:8b"]),
    FallbackRule::new("70b", &["llama3.1:8b"]),
    FallbackRule::new("deepseek-r1", &["deepseek-r1:7b"]),
];

/// Local Ollama adapter
pub struct OllamaProvider {
    client: Client,
    base_url: Url,
    configured: bool,
    default_model: String,
    tiers: TierTable,
    fallbacks: ModelFallbacks,
    retry: RetryPolicy,
}

impl OllamaProvider {
    /// Create from configuration
    ///
    /// The runtime needs no credentials, but it only counts as configured
    /// when an `ollama` section (or `OLLAMA_HOST`) is present.
    pub fn new(config: &Config) -> Result<Self, LlmError> {
        let configured = config.providers.ollama.is_some();
        let section = config.providers.ollama.clone().unwrap_or_default();

        let base_url = match section.base_url {
            Some(url) => url,
            None => Url::parse(DEFAULT_BASE_URL).map_err(|e| LlmError::Internal(e.into()))?,
        };
        let default_model = section.model.unwrap_or_else(|| DEFAULT_MODEL.to_owned());

        Ok(Self {
            client: http::build_client(config.request_timeout())?,
            base_url,
            configured,
            tiers: TierTable {
                large: Threshold::new(10, 500),
                medium: Threshold::new(4, 120),
                models: TierModels::uniform(&default_model),
            },
            fallbacks: ModelFallbacks::new(FALLBACKS, &default_model),
            default_model,
            retry: RetryPolicy::from(&config.retry),
        })
    }

    fn url(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        format!("{base}/{path}")
    }

    /// Check the model against the locally installed tags
    async fn lookup_model(&self, model: &str, cancel: &CancellationToken) -> Result<(), LlmError> {
        self.fallbacks.check_model_id(model)?;

        let response = http::send(
            self.name(),
            self.client.get(self.url("api/tags")),
            cancel,
            &self.fallbacks,
            model,
        )
        .await?;
        let tags: OllamaTags = http::read_json(response, cancel).await?;

        if tags.models.iter().any(|tag| tag_matches(&tag.name, model)) {
            Ok(())
        } else {
            Err(self.fallbacks.not_found(model))
        }
    }

    async fn version(&self, cancel: &CancellationToken) -> Result<String, LlmError> {
        let response = http::send(
            self.name(),
            self.client.get(self.url("api/version")),
            cancel,
            &self.fallbacks,
            &self.default_model,
        )
        .await?;
        let version: OllamaVersion = http::read_json(response, cancel).await?;
        Ok(version.version)
    }
}

/// `llama3.1` matches the installed `llama3.1:latest`
fn tag_matches(installed: &str, requested: &str) -> bool {
    installed == requested || installed.strip_suffix(":latest") == Some(requested)
}

/// Decode a newline-delimited JSON body into stream events
fn ndjson_events(response: Response) -> impl Stream<Item = Result<StreamEvent, LlmError>> + Send {
    let bytes = response.bytes_stream().map(|chunk| chunk.map_err(std::io::Error::other));

    FramedRead::new(StreamReader::new(bytes), LinesCodec::new())
        .map(|line| match line {
            Ok(line) if line.trim().is_empty() => Ok(Vec::new()),
            Ok(line) => match serde_json::from_str::<OllamaGenerateResponse>(&line) {
                Ok(chunk) => ollama_chunk_to_events(&chunk),
                Err(e) => {
                    tracing::debug!(error = %e, line = %line, "skipping unparseable NDJSON line");
                    Ok(Vec::new())
                }
            },
            Err(e) => Err(LlmError::Upstream(format!("stream error: {e}"))),
        })
        .flat_map(|result| {
            let events: Vec<Result<StreamEvent, LlmError>> = match result {
                Ok(events) => events.into_iter().map(Ok).collect(),
                Err(e) => vec![Err(e)],
            };
            futures_util::stream::iter(events)
        })
}

#[async_trait]
impl Provider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn is_configured(&self) -> bool {
        self.configured
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
        let mut wire_request = OllamaGenerateRequest::from(request);
        model.clone_into(&mut wire_request.model);

        let builder = self.client.post(self.url("api/generate")).json(&wire_request);
        let response = http::send(self.name(), builder, context.cancellation(), &self.fallbacks, model).await?;

        if request.stream {
            http::drain(ndjson_events(response), context, model).await
        } else {
            let wire_response: OllamaGenerateResponse = http::read_json(response, context.cancellation()).await?;
            if let Some(error) = &wire_response.error {
                return Err(LlmError::Upstream(error.clone()));
            }
            Ok(wire_response.into())
        }
    }

    async fn validate_model(&self, model: &str, context: &CallContext) -> ModelValidation {
        let outcome = if self.is_configured() {
            self.lookup_model(model, context.cancellation()).await
        } else {
            Err(LlmError::NotConfigured {
                provider: self.name().to_owned(),
            })
        };

        ModelValidation::from_outcome(self, model, outcome)
    }

    async fn test_connection(&self, context: &CallContext) -> ConnectionReport {
        let model = self.default_model.clone();

        let outcome = async {
            if !self.is_configured() {
                return Err(LlmError::NotConfigured {
                    provider: self.name().to_owned(),
                });
            }
            let version = self.version(context.cancellation()).await?;
            self.complete(&probe_request(&model), context).await?;
            Ok(Some(version))
        }
        .await;

        ConnectionReport::from_outcome(self, &model, outcome)
    }
}

#[cfg(test)]
mod tests {
    use quill_config::OllamaConfig;

    use super::*;

    #[test]
    fn configured_only_with_section() {
        assert!(!OllamaProvider::new(&Config::default()).unwrap().is_configured());

        let mut config = Config::default();
        config.providers.ollama = Some(OllamaConfig::default());
        let provider = OllamaProvider::new(&config).unwrap();
        assert!(provider.is_configured());
        assert_eq!(provider.url("api/generate"), "http://localhost:11434/api/generate");
    }

    #[test]
    fn known_families_are_local() {
        let provider = OllamaProvider::new(&Config::default()).unwrap();
        let caps = provider.capabilities("qwen2.5-coder:7b");
        assert!(caps.local && caps.streaming && caps.large_context);
        assert!(!caps.tool_use);
        assert!(provider.capabilities("some-unknown-model").features().is_empty());
        assert!(provider.capabilities("llava:13b").vision);
        assert!(provider.capabilities("deepseek-r1:14b").reasoning);
    }

    #[test]
    fn latest_tag_is_implied() {
        assert!(tag_matches("llama3.1:latest", "llama3.1"));
        assert!(tag_matches("llama3.1:8b", "llama3.1:8b"));
        assert!(!tag_matches("llama3.1:8b", "llama3.1"));
    }

    #[test]
    fn large_models_fall_back_to_8b() {
        let provider = OllamaProvider::new(&Config::default()).unwrap();
        assert_eq!(provider.fallbacks().alternatives("llama3.1:70b")[0], "llama3.1:8b");
    }
}
