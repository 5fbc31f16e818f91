//! Adapter registry and active-provider resolution
//!
//! Adapters come from a compiled-in registration list in priority order.
//! Resolution is a pure function of the configuration: the preferred
//! provider when it is configured, otherwise the first configured adapter,
//! otherwise the inert sentinel.

use std::sync::Arc;

use quill_config::Config;
use serde::Serialize;

use crate::error::LlmError;
use crate::provider::Provider;
use crate::provider::anthropic::AnthropicProvider;
use crate::provider::azure::AzureProvider;
use crate::provider::gemini::GeminiProvider;
use crate::provider::inert::InertProvider;
use crate::provider::ollama::OllamaProvider;
use crate::provider::openai::OpenAiProvider;
use crate::provider::vertex::VertexProvider;

type Constructor = fn(&Config) -> Result<Arc<dyn Provider>, LlmError>;

fn boxed<P: Provider + 'static>(result: Result<P, LlmError>) -> Result<Arc<dyn Provider>, LlmError> {
    result.map(|p| Arc::new(p) as Arc<dyn Provider>)
}

/// Registration list, highest priority first
const REGISTRATIONS: &[(&str, Constructor)] = &[
    ("azure", |c| boxed(AzureProvider::new(c))),
    ("vertex", |c| boxed(VertexProvider::new(c))),
    ("anthropic", |c| boxed(AnthropicProvider::new(c))),
    ("openai", |c| boxed(OpenAiProvider::new(c))),
    ("gemini", |c| boxed(GeminiProvider::new(c))),
    ("ollama", |c| boxed(OllamaProvider::new(c))),
];

/// Name and current availability of a loaded adapter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Registration {
    pub name: String,
    pub available: bool,
}

/// Loaded adapters in priority order
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn Provider>>,
    preferred: Option<String>,
}

impl ProviderRegistry {
    /// Instantiate every adapter family
    ///
    /// An adapter whose constructor fails is logged and left out.
    pub fn load_adapters(config: &Config) -> Self {
        let adapters = REGISTRATIONS
            .iter()
            .filter_map(|(name, construct)| match construct(config) {
                Ok(adapter) => Some(adapter),
                Err(e) => {
                    tracing::warn!(provider = %name, error = %e, "failed to initialize provider, skipping");
                    None
                }
            })
            .collect();

        Self {
            adapters,
            preferred: config.preferred_provider.clone(),
        }
    }

    /// Adapter that should serve calls
    pub fn resolve_active(&self) -> Arc<dyn Provider> {
        if let Some(preferred) = &self.preferred {
            match self.get(preferred) {
                Some(adapter) if adapter.is_configured() => return adapter,
                Some(_) => tracing::warn!(provider = %preferred, "preferred provider is not configured, ignoring"),
                None => tracing::warn!(provider = %preferred, "preferred provider is unknown, ignoring"),
            }
        }

        self.adapters
            .iter()
            .find(|adapter| adapter.is_configured())
            .cloned()
            .unwrap_or_else(|| Arc::new(InertProvider::new()))
    }

    /// Every loaded adapter with freshly computed availability
    pub fn registrations(&self) -> Vec<Registration> {
        self.adapters
            .iter()
            .map(|adapter| Registration {
                name: adapter.name().to_owned(),
                available: adapter.is_configured(),
            })
            .collect()
    }

    /// Look up a loaded adapter by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.adapters.iter().find(|adapter| adapter.name() == name).cloned()
    }
}
