use secrecy::SecretString;
use serde::Deserialize;
use url::Url;

/// Backend names known to the registry, in priority order
pub const PROVIDER_NAMES: &[&str] = &["azure", "vertex", "anthropic", "openai", "gemini", "ollama"];

/// Default Azure OpenAI REST API version
pub const DEFAULT_AZURE_API_VERSION: &str = "2024-06-01";

/// Default Vertex AI region
pub const DEFAULT_VERTEX_LOCATION: &str = "us-central1";

/// Credentials and endpoints for every backend family
///
/// A missing section means the backend is not configured.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvidersConfig {
    /// Azure OpenAI deployment
    #[serde(default)]
    pub azure: Option<AzureConfig>,
    /// Google Vertex AI
    #[serde(default)]
    pub vertex: Option<VertexConfig>,
    /// Anthropic Messages API
    #[serde(default)]
    pub anthropic: Option<ApiKeyConfig>,
    /// `OpenAI` or a compatible API
    #[serde(default)]
    pub openai: Option<ApiKeyConfig>,
    /// Google Generative Language API
    #[serde(default)]
    pub gemini: Option<ApiKeyConfig>,
    /// Local Ollama runtime
    #[serde(default)]
    pub ollama: Option<OllamaConfig>,
}

impl ProvidersConfig {
    /// Names of the sections present, in registry priority order
    pub fn present(&self) -> Vec<&'static str> {
        let flags = [
            self.azure.is_some(),
            self.vertex.is_some(),
            self.anthropic.is_some(),
            self.openai.is_some(),
            self.gemini.is_some(),
            self.ollama.is_some(),
        ];

        PROVIDER_NAMES
            .iter()
            .zip(flags)
            .filter_map(|(name, present)| present.then_some(*name))
            .collect()
    }
}

/// Backends authenticated by a single API key
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiKeyConfig {
    /// API key
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Base URL override
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Default model override
    #[serde(default)]
    pub model: Option<String>,
}

/// Azure OpenAI configuration
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AzureConfig {
    /// Resource API key, sent as the `api-key` header
    #[serde(default)]
    pub api_key: Option<SecretString>,
    /// Resource endpoint, e.g. `https://my-resource.openai.azure.com`
    #[serde(default)]
    pub endpoint: Option<Url>,
    /// Deployment name; doubles as the default model
    #[serde(default)]
    pub deployment: Option<String>,
    /// REST API version
    #[serde(default)]
    pub api_version: Option<String>,
}

/// Google Vertex AI configuration
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VertexConfig {
    /// GCP project id; taken from the credentials JSON when absent
    #[serde(default)]
    pub project_id: Option<String>,
    /// Region
    #[serde(default)]
    pub location: Option<String>,
    /// OAuth access token sent as a bearer token
    #[serde(default)]
    pub access_token: Option<SecretString>,
    /// Service account or authorized-user credentials, as raw JSON text
    #[serde(default)]
    pub credentials: Option<SecretString>,
    /// Base URL override (defaults to the regional endpoint)
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Default model override
    #[serde(default)]
    pub model: Option<String>,
}

/// Local Ollama runtime configuration
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OllamaConfig {
    /// Runtime address, e.g. `http://localhost:11434`
    #[serde(default)]
    pub base_url: Option<Url>,
    /// Default model override
    #[serde(default)]
    pub model: Option<String>,
}
