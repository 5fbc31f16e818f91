use secrecy::SecretString;
use url::Url;

use crate::{ApiKeyConfig, AzureConfig, Config, OllamaConfig, ProvidersConfig, VertexConfig};

impl Config {
    /// Build a configuration snapshot from the process environment
    ///
    /// Each backend section is present only when at least one of its
    /// variables is set. Later changes to the environment are not observed;
    /// take a new snapshot and reconfigure instead.
    ///
    /// # Errors
    ///
    /// Returns an error if an endpoint variable is not a valid URL or the
    /// resulting configuration fails validation
    pub fn from_env() -> anyhow::Result<Self> {
        let providers = ProvidersConfig {
            azure: azure_from_env()?,
            vertex: vertex_from_env()?,
            anthropic: api_key_from_env("ANTHROPIC_API_KEY", "ANTHROPIC_BASE_URL", "ANTHROPIC_MODEL")?,
            openai: api_key_from_env("OPENAI_API_KEY", "OPENAI_BASE_URL", "OPENAI_MODEL")?,
            gemini: gemini_from_env()?,
            ollama: ollama_from_env()?,
        };

        let request_timeout_secs = var("QUILL_REQUEST_TIMEOUT_SECS")
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|e| anyhow::anyhow!("invalid QUILL_REQUEST_TIMEOUT_SECS '{raw}': {e}"))
            })
            .transpose()?;

        let config = Self {
            preferred_provider: var("QUILL_PROVIDER"),
            request_timeout_secs,
            providers,
            ..Self::default()
        };

        config.validate()?;
        tracing::debug!(sections = ?config.providers.present(), "configuration read from environment");

        Ok(config)
    }
}

/// Read a non-empty environment variable
fn var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn secret(name: &str) -> Option<SecretString> {
    var(name).map(SecretString::from)
}

fn url(name: &str) -> anyhow::Result<Option<Url>> {
    var(name)
        .map(|raw| Url::parse(&raw).map_err(|e| anyhow::anyhow!("invalid URL in {name} '{raw}': {e}")))
        .transpose()
}

fn api_key_from_env(key: &str, base_url: &str, model: &str) -> anyhow::Result<Option<ApiKeyConfig>> {
    let section = ApiKeyConfig {
        api_key: secret(key),
        base_url: url(base_url)?,
        model: var(model),
    };

    let present = section.api_key.is_some() || section.base_url.is_some() || section.model.is_some();
    Ok(present.then_some(section))
}

fn gemini_from_env() -> anyhow::Result<Option<ApiKeyConfig>> {
    let mut section = api_key_from_env("GEMINI_API_KEY", "GEMINI_BASE_URL", "GEMINI_MODEL")?;

    if let Some(key) = secret("GOOGLE_API_KEY") {
        let section = section.get_or_insert_with(ApiKeyConfig::default);
        section.api_key.get_or_insert(key);
    }

    Ok(section)
}

fn azure_from_env() -> anyhow::Result<Option<AzureConfig>> {
    let section = AzureConfig {
        api_key: secret("AZURE_OPENAI_API_KEY"),
        endpoint: url("AZURE_OPENAI_ENDPOINT")?,
        deployment: var("AZURE_OPENAI_DEPLOYMENT"),
        api_version: var("AZURE_OPENAI_API_VERSION"),
    };

    let present = section.api_key.is_some() || section.endpoint.is_some() || section.deployment.is_some();
    Ok(present.then_some(section))
}

fn vertex_from_env() -> anyhow::Result<Option<VertexConfig>> {
    let section = VertexConfig {
        project_id: var("GOOGLE_CLOUD_PROJECT"),
        location: var("GOOGLE_CLOUD_LOCATION"),
        access_token: secret("VERTEX_ACCESS_TOKEN"),
        credentials: secret("GOOGLE_APPLICATION_CREDENTIALS_JSON"),
        base_url: url("VERTEX_BASE_URL")?,
        model: var("VERTEX_MODEL"),
    };

    let present = section.project_id.is_some() || section.access_token.is_some() || section.credentials.is_some();
    Ok(present.then_some(section))
}

fn ollama_from_env() -> anyhow::Result<Option<OllamaConfig>> {
    let section = OllamaConfig {
        base_url: url("OLLAMA_HOST")?,
        model: var("OLLAMA_MODEL"),
    };

    Ok(section.base_url.is_some().then_some(section))
}
