use crate::{Config, PROVIDER_NAMES};

/// Upper bound on configured rate-limit retries
const MAX_RETRIES_CEILING: u32 = 10;

impl Config {
    /// Parse configuration from TOML text
    ///
    /// Expands `{{ env.VAR }}` placeholders, then deserializes and validates
    /// the result. Reading the text from disk is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if variable expansion, TOML parsing or validation fails
    pub fn from_toml_str(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;
        tracing::debug!(sections = ?config.providers.present(), "configuration parsed");

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error describing the first inconsistency found
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(preferred) = &self.preferred_provider
            && !PROVIDER_NAMES.contains(&preferred.as_str())
        {
            anyhow::bail!(
                "unknown preferred_provider '{preferred}', expected one of: {}",
                PROVIDER_NAMES.join(", ")
            );
        }

        if let Some(preferred) = &self.preferred_provider
            && !self.providers.present().contains(&preferred.as_str())
        {
            tracing::warn!(
                preferred = %preferred,
                "preferred_provider has no configuration section, priority order applies"
            );
        }

        if self.request_timeout_secs == Some(0) {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }

        if self.retry.max_retries > MAX_RETRIES_CEILING {
            anyhow::bail!("retry.max_retries must be at most {MAX_RETRIES_CEILING}");
        }

        if let Some(azure) = &self.providers.azure
            && azure.api_version.as_deref().is_some_and(|v| v.trim().is_empty())
        {
            anyhow::bail!("providers.azure.api_version must not be empty");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use crate::{Config, LogFormat};

    #[test]
    fn empty_text_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert!(config.preferred_provider.is_none());
        assert!(config.providers.openai.is_none());
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.request_timeout().as_secs(), 120);
    }

    #[test]
    fn parses_provider_sections() {
        let toml = r#"
            preferred_provider = "anthropic"
            request_timeout_secs = 30

            [retry]
            base_delay_ms = 5

            [logging]
            filter = "debug"
            format = "json"

            [providers.anthropic]
            api_key = "sk-ant"

            [providers.azure]
            api_key = "az-key"
            endpoint = "https://example.openai.azure.com"
            deployment = "gpt-4o-prod"

            [providers.ollama]
            base_url = "http://localhost:11434"
            model = "llama3.1"
        "#;

        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.preferred_provider.as_deref(), Some("anthropic"));
        assert_eq!(config.retry.base_delay_ms, 5);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.logging.format, LogFormat::Json);

        let anthropic = config.providers.anthropic.unwrap();
        assert_eq!(anthropic.api_key.unwrap().expose_secret(), "sk-ant");

        let azure = config.providers.azure.unwrap();
        assert_eq!(azure.deployment.as_deref(), Some("gpt-4o-prod"));
        assert_eq!(
            azure.endpoint.unwrap().as_str(),
            "https://example.openai.azure.com/"
        );

        let ollama = config.providers.ollama.unwrap();
        assert_eq!(ollama.model.as_deref(), Some("llama3.1"));
    }

    #[test]
    fn present_sections_follow_priority_order() {
        let toml = "[providers.ollama]\n[providers.anthropic]\napi_key = \"k\"\n[providers.azure]\n";
        let config = Config::from_toml_str(toml).unwrap();
        assert_eq!(config.providers.present(), ["azure", "anthropic", "ollama"]);
    }

    #[test]
    fn expands_placeholders_before_parsing() {
        temp_env::with_var("QUILL_OPENAI_KEY", Some("sk-from-env"), || {
            let toml = "[providers.openai]\napi_key = \"{{ env.QUILL_OPENAI_KEY }}\"\n";
            let config = Config::from_toml_str(toml).unwrap();
            let key = config.providers.openai.unwrap().api_key.unwrap();
            assert_eq!(key.expose_secret(), "sk-from-env");
        });
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Config::from_toml_str("[providers.openai]\ntoken = \"x\"").unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn rejects_unknown_preferred_provider() {
        let err = Config::from_toml_str("preferred_provider = \"bedrock\"").unwrap_err();
        assert!(err.to_string().contains("unknown preferred_provider"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let err = Config::from_toml_str("request_timeout_secs = 0").unwrap_err();
        assert!(err.to_string().contains("request_timeout_secs"));
    }

    #[test]
    fn rejects_excessive_retries() {
        let err = Config::from_toml_str("[retry]\nmax_retries = 50").unwrap_err();
        assert!(err.to_string().contains("max_retries"));
    }
}
