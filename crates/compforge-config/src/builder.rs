use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use compforge_utils::error::ConfigError;
use compforge_utils::types::{ProviderId, StageId};

use super::{
    Config, ConfigSource, Defaults, LlmConfig, PreflightConfig, ProvidersConfig, StagesConfig,
};

impl Config {
    /// Create a builder for programmatic configuration.
    ///
    /// ```rust
    /// use compforge_config::Config;
    /// use compforge_utils::types::ProviderId;
    /// use std::time::Duration;
    ///
    /// let config = Config::builder()
    ///     .timeout(Duration::from_secs(30))
    ///     .relay_url("http://127.0.0.1:8787")
    ///     .provider_model(ProviderId::Claude, "claude-opus-4-1")
    ///     .build()
    ///     .expect("valid config");
    ///
    /// assert_eq!(config.base_url(ProviderId::Gemini), "http://127.0.0.1:8787/api/gemini");
    /// ```
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for programmatic configuration.
///
/// Nothing is read from the environment or the filesystem. All values set via
/// the builder are attributed to [`ConfigSource::Programmatic`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    defaults: Defaults,
    llm: LlmConfig,
    providers: ProvidersConfig,
    stages: StagesConfig,
    preflight: PreflightConfig,
    set_keys: Vec<String>,
}

impl ConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn mark(mut self, key: impl Into<String>) -> Self {
        self.set_keys.push(key.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.defaults.timeout_secs = Some(timeout.as_secs());
        self.mark("timeout_secs")
    }

    #[must_use]
    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.defaults.max_tokens = Some(max_tokens);
        self.mark("max_tokens")
    }

    #[must_use]
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.defaults.temperature = Some(temperature);
        self.mark("temperature")
    }

    #[must_use]
    pub fn relay_url(mut self, url: impl Into<String>) -> Self {
        self.llm.relay_url = Some(url.into());
        self.mark("relay_url")
    }

    #[must_use]
    pub fn credentials_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.llm.credentials_file = Some(path.into());
        self.mark("credentials_file")
    }

    #[must_use]
    pub fn base_url(mut self, provider: ProviderId, url: impl Into<String>) -> Self {
        self.providers.get_or_insert(provider).base_url = Some(url.into());
        self.mark(format!("providers.{}.base_url", provider.as_str()))
    }

    #[must_use]
    pub fn provider_model(mut self, provider: ProviderId, model: impl Into<String>) -> Self {
        self.providers.get_or_insert(provider).model = Some(model.into());
        self.mark(format!("providers.{}.model", provider.as_str()))
    }

    #[must_use]
    pub fn provider_fallback_model(
        mut self,
        provider: ProviderId,
        model: impl Into<String>,
    ) -> Self {
        self.providers.get_or_insert(provider).fallback_model = Some(model.into());
        self.mark(format!("providers.{}.fallback_model", provider.as_str()))
    }

    #[must_use]
    pub fn api_key_env(mut self, provider: ProviderId, env_name: impl Into<String>) -> Self {
        self.providers.get_or_insert(provider).api_key_env = Some(env_name.into());
        self.mark(format!("providers.{}.api_key_env", provider.as_str()))
    }

    #[must_use]
    pub fn stage_model(mut self, stage: StageId, model: impl Into<String>) -> Self {
        self.stages.get_or_insert(stage).model = Some(model.into());
        self.mark(format!("stages.{}.model", stage.as_str()))
    }

    #[must_use]
    pub fn stage_fallback_model(mut self, stage: StageId, model: impl Into<String>) -> Self {
        self.stages.get_or_insert(stage).fallback_model = Some(model.into());
        self.mark(format!("stages.{}.fallback_model", stage.as_str()))
    }

    #[must_use]
    pub fn stage_max_tokens(mut self, stage: StageId, max_tokens: u32) -> Self {
        self.stages.get_or_insert(stage).max_tokens = Some(max_tokens);
        self.mark(format!("stages.{}.max_tokens", stage.as_str()))
    }

    #[must_use]
    pub fn preflight(mut self, enabled: bool) -> Self {
        self.preflight.enabled = Some(enabled);
        self.mark("preflight.enabled")
    }

    #[must_use]
    pub fn image_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preflight.image_keywords = Some(keywords.into_iter().map(Into::into).collect());
        self.mark("preflight.image_keywords")
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<Config, ConfigError> {
        let mut source_attribution: HashMap<String, ConfigSource> = [
            "timeout_secs",
            "max_tokens",
            "temperature",
            "verbose",
            "preflight.enabled",
        ]
        .into_iter()
        .map(|key| (key.to_string(), ConfigSource::Default))
        .collect();
        for key in self.set_keys {
            source_attribution.insert(key, ConfigSource::Programmatic);
        }

        let config = Config {
            defaults: self.defaults,
            llm: self.llm,
            providers: self.providers,
            stages: self.stages,
            preflight: self.preflight,
            config_path: None,
            source_attribution,
        };
        config.validate()?;
        Ok(config)
    }
}
