//! Configuration management for compforge
//!
//! Hierarchical configuration with discovery and precedence:
//! CLI > file > defaults. TOML files carry `[defaults]`, `[llm]`,
//! `[providers.<name>]`, `[stages.<name>]` and `[preflight]` sections.

mod builder;
mod cli_args;
mod discovery;
mod model;
mod sources;
mod validation;

pub use builder::ConfigBuilder;
pub use cli_args::CliArgs;
pub use compforge_utils::types::ConfigSource;
pub use discovery::{CONFIG_DIR, CONFIG_FILE, HOME_ENV};
pub use model::*;

use std::path::PathBuf;
use std::time::Duration;

use compforge_utils::types::{ProviderId, StageId};

impl Config {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.defaults.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    #[must_use]
    pub fn temperature(&self) -> f32 {
        self.defaults.temperature.unwrap_or(DEFAULT_TEMPERATURE)
    }

    #[must_use]
    pub fn verbose(&self) -> bool {
        self.defaults.verbose.unwrap_or(false)
    }

    #[must_use]
    pub fn default_max_tokens(&self) -> u32 {
        self.defaults.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Output token budget for a stage: `[stages.<stage>]` > `[defaults]` > built-in.
    #[must_use]
    pub fn max_tokens_for(&self, stage: StageId) -> u32 {
        self.stages
            .get(stage)
            .and_then(|sc| sc.max_tokens)
            .unwrap_or_else(|| self.default_max_tokens())
    }

    /// Primary model configured for a provider, ignoring stage overrides.
    #[must_use]
    pub fn provider_model(&self, provider: ProviderId) -> String {
        self.providers
            .get(provider)
            .and_then(|pc| pc.model.clone())
            .unwrap_or_else(|| builtin_model(provider).to_string())
    }

    /// Primary model for `stage` when it talks to `provider`.
    ///
    /// Stage overrides apply to the default provider only; a non-default
    /// provider always uses its `[providers.<name>] model`.
    ///
    /// ```rust
    /// use compforge_config::Config;
    /// use compforge_utils::types::{ProviderId, StageId};
    ///
    /// let config = Config::builder()
    ///     .stage_model(StageId::Audit, "gemini-2.5-flash")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.model_for(StageId::Audit, ProviderId::Gemini), "gemini-2.5-flash");
    /// assert_eq!(config.model_for(StageId::SpecDraft, ProviderId::Gemini), "gemini-2.5-pro");
    /// assert_eq!(config.model_for(StageId::CodeGen, ProviderId::Claude), "claude-sonnet-4-5");
    /// ```
    #[must_use]
    pub fn model_for(&self, stage: StageId, provider: ProviderId) -> String {
        if provider.is_default()
            && let Some(model) = self.stages.get(stage).and_then(|sc| sc.model.clone())
        {
            return model;
        }
        self.provider_model(provider)
    }

    /// Same-provider fallback model; `None` for non-default providers.
    #[must_use]
    pub fn fallback_model_for(&self, stage: StageId, provider: ProviderId) -> Option<String> {
        if !provider.is_default() {
            return None;
        }
        self.stages
            .get(stage)
            .and_then(|sc| sc.fallback_model.clone())
            .or_else(|| {
                self.providers
                    .get(provider)
                    .and_then(|pc| pc.fallback_model.clone())
            })
            .or_else(|| builtin_fallback_model(provider).map(str::to_string))
    }

    /// Base URL for a provider: `[providers.<name>] base_url` > relay > public host.
    ///
    /// Never ends with a slash.
    #[must_use]
    pub fn base_url(&self, provider: ProviderId) -> String {
        if let Some(base) = self.providers.get(provider).and_then(|pc| pc.base_url.as_ref()) {
            return base.trim().trim_end_matches('/').to_string();
        }
        if let Some(relay) = &self.llm.relay_url {
            return format!(
                "{}/api/{}",
                relay.trim().trim_end_matches('/'),
                provider.as_str()
            );
        }
        public_base_url(provider).to_string()
    }

    /// Environment variable consulted for the provider's key.
    #[must_use]
    pub fn api_key_env(&self, provider: ProviderId) -> String {
        self.providers
            .get(provider)
            .and_then(|pc| pc.api_key_env.clone())
            .unwrap_or_else(|| provider.default_api_key_env().to_string())
    }

    /// Location of the user-configured credentials file.
    ///
    /// Falls back to `~/.compforge/credentials.toml`; `None` only if no home
    /// directory can be determined.
    #[must_use]
    pub fn credentials_path(&self) -> Option<PathBuf> {
        self.llm.credentials_file.clone().or_else(|| {
            dirs::home_dir().map(|home| home.join(CONFIG_DIR).join("credentials.toml"))
        })
    }

    #[must_use]
    pub fn preflight_enabled(&self) -> bool {
        self.preflight.enabled.unwrap_or(true)
    }

    #[must_use]
    pub fn image_keywords(&self) -> Vec<String> {
        match &self.preflight.image_keywords {
            Some(keywords) => keywords.clone(),
            None => DEFAULT_IMAGE_KEYWORDS
                .iter()
                .map(|k| (*k).to_string())
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn create_test_config_file(dir: &Path, content: &str) -> PathBuf {
        let config_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&config_dir).unwrap();
        let config_path = config_dir.join(CONFIG_FILE);
        fs::write(&config_path, content).unwrap();
        config_path
    }

    fn discover(dir: &Path, cli_args: &CliArgs) -> anyhow::Result<Config> {
        Config::discover_with_home(dir, None, cli_args)
    }

    #[test]
    fn test_default_config() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        let config = discover(temp_dir.path(), &CliArgs::default()).unwrap();

        assert!(config.config_path.is_none());
        assert_eq!(config.timeout(), Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.max_tokens_for(StageId::Audit), DEFAULT_MAX_TOKENS);
        assert_eq!(config.model_for(StageId::SpecDraft, ProviderId::Gemini), "gemini-2.5-pro");
        assert_eq!(
            config.fallback_model_for(StageId::Audit, ProviderId::Gemini),
            Some("gemini-2.5-flash".to_string())
        );
        assert_eq!(config.fallback_model_for(StageId::CodeGen, ProviderId::OpenAi), None);
        assert_eq!(
            config.base_url(ProviderId::Claude),
            "https://api.anthropic.com"
        );
        assert!(config.preflight_enabled());
        assert!(config.image_keywords().contains(&"image".to_string()));
    }

    #[test]
    fn test_config_discovery_with_cli_override() {
        let temp_dir = TempDir::new().unwrap();
        create_test_config_file(
            temp_dir.path(),
            r#"
[defaults]
timeout_secs = 45
max_tokens = 2048

[llm]
relay_url = "https://relay.example.com/"

[providers.claude]
model = "claude-opus-4-1"
api_key_env = "TEAM_CLAUDE_KEY"

[stages.audit]
model = "gemini-2.5-flash"
max_tokens = 1024
"#,
        );

        let cli_args = CliArgs {
            timeout_secs: Some(10),
            verbose: Some(true),
            ..Default::default()
        };
        let config = discover(temp_dir.path(), &cli_args).unwrap();

        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert!(config.verbose());
        assert_eq!(config.default_max_tokens(), 2048);
        assert_eq!(config.max_tokens_for(StageId::Audit), 1024);
        assert_eq!(config.max_tokens_for(StageId::CodeGen), 2048);
        assert_eq!(config.model_for(StageId::CodeGen, ProviderId::Claude), "claude-opus-4-1");
        assert_eq!(config.model_for(StageId::Audit, ProviderId::Gemini), "gemini-2.5-flash");
        assert_eq!(config.api_key_env(ProviderId::Claude), "TEAM_CLAUDE_KEY");
        assert_eq!(config.api_key_env(ProviderId::Gemini), "GEMINI_API_KEY");
        assert_eq!(
            config.base_url(ProviderId::OpenAi),
            "https://relay.example.com/api/openai"
        );

        assert_eq!(
            config.source_attribution.get("timeout_secs"),
            Some(&ConfigSource::Cli)
        );
        assert_eq!(
            config.source_attribution.get("max_tokens"),
            Some(&ConfigSource::Config)
        );
        assert_eq!(
            config.source_attribution.get("providers.claude.model"),
            Some(&ConfigSource::Config)
        );
    }

    #[test]
    fn test_provider_base_url_overrides_relay() {
        let config = Config::builder()
            .relay_url("http://relay.local")
            .base_url(ProviderId::Gemini, "http://127.0.0.1:9000/")
            .build()
            .unwrap();
        assert_eq!(config.base_url(ProviderId::Gemini), "http://127.0.0.1:9000");
        assert_eq!(config.base_url(ProviderId::Claude), "http://relay.local/api/claude");
    }

    #[test]
    fn test_stage_model_override_ignored_for_non_default_provider() {
        let config = Config::builder()
            .stage_model(StageId::CodeGen, "gemini-2.5-flash")
            .build()
            .unwrap();
        assert_eq!(config.model_for(StageId::CodeGen, ProviderId::Gemini), "gemini-2.5-flash");
        assert_eq!(config.model_for(StageId::CodeGen, ProviderId::OpenAi), "gpt-4.1");
    }

    #[test]
    fn test_config_validation_rejects_bad_values() {
        let temp_dir = TempDir::new().unwrap();
        let cases = [
            ("[defaults]\ntimeout_secs = 0\n", "timeout_secs"),
            ("[defaults]\ntemperature = 2.5\n", "temperature"),
            ("[defaults]\nmax_tokens = 0\n", "max_tokens"),
            ("[providers.gemini]\nmodel = \"  \"\n", "providers.gemini.model"),
            ("[stages.code_gen]\nfallback_model = \"\"\n", "stages.code_gen.fallback_model"),
            ("[llm]\nrelay_url = \"relay.local\"\n", "relay_url"),
            ("[providers.openai]\napi_key_env = \"\"\n", "providers.openai.api_key_env"),
        ];

        for (content, key) in cases {
            let path = create_test_config_file(temp_dir.path(), content);
            let cli_args = CliArgs {
                config_path: Some(path),
                ..Default::default()
            };
            let err = discover(temp_dir.path(), &cli_args).unwrap_err();
            assert!(
                format!("{err:#}").contains(key),
                "expected error mentioning {key}, got {err:#}"
            );
        }
    }

    #[test]
    fn test_builder_validates() {
        let err = Config::builder().temperature(-0.1).build().unwrap_err();
        assert!(err.to_string().contains("temperature"));
    }

    #[test]
    fn test_invalid_toml_config() {
        let temp_dir = TempDir::new().unwrap();
        create_test_config_file(temp_dir.path(), "invalid toml content [[[");

        let err = discover(temp_dir.path(), &CliArgs::default()).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to parse TOML config file"));
    }

    #[test]
    fn test_config_with_wrong_types() {
        let temp_dir = TempDir::new().unwrap();
        create_test_config_file(temp_dir.path(), "[defaults]\ntimeout_secs = \"soon\"\n");
        assert!(discover(temp_dir.path(), &CliArgs::default()).is_err());
    }

    #[test]
    fn test_config_with_unknown_fields_is_accepted() {
        let temp_dir = TempDir::new().unwrap();
        create_test_config_file(
            temp_dir.path(),
            r#"
[defaults]
timeout_secs = 30
unknown_field = "ignored"

[unknown_section]
key = "value"
"#,
        );
        let config = discover(temp_dir.path(), &CliArgs::default()).unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_missing_config_path_is_error() {
        let temp_dir = TempDir::new().unwrap();
        let cli_args = CliArgs {
            config_path: Some(temp_dir.path().join("nope.toml")),
            ..Default::default()
        };
        let err = discover(temp_dir.path(), &cli_args).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_upward_discovery_stops_at_repo_root() {
        let temp_dir = TempDir::new().unwrap();
        create_test_config_file(temp_dir.path(), "[defaults]\ntimeout_secs = 33\n");

        let repo = temp_dir.path().join("repo");
        let nested = repo.join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        // Found from a nested directory when no repo marker intervenes.
        let found = Config::discover_config_file_from(&nested).unwrap();
        assert_eq!(found, Some(temp_dir.path().join(CONFIG_DIR).join(CONFIG_FILE)));

        fs::create_dir(repo.join(".git")).unwrap();
        assert_eq!(Config::discover_config_file_from(&nested).unwrap(), None);
    }

    #[test]
    fn test_home_config_takes_precedence_over_upward_search() {
        let project = TempDir::new().unwrap();
        create_test_config_file(project.path(), "[defaults]\ntimeout_secs = 11\n");
        let home = TempDir::new().unwrap();
        fs::write(home.path().join(CONFIG_FILE), "[defaults]\ntimeout_secs = 22\n").unwrap();

        let config =
            Config::discover_with_home(project.path(), Some(home.path()), &CliArgs::default())
                .unwrap();
        assert_eq!(config.timeout(), Duration::from_secs(22));
    }

    #[test]
    #[serial]
    fn test_discover_from_reads_home_env() {
        let project = TempDir::new().unwrap();
        fs::create_dir(project.path().join(".git")).unwrap();
        let home = TempDir::new().unwrap();
        fs::write(home.path().join(CONFIG_FILE), "[defaults]\ntimeout_secs = 77\n").unwrap();

        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var(HOME_ENV, home.path()) };
        let result = Config::discover_from(project.path(), &CliArgs::default());
        unsafe { std::env::remove_var(HOME_ENV) };

        assert_eq!(result.unwrap().timeout(), Duration::from_secs(77));
    }

    #[test]
    fn test_no_preflight_flag() {
        let temp_dir = TempDir::new().unwrap();
        create_test_config_file(temp_dir.path(), "[preflight]\nenabled = true\n");
        let cli_args = CliArgs {
            no_preflight: true,
            ..Default::default()
        };
        let config = discover(temp_dir.path(), &cli_args).unwrap();
        assert!(!config.preflight_enabled());
        assert_eq!(
            config.source_attribution.get("preflight.enabled"),
            Some(&ConfigSource::Cli)
        );
    }

    #[test]
    fn test_effective_config() {
        let temp_dir = TempDir::new().unwrap();
        create_test_config_file(
            temp_dir.path(),
            "[defaults]\nmax_tokens = 4000\n\n[providers.gemini]\nbase_url = \"http://localhost:1234\"\n",
        );
        let config = discover(temp_dir.path(), &CliArgs::default()).unwrap();
        let effective = config.effective_config();

        assert_eq!(effective["max_tokens"], ("4000".to_string(), "config".to_string()));
        assert_eq!(
            effective["stages.audit.max_tokens"],
            ("4000".to_string(), "config".to_string())
        );
        assert_eq!(
            effective["timeout_secs"],
            (DEFAULT_TIMEOUT_SECS.to_string(), "default".to_string())
        );
        assert_eq!(
            effective["providers.gemini.base_url"],
            ("http://localhost:1234".to_string(), "config".to_string())
        );
        assert_eq!(
            effective["providers.claude.api_key_env"],
            ("ANTHROPIC_API_KEY".to_string(), "default".to_string())
        );
        assert!(!effective.contains_key("providers.claude.fallback_model"));
    }
}
