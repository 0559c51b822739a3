use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use compforge_utils::error::ConfigError;
use compforge_utils::types::{ProviderId, StageId};

use super::{
    CliArgs, Config, ConfigSource, Defaults, LlmConfig, PreflightConfig, ProviderConfig,
    ProvidersConfig, StageConfig, StagesConfig,
};

/// Environment variable pointing at a directory holding `config.toml`.
pub const HOME_ENV: &str = "COMPFORGE_HOME";

/// Directory searched for upward from the working directory.
pub const CONFIG_DIR: &str = ".compforge";

pub const CONFIG_FILE: &str = "config.toml";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize, Serialize)]
struct TomlConfig {
    defaults: Option<Defaults>,
    llm: Option<LlmConfig>,
    providers: Option<ProvidersConfig>,
    stages: Option<StagesConfig>,
    preflight: Option<PreflightConfig>,
}

/// Overwrite `target` when `value` is set, recording where it came from.
fn apply<T>(
    target: &mut Option<T>,
    value: Option<T>,
    key: &str,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    if value.is_some() {
        *target = value;
        attribution.insert(key.to_string(), source.clone());
    }
}

fn apply_provider(
    target: &mut ProviderConfig,
    file: ProviderConfig,
    provider: ProviderId,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    let prefix = format!("providers.{}", provider.as_str());
    apply(
        &mut target.model,
        file.model,
        &format!("{prefix}.model"),
        source,
        attribution,
    );
    apply(
        &mut target.fallback_model,
        file.fallback_model,
        &format!("{prefix}.fallback_model"),
        source,
        attribution,
    );
    apply(
        &mut target.base_url,
        file.base_url,
        &format!("{prefix}.base_url"),
        source,
        attribution,
    );
    apply(
        &mut target.api_key_env,
        file.api_key_env,
        &format!("{prefix}.api_key_env"),
        source,
        attribution,
    );
}

fn apply_stage(
    target: &mut StageConfig,
    file: StageConfig,
    stage: StageId,
    source: &ConfigSource,
    attribution: &mut HashMap<String, ConfigSource>,
) {
    let prefix = format!("stages.{}", stage.as_str());
    apply(
        &mut target.model,
        file.model,
        &format!("{prefix}.model"),
        source,
        attribution,
    );
    apply(
        &mut target.fallback_model,
        file.fallback_model,
        &format!("{prefix}.fallback_model"),
        source,
        attribution,
    );
    apply(
        &mut target.max_tokens,
        file.max_tokens,
        &format!("{prefix}.max_tokens"),
        source,
        attribution,
    );
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self> {
        let start_dir = env::current_dir().context("Failed to get current directory")?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover configuration starting from `start_dir`, honouring `COMPFORGE_HOME`.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self> {
        let home = env::var_os(HOME_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self::discover_with_home(start_dir, home.as_deref(), cli_args)
    }

    /// Path-driven variant that does not read process-global state.
    ///
    /// File lookup order: `cli_args.config_path`, then `<home>/config.toml`,
    /// then an upward search for `.compforge/config.toml` from `start_dir`.
    pub fn discover_with_home(
        start_dir: &Path,
        home: Option<&Path>,
        cli_args: &CliArgs,
    ) -> Result<Self> {
        let mut source_attribution = HashMap::new();

        let mut defaults = Defaults::default();
        let mut llm = LlmConfig::default();
        let mut providers = ProvidersConfig::default();
        let mut stages = StagesConfig::default();
        let mut preflight = PreflightConfig::default();

        for key in [
            "timeout_secs",
            "max_tokens",
            "temperature",
            "verbose",
            "preflight.enabled",
        ] {
            source_attribution.insert(key.to_string(), ConfigSource::Default);
        }

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.exists() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    }
                    .into());
                }
                Some(explicit.clone())
            }
            None => match home.map(|dir| dir.join(CONFIG_FILE)) {
                Some(home_config) if home_config.exists() => Some(home_config),
                _ => Self::discover_config_file_from(start_dir)?,
            },
        };

        if let Some(path) = &config_path {
            let file_config = Self::load_config_file(path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?;
            let source = ConfigSource::Config;
            let attr = &mut source_attribution;

            if let Some(file_defaults) = file_config.defaults {
                apply(
                    &mut defaults.timeout_secs,
                    file_defaults.timeout_secs,
                    "timeout_secs",
                    &source,
                    attr,
                );
                apply(
                    &mut defaults.max_tokens,
                    file_defaults.max_tokens,
                    "max_tokens",
                    &source,
                    attr,
                );
                apply(
                    &mut defaults.temperature,
                    file_defaults.temperature,
                    "temperature",
                    &source,
                    attr,
                );
                apply(
                    &mut defaults.verbose,
                    file_defaults.verbose,
                    "verbose",
                    &source,
                    attr,
                );
            }

            if let Some(file_llm) = file_config.llm {
                apply(
                    &mut llm.relay_url,
                    file_llm.relay_url,
                    "relay_url",
                    &source,
                    attr,
                );
                apply(
                    &mut llm.credentials_file,
                    file_llm.credentials_file,
                    "credentials_file",
                    &source,
                    attr,
                );
            }

            if let Some(file_providers) = file_config.providers {
                for provider in ProviderId::ALL {
                    if let Some(file_provider) = file_providers.get(provider).cloned() {
                        apply_provider(
                            providers.get_or_insert(provider),
                            file_provider,
                            provider,
                            &source,
                            attr,
                        );
                    }
                }
            }

            if let Some(file_stages) = file_config.stages {
                for stage in StageId::ALL {
                    if let Some(file_stage) = file_stages.get(stage).cloned() {
                        apply_stage(stages.get_or_insert(stage), file_stage, stage, &source, attr);
                    }
                }
            }

            if let Some(file_preflight) = file_config.preflight {
                apply(
                    &mut preflight.enabled,
                    file_preflight.enabled,
                    "preflight.enabled",
                    &source,
                    attr,
                );
                apply(
                    &mut preflight.image_keywords,
                    file_preflight.image_keywords,
                    "preflight.image_keywords",
                    &source,
                    attr,
                );
            }
        }

        // CLI overrides (highest priority)
        let cli = ConfigSource::Cli;
        let attr = &mut source_attribution;
        apply(
            &mut defaults.timeout_secs,
            cli_args.timeout_secs,
            "timeout_secs",
            &cli,
            attr,
        );
        apply(
            &mut defaults.max_tokens,
            cli_args.max_tokens,
            "max_tokens",
            &cli,
            attr,
        );
        apply(
            &mut defaults.temperature,
            cli_args.temperature,
            "temperature",
            &cli,
            attr,
        );
        apply(&mut defaults.verbose, cli_args.verbose, "verbose", &cli, attr);
        apply(
            &mut llm.relay_url,
            cli_args.relay_url.clone(),
            "relay_url",
            &cli,
            attr,
        );
        apply(
            &mut llm.credentials_file,
            cli_args.credentials_file.clone(),
            "credentials_file",
            &cli,
            attr,
        );
        if cli_args.no_preflight {
            preflight.enabled = Some(false);
            attr.insert("preflight.enabled".to_string(), ConfigSource::Cli);
        }

        let config = Self {
            defaults,
            llm,
            providers,
            stages,
            preflight,
            config_path,
            source_attribution,
        };

        config.validate()?;

        Ok(config)
    }

    /// Discover config file by searching upward from a given directory
    ///
    /// Walks up the directory tree looking for `.compforge/config.toml`,
    /// stopping at repository root markers (.git, .hg, .svn) or filesystem root.
    pub fn discover_config_file_from(start_dir: &Path) -> Result<Option<PathBuf>> {
        let mut current_dir = start_dir.to_path_buf();

        loop {
            let config_path = current_dir.join(CONFIG_DIR).join(CONFIG_FILE);
            if config_path.exists() {
                return Ok(Some(config_path));
            }

            if current_dir.join(".git").exists()
                || current_dir.join(".hg").exists()
                || current_dir.join(".svn").exists()
            {
                break;
            }

            match current_dir.parent() {
                Some(parent) => current_dir = parent.to_path_buf(),
                None => break,
            }
        }

        Ok(None)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let config: TomlConfig = toml::from_str(&content).map_err(|e| {
                    ConfigError::InvalidFile(format!(
                        "Failed to parse TOML config file {}: {e}",
                        path.display()
                    ))
                })?;
                Ok(config)
            }
            // Discovery only yields existing paths; a race with deletion falls back to defaults.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(TomlConfig::default()),
            Err(e) => Err(anyhow::anyhow!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            )),
        }
    }
}
