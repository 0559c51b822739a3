use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use compforge_utils::types::{ConfigSource, ProviderId, StageId};

/// Default per-call timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Default output token budget per call
pub const DEFAULT_MAX_TOKENS: u32 = 8192;

pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Keywords that make the pre-flight check ask before sending a request to a
/// provider that may not accept visual input.
pub const DEFAULT_IMAGE_KEYWORDS: &[&str] = &[
    "image",
    "picture",
    "photo",
    "screenshot",
    "icon",
    "logo",
    "png",
    "jpg",
    "jpeg",
    "svg",
    "gif",
];

/// Configuration for compforge runs.
///
/// `Config` provides hierarchical configuration with discovery and precedence:
/// CLI arguments > config file > built-in defaults.
///
/// Use [`Config::discover()`] for CLI-like behavior (searches for
/// `.compforge/config.toml` upward from the current directory and respects
/// `COMPFORGE_HOME`), or [`Config::builder()`] for deterministic programmatic
/// configuration.
///
/// # Configuration File Format
///
/// ```toml
/// [defaults]
/// timeout_secs = 90
/// max_tokens = 8192
/// temperature = 0.2
///
/// [llm]
/// relay_url = "https://relay.internal.example"
///
/// [providers.gemini]
/// model = "gemini-2.5-pro"
/// fallback_model = "gemini-2.5-flash"
///
/// [providers.claude]
/// model = "claude-sonnet-4-5"
/// api_key_env = "MY_ANTHROPIC_KEY"
///
/// [stages.audit]
/// max_tokens = 4096
///
/// [preflight]
/// enabled = true
/// image_keywords = ["image", "icon"]
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub defaults: Defaults,
    pub llm: LlmConfig,
    pub providers: ProvidersConfig,
    pub stages: StagesConfig,
    pub preflight: PreflightConfig,
    /// Config file the values were loaded from, if any.
    pub config_path: Option<PathBuf>,
    /// Source attribution for each setting (for `compforge config`).
    pub source_attribution: HashMap<String, ConfigSource>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Defaults {
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub verbose: Option<bool>,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
            max_tokens: Some(DEFAULT_MAX_TOKENS),
            temperature: Some(DEFAULT_TEMPERATURE),
            verbose: Some(false),
        }
    }
}

/// Gateway-wide settings
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Reverse-proxy relay; providers are addressed at `{relay_url}/api/<provider>`.
    pub relay_url: Option<String>,
    /// TOML file holding user-configured keys (see `compforge-llm::credentials`).
    pub credentials_file: Option<PathBuf>,
}

/// Per-provider settings
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ProviderConfig {
    pub model: Option<String>,
    /// Same-provider fallback model; only honoured for the default provider.
    pub fallback_model: Option<String>,
    /// Overrides both the relay and the public host.
    pub base_url: Option<String>,
    /// Environment variable consulted when no user-configured key exists.
    pub api_key_env: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ProvidersConfig {
    pub gemini: Option<ProviderConfig>,
    pub claude: Option<ProviderConfig>,
    pub openai: Option<ProviderConfig>,
}

impl ProvidersConfig {
    #[must_use]
    pub fn get(&self, provider: ProviderId) -> Option<&ProviderConfig> {
        match provider {
            ProviderId::Gemini => self.gemini.as_ref(),
            ProviderId::Claude => self.claude.as_ref(),
            ProviderId::OpenAi => self.openai.as_ref(),
        }
    }

    pub fn get_or_insert(&mut self, provider: ProviderId) -> &mut ProviderConfig {
        let slot = match provider {
            ProviderId::Gemini => &mut self.gemini,
            ProviderId::Claude => &mut self.claude,
            ProviderId::OpenAi => &mut self.openai,
        };
        slot.get_or_insert_with(ProviderConfig::default)
    }
}

/// Per-stage overrides.
///
/// `model` and `fallback_model` apply when the stage talks to the default
/// provider; a non-default provider selected for code generation uses its own
/// `[providers.<name>]` model.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct StageConfig {
    pub model: Option<String>,
    pub fallback_model: Option<String>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StagesConfig {
    pub spec_draft: Option<StageConfig>,
    pub code_gen: Option<StageConfig>,
    pub audit: Option<StageConfig>,
}

impl StagesConfig {
    #[must_use]
    pub fn get(&self, stage: StageId) -> Option<&StageConfig> {
        match stage {
            StageId::SpecDraft => self.spec_draft.as_ref(),
            StageId::CodeGen => self.code_gen.as_ref(),
            StageId::Audit => self.audit.as_ref(),
        }
    }

    pub fn get_or_insert(&mut self, stage: StageId) -> &mut StageConfig {
        let slot = match stage {
            StageId::SpecDraft => &mut self.spec_draft,
            StageId::CodeGen => &mut self.code_gen,
            StageId::Audit => &mut self.audit,
        };
        slot.get_or_insert_with(StageConfig::default)
    }
}

/// Pre-flight modality check settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PreflightConfig {
    pub enabled: Option<bool>,
    pub image_keywords: Option<Vec<String>>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            enabled: Some(true),
            image_keywords: None,
        }
    }
}

/// Built-in primary model per provider.
#[must_use]
pub const fn builtin_model(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Gemini => "gemini-2.5-pro",
        ProviderId::Claude => "claude-sonnet-4-5",
        ProviderId::OpenAi => "gpt-4.1",
    }
}

/// Built-in same-provider fallback model (default provider only).
#[must_use]
pub const fn builtin_fallback_model(provider: ProviderId) -> Option<&'static str> {
    match provider {
        ProviderId::Gemini => Some("gemini-2.5-flash"),
        ProviderId::Claude | ProviderId::OpenAi => None,
    }
}

/// Public API host per provider, used when neither a relay nor a base URL is set.
#[must_use]
pub const fn public_base_url(provider: ProviderId) -> &'static str {
    match provider {
        ProviderId::Gemini => "https://generativelanguage.googleapis.com",
        ProviderId::Claude => "https://api.anthropic.com",
        ProviderId::OpenAi => "https://api.openai.com",
    }
}
