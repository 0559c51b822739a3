use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Stage identifiers for the generation pipeline.
///
/// Stages execute strictly in this order, each consuming the previous stage's
/// verbatim output:
///
/// ```text
/// SpecDraft → CodeGen → Audit
/// ```
///
/// # Example
///
/// ```rust
/// use compforge_utils::types::StageId;
///
/// assert_eq!(StageId::SpecDraft.as_str(), "spec_draft");
/// assert_eq!(StageId::CodeGen.index(), 2);
/// assert_eq!(StageId::SpecDraft.next(), Some(StageId::CodeGen));
/// assert_eq!(StageId::Audit.next(), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Stage 1: turns the free-text request into a structured component spec.
    SpecDraft,
    /// Stage 2: generates component code from the drafted spec.
    CodeGen,
    /// Stage 3: audits the generated code against platform constraints.
    Audit,
}

impl StageId {
    /// All stages in execution order.
    pub const ALL: [StageId; 3] = [StageId::SpecDraft, StageId::CodeGen, StageId::Audit];

    /// Canonical snake_case name used in config sections, logs and run records.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SpecDraft => "spec_draft",
            Self::CodeGen => "code_gen",
            Self::Audit => "audit",
        }
    }

    /// One-based position of the stage in the pipeline.
    #[must_use]
    pub const fn index(&self) -> u8 {
        match self {
            Self::SpecDraft => 1,
            Self::CodeGen => 2,
            Self::Audit => 3,
        }
    }

    /// Human-readable label for progress output.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::SpecDraft => "Spec drafting",
            Self::CodeGen => "Code generation",
            Self::Audit => "Code audit",
        }
    }

    /// The stage that consumes this stage's output.
    #[must_use]
    pub const fn next(&self) -> Option<StageId> {
        match self {
            Self::SpecDraft => Some(Self::CodeGen),
            Self::CodeGen => Some(Self::Audit),
            Self::Audit => None,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// LLM providers the gateway can talk to.
///
/// `Gemini` is the default provider and must always be credentialed. `Claude`
/// and `OpenAi` are optional and only matter when selected for code generation.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    /// Google Gemini (default provider, key passed as a query parameter).
    #[default]
    Gemini,
    /// Anthropic Claude (header auth, top-level `system` field).
    Claude,
    /// OpenAI chat completions (bearer auth, leading system message).
    #[serde(rename = "openai")]
    OpenAi,
}

impl ProviderId {
    /// All providers, default first.
    pub const ALL: [ProviderId; 3] = [ProviderId::Gemini, ProviderId::Claude, ProviderId::OpenAi];

    /// The provider every stage falls back to.
    pub const DEFAULT: ProviderId = ProviderId::Gemini;

    /// Canonical lowercase name; also the relay path segment (`/api/<name>`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::Claude => "claude",
            Self::OpenAi => "openai",
        }
    }

    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
            Self::Claude => "Claude",
            Self::OpenAi => "OpenAI",
        }
    }

    #[must_use]
    pub const fn is_default(&self) -> bool {
        matches!(self, Self::Gemini)
    }

    /// Environment variable consulted when no user-configured key exists.
    #[must_use]
    pub const fn default_api_key_env(&self) -> &'static str {
        match self {
            Self::Gemini => "GEMINI_API_KEY",
            Self::Claude => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Whether `model` belongs to this provider's model family.
    ///
    /// ```rust
    /// use compforge_utils::types::ProviderId;
    ///
    /// assert!(ProviderId::Gemini.recognizes_model("gemini-2.5-flash"));
    /// assert!(ProviderId::OpenAi.recognizes_model("o4-mini"));
    /// assert!(!ProviderId::Claude.recognizes_model("gpt-4.1"));
    /// ```
    #[must_use]
    pub fn recognizes_model(&self, model: &str) -> bool {
        let model = model.trim().to_ascii_lowercase();
        let prefixes: &[&str] = match self {
            Self::Gemini => &["gemini-", "models/gemini-"],
            Self::Claude => &["claude-"],
            Self::OpenAi => &["gpt-", "chatgpt-", "o1", "o3", "o4"],
        };
        prefixes.iter().any(|prefix| model.starts_with(prefix))
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "claude" | "anthropic" => Ok(Self::Claude),
            "openai" | "gpt" | "chatgpt" => Ok(Self::OpenAi),
            other => Err(format!(
                "Unknown provider '{other}'. Supported providers: gemini, claude, openai."
            )),
        }
    }
}

/// Source of a configuration value.
///
/// Indicates where a configuration value originated from in the precedence chain:
/// CLI arguments > config file > programmatic overrides > built-in defaults.
///
/// ```rust
/// use compforge_utils::types::ConfigSource;
///
/// let json = serde_json::to_string(&ConfigSource::Cli).unwrap();
/// assert_eq!(json, r#""cli""#);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    /// Value provided via CLI argument (highest precedence).
    Cli,
    /// Value loaded from configuration file.
    Config,
    /// Value provided programmatically.
    Programmatic,
    /// Built-in default value (lowest precedence).
    Default,
}

impl ConfigSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Config => "config",
            Self::Programmatic => "programmatic",
            Self::Default => "default",
        }
    }
}
