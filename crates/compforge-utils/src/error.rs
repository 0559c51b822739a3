use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::types::{ProviderId, StageId};

/// Library-level error type for compforge operations.
///
/// Stage failures do not surface here: the orchestrator records them in the
/// run itself. `CompforgeError` covers what happens around a run (config,
/// caller misuse, I/O while exporting results).
///
/// | Category | Description |
/// |----------|-------------|
/// | `Config` | Configuration file or CLI argument errors |
/// | `Llm` | Provider errors outside a run (e.g. building a backend) |
/// | `Stage` | A stage failure propagated to a caller that wants `?` |
/// | `Pipeline` | Invalid pipeline invocation |
#[derive(Error, Debug)]
pub enum CompforgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM provider error: {0}")]
    Llm(#[from] LlmError),

    #[error("Stage error: {0}")]
    Stage(#[from] StageError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Credentials,
    ProviderIntegration,
    StageExecution,
    FileSystem,
    Validation,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Credentials => write!(f, "Credentials"),
            Self::ProviderIntegration => write!(f, "Provider Integration"),
            Self::StageExecution => write!(f, "Stage Execution"),
            Self::FileSystem => write!(f, "File System"),
            Self::Validation => write!(f, "Validation"),
        }
    }
}

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Configuration discovery failed: {0}")]
    DiscoveryFailed(String),
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(msg) => format!("The configuration file could not be read: {msg}"),
            Self::InvalidValue { key, value } => {
                format!("Configuration key '{key}' has an invalid value: {value}")
            }
            Self::NotFound { path } => format!("No configuration file exists at {path}"),
            Self::DiscoveryFailed(msg) => format!("Could not locate configuration: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Configuration is loaded with precedence: CLI flags > .compforge/config.toml > defaults."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of .compforge/config.toml".to_string(),
                "Run 'compforge config' to see the effective configuration".to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![format!(
                "Fix or remove '{key}' in the configuration file or CLI flags"
            )],
            Self::NotFound { .. } => vec![
                "Check the path passed to --config".to_string(),
                "Omit --config to use discovery".to_string(),
            ],
            Self::DiscoveryFailed(_) => {
                vec!["Set COMPFORGE_HOME or pass --config explicitly".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

/// Failure categories surfaced to callers for a failed stage.
///
/// These are the stable, display-level distinctions; [`LlmError`] carries
/// more detail (status codes, timeouts) than a caller usually needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Required provider key absent; the stage was never attempted.
    MissingCredential,
    /// The provider rejected the key.
    AuthenticationFailure,
    /// The provider cannot process the requested content (e.g. images).
    UnsupportedModality,
    /// Network, timeout or non-success status without a more specific signal.
    TransportFailure,
    /// Success status but the expected payload field was missing.
    MalformedResponse,
    /// Local configuration made the call impossible.
    Configuration,
}

impl FailureKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::AuthenticationFailure => "authentication_failure",
            Self::UnsupportedModality => "unsupported_modality",
            Self::TransportFailure => "transport_failure",
            Self::MalformedResponse => "malformed_response",
            Self::Configuration => "configuration",
        }
    }

    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::MissingCredential => "Missing credential",
            Self::AuthenticationFailure => "Authentication failure",
            Self::UnsupportedModality => "Unsupported input modality",
            Self::TransportFailure => "Transport failure",
            Self::MalformedResponse => "Malformed response",
            Self::Configuration => "Configuration error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Errors produced by provider adapters, the credential resolver and the
/// fallback policy.
///
/// Messages carried by these variants are already redacted by the adapter
/// that produced them; they never contain a resolved key.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// No key could be resolved for the provider; no request was sent.
    #[error("No API key configured for {provider}")]
    MissingCredential { provider: ProviderId },

    /// Provider rejected the credential (401/403 or an auth marker in the body).
    #[error("{provider} rejected the API key: {message}")]
    AuthenticationFailure { provider: ProviderId, message: String },

    /// Provider reported it cannot process the requested input modality.
    #[error("{provider} cannot process this input: {message}")]
    UnsupportedModality { provider: ProviderId, message: String },

    /// Connectivity failure or a non-success status without a more specific signal.
    #[error("{provider} transport error{}: {message}", status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        provider: ProviderId,
        status: Option<u16>,
        message: String,
    },

    /// Request did not complete within the configured timeout.
    #[error("{provider} timed out after {duration:?}")]
    Timeout {
        provider: ProviderId,
        duration: Duration,
    },

    /// Success status but the response lacked the expected text field.
    #[error("{provider} returned a malformed response: {message}")]
    MalformedResponse { provider: ProviderId, message: String },

    /// The call could not be built from the local configuration.
    #[error("Misconfiguration: {0}")]
    Misconfiguration(String),
}

impl LlmError {
    /// Display-level category for this error.
    #[must_use]
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::MissingCredential { .. } => FailureKind::MissingCredential,
            Self::AuthenticationFailure { .. } => FailureKind::AuthenticationFailure,
            Self::UnsupportedModality { .. } => FailureKind::UnsupportedModality,
            Self::Transport { .. } | Self::Timeout { .. } => FailureKind::TransportFailure,
            Self::MalformedResponse { .. } => FailureKind::MalformedResponse,
            Self::Misconfiguration(_) => FailureKind::Configuration,
        }
    }

    /// Provider the error is attributed to, if any.
    #[must_use]
    pub fn provider(&self) -> Option<ProviderId> {
        match self {
            Self::MissingCredential { provider }
            | Self::AuthenticationFailure { provider, .. }
            | Self::UnsupportedModality { provider, .. }
            | Self::Transport { provider, .. }
            | Self::Timeout { provider, .. }
            | Self::MalformedResponse { provider, .. } => Some(*provider),
            Self::Misconfiguration(_) => None,
        }
    }

    /// Best-effort upstream message (already redacted).
    #[must_use]
    pub fn upstream_message(&self) -> String {
        match self {
            Self::MissingCredential { provider } => format!(
                "set {} or configure a {} key",
                provider.default_api_key_env(),
                provider.display_name()
            ),
            Self::AuthenticationFailure { message, .. }
            | Self::UnsupportedModality { message, .. }
            | Self::Transport { message, .. }
            | Self::MalformedResponse { message, .. } => message.clone(),
            Self::Timeout { duration, .. } => format!("no response within {duration:?}"),
            Self::Misconfiguration(message) => message.clone(),
        }
    }
}

impl UserFriendlyError for LlmError {
    fn user_message(&self) -> String {
        match self {
            Self::MissingCredential { provider } => {
                format!("No API key is available for {}", provider.display_name())
            }
            Self::AuthenticationFailure { provider, message } => format!(
                "{} authentication failed: {message}",
                provider.display_name()
            ),
            Self::UnsupportedModality { provider, message } => format!(
                "{} cannot handle this request's content: {message}",
                provider.display_name()
            ),
            Self::Transport { provider, message, .. } => {
                format!("Could not reach {}: {message}", provider.display_name())
            }
            Self::Timeout { provider, duration } => format!(
                "{} did not answer within {duration:?}",
                provider.display_name()
            ),
            Self::MalformedResponse { provider, message } => format!(
                "{} returned an unexpected response: {message}",
                provider.display_name()
            ),
            Self::Misconfiguration(msg) => format!("LLM configuration error: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::MissingCredential { .. } => Some(
                "User-configured keys take precedence over environment variables.".to_string(),
            ),
            Self::AuthenticationFailure { .. } => {
                Some("Authentication errors indicate an invalid or revoked API key.".to_string())
            }
            Self::UnsupportedModality { .. } => Some(
                "Some providers reject prompts that reference images or other visual input."
                    .to_string(),
            ),
            Self::Transport { .. } | Self::Timeout { .. } => Some(
                "Transport errors occur when the provider or the relay cannot be reached."
                    .to_string(),
            ),
            Self::MalformedResponse { .. } => {
                Some("The provider answered with a payload missing the generated text.".to_string())
            }
            Self::Misconfiguration(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::MissingCredential { provider } => vec![
                format!("Export {}", provider.default_api_key_env()),
                format!(
                    "Add a [{}] entry to the credentials file",
                    provider.as_str()
                ),
            ],
            Self::AuthenticationFailure { .. } => vec![
                "Verify the API key is valid and not expired".to_string(),
                "Run 'compforge providers' to see which key source is in use".to_string(),
            ],
            Self::UnsupportedModality { .. } => vec![
                "Select the default provider (--provider gemini) for image-related requests"
                    .to_string(),
                "Describe the visual element in text instead of referencing an image".to_string(),
            ],
            Self::Transport { .. } | Self::Timeout { .. } => vec![
                "Check network connectivity and the relay URL".to_string(),
                "Retry the run; transient provider errors usually clear quickly".to_string(),
            ],
            Self::MalformedResponse { .. } => {
                vec!["Retry the run or choose a different model".to_string()]
            }
            Self::Misconfiguration(_) => vec![
                "Check the [providers] and [stages] sections of .compforge/config.toml"
                    .to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::MissingCredential { .. } | Self::AuthenticationFailure { .. } => {
                ErrorCategory::Credentials
            }
            Self::Misconfiguration(_) => ErrorCategory::Configuration,
            _ => ErrorCategory::ProviderIntegration,
        }
    }
}

/// An adapter error tagged with the stage that issued the call.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("stage {} ({stage}) failed: {source}", stage.index())]
pub struct StageError {
    pub stage: StageId,
    #[source]
    pub source: LlmError,
}

impl StageError {
    #[must_use]
    pub fn new(stage: StageId, source: LlmError) -> Self {
        Self { stage, source }
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.source.kind()
    }
}

impl UserFriendlyError for StageError {
    fn user_message(&self) -> String {
        format!(
            "Stage {} ({}) failed: {}",
            self.stage.index(),
            self.stage.label(),
            self.source.user_message()
        )
    }

    fn context(&self) -> Option<String> {
        self.source.context()
    }

    fn suggestions(&self) -> Vec<String> {
        self.source.suggestions()
    }

    fn category(&self) -> ErrorCategory {
        match self.source.category() {
            ErrorCategory::ProviderIntegration => ErrorCategory::StageExecution,
            other => other,
        }
    }
}

/// Invalid pipeline invocations rejected before a run is created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("request text is empty")]
    EmptyInput,
}

impl UserFriendlyError for PipelineError {
    fn user_message(&self) -> String {
        match self {
            Self::EmptyInput => "Describe the component you want to build".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        None
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::EmptyInput => vec![
                "Pass the request as an argument: compforge run \"a circular gauge 0-100\""
                    .to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Validation
    }
}

impl UserFriendlyError for CompforgeError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(err) => err.user_message(),
            Self::Llm(err) => err.user_message(),
            Self::Stage(err) => err.user_message(),
            Self::Pipeline(err) => err.user_message(),
            Self::Io(err) => format!("File system error: {err}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(err) => err.context(),
            Self::Llm(err) => err.context(),
            Self::Stage(err) => err.context(),
            Self::Pipeline(err) => err.context(),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(err) => err.suggestions(),
            Self::Llm(err) => err.suggestions(),
            Self::Stage(err) => err.suggestions(),
            Self::Pipeline(err) => err.suggestions(),
            Self::Io(_) => vec!["Check permissions of the output directory".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(err) => err.category(),
            Self::Llm(err) => err.category(),
            Self::Stage(err) => err.category(),
            Self::Pipeline(err) => err.category(),
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl CompforgeError {
    /// Multi-line report for terminal output.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut out = format!("✗ {}", self.user_message());
        if let Some(context) = self.context() {
            out.push_str(&format!("\n  {context}"));
        }
        for suggestion in self.suggestions() {
            out.push_str(&format!("\n  → {suggestion}"));
        }
        out
    }
}
