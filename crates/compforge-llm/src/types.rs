//! Core types for the provider gateway

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use compforge_utils::error::LlmError;
use compforge_utils::types::{ProviderId, StageId};

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }
}

/// Input to a provider call.
///
/// Stages build one system message (the instruction) followed by one user
/// message (the prompt). `metadata` carries per-call overrides such as
/// `max_tokens` and `temperature`.
#[derive(Debug, Clone)]
pub struct LlmInvocation {
    /// Stage issuing the call, for logging.
    pub stage: StageId,
    pub model: String,
    pub timeout: Duration,
    pub messages: Vec<Message>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl LlmInvocation {
    #[must_use]
    pub fn new(
        stage: StageId,
        model: impl Into<String>,
        timeout: Duration,
        messages: Vec<Message>,
    ) -> Self {
        Self {
            stage,
            model: model.into(),
            timeout,
            messages,
            metadata: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Same invocation addressed to a different model.
    #[must_use]
    pub fn retarget(&self, model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..self.clone()
        }
    }

    /// Concatenated system messages, if any.
    #[must_use]
    pub fn system_instruction(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n\n"))
    }

    /// Check the call can be sent to `provider` at all.
    ///
    /// Fails with `Misconfiguration` when the prompt or system instruction is
    /// blank, or the model is empty or not from the provider's model family.
    pub fn validate_for(&self, provider: ProviderId) -> Result<(), LlmError> {
        let has_prompt = self
            .messages
            .iter()
            .any(|m| m.role == Role::User && !m.content.trim().is_empty());
        if !has_prompt {
            return Err(LlmError::Misconfiguration(format!(
                "{} stage produced an empty prompt",
                self.stage
            )));
        }

        let has_system = self
            .messages
            .iter()
            .any(|m| m.role == Role::System && !m.content.trim().is_empty());
        if !has_system {
            return Err(LlmError::Misconfiguration(format!(
                "{} stage has an empty system instruction",
                self.stage
            )));
        }

        if self.model.trim().is_empty() {
            return Err(LlmError::Misconfiguration(format!(
                "no model configured for {provider}"
            )));
        }

        if !provider.recognizes_model(&self.model) {
            return Err(LlmError::Misconfiguration(format!(
                "model '{}' is not a {} model",
                self.model,
                provider.display_name()
            )));
        }

        Ok(())
    }
}

/// Result from a provider call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResult {
    /// Extracted response text, verbatim.
    pub text: String,
    pub provider: ProviderId,
    pub model_used: String,
    pub tokens_input: Option<u64>,
    pub tokens_output: Option<u64>,
}

impl LlmResult {
    #[must_use]
    pub fn new(text: impl Into<String>, provider: ProviderId, model_used: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            provider,
            model_used: model_used.into(),
            tokens_input: None,
            tokens_output: None,
        }
    }

    #[must_use]
    pub fn with_tokens(mut self, input: Option<u64>, output: Option<u64>) -> Self {
        self.tokens_input = input;
        self.tokens_output = output;
        self
    }
}

/// Trait for provider adapters
///
/// Adapters hold no per-call state and may be invoked concurrently. They
/// never retry; a single failure is returned as-is for the fallback policy to
/// act on.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    fn provider(&self) -> ProviderId;

    /// Perform exactly one provider call.
    ///
    /// # Errors
    ///
    /// - `Misconfiguration` if the invocation fails [`LlmInvocation::validate_for`]
    /// - `AuthenticationFailure`, `UnsupportedModality` or `Transport` for non-2xx responses
    /// - `Timeout` if the call exceeds `inv.timeout`
    /// - `MalformedResponse` if a 2xx body lacks the expected text
    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError>;
}

/// Sampling parameters sent with each request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 8192,
            temperature: 0.2,
        }
    }
}

impl HttpParams {
    /// Per-call overrides from `inv.metadata` take precedence over `self`.
    #[must_use]
    pub fn resolve(&self, inv: &LlmInvocation) -> HttpParams {
        let max_tokens = inv
            .metadata
            .get("max_tokens")
            .and_then(|v| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(self.max_tokens);

        let temperature = inv
            .metadata
            .get("temperature")
            .and_then(|v| v.as_f64())
            .map(|v| v as f32)
            .unwrap_or(self.temperature);

        HttpParams {
            max_tokens,
            temperature,
        }
    }
}
