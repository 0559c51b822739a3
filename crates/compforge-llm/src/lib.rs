//! Multi-provider LLM gateway for compforge
//!
//! All providers implement [`LlmBackend`]; callers go through a per-run
//! [`Gateway`] and never see provider-specific envelopes or auth placement.
//! Retry decisions live in [`FallbackPolicy`] only, the adapters make exactly
//! one attempt per call.

mod anthropic_backend;
pub mod credentials;
mod fallback;
mod gateway;
mod gemini_backend;
pub mod http_client;
mod openai_backend;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;

pub use anthropic_backend::AnthropicBackend;
pub use credentials::{
    ApiKey, Credential, CredentialResolver, CredentialSource, CredentialStore,
    FileCredentialStore, InMemoryCredentialStore, Resolution,
};
pub use fallback::{
    CallOutcome, CallPlan, CallTarget, FallbackHop, FallbackPolicy, FallbackRule, FallbackTrigger,
};
pub use gateway::{BackendFactory, Gateway, HttpBackendFactory};
pub use gemini_backend::GeminiBackend;
pub use openai_backend::OpenAiBackend;
pub use types::{HttpParams, LlmBackend, LlmInvocation, LlmResult, Message, Role};

pub use compforge_utils::error::LlmError;
