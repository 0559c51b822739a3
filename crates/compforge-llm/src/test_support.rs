//! Scripted adapters for exercising the pipeline without a network.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use compforge_config::Config;
use compforge_utils::error::LlmError;
use compforge_utils::types::ProviderId;

use crate::credentials::Credential;
use crate::gateway::BackendFactory;
use crate::types::{LlmBackend, LlmInvocation, LlmResult};

/// Adapter that replays a fixed script of responses, one per call.
///
/// Every invocation is recorded. Once the script is exhausted further calls
/// fail with `Misconfiguration`.
#[derive(Debug)]
pub struct ScriptedBackend {
    provider: ProviderId,
    script: Mutex<VecDeque<Result<String, LlmError>>>,
    calls: Mutex<Vec<LlmInvocation>>,
    gate: Option<Arc<Notify>>,
}

impl ScriptedBackend {
    #[must_use]
    pub fn new(provider: ProviderId) -> Self {
        Self {
            provider,
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            gate: None,
        }
    }

    #[must_use]
    pub fn respond(self, text: impl Into<String>) -> Self {
        self.push(Ok(text.into()));
        self
    }

    #[must_use]
    pub fn fail(self, error: LlmError) -> Self {
        self.push(Err(error));
        self
    }

    /// Hold every call until `gate` is notified once for it.
    #[must_use]
    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    fn push(&self, entry: Result<String, LlmError>) {
        self.script.lock().unwrap().push_back(entry);
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    #[must_use]
    pub fn invocations(&self) -> Vec<LlmInvocation> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn models_called(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|inv| inv.model.clone())
            .collect()
    }

    /// User prompts received, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|inv| {
                inv.messages
                    .iter()
                    .find(|m| m.role == crate::types::Role::User)
                    .map(|m| m.content.clone())
            })
            .collect()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    fn provider(&self) -> ProviderId {
        self.provider
    }

    async fn invoke(&self, inv: LlmInvocation) -> Result<LlmResult, LlmError> {
        inv.validate_for(self.provider)?;
        self.calls.lock().unwrap().push(inv.clone());

        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Ok(text)) => Ok(LlmResult::new(text, self.provider, inv.model)),
            Some(Err(e)) => Err(e),
            None => Err(LlmError::Misconfiguration(format!(
                "scripted {} backend has no response left",
                self.provider
            ))),
        }
    }
}

/// Factory handing out pre-built adapters by provider.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    backends: HashMap<ProviderId, Arc<ScriptedBackend>>,
    created: Mutex<Vec<ProviderId>>,
}

impl ScriptedFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, backend: Arc<ScriptedBackend>) -> Self {
        self.backends.insert(backend.provider(), backend);
        self
    }

    /// Providers for which an adapter was requested, in order.
    #[must_use]
    pub fn created(&self) -> Vec<ProviderId> {
        self.created.lock().unwrap().clone()
    }
}

impl BackendFactory for ScriptedFactory {
    fn create(
        &self,
        credential: &Credential,
        _config: &Config,
    ) -> Result<Arc<dyn LlmBackend>, LlmError> {
        self.created.lock().unwrap().push(credential.provider);
        self.backends
            .get(&credential.provider)
            .map(|b| Arc::clone(b) as Arc<dyn LlmBackend>)
            .ok_or_else(|| {
                LlmError::Misconfiguration(format!(
                    "no scripted backend for {}",
                    credential.provider
                ))
            })
    }
}
