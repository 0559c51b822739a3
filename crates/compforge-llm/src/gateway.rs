//! Provider gateway: the adapter set for one run
//!
//! A [`Gateway`] maps each credentialed provider to its adapter. It is built
//! fresh per run by a [`BackendFactory`] from the credentials resolved for
//! that run, so key changes between runs are always picked up.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use compforge_config::Config;
use compforge_utils::error::LlmError;
use compforge_utils::types::ProviderId;

use crate::anthropic_backend::AnthropicBackend;
use crate::credentials::Credential;
use crate::gemini_backend::GeminiBackend;
use crate::http_client::HttpClient;
use crate::openai_backend::OpenAiBackend;
use crate::types::{HttpParams, LlmBackend, LlmInvocation, LlmResult};

/// Builds an adapter for a provider from a resolved credential.
pub trait BackendFactory: Send + Sync {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the adapter cannot be constructed
    fn create(
        &self,
        credential: &Credential,
        config: &Config,
    ) -> Result<Arc<dyn LlmBackend>, LlmError>;
}

/// Factory for the real HTTP adapters, sharing one connection pool.
#[derive(Clone, Debug)]
pub struct HttpBackendFactory {
    client: Arc<HttpClient>,
}

impl HttpBackendFactory {
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be constructed
    pub fn new() -> Result<Self, LlmError> {
        Ok(Self {
            client: Arc::new(HttpClient::new()?),
        })
    }

    #[must_use]
    pub fn with_client(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

impl BackendFactory for HttpBackendFactory {
    fn create(
        &self,
        credential: &Credential,
        config: &Config,
    ) -> Result<Arc<dyn LlmBackend>, LlmError> {
        let base_url = config.base_url(credential.provider);
        let params = HttpParams {
            max_tokens: config.default_max_tokens(),
            temperature: config.temperature(),
        };
        let client = Arc::clone(&self.client);
        let key = credential.key.clone();

        debug!(
            provider = %credential.provider,
            source = %credential.source,
            base_url = %base_url,
            "Constructing provider backend"
        );

        let backend: Arc<dyn LlmBackend> = match credential.provider {
            ProviderId::Gemini => Arc::new(GeminiBackend::new(client, key, base_url, params)),
            ProviderId::Claude => Arc::new(AnthropicBackend::new(client, key, base_url, params)),
            ProviderId::OpenAi => Arc::new(OpenAiBackend::new(client, key, base_url, params)),
        };
        Ok(backend)
    }
}

/// Adapters available to one run, keyed by provider.
#[derive(Clone, Default)]
pub struct Gateway {
    backends: HashMap<ProviderId, Arc<dyn LlmBackend>>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.backends.keys().map(|p| p.as_str()).collect();
        providers.sort_unstable();
        f.debug_struct("Gateway").field("providers", &providers).finish()
    }
}

impl Gateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every credential.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error for the first adapter that fails to build
    pub fn from_credentials<'a, I>(
        factory: &dyn BackendFactory,
        credentials: I,
        config: &Config,
    ) -> Result<Self, LlmError>
    where
        I: IntoIterator<Item = &'a Credential>,
    {
        let mut gateway = Self::new();
        for credential in credentials {
            gateway.insert(factory.create(credential, config)?);
        }
        Ok(gateway)
    }

    /// Register an adapter under the provider it reports.
    pub fn insert(&mut self, backend: Arc<dyn LlmBackend>) {
        self.backends.insert(backend.provider(), backend);
    }

    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn LlmBackend>) -> Self {
        self.insert(backend);
        self
    }

    #[must_use]
    pub fn contains(&self, provider: ProviderId) -> bool {
        self.backends.contains_key(&provider)
    }

    /// Call `provider` once.
    ///
    /// # Errors
    ///
    /// `MissingCredential` if the provider has no adapter (no network attempt),
    /// otherwise whatever the adapter returns
    pub async fn call(
        &self,
        provider: ProviderId,
        inv: LlmInvocation,
    ) -> Result<LlmResult, LlmError> {
        let backend = self
            .backends
            .get(&provider)
            .ok_or(LlmError::MissingCredential { provider })?;
        backend.invoke(inv).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{ApiKey, CredentialSource};
    use crate::types::Message;
    use compforge_utils::types::StageId;
    use std::time::Duration;

    fn credential(provider: ProviderId) -> Credential {
        Credential {
            provider,
            key: ApiKey::new("test-key-value"),
            source: CredentialSource::EnvironmentDefault,
            origin: provider.default_api_key_env().to_string(),
        }
    }

    #[test]
    fn test_factory_builds_one_backend_per_credential() {
        let factory = HttpBackendFactory::new().unwrap();
        let config = Config::builder().build().unwrap();
        let creds = [credential(ProviderId::Gemini), credential(ProviderId::OpenAi)];

        let gateway = Gateway::from_credentials(&factory, &creds, &config).unwrap();

        assert!(gateway.contains(ProviderId::Gemini));
        assert!(gateway.contains(ProviderId::OpenAi));
        assert!(!gateway.contains(ProviderId::Claude));
        assert!(!format!("{gateway:?}").contains("test-key-value"));
    }

    #[tokio::test]
    async fn test_call_without_backend_is_missing_credential() {
        let gateway = Gateway::new();
        let inv = LlmInvocation::new(
            StageId::SpecDraft,
            "gemini-2.5-pro",
            Duration::from_secs(1),
            vec![Message::system("s"), Message::user("u")],
        );

        match gateway.call(ProviderId::Gemini, inv).await {
            Err(LlmError::MissingCredential { provider }) => assert_eq!(provider, ProviderId::Gemini),
            other => panic!("expected MissingCredential, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_factory_routes_through_configured_relay() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/claude/v1/messages")
            .with_status(200)
            .with_body(r#"{"content":[{"type":"text","text":"relayed"}]}"#)
            .create_async()
            .await;

        let config = Config::builder().relay_url(server.url()).build().unwrap();
        let factory = HttpBackendFactory::new().unwrap();
        let gateway =
            Gateway::from_credentials(&factory, &[credential(ProviderId::Claude)], &config).unwrap();

        let inv = LlmInvocation::new(
            StageId::CodeGen,
            "claude-sonnet-4-5",
            Duration::from_secs(5),
            vec![Message::system("s"), Message::user("u")],
        );
        let result = gateway.call(ProviderId::Claude, inv).await.unwrap();

        mock.assert_async().await;
        assert_eq!(result.text, "relayed");
    }
}
