//! Credential resolution
//!
//! A provider key is looked up in two places, in order:
//!
//! 1. the user-configured [`CredentialStore`] (e.g. a TOML credentials file),
//! 2. the provider's environment variable (`GEMINI_API_KEY`, ...).
//!
//! A user-configured key strictly shadows the environment. Blank values count
//! as absent. Nothing is cached: every [`CredentialResolver::resolve`] call
//! consults both sources again.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

use compforge_config::Config;
use compforge_utils::error::LlmError;
use compforge_utils::types::ProviderId;

/// An API key. Never printed by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw key, for building requests and scrubbing error messages.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }

    fn from_raw(value: &str) -> Option<Self> {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Where a resolved key came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    UserConfigured,
    EnvironmentDefault,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UserConfigured => write!(f, "user-configured"),
            Self::EnvironmentDefault => write!(f, "environment"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub provider: ProviderId,
    pub key: ApiKey,
    pub source: CredentialSource,
    /// Human-readable origin: a store description or an env var name.
    pub origin: String,
}

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(Credential),
    Absent { provider: ProviderId },
}

impl Resolution {
    #[must_use]
    pub fn credential(&self) -> Option<&Credential> {
        match self {
            Self::Resolved(credential) => Some(credential),
            Self::Absent { .. } => None,
        }
    }

    /// Convert absence into `LlmError::MissingCredential`.
    pub fn into_result(self) -> Result<Credential, LlmError> {
        match self {
            Self::Resolved(credential) => Ok(credential),
            Self::Absent { provider } => Err(LlmError::MissingCredential { provider }),
        }
    }
}

/// User-configured key storage.
///
/// The encrypted store of a host application sits behind this trait; only the
/// lookup contract matters here.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, provider: ProviderId) -> Option<ApiKey>;

    /// Short description used in status output (never the key).
    fn describe(&self) -> String;
}

/// In-memory store, for embedding and tests.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    keys: RwLock<HashMap<ProviderId, ApiKey>>,
}

impl InMemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, provider: ProviderId, key: impl Into<String>) {
        if let Ok(mut keys) = self.keys.write() {
            keys.insert(provider, ApiKey::new(key));
        }
    }

    pub fn clear(&self, provider: ProviderId) {
        if let Ok(mut keys) = self.keys.write() {
            keys.remove(&provider);
        }
    }
}

impl CredentialStore for InMemoryCredentialStore {
    fn lookup(&self, provider: ProviderId) -> Option<ApiKey> {
        self.keys
            .read()
            .ok()
            .and_then(|keys| keys.get(&provider).and_then(|k| ApiKey::from_raw(k.expose())))
    }

    fn describe(&self) -> String {
        "in-memory store".to_string()
    }
}

/// TOML credentials file, re-read on every lookup.
///
/// ```toml
/// gemini = "..."
/// claude = "..."
/// openai = "..."
/// ```
///
/// A missing file means no user-configured keys. An unreadable or malformed
/// file is logged and treated the same way.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> HashMap<String, String> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cannot read credentials file");
                return HashMap::new();
            }
        };

        match toml::from_str::<HashMap<String, toml::Value>>(&content) {
            Ok(table) => table
                .into_iter()
                .filter_map(|(name, value)| match value {
                    toml::Value::String(s) => Some((name.to_ascii_lowercase(), s)),
                    _ => None,
                })
                .collect(),
            Err(_) => {
                // The parse error echoes file content, which may include keys.
                warn!(path = %self.path.display(), "Credentials file is not valid TOML; ignoring it");
                HashMap::new()
            }
        }
    }
}

impl CredentialStore for FileCredentialStore {
    fn lookup(&self, provider: ProviderId) -> Option<ApiKey> {
        self.load()
            .get(provider.as_str())
            .and_then(|value| ApiKey::from_raw(value))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Resolves provider keys: user-configured store first, then environment.
#[derive(Clone)]
pub struct CredentialResolver {
    store: Option<Arc<dyn CredentialStore>>,
    env_vars: HashMap<ProviderId, String>,
    env: EnvLookup,
}

impl fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("store", &self.store.as_ref().map(|s| s.describe()))
            .field("env_vars", &self.env_vars)
            .finish()
    }
}

impl Default for CredentialResolver {
    fn default() -> Self {
        Self::new(None)
    }
}

impl CredentialResolver {
    /// Resolver reading the process environment with default variable names.
    #[must_use]
    pub fn new(store: Option<Arc<dyn CredentialStore>>) -> Self {
        let env_vars = ProviderId::ALL
            .into_iter()
            .map(|p| (p, p.default_api_key_env().to_string()))
            .collect();
        Self {
            store,
            env_vars,
            env: Arc::new(|name| std::env::var(name).ok()),
        }
    }

    /// Resolver using the config's credentials file and `api_key_env` names.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let store = config
            .credentials_path()
            .map(|path| Arc::new(FileCredentialStore::new(path)) as Arc<dyn CredentialStore>);
        let mut resolver = Self::new(store);
        for provider in ProviderId::ALL {
            resolver
                .env_vars
                .insert(provider, config.api_key_env(provider));
        }
        resolver
    }

    /// Replace the environment lookup (tests and embedding hosts).
    #[must_use]
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Arc::new(lookup);
        self
    }

    #[must_use]
    pub fn env_var(&self, provider: ProviderId) -> &str {
        self.env_vars
            .get(&provider)
            .map(String::as_str)
            .unwrap_or_else(|| provider.default_api_key_env())
    }

    /// Look up the key for `provider`.
    #[must_use]
    pub fn resolve(&self, provider: ProviderId) -> Resolution {
        if let Some(store) = &self.store
            && let Some(key) = store.lookup(provider)
        {
            debug!(provider = %provider, source = "user-configured", "Resolved credential");
            return Resolution::Resolved(Credential {
                provider,
                key,
                source: CredentialSource::UserConfigured,
                origin: store.describe(),
            });
        }

        let env_var = self.env_var(provider);
        if let Some(key) = (self.env)(env_var).as_deref().and_then(ApiKey::from_raw) {
            debug!(provider = %provider, source = "environment", env_var, "Resolved credential");
            return Resolution::Resolved(Credential {
                provider,
                key,
                source: CredentialSource::EnvironmentDefault,
                origin: env_var.to_string(),
            });
        }

        debug!(provider = %provider, env_var, "No credential available");
        Resolution::Absent { provider }
    }
}
