//! Providers command implementation
//!
//! Handles `compforge providers` and `compforge providers --json`. Reports
//! where each provider's key would come from, never the key itself.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;

use compforge_config::Config;
use compforge_llm::{CredentialResolver, CredentialSource};
use compforge_utils::exit_codes::ExitCode;
use compforge_utils::types::{ProviderId, StageId};

/// Credential and model summary for one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderStatus {
    pub provider: ProviderId,
    pub default: bool,
    pub available: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CredentialSource>,
    /// Store description or environment variable name.
    pub origin: String,
    /// Model per stage this provider would serve.
    pub models: BTreeMap<StageId, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub fallback_models: BTreeMap<StageId, String>,
}

/// Resolve every provider once.
#[must_use]
pub fn provider_statuses(config: &Config, resolver: &CredentialResolver) -> Vec<ProviderStatus> {
    ProviderId::ALL
        .into_iter()
        .map(|provider| {
            let resolution = resolver.resolve(provider);
            let credential = resolution.credential();

            // Non-default providers only ever serve Stage 2.
            let stages: &[StageId] = if provider.is_default() {
                &StageId::ALL
            } else {
                &[StageId::CodeGen]
            };
            let models = stages
                .iter()
                .map(|s| (*s, config.model_for(*s, provider)))
                .collect();
            let fallback_models = stages
                .iter()
                .filter_map(|s| config.fallback_model_for(*s, provider).map(|m| (*s, m)))
                .collect();

            ProviderStatus {
                provider,
                default: provider.is_default(),
                available: credential.is_some(),
                source: credential.map(|c| c.source),
                origin: credential.map_or_else(
                    || resolver.env_var(provider).to_string(),
                    |c| c.origin.clone(),
                ),
                models,
                fallback_models,
            }
        })
        .collect()
}

/// Execute the providers command.
///
/// Exits with `MISSING_CREDENTIAL` when the default provider has no key,
/// since no run could start.
pub fn execute_providers_command(json: bool, config: &Config) -> Result<ExitCode> {
    let resolver = CredentialResolver::from_config(config);
    let statuses = provider_statuses(config, &resolver);

    if json {
        let rendered =
            serde_json::to_string_pretty(&statuses).context("Failed to emit providers JSON")?;
        println!("{rendered}");
    } else {
        for status in &statuses {
            let marker = if status.available { "✓" } else { "✗" };
            let role = if status.default { " (default)" } else { "" };
            println!("{marker} {}{role}", status.provider.display_name());
            match status.source {
                Some(source) => println!("    key: {source} ({})", status.origin),
                None => println!("    key: missing (set {})", status.origin),
            }
            for (stage, model) in &status.models {
                match status.fallback_models.get(stage) {
                    Some(fallback) => {
                        println!("    {}: {model} (fallback {fallback})", stage.label());
                    }
                    None => println!("    {}: {model}", stage.label()),
                }
            }
        }
    }

    let default_available = statuses
        .iter()
        .any(|s| s.default && s.available);
    Ok(if default_available {
        ExitCode::SUCCESS
    } else {
        ExitCode::MISSING_CREDENTIAL
    })
}
