use std::collections::BTreeMap;

use compforge_utils::types::{ConfigSource, ProviderId, StageId};

use super::Config;

fn source_label(source: Option<&ConfigSource>) -> String {
    source.unwrap_or(&ConfigSource::Default).as_str().to_string()
}

impl Config {
    /// Effective configuration as `key -> (value, source)`, sorted by key.
    ///
    /// Resolved values are reported even when nothing was configured, so the
    /// output shows exactly what a run would use. Keys are never included.
    #[must_use]
    pub fn effective_config(&self) -> BTreeMap<String, (String, String)> {
        let mut config = BTreeMap::new();

        // `source_key` differs from `key` when a value is inherited.
        let mut add = |key: &str, source_key: &str, value: String| {
            let source = source_label(self.source_attribution.get(source_key));
            config.insert(key.to_string(), (value, source));
        };

        add("timeout_secs", "timeout_secs", self.timeout().as_secs().to_string());
        add("max_tokens", "max_tokens", self.default_max_tokens().to_string());
        add("temperature", "temperature", self.temperature().to_string());
        add("verbose", "verbose", self.verbose().to_string());
        add(
            "preflight.enabled",
            "preflight.enabled",
            self.preflight_enabled().to_string(),
        );
        add(
            "preflight.image_keywords",
            "preflight.image_keywords",
            self.image_keywords().join(", "),
        );

        if let Some(relay) = &self.llm.relay_url {
            add("relay_url", "relay_url", relay.clone());
        }
        if let Some(path) = self.credentials_path() {
            add("credentials_file", "credentials_file", path.display().to_string());
        }

        for provider in ProviderId::ALL {
            let prefix = format!("providers.{}", provider.as_str());
            let model_key = format!("{prefix}.model");
            add(&model_key, &model_key, self.provider_model(provider));

            if let Some(fallback) = self.fallback_model_for(StageId::SpecDraft, provider) {
                let key = format!("{prefix}.fallback_model");
                add(&key, &key, fallback);
            }

            let base_key = format!("{prefix}.base_url");
            let base_source = if self.source_attribution.contains_key(&base_key) {
                base_key.clone()
            } else {
                "relay_url".to_string()
            };
            add(&base_key, &base_source, self.base_url(provider));

            let env_key = format!("{prefix}.api_key_env");
            add(&env_key, &env_key, self.api_key_env(provider));
        }

        for stage in StageId::ALL {
            let prefix = format!("stages.{}", stage.as_str());
            if let Some(sc) = self.stages.get(stage) {
                if let Some(model) = &sc.model {
                    let key = format!("{prefix}.model");
                    add(&key, &key, model.clone());
                }
                if let Some(fallback) = &sc.fallback_model {
                    let key = format!("{prefix}.fallback_model");
                    add(&key, &key, fallback.clone());
                }
            }

            // Stage token budgets inherit `[defaults] max_tokens` and its source.
            let key = format!("{prefix}.max_tokens");
            let source_key = if self.source_attribution.contains_key(&key) {
                key.clone()
            } else {
                "max_tokens".to_string()
            };
            add(&key, &source_key, self.max_tokens_for(stage).to_string());
        }

        config
    }
}
