use compforge_utils::error::ConfigError;
use compforge_utils::types::{ProviderId, StageId};

use super::Config;

/// Upper bound on a single provider call.
const MAX_TIMEOUT_SECS: u64 = 3600;

const MAX_TOKENS_LIMIT: u32 = 200_000;

fn invalid(key: impl Into<String>, value: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.into(),
        value: value.into(),
    }
}

fn validate_url(key: &str, url: &str) -> Result<(), ConfigError> {
    let trimmed = url.trim();
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(invalid(key, format!("'{url}' must start with http:// or https://")));
    }
    if trimmed.contains(char::is_whitespace) {
        return Err(invalid(key, "URL must not contain whitespace"));
    }
    Ok(())
}

fn validate_model(key: &str, model: Option<&String>) -> Result<(), ConfigError> {
    match model {
        Some(m) if m.trim().is_empty() => Err(invalid(key, "model name must not be empty")),
        _ => Ok(()),
    }
}

fn validate_max_tokens(key: &str, max_tokens: Option<u32>) -> Result<(), ConfigError> {
    match max_tokens {
        Some(0) => Err(invalid(key, "must be greater than 0")),
        Some(n) if n > MAX_TOKENS_LIMIT => Err(invalid(
            key,
            format!("exceeds maximum limit of {MAX_TOKENS_LIMIT}"),
        )),
        _ => Ok(()),
    }
}

impl Config {
    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(timeout) = self.defaults.timeout_secs {
            if timeout == 0 {
                return Err(invalid("timeout_secs", "must be greater than 0"));
            }
            if timeout > MAX_TIMEOUT_SECS {
                return Err(invalid(
                    "timeout_secs",
                    format!("exceeds maximum limit of {MAX_TIMEOUT_SECS} seconds"),
                ));
            }
        }

        validate_max_tokens("max_tokens", self.defaults.max_tokens)?;

        if let Some(temperature) = self.defaults.temperature
            && !(0.0..=2.0).contains(&temperature)
        {
            return Err(invalid(
                "temperature",
                format!("{temperature} is outside the range 0.0..=2.0"),
            ));
        }

        if let Some(relay) = &self.llm.relay_url {
            validate_url("relay_url", relay)?;
        }

        for provider in ProviderId::ALL {
            let Some(pc) = self.providers.get(provider) else {
                continue;
            };
            let prefix = format!("providers.{}", provider.as_str());
            validate_model(&format!("{prefix}.model"), pc.model.as_ref())?;
            validate_model(
                &format!("{prefix}.fallback_model"),
                pc.fallback_model.as_ref(),
            )?;
            if let Some(url) = &pc.base_url {
                validate_url(&format!("{prefix}.base_url"), url)?;
            }
            if let Some(env_name) = &pc.api_key_env
                && env_name.trim().is_empty()
            {
                return Err(invalid(
                    format!("{prefix}.api_key_env"),
                    "environment variable name must not be empty",
                ));
            }
        }

        for stage in StageId::ALL {
            let Some(sc) = self.stages.get(stage) else {
                continue;
            };
            let prefix = format!("stages.{}", stage.as_str());
            validate_model(&format!("{prefix}.model"), sc.model.as_ref())?;
            validate_model(
                &format!("{prefix}.fallback_model"),
                sc.fallback_model.as_ref(),
            )?;
            validate_max_tokens(&format!("{prefix}.max_tokens"), sc.max_tokens)?;
        }

        if let Some(keywords) = &self.preflight.image_keywords
            && keywords.iter().any(|k| k.trim().is_empty())
        {
            return Err(invalid(
                "preflight.image_keywords",
                "keywords must not be empty strings",
            ));
        }

        Ok(())
    }
}
