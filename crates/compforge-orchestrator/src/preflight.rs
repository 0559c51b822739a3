//! Pre-flight modality check
//!
//! Before a run that sends Stage 2 to a non-default provider, the input is
//! screened for signs of image or visual content. When the [`ModalityPolicy`]
//! flags it, the [`ConfirmationGate`] decides whether to continue. This is a
//! hint only: the provider's own `UnsupportedModality` response stays
//! authoritative.

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::Serialize;
use tracing::warn;

use compforge_utils::types::ProviderId;

/// What the policy found in the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModalityConcern {
    pub provider: ProviderId,
    /// Keywords that matched, in the order configured.
    pub matched: Vec<String>,
}

impl ModalityConcern {
    #[must_use]
    pub fn prompt(&self) -> String {
        format!(
            "The request mentions {} and {} may reject image input. Continue anyway?",
            self.matched.join(", "),
            self.provider.display_name()
        )
    }
}

/// Decides whether an input looks like it carries visual content
pub trait ModalityPolicy: Send + Sync {
    fn inspect(&self, input: &str, provider: ProviderId) -> Option<ModalityConcern>;
}

/// Case-insensitive whole-word keyword match
#[derive(Debug, Clone)]
pub struct KeywordModalityPolicy {
    keywords: Vec<(String, Regex)>,
}

impl KeywordModalityPolicy {
    /// Keywords that cannot be compiled are skipped with a warning.
    #[must_use]
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keywords = keywords
            .into_iter()
            .map(Into::into)
            .filter(|k: &String| !k.trim().is_empty())
            .filter_map(|keyword| {
                let pattern = format!(r"\b{}s?\b", regex::escape(keyword.trim()));
                match RegexBuilder::new(&pattern).case_insensitive(true).build() {
                    Ok(re) => Some((keyword, re)),
                    Err(e) => {
                        warn!(keyword = %keyword, error = %e, "Skipping unusable image keyword");
                        None
                    }
                }
            })
            .collect();
        Self { keywords }
    }
}

impl ModalityPolicy for KeywordModalityPolicy {
    fn inspect(&self, input: &str, provider: ProviderId) -> Option<ModalityConcern> {
        let matched: Vec<String> = self
            .keywords
            .iter()
            .filter(|(_, re)| re.is_match(input))
            .map(|(keyword, _)| keyword.clone())
            .collect();

        (!matched.is_empty()).then_some(ModalityConcern { provider, matched })
    }
}

/// Policy that never flags anything (pre-flight disabled).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoModalityCheck;

impl ModalityPolicy for NoModalityCheck {
    fn inspect(&self, _input: &str, _provider: ProviderId) -> Option<ModalityConcern> {
        None
    }
}

/// Asks whether to continue after a modality concern
#[async_trait]
pub trait ConfirmationGate: Send + Sync {
    async fn confirm(&self, concern: &ModalityConcern) -> bool;
}

/// Gate with a fixed answer
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

impl AutoConfirm {
    #[must_use]
    pub const fn accept() -> Self {
        Self(true)
    }

    #[must_use]
    pub const fn decline() -> Self {
        Self(false)
    }
}

#[async_trait]
impl ConfirmationGate for AutoConfirm {
    async fn confirm(&self, _concern: &ModalityConcern) -> bool {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compforge_config::DEFAULT_IMAGE_KEYWORDS;

    fn default_policy() -> KeywordModalityPolicy {
        KeywordModalityPolicy::new(DEFAULT_IMAGE_KEYWORDS.iter().copied())
    }

    #[test]
    fn test_flags_visual_requests() {
        let concern = default_policy()
            .inspect("A card with a Logo and two photos", ProviderId::Claude)
            .unwrap();
        assert_eq!(concern.provider, ProviderId::Claude);
        assert!(concern.matched.contains(&"logo".to_string()));
        assert!(concern.matched.contains(&"photo".to_string()));
        assert!(concern.prompt().contains("Claude"));
    }

    #[test]
    fn test_ignores_substrings_and_plain_requests() {
        let policy = default_policy();
        assert!(policy.inspect("a circular gauge 0-100", ProviderId::OpenAi).is_none());
        assert!(policy.inspect("imaginary numbers table", ProviderId::OpenAi).is_none());
    }

    #[test]
    fn test_custom_keywords_are_escaped() {
        let policy = KeywordModalityPolicy::new(["c++", " ", "diagram"]);
        assert!(policy.inspect("render a Diagram", ProviderId::Claude).is_some());
        assert!(policy.inspect("no match here", ProviderId::Claude).is_none());
    }

    #[tokio::test]
    async fn test_auto_confirm() {
        let concern = ModalityConcern {
            provider: ProviderId::Claude,
            matched: vec!["image".into()],
        };
        assert!(AutoConfirm::accept().confirm(&concern).await);
        assert!(!AutoConfirm::decline().confirm(&concern).await);
        assert!(NoModalityCheck.inspect("image", ProviderId::Claude).is_none());
    }
}
