//! Fallback policy
//!
//! A call site gets at most two attempts: the primary target, then one hop
//! when the primary failure matches the plan's trigger. The hop is issued
//! only after the primary attempt has returned. There is no further retry.
//!
//! | Stage provider        | Trigger                | Hop to                          |
//! |-----------------------|------------------------|---------------------------------|
//! | default               | `Transport`, `Timeout` | same provider, fallback model   |
//! | non-default (Stage 2) | `AuthenticationFailure`| default provider, Stage 2 model |

use serde::Serialize;
use std::fmt;

use compforge_config::Config;
use compforge_error_redaction::redact_error_message_for_logging;
use compforge_utils::error::LlmError;
use compforge_utils::logging::log_fallback_hop;
use compforge_utils::types::{ProviderId, StageId};

use crate::gateway::Gateway;
use crate::types::{LlmInvocation, LlmResult};

/// Provider and model for one attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallTarget {
    pub provider: ProviderId,
    pub model: String,
}

impl CallTarget {
    #[must_use]
    pub fn new(provider: ProviderId, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

impl fmt::Display for CallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider, self.model)
    }
}

/// Failure class that permits the hop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTrigger {
    /// `Transport` or `Timeout` on the default provider.
    TransportFailure,
    /// `AuthenticationFailure` on a non-default provider at Stage 2.
    AuthenticationFailure,
}

impl FallbackTrigger {
    #[must_use]
    pub fn matches(&self, error: &LlmError) -> bool {
        match self {
            Self::TransportFailure => {
                matches!(error, LlmError::Transport { .. } | LlmError::Timeout { .. })
            }
            Self::AuthenticationFailure => matches!(error, LlmError::AuthenticationFailure { .. }),
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::TransportFailure => "transport_failure",
            Self::AuthenticationFailure => "authentication_failure",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackRule {
    pub trigger: FallbackTrigger,
    pub target: CallTarget,
}

/// Targets for one stage call site
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallPlan {
    pub stage: StageId,
    pub primary: CallTarget,
    pub fallback: Option<FallbackRule>,
}

impl CallPlan {
    /// Plan for `stage` talking to `provider`.
    ///
    /// ```rust
    /// use compforge_config::Config;
    /// use compforge_llm::{CallPlan, FallbackTrigger};
    /// use compforge_utils::types::{ProviderId, StageId};
    ///
    /// let config = Config::builder().build().unwrap();
    ///
    /// let plan = CallPlan::for_stage(StageId::SpecDraft, ProviderId::Gemini, &config);
    /// let rule = plan.fallback.unwrap();
    /// assert_eq!(rule.trigger, FallbackTrigger::TransportFailure);
    /// assert_eq!(rule.target.model, "gemini-2.5-flash");
    ///
    /// let plan = CallPlan::for_stage(StageId::CodeGen, ProviderId::Claude, &config);
    /// let rule = plan.fallback.unwrap();
    /// assert_eq!(rule.trigger, FallbackTrigger::AuthenticationFailure);
    /// assert_eq!(rule.target.provider, ProviderId::Gemini);
    /// ```
    #[must_use]
    pub fn for_stage(stage: StageId, provider: ProviderId, config: &Config) -> Self {
        let primary = CallTarget::new(provider, config.model_for(stage, provider));

        let fallback = if provider.is_default() {
            config
                .fallback_model_for(stage, provider)
                .map(|model| FallbackRule {
                    trigger: FallbackTrigger::TransportFailure,
                    target: CallTarget::new(provider, model),
                })
        } else if stage == StageId::CodeGen {
            let default = ProviderId::DEFAULT;
            Some(FallbackRule {
                trigger: FallbackTrigger::AuthenticationFailure,
                target: CallTarget::new(default, config.model_for(stage, default)),
            })
        } else {
            None
        };

        Self {
            stage,
            primary,
            fallback,
        }
    }

    #[must_use]
    pub fn without_fallback(mut self) -> Self {
        self.fallback = None;
        self
    }
}

/// Record of a hop that was taken
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackHop {
    pub from: CallTarget,
    pub to: CallTarget,
    pub trigger: FallbackTrigger,
    /// Redacted primary failure.
    pub reason: String,
}

/// Successful outcome of a call site
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub result: LlmResult,
    /// Target that produced `result`.
    pub target: CallTarget,
    pub hop: Option<FallbackHop>,
    pub attempts: u8,
}

/// Executes a [`CallPlan`] against a [`Gateway`].
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackPolicy;

impl FallbackPolicy {
    /// Maximum attempts per call site.
    pub const MAX_ATTEMPTS: u8 = 2;

    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Run `plan`, taking at most one hop.
    ///
    /// `inv.model` is replaced by each target's model; the messages are sent
    /// unchanged to both targets.
    ///
    /// # Errors
    ///
    /// The primary error when it does not match the plan's trigger (or there
    /// is no fallback), otherwise the fallback attempt's error unchanged
    pub async fn invoke(
        &self,
        gateway: &Gateway,
        plan: &CallPlan,
        inv: LlmInvocation,
    ) -> Result<CallOutcome, LlmError> {
        self.invoke_with(gateway, plan, |target| inv.retarget(target.model.clone()))
            .await
    }

    /// Run `plan`, building a fresh invocation for each target.
    ///
    /// Used when the request depends on the provider, so a cross-provider hop
    /// sends the hop target's own wording.
    ///
    /// # Errors
    ///
    /// Same as [`FallbackPolicy::invoke`]
    pub async fn invoke_with<F>(
        &self,
        gateway: &Gateway,
        plan: &CallPlan,
        build: F,
    ) -> Result<CallOutcome, LlmError>
    where
        F: Fn(&CallTarget) -> LlmInvocation + Send + Sync,
    {
        let primary_error = match gateway.call(plan.primary.provider, build(&plan.primary)).await {
            Ok(result) => {
                return Ok(CallOutcome {
                    result,
                    target: plan.primary.clone(),
                    hop: None,
                    attempts: 1,
                });
            }
            Err(e) => e,
        };

        let Some(rule) = plan
            .fallback
            .as_ref()
            .filter(|rule| rule.trigger.matches(&primary_error))
        else {
            return Err(primary_error);
        };

        let reason = redact_error_message_for_logging(&primary_error.to_string());
        log_fallback_hop(
            plan.stage,
            &plan.primary.to_string(),
            &rule.target.to_string(),
            &reason,
        );

        let hop = FallbackHop {
            from: plan.primary.clone(),
            to: rule.target.clone(),
            trigger: rule.trigger,
            reason,
        };

        let result = gateway.call(rule.target.provider, build(&rule.target)).await?;

        Ok(CallOutcome {
            result,
            target: rule.target.clone(),
            hop: Some(hop),
            attempts: Self::MAX_ATTEMPTS,
        })
    }
}
