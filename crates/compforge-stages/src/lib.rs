//! Pipeline stages for compforge
//!
//! A [`Stage`] builds the system instruction and prompt for its step; the
//! shared driver [`run_stage`] sends them through the fallback policy and tags
//! any failure with the stage that issued the call.

pub mod audit;
pub mod extraction;
mod stages;

pub use audit::{AuditScore, AuditSummary};
pub use extraction::{ExtractedArtifact, extract_artifact};
pub use stages::{AUDIT_SECTIONS, AuditStage, CodeGenStage, SpecDraftStage, stage_for};

use std::time::{Duration, Instant};
use tracing::Instrument;

use compforge_config::Config;
use compforge_error_redaction::redact_error_message_for_logging;
use compforge_llm::{
    CallOutcome, CallPlan, CallTarget, FallbackPolicy, Gateway, LlmInvocation, Message,
};
use compforge_utils::error::{LlmError, StageError};
use compforge_utils::logging::{log_stage_complete, log_stage_error, log_stage_start, stage_span};
use compforge_utils::types::{ProviderId, StageId};

/// One step of the pipeline
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Instruction for the model. Only wording may vary by provider.
    fn system_instruction(&self, provider: ProviderId) -> String;

    /// User prompt built from the previous stage's output (or the request).
    fn prompt(&self, input: &str) -> String;
}

/// Where and how a stage call is sent
#[derive(Debug, Clone, PartialEq)]
pub struct StageRoute {
    pub plan: CallPlan,
    pub timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl StageRoute {
    /// Route for `stage` on `provider`, with models and limits from `config`.
    #[must_use]
    pub fn from_config(stage: StageId, provider: ProviderId, config: &Config) -> Self {
        Self {
            plan: CallPlan::for_stage(stage, provider, config),
            timeout: config.timeout(),
            max_tokens: config.max_tokens_for(stage),
            temperature: config.temperature(),
        }
    }

    #[must_use]
    pub fn provider(&self) -> ProviderId {
        self.plan.primary.provider
    }
}

/// Build the primary invocation for `stage` without sending it.
#[must_use]
pub fn build_invocation(stage: &dyn Stage, input: &str, route: &StageRoute) -> LlmInvocation {
    build_invocation_for(stage, input, route, &route.plan.primary)
}

/// Build the invocation `stage` sends to `target`.
///
/// The system instruction follows the target's provider, so a cross-provider
/// hop carries the default provider's wording.
#[must_use]
pub fn build_invocation_for(
    stage: &dyn Stage,
    input: &str,
    route: &StageRoute,
    target: &CallTarget,
) -> LlmInvocation {
    LlmInvocation::new(
        stage.id(),
        target.model.clone(),
        route.timeout,
        vec![
            Message::system(stage.system_instruction(target.provider)),
            Message::user(stage.prompt(input)),
        ],
    )
    .with_metadata("max_tokens", serde_json::json!(route.max_tokens))
    .with_metadata("temperature", serde_json::json!(route.temperature))
}

/// Run one stage.
///
/// A blank response is reported as `MalformedResponse`: it would only
/// resurface as an empty prompt at the next stage.
///
/// # Errors
///
/// Returns `StageError` wrapping the adapter or fallback error unchanged
pub async fn run_stage(
    stage: &dyn Stage,
    input: &str,
    route: &StageRoute,
    gateway: &Gateway,
) -> Result<CallOutcome, StageError> {
    let id = stage.id();
    let span = stage_span(id, route.provider());

    async {
        let started = Instant::now();
        log_stage_start(id, route.provider(), &route.plan.primary.model);

        let result = FallbackPolicy::new()
            .invoke_with(gateway, &route.plan, |target| {
                build_invocation_for(stage, input, route, target)
            })
            .await
            .and_then(|outcome| {
                if outcome.result.text.trim().is_empty() {
                    Err(LlmError::MalformedResponse {
                        provider: outcome.target.provider,
                        message: "response text is empty".to_string(),
                    })
                } else {
                    Ok(outcome)
                }
            });

        let elapsed = started.elapsed().as_millis();
        match result {
            Ok(outcome) => {
                log_stage_complete(id, elapsed, outcome.result.text.len());
                Ok(outcome)
            }
            Err(e) => {
                log_stage_error(
                    id,
                    e.kind().as_str(),
                    &redact_error_message_for_logging(&e.to_string()),
                    elapsed,
                );
                Err(StageError::new(id, e))
            }
        }
    }
    .instrument(span)
    .await
}
