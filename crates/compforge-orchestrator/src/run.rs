//! Run record published by the orchestrator.

use chrono::{DateTime, Utc};
use serde::Serialize;

use compforge_llm::{CallOutcome, FallbackHop};
use compforge_utils::error::{FailureKind, StageError, UserFriendlyError};
use compforge_utils::types::{ProviderId, StageId};

/// Pipeline state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    RunningStage1,
    RunningStage2,
    RunningStage3,
    Completed,
    Failed { stage: StageId },
}

impl RunStatus {
    #[must_use]
    pub const fn running(stage: StageId) -> Self {
        match stage {
            StageId::SpecDraft => Self::RunningStage1,
            StageId::CodeGen => Self::RunningStage2,
            StageId::Audit => Self::RunningStage3,
        }
    }

    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(
            self,
            Self::RunningStage1 | Self::RunningStage2 | Self::RunningStage3
        )
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    /// Stage being run, if any.
    #[must_use]
    pub const fn current_stage(&self) -> Option<StageId> {
        match self {
            Self::RunningStage1 => Some(StageId::SpecDraft),
            Self::RunningStage2 => Some(StageId::CodeGen),
            Self::RunningStage3 => Some(StageId::Audit),
            _ => None,
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self {
            Self::Idle => "idle".to_string(),
            Self::Completed => "completed".to_string(),
            Self::Failed { stage } => format!("failed at stage {}", stage.index()),
            running => match running.current_stage() {
                Some(stage) => format!("running stage {} ({})", stage.index(), stage.label()),
                None => "unknown".to_string(),
            },
        }
    }
}

/// Output of a completed stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageOutput {
    pub stage: StageId,
    /// Verbatim response text.
    pub text: String,
    pub provider: ProviderId,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackHop>,
    pub attempts: u8,
    pub duration_ms: u64,
}

impl StageOutput {
    #[must_use]
    pub fn from_outcome(stage: StageId, outcome: CallOutcome, duration_ms: u64) -> Self {
        Self {
            stage,
            text: outcome.result.text,
            provider: outcome.target.provider,
            model: outcome.target.model,
            fallback: outcome.hop,
            attempts: outcome.attempts,
            duration_ms,
        }
    }
}

/// Why a run failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageFailure {
    pub stage: StageId,
    pub kind: FailureKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderId>,
    /// Redacted, human-readable message.
    pub message: String,
    #[serde(skip)]
    pub error: StageError,
}

impl StageFailure {
    #[must_use]
    pub fn from_error(error: StageError) -> Self {
        Self {
            stage: error.stage,
            kind: error.kind(),
            provider: error.source.provider(),
            message: compforge_error_redaction::redact_error_message(&error.user_message()),
            error,
        }
    }
}

/// One end-to-end execution.
///
/// A stage output is `Some` only if every earlier stage's output is.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    pub input: String,
    pub selected_provider: ProviderId,
    pub status: RunStatus,
    pub stage1_output: Option<StageOutput>,
    pub stage2_output: Option<StageOutput>,
    pub stage3_output: Option<StageOutput>,
    pub failure: Option<StageFailure>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new(String::new(), ProviderId::DEFAULT)
    }
}

impl PipelineRun {
    #[must_use]
    pub fn new(input: impl Into<String>, selected_provider: ProviderId) -> Self {
        Self {
            input: input.into(),
            selected_provider,
            status: RunStatus::Idle,
            stage1_output: None,
            stage2_output: None,
            stage3_output: None,
            failure: None,
            started_at: None,
            finished_at: None,
        }
    }

    #[must_use]
    pub fn output(&self, stage: StageId) -> Option<&StageOutput> {
        match stage {
            StageId::SpecDraft => self.stage1_output.as_ref(),
            StageId::CodeGen => self.stage2_output.as_ref(),
            StageId::Audit => self.stage3_output.as_ref(),
        }
    }

    /// Record a stage output. Panics in debug builds if an earlier stage is missing.
    pub(crate) fn set_output(&mut self, output: StageOutput) {
        debug_assert!(
            StageId::ALL
                .iter()
                .take_while(|s| **s != output.stage)
                .all(|s| self.output(*s).is_some()),
            "stage outputs must be recorded in order"
        );
        match output.stage {
            StageId::SpecDraft => self.stage1_output = Some(output),
            StageId::CodeGen => self.stage2_output = Some(output),
            StageId::Audit => self.stage3_output = Some(output),
        }
    }

    /// Completed stage outputs, in order.
    pub fn outputs(&self) -> impl Iterator<Item = &StageOutput> {
        StageId::ALL.into_iter().filter_map(|s| self.output(s))
    }

    /// Later stage outputs are only present when every earlier one is.
    #[must_use]
    pub fn outputs_are_ordered(&self) -> bool {
        let present: Vec<bool> = StageId::ALL
            .iter()
            .map(|s| self.output(*s).is_some())
            .collect();
        present.windows(2).all(|w| w[0] || !w[1])
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Input `stage` consumes: the request for Stage 1, the previous stage's
    /// output otherwise.
    #[must_use]
    pub fn input_for(&self, stage: StageId) -> Option<&str> {
        match stage {
            StageId::SpecDraft => Some(self.input.as_str()),
            StageId::CodeGen => self.stage1_output.as_ref().map(|o| o.text.as_str()),
            StageId::Audit => self.stage2_output.as_ref().map(|o| o.text.as_str()),
        }
    }

    pub(crate) fn fail(&mut self, error: StageError) {
        self.status = RunStatus::Failed { stage: error.stage };
        self.failure = Some(StageFailure::from_error(error));
        self.finished_at = Some(Utc::now());
    }

    pub(crate) fn complete(&mut self) {
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compforge_utils::error::LlmError;

    fn output(stage: StageId, text: &str) -> StageOutput {
        StageOutput {
            stage,
            text: text.to_string(),
            provider: ProviderId::Gemini,
            model: "gemini-2.5-pro".to_string(),
            fallback: None,
            attempts: 1,
            duration_ms: 3,
        }
    }

    #[test]
    fn test_status_helpers() {
        assert_eq!(RunStatus::running(StageId::CodeGen), RunStatus::RunningStage2);
        assert!(RunStatus::RunningStage3.is_running());
        assert!(!RunStatus::Completed.is_running());
        assert!(RunStatus::Failed { stage: StageId::Audit }.is_terminal());
        assert_eq!(RunStatus::RunningStage1.label(), "running stage 1 (Spec drafting)");
    }

    #[test]
    fn test_outputs_in_order() {
        let mut run = PipelineRun::new("gauge", ProviderId::Gemini);
        run.set_output(output(StageId::SpecDraft, "spec"));
        run.set_output(output(StageId::CodeGen, "code"));
        assert!(run.outputs_are_ordered());
        assert_eq!(run.outputs().count(), 2);
        assert_eq!(run.input_for(StageId::Audit), Some("code"));

        let mut broken = PipelineRun::new("gauge", ProviderId::Gemini);
        broken.stage3_output = Some(output(StageId::Audit, "audit"));
        assert!(!broken.outputs_are_ordered());
    }

    #[test]
    fn test_failure_serializes_without_secrets_or_error_object() {
        let mut run = PipelineRun::new("gauge", ProviderId::Claude);
        run.set_output(output(StageId::SpecDraft, "spec"));
        run.fail(StageError::new(
            StageId::CodeGen,
            LlmError::Transport {
                provider: ProviderId::Claude,
                status: Some(503),
                message: "overloaded".into(),
            },
        ));

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["status"]["state"], "failed");
        assert_eq!(json["status"]["stage"], "code_gen");
        assert_eq!(json["failure"]["kind"], "transport_failure");
        assert_eq!(json["failure"]["provider"], "claude");
        assert!(json["failure"].get("error").is_none());
        assert!(json["stage1_output"]["text"] == "spec");
        assert!(json["stage2_output"].is_null());
    }
}
