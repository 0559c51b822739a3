//! Pipeline orchestrator for compforge
//!
//! [`PipelineOrchestrator::run`] drives one request through the three stages:
//!
//! ```text
//! Idle → RunningStage1 → RunningStage2 → RunningStage3 → Completed
//!              └──────────────┴──────────────┴──────→ Failed { stage }
//! ```
//!
//! Only one run may be in flight per orchestrator; a second call while one is
//! running returns [`RunOutcome::Busy`] without touching it. Every state
//! change is published on a `tokio::sync::watch` channel.
//!
//! ```rust,no_run
//! use compforge_config::{CliArgs, Config};
//! use compforge_orchestrator::{PipelineOrchestrator, RunOutcome};
//! use compforge_utils::types::ProviderId;
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::discover(&CliArgs::default())?;
//! let orchestrator = PipelineOrchestrator::from_config(config)?;
//!
//! if let RunOutcome::Finished(run) = orchestrator.run("a circular gauge 0-100", ProviderId::Gemini).await? {
//!     println!("{}", run.status.label());
//! }
//! # Ok(())
//! # }
//! ```

mod guard;
pub mod preflight;
mod run;

pub use preflight::{
    AutoConfirm, ConfirmationGate, KeywordModalityPolicy, ModalityConcern, ModalityPolicy,
    NoModalityCheck,
};
pub use run::{PipelineRun, RunStatus, StageFailure, StageOutput};

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{info, warn};

use compforge_config::Config;
use compforge_llm::{
    BackendFactory, Credential, CredentialResolver, Gateway, HttpBackendFactory, LlmError,
};
use compforge_stages::{StageRoute, run_stage, stage_for};
use compforge_utils::error::{PipelineError, StageError};
use compforge_utils::types::{ProviderId, StageId};

use guard::RunGuard;

/// Result of a call to [`PipelineOrchestrator::run`]
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The run reached `Completed` or `Failed`.
    Finished(PipelineRun),
    /// Another run was in flight; nothing was done.
    Busy,
    /// The confirmation gate declined after a modality concern; nothing was sent.
    Declined(ModalityConcern),
}

/// Drives pipeline runs
pub struct PipelineOrchestrator {
    config: Arc<Config>,
    resolver: CredentialResolver,
    factory: Arc<dyn BackendFactory>,
    modality: Arc<dyn ModalityPolicy>,
    gate: Arc<dyn ConfirmationGate>,
    guard: RunGuard,
    progress: watch::Sender<PipelineRun>,
}

impl std::fmt::Debug for PipelineOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineOrchestrator")
            .field("resolver", &self.resolver)
            .field("running", &self.guard.is_held())
            .finish_non_exhaustive()
    }
}

impl PipelineOrchestrator {
    /// Orchestrator with the keyword pre-flight policy (when enabled in
    /// config) and a gate that always continues.
    #[must_use]
    pub fn new(
        config: Config,
        resolver: CredentialResolver,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        let modality: Arc<dyn ModalityPolicy> = if config.preflight_enabled() {
            Arc::new(KeywordModalityPolicy::new(config.image_keywords()))
        } else {
            Arc::new(NoModalityCheck)
        };
        let (progress, _) = watch::channel(PipelineRun::default());

        Self {
            config: Arc::new(config),
            resolver,
            factory,
            modality,
            gate: Arc::new(AutoConfirm::accept()),
            guard: RunGuard::default(),
            progress,
        }
    }

    /// Orchestrator using the real HTTP adapters and the configured
    /// credential sources.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Misconfiguration` if the HTTP client cannot be built
    pub fn from_config(config: Config) -> Result<Self, LlmError> {
        let resolver = CredentialResolver::from_config(&config);
        let factory = Arc::new(HttpBackendFactory::new()?);
        Ok(Self::new(config, resolver, factory))
    }

    #[must_use]
    pub fn with_modality_policy(mut self, policy: Arc<dyn ModalityPolicy>) -> Self {
        self.modality = policy;
        self
    }

    #[must_use]
    pub fn with_confirmation_gate(mut self, gate: Arc<dyn ConfirmationGate>) -> Self {
        self.gate = gate;
        self
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Receiver that sees every state change of every run.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PipelineRun> {
        self.progress.subscribe()
    }

    /// Latest published run.
    #[must_use]
    pub fn snapshot(&self) -> PipelineRun {
        self.progress.borrow().clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.guard.is_held()
    }

    /// Run the pipeline for `input`, sending Stage 2 to `provider`.
    ///
    /// Stage 1 and Stage 3 always use the default provider. Credentials are
    /// resolved afresh on every call.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::EmptyInput` if `input` is blank. Stage
    /// failures are not errors: they finish the run as `Failed`.
    pub async fn run(&self, input: &str, provider: ProviderId) -> Result<RunOutcome, PipelineError> {
        let Some(_token) = self.guard.try_acquire(self.progress.clone()) else {
            info!("Run requested while another is in flight; ignoring");
            return Ok(RunOutcome::Busy);
        };

        if input.trim().is_empty() {
            return Err(PipelineError::EmptyInput);
        }

        if !provider.is_default()
            && let Some(concern) = self.modality.inspect(input, provider)
        {
            warn!(provider = %provider, matched = ?concern.matched, "Request may contain image input");
            if !self.gate.confirm(&concern).await {
                info!("Run declined at pre-flight confirmation");
                return Ok(RunOutcome::Declined(concern));
            }
        }

        let mut run = PipelineRun::new(input, provider);
        run.started_at = Some(Utc::now());
        self.publish(&run);

        let gateway = match self.prepare_gateway(provider) {
            Ok(gateway) => gateway,
            Err(e) => {
                warn!(stage = %e.stage, error = %e, "Run blocked before any stage executed");
                run.fail(e);
                self.publish(&run);
                return Ok(RunOutcome::Finished(run));
            }
        };

        for stage_id in StageId::ALL {
            let stage_provider = if stage_id == StageId::CodeGen {
                provider
            } else {
                ProviderId::DEFAULT
            };
            let route = StageRoute::from_config(stage_id, stage_provider, &self.config);
            let stage_input = run.input_for(stage_id).unwrap_or_default().to_string();

            run.status = RunStatus::running(stage_id);
            self.publish(&run);

            let started = Instant::now();
            match run_stage(stage_for(stage_id), &stage_input, &route, &gateway).await {
                Ok(outcome) => {
                    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                    run.set_output(StageOutput::from_outcome(stage_id, outcome, duration_ms));
                }
                Err(e) => {
                    run.fail(e);
                    self.publish(&run);
                    return Ok(RunOutcome::Finished(run));
                }
            }
        }

        run.complete();
        self.publish(&run);
        info!(provider = %provider, "Pipeline completed");
        Ok(RunOutcome::Finished(run))
    }

    fn publish(&self, run: &PipelineRun) {
        self.progress.send_replace(run.clone());
    }

    /// Resolve credentials and build the adapters for this run.
    ///
    /// The default provider is needed by Stage 1, a selected non-default
    /// provider by Stage 2; a missing key is attributed to that stage.
    fn prepare_gateway(&self, provider: ProviderId) -> Result<Gateway, StageError> {
        let mut needed = vec![(ProviderId::DEFAULT, StageId::SpecDraft)];
        if !provider.is_default() {
            needed.push((provider, StageId::CodeGen));
        }

        let mut credentials: Vec<Credential> = Vec::with_capacity(needed.len());
        for (p, stage) in &needed {
            let credential = self
                .resolver
                .resolve(*p)
                .into_result()
                .map_err(|e| StageError::new(*stage, e))?;
            info!(provider = %p, source = %credential.source, "Using credential");
            credentials.push(credential);
        }

        let mut gateway = Gateway::new();
        for (credential, (_, stage)) in credentials.iter().zip(&needed) {
            let backend = self
                .factory
                .create(credential, &self.config)
                .map_err(|e| StageError::new(*stage, e))?;
            gateway.insert(backend);
        }
        Ok(gateway)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compforge_llm::InMemoryCredentialStore;
    use compforge_llm::test_support::{ScriptedBackend, ScriptedFactory};
    use compforge_utils::error::FailureKind;

    fn resolver(keys: &[(ProviderId, &str)]) -> CredentialResolver {
        let store = Arc::new(InMemoryCredentialStore::new());
        for (provider, key) in keys {
            store.set(*provider, *key);
        }
        CredentialResolver::new(Some(store)).with_env_lookup(|_| None)
    }

    fn orchestrator(keys: &[(ProviderId, &str)], factory: ScriptedFactory) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            Config::builder().build().unwrap(),
            resolver(keys),
            Arc::new(factory),
        )
    }

    fn finished(outcome: RunOutcome) -> PipelineRun {
        match outcome {
            RunOutcome::Finished(run) => run,
            other => panic!("expected Finished, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected_and_guard_released() {
        let orch = orchestrator(&[(ProviderId::Gemini, "g")], ScriptedFactory::new());
        assert_eq!(
            orch.run("   \n", ProviderId::Gemini).await.unwrap_err(),
            PipelineError::EmptyInput
        );
        assert!(!orch.is_running());
        assert_eq!(orch.snapshot().status, RunStatus::Idle);
    }

    #[tokio::test]
    async fn test_stage_outputs_chain_verbatim() {
        let gemini = Arc::new(
            ScriptedBackend::new(ProviderId::Gemini)
                .respond("SPEC")
                .respond("CODE")
                .respond("AUDIT"),
        );
        let orch = orchestrator(
            &[(ProviderId::Gemini, "g")],
            ScriptedFactory::new().with(gemini.clone()),
        );

        let run = finished(orch.run("gauge", ProviderId::Gemini).await.unwrap());

        assert!(run.is_completed());
        let prompts = gemini.prompts();
        assert!(prompts[1].ends_with("SPEC"));
        assert!(prompts[2].ends_with("CODE"));
        assert_eq!(orch.snapshot(), run);
    }

    #[tokio::test]
    async fn test_missing_optional_key_blocks_at_stage_two_before_any_call() {
        let gemini = Arc::new(ScriptedBackend::new(ProviderId::Gemini).respond("SPEC"));
        let factory = ScriptedFactory::new().with(gemini.clone());
        let orch = orchestrator(&[(ProviderId::Gemini, "g")], factory);

        let run = finished(orch.run("gauge", ProviderId::OpenAi).await.unwrap());

        assert_eq!(run.status, RunStatus::Failed { stage: StageId::CodeGen });
        let failure = run.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::MissingCredential);
        assert_eq!(failure.provider, Some(ProviderId::OpenAi));
        assert_eq!(gemini.call_count(), 0);
        assert!(run.stage1_output.is_none());
    }

    #[tokio::test]
    async fn test_declined_preflight_sends_nothing() {
        let claude = Arc::new(ScriptedBackend::new(ProviderId::Claude).respond("CODE"));
        let gemini = Arc::new(ScriptedBackend::new(ProviderId::Gemini).respond("SPEC"));
        let factory = ScriptedFactory::new().with(claude.clone()).with(gemini.clone());
        let orch = orchestrator(&[(ProviderId::Gemini, "g"), (ProviderId::Claude, "c")], factory)
            .with_confirmation_gate(Arc::new(AutoConfirm::decline()));

        match orch.run("a gallery of product images", ProviderId::Claude).await.unwrap() {
            RunOutcome::Declined(concern) => assert_eq!(concern.matched, vec!["image"]),
            other => panic!("expected Declined, got {other:?}"),
        }
        assert_eq!(gemini.call_count() + claude.call_count(), 0);
        assert!(!orch.is_running());
    }

    #[tokio::test]
    async fn test_preflight_skipped_for_default_provider() {
        let gemini = Arc::new(
            ScriptedBackend::new(ProviderId::Gemini)
                .respond("SPEC")
                .respond("CODE")
                .respond("AUDIT"),
        );
        let orch = orchestrator(
            &[(ProviderId::Gemini, "g")],
            ScriptedFactory::new().with(gemini),
        )
        .with_confirmation_gate(Arc::new(AutoConfirm::decline()));

        let run = finished(orch.run("an image carousel", ProviderId::Gemini).await.unwrap());
        assert!(run.is_completed());
    }

    #[tokio::test]
    async fn test_factory_failure_is_attributed_to_stage() {
        // No scripted Gemini backend: the factory refuses to build it.
        let orch = orchestrator(&[(ProviderId::Gemini, "g")], ScriptedFactory::new());
        let run = finished(orch.run("gauge", ProviderId::Gemini).await.unwrap());

        assert_eq!(run.status, RunStatus::Failed { stage: StageId::SpecDraft });
        assert_eq!(run.failure.unwrap().kind, FailureKind::Configuration);
    }
}
