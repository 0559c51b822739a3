//! compforge - draft, generate and audit low-code UI components with LLMs
//!
//! A request in plain language goes through three dependent stages:
//!
//! 1. **Spec drafting** on the default provider (Gemini) turns the request into
//!    a component specification.
//! 2. **Code generation** on the provider you pick (Gemini, Claude or OpenAI)
//!    turns the specification into a self-contained component.
//! 3. **Code audit** on the default provider reviews the generated code.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! export GEMINI_API_KEY=...
//! compforge run "a circular gauge from 0 to 100 with a needle" --out ./gauge
//!
//! # Code generation on Claude (falls back to Gemini on a rejected key)
//! export ANTHROPIC_API_KEY=...
//! compforge run "a sortable orders table" --provider claude --out ./orders
//!
//! compforge providers
//! compforge config
//! ```
//!
//! # Library
//!
//! ```rust,no_run
//! use compforge::{Config, PipelineOrchestrator, ProviderId, RunOutcome};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = Config::builder().build()?;
//! let orchestrator = PipelineOrchestrator::from_config(config)?;
//! let mut progress = orchestrator.subscribe();
//! tokio::spawn(async move {
//!     while progress.changed().await.is_ok() {
//!         println!("{}", progress.borrow().status.label());
//!     }
//! });
//!
//! match orchestrator.run("a KPI tile with sparkline", ProviderId::OpenAi).await? {
//!     RunOutcome::Finished(run) => println!("{:?}", run.stage3_output.map(|o| o.text)),
//!     RunOutcome::Declined(concern) => println!("declined: {}", concern.prompt()),
//!     RunOutcome::Busy => unreachable!("single caller"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod export;

pub use compforge_config::{CliArgs, Config, ConfigBuilder};
pub use compforge_llm::{CredentialResolver, CredentialSource, LlmError};
pub use compforge_orchestrator::{
    AutoConfirm, ConfirmationGate, ModalityConcern, PipelineOrchestrator, PipelineRun, RunOutcome,
    RunStatus, StageFailure, StageOutput,
};
pub use compforge_stages::{AuditSummary, ExtractedArtifact, extract_artifact};
pub use compforge_utils::error::{CompforgeError, FailureKind, PipelineError, StageError};
pub use compforge_utils::exit_codes::ExitCode;
pub use compforge_utils::types::{ProviderId, StageId};
