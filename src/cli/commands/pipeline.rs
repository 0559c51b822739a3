//! Run command implementation
//!
//! Handles `compforge run <REQUEST>`: runs the pipeline, prints progress on
//! stderr and writes the outputs to `--out`.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use compforge_config::Config;
use compforge_orchestrator::{
    AutoConfirm, ConfirmationGate, PipelineOrchestrator, PipelineRun, RunOutcome, RunStatus,
    StageOutput,
};
use compforge_stages::AuditSummary;
use compforge_utils::error::CompforgeError;
use compforge_utils::exit_codes::ExitCode;
use compforge_utils::types::ProviderId;

use super::confirm::StdinConfirm;
use crate::export::{ExportedFiles, export_run};

/// Request text from the argument, or all of stdin for `-`.
pub fn read_request(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_string());
    }
    let mut request = String::new();
    std::io::stdin()
        .read_to_string(&mut request)
        .context("Failed to read request from stdin")?;
    Ok(request)
}

#[derive(serde::Serialize)]
struct RunReport<'a> {
    run: &'a PipelineRun,
    files: &'a ExportedFiles,
    #[serde(skip_serializing_if = "Option::is_none")]
    audit: Option<AuditSummary>,
}

/// Execute the run command. `request` is the raw argument (`-` for stdin).
///
/// A failed stage is returned as `CompforgeError::Stage` after the partial
/// outputs have been written.
pub async fn execute_run_command(
    request: &str,
    provider: ProviderId,
    out: &Path,
    yes: bool,
    json: bool,
    config: Config,
) -> Result<ExitCode> {
    let request = read_request(request)?;
    let gate: Arc<dyn ConfirmationGate> = if yes {
        Arc::new(AutoConfirm::accept())
    } else {
        Arc::new(StdinConfirm)
    };
    let orchestrator = PipelineOrchestrator::from_config(config)
        .map_err(CompforgeError::from)?
        .with_confirmation_gate(gate);

    let printer = (!json).then(|| spawn_progress_printer(orchestrator.subscribe()));
    let outcome = orchestrator
        .run(&request, provider)
        .await
        .map_err(CompforgeError::from);

    // Closing the channel lets the printer drain the last states and exit.
    drop(orchestrator);
    if let Some(printer) = printer {
        finish_printer(printer).await;
    }

    let run = match outcome? {
        RunOutcome::Finished(run) => run,
        RunOutcome::Declined(concern) => {
            eprintln!(
                "✗ Declined: nothing was sent to {}",
                concern.provider.display_name()
            );
            return Ok(ExitCode::DECLINED);
        }
        RunOutcome::Busy => {
            eprintln!("✗ Another run is already in progress");
            return Ok(ExitCode::INTERNAL);
        }
    };

    let files = export_run(&run, out)?;
    let audit = run
        .stage3_output
        .as_ref()
        .map(|o| AuditSummary::parse(&o.text));

    if json {
        let report = RunReport {
            run: &run,
            files: &files,
            audit,
        };
        let rendered =
            serde_json::to_string_pretty(&report).context("Failed to emit run JSON")?;
        println!("{rendered}");
    } else {
        print_summary(&run, &files, audit.as_ref());
    }

    match run.failure {
        Some(failure) => Err(CompforgeError::Stage(failure.error).into()),
        None => Ok(ExitCode::SUCCESS),
    }
}

/// Wait for the progress printer. Returns false if it did not finish cleanly.
async fn finish_printer(printer: JoinHandle<()>) -> bool {
    match printer.await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Progress printer stopped abnormally");
            false
        }
    }
}

fn spawn_progress_printer(mut progress: watch::Receiver<PipelineRun>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_status = RunStatus::Idle;
        let mut reported = 0usize;

        while progress.changed().await.is_ok() {
            let run = progress.borrow_and_update().clone();

            let completed: Vec<&StageOutput> = run.outputs().collect();
            if completed.len() < reported {
                reported = 0;
            }
            for output in &completed[reported..] {
                eprintln!(
                    "  ✓ {} on {}/{} ({} ms)",
                    output.stage.label(),
                    output.provider,
                    output.model,
                    output.duration_ms
                );
            }
            reported = completed.len();

            if run.status != last_status {
                if let Some(stage) = run.status.current_stage() {
                    eprintln!("→ Stage {} ({})...", stage.index(), stage.label());
                }
                last_status = run.status;
            }
        }
    })
}

fn print_summary(run: &PipelineRun, files: &ExportedFiles, audit: Option<&AuditSummary>) {
    println!("Pipeline {}", run.status.label());

    for output in run.outputs() {
        println!(
            "  Stage {} ({}): {}/{}, {} attempt(s)",
            output.stage.index(),
            output.stage.label(),
            output.provider,
            output.model,
            output.attempts
        );
        if let Some(hop) = &output.fallback {
            println!(
                "    fell back from {} to {} after {}: {}",
                hop.from,
                hop.to,
                hop.trigger.as_str(),
                hop.reason
            );
        }
    }

    if let Some(audit) = audit {
        println!();
        match audit.score {
            Some(score) => println!("  Audit score: {}/{}", score.value, score.out_of),
            None => println!("  Audit score: not reported"),
        }
        println!("  Critical issues: {}", audit.critical_issues.len());
        for issue in &audit.critical_issues {
            println!("    - {issue}");
        }
        println!("  Warnings: {}", audit.warnings.len());
        println!("  Recommendations: {}", audit.recommendations.len());
    }

    println!();
    println!("Files:");
    for path in files.iter() {
        println!("  {}", path.display());
    }
}
