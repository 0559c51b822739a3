//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Builds CliArgs and discovers Config
//! - Creates the tokio runtime
//! - Dispatches to command handlers
//! - Handles all error output

use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

use compforge_config::Config;
use compforge_error_redaction::redact_error_message;
use compforge_utils::error::{CompforgeError, ConfigError, UserFriendlyError};
use compforge_utils::exit_codes::ExitCode;
use compforge_utils::logging::init_tracing;

/// Main CLI execution function.
///
/// Prints everything, including errors, and returns the exit code on
/// failure. main.rs only calls `std::process::exit(code.as_i32())`.
pub fn run() -> Result<(), ExitCode> {
    let cli = Cli::parse();
    let cli_args = cli.to_cli_args();

    let config = match Config::discover(&cli_args) {
        Ok(config) => config,
        Err(err) => {
            return Err(report_error(&err, "config"));
        }
    };

    // A subscriber may already be installed when embedded; keep going.
    let _ = init_tracing(config.verbose());

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("✗ Failed to create async runtime: {e}");
            return Err(ExitCode::INTERNAL);
        }
    };

    let operation = cli.command.operation();

    let result = rt.block_on(async {
        match cli.command {
            Commands::Run {
                request,
                provider,
                out,
                yes,
                json,
            } => {
                commands::execute_run_command(&request, provider, &out, yes, json, config).await
            }
            Commands::Providers { json } => commands::execute_providers_command(json, &config),
            Commands::Config { json } => commands::execute_config_command(json, &config),
        }
    });

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(error) => Err(report_error(&error, operation)),
    }
}

/// Print `error` to stderr and pick its exit code.
fn report_error(error: &anyhow::Error, operation: &str) -> ExitCode {
    if let Some(err) = error.downcast_ref::<CompforgeError>() {
        eprintln!("{}", redact_error_message(&err.display_for_user()));
        return err.to_exit_code();
    }

    if let Some(err) = error.downcast_ref::<ConfigError>() {
        eprintln!("{}", redact_error_message(&render(err)));
        return ExitCode::CLI_ARGS;
    }

    eprintln!(
        "✗ {operation} failed: {}",
        redact_error_message(&format!("{error:#}"))
    );
    if operation == "config" {
        ExitCode::CLI_ARGS
    } else {
        ExitCode::INTERNAL
    }
}

fn render(err: &dyn UserFriendlyError) -> String {
    let mut out = format!("✗ {}", err.user_message());
    if let Some(context) = err.context() {
        out.push_str(&format!("\n  {context}"));
    }
    for suggestion in err.suggestions() {
        out.push_str(&format!("\n  → {suggestion}"));
    }
    out
}
