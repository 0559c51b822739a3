//! Logging and observability for compforge
//!
//! Structured `tracing` output with a compact default format and a verbose
//! format that adds targets and span close timings.

use tracing::{Level, error, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::types::{ProviderId, StageId};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "COMPFORGE_LOG";

fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("compforge=debug,info")
            } else {
                EnvFilter::try_new("compforge=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the global tracing subscriber.
///
/// Fails if a subscriber is already installed; callers that may initialize
/// twice (tests) should ignore the error.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = env_filter(verbose);

    if verbose {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span wrapping one stage execution.
pub fn stage_span(stage: StageId, provider: ProviderId) -> tracing::Span {
    span!(
        Level::INFO,
        "stage",
        stage = %stage,
        index = stage.index(),
        provider = %provider,
    )
}

pub fn log_stage_start(stage: StageId, provider: ProviderId, model: &str) {
    info!(
        stage = %stage,
        provider = %provider,
        model = %model,
        "Starting stage {}",
        stage.index()
    );
}

pub fn log_stage_complete(stage: StageId, duration_ms: u128, output_len: usize) {
    info!(
        stage = %stage,
        duration_ms = %duration_ms,
        output_len,
        "Stage {} completed",
        stage.index()
    );
}

/// Log a stage failure. `message` must already be redacted.
pub fn log_stage_error(stage: StageId, kind: &str, message: &str, duration_ms: u128) {
    error!(
        stage = %stage,
        kind = %kind,
        duration_ms = %duration_ms,
        error = %message,
        "Stage {} failed",
        stage.index()
    );
}

/// Log a fallback hop. `reason` must already be redacted.
pub fn log_fallback_hop(stage: StageId, from: &str, to: &str, reason: &str) {
    warn!(
        stage = %stage,
        from = %from,
        to = %to,
        reason = %reason,
        "Primary call failed; retrying with fallback target"
    );
}
