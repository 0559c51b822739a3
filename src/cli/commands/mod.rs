//! CLI command implementations.
//!
//! Each handler returns the exit code for a completed command; errors that
//! abort a command propagate as `anyhow::Error` and are reported by `run.rs`.

mod config;
mod confirm;
mod pipeline;
mod providers;

pub use config::execute_config_command;
pub use confirm::StdinConfirm;
pub use pipeline::execute_run_command;
pub use providers::execute_providers_command;
