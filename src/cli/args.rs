//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use compforge_config::CliArgs;
use compforge_utils::types::ProviderId;

/// compforge - three-stage LLM pipeline for low-code UI components
#[derive(Parser, Debug)]
#[command(name = "compforge")]
#[command(about = "Draft, generate and audit low-code UI components with LLM providers")]
#[command(long_about = r#"
compforge turns a plain-language component request into a specification,
self-contained component code and an audit report.

EXAMPLES:
  # Run the pipeline on the default provider (Gemini)
  compforge run "a circular gauge from 0 to 100" --out ./gauge

  # Generate the code with Claude, read the request from stdin
  echo "a sortable orders table" | compforge run - --provider claude

  # Show which provider keys are available and which models would be used
  compforge providers

  # Show the effective configuration and where each value comes from
  compforge config

STAGES:
  Spec drafting (Gemini) → Code generation (selected provider) → Code audit (Gemini)

CREDENTIALS:
  Keys come from the credentials file ([llm] credentials_file) first, then from
  GEMINI_API_KEY, ANTHROPIC_API_KEY and OPENAI_API_KEY.

CONFIGURATION:
  Configuration is loaded with precedence: CLI flags > config file > defaults
  Config file is discovered by searching upward from CWD for .compforge/config.toml
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Per-call timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Maximum tokens per response
    #[arg(long, global = true)]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 - 2.0)
    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// Route provider calls through a relay (`{relay}/api/{provider}`)
    #[arg(long, global = true)]
    pub relay_url: Option<String>,

    /// TOML file holding user-configured provider keys
    #[arg(long, global = true)]
    pub credentials_file: Option<PathBuf>,

    /// Skip the image-content confirmation before non-default providers
    #[arg(long, global = true)]
    pub no_preflight: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Configuration overrides carried by the global flags.
    #[must_use]
    pub fn to_cli_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            timeout_secs: self.timeout,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            verbose: self.verbose.then_some(true),
            relay_url: self.relay_url.clone(),
            credentials_file: self.credentials_file.clone(),
            no_preflight: self.no_preflight,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the three-stage pipeline for a component request
    Run {
        /// Component request, or `-` to read it from stdin
        request: String,

        /// Provider for the code generation stage
        #[arg(short, long, default_value = "gemini")]
        provider: ProviderId,

        /// Directory for spec.json, the component file, audit.md and run.json
        #[arg(short, long, default_value = "compforge-out")]
        out: PathBuf,

        /// Continue without asking when the request mentions images
        #[arg(short, long)]
        yes: bool,

        /// Print the run record as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// Show credential status and models per provider
    Providers {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the effective configuration with value sources
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Commands {
    /// Operation name used in error reports.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Run { .. } => "run",
            Self::Providers { .. } => "providers",
            Self::Config { .. } => "config",
        }
    }
}

/// Build the clap command (used for help rendering and tests).
#[must_use]
pub fn build_cli() -> clap::Command {
    <Cli as clap::CommandFactory>::command()
}
