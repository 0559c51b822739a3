use std::path::PathBuf;

/// Configuration values supplied on the command line.
///
/// Every field is optional; unset fields fall through to the config file and
/// then to built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config_path: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub verbose: Option<bool>,
    pub relay_url: Option<String>,
    pub credentials_file: Option<PathBuf>,
    /// Disable the pre-flight modality confirmation.
    pub no_preflight: bool,
}
