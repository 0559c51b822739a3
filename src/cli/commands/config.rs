//! Config command implementation
//!
//! Handles `compforge config`: the effective value of every setting and the
//! layer it came from.

use anyhow::{Context, Result};
use serde::Serialize;

use compforge_config::Config;
use compforge_utils::exit_codes::ExitCode;

#[derive(Serialize)]
struct ConfigEntry<'a> {
    key: &'a str,
    value: &'a str,
    source: &'a str,
}

pub fn execute_config_command(json: bool, config: &Config) -> Result<ExitCode> {
    let effective = config.effective_config();

    if json {
        let entries: Vec<ConfigEntry<'_>> = effective
            .iter()
            .map(|(key, (value, source))| ConfigEntry { key, value, source })
            .collect();
        let rendered =
            serde_json::to_string_pretty(&entries).context("Failed to emit config JSON")?;
        println!("{rendered}");
        return Ok(ExitCode::SUCCESS);
    }

    let width = effective.keys().map(String::len).max().unwrap_or(0);
    for (key, (value, source)) in &effective {
        println!("{key:<width$}  {value}  [{source}]");
    }
    Ok(ExitCode::SUCCESS)
}
