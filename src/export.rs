//! Writing a finished run to disk.
//!
//! | File | Content |
//! |------|---------|
//! | `spec.json` | Stage 1 output (fenced block contents if the model wrapped it) |
//! | `component.<ext>` | Code extracted from the Stage 2 output |
//! | `audit.md` | Stage 3 output, verbatim |
//! | `run.json` | The serialized [`PipelineRun`] |
//!
//! Only the stages that completed are written; `run.json` always is.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use compforge_orchestrator::PipelineRun;
use compforge_stages::extract_artifact;
use compforge_utils::error::CompforgeError;

pub const SPEC_FILE: &str = "spec.json";
pub const AUDIT_FILE: &str = "audit.md";
pub const RUN_FILE: &str = "run.json";

/// Files written for one run, in write order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportedFiles {
    pub spec: Option<PathBuf>,
    pub component: Option<PathBuf>,
    pub audit: Option<PathBuf>,
    pub run: PathBuf,
}

impl ExportedFiles {
    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        [self.spec.as_ref(), self.component.as_ref(), self.audit.as_ref()]
            .into_iter()
            .flatten()
            .chain(std::iter::once(&self.run))
    }
}

/// Write `run` into `dir`, creating it if needed.
///
/// # Errors
///
/// Returns `CompforgeError::Io` if the directory or a file cannot be written
pub fn export_run(run: &PipelineRun, dir: &Path) -> Result<ExportedFiles, CompforgeError> {
    fs::create_dir_all(dir)?;

    let spec = match run.stage1_output.as_ref() {
        Some(output) => {
            let body = extract_artifact(&output.text)
                .filter(|a| a.fenced)
                .map_or_else(|| output.text.clone(), |a| a.code);
            Some(write(dir.join(SPEC_FILE), &body)?)
        }
        None => None,
    };

    let component = match run
        .stage2_output
        .as_ref()
        .and_then(|o| extract_artifact(&o.text))
    {
        Some(artifact) => Some(write(dir.join(artifact.file_name()), &artifact.code)?),
        None => None,
    };

    let audit = match run.stage3_output.as_ref() {
        Some(output) => Some(write(dir.join(AUDIT_FILE), &output.text)?),
        None => None,
    };

    let record = serde_json::to_string_pretty(run).map_err(std::io::Error::other)?;
    let run_path = write(dir.join(RUN_FILE), &record)?;

    Ok(ExportedFiles {
        spec,
        component,
        audit,
        run: run_path,
    })
}

fn write(path: PathBuf, contents: &str) -> Result<PathBuf, CompforgeError> {
    let mut contents = contents.to_string();
    if !contents.ends_with('\n') {
        contents.push('\n');
    }
    fs::write(&path, contents)?;
    debug!(path = %path.display(), "Wrote output file");
    Ok(path)
}
