//! Exit code constants and error mapping for compforge.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Pipeline completed (or command succeeded) |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments or configuration |
//! | 3 | `STAGE_FAILURE` | A pipeline stage failed |
//! | 4 | `MISSING_CREDENTIAL` | A required provider key is absent |
//! | 5 | `DECLINED` | The user declined the pre-flight confirmation |

use crate::error::{CompforgeError, FailureKind, LlmError, StageError};

/// Process exit code.
///
/// The numeric values are part of the public CLI contract.
///
/// ```rust
/// use compforge_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
/// assert_eq!(ExitCode::from_i32(3), ExitCode::STAGE_FAILURE);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// Invalid or missing command-line arguments, or a bad config file
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// A stage failed after the pipeline started
    pub const STAGE_FAILURE: ExitCode = ExitCode(3);

    /// The run was blocked by an absent provider key
    pub const MISSING_CREDENTIAL: ExitCode = ExitCode(4);

    /// The user declined the pre-flight confirmation
    pub const DECLINED: ExitCode = ExitCode(5);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Exit code for a failed stage, by failure category.
    #[must_use]
    pub const fn for_failure(kind: FailureKind) -> Self {
        match kind {
            FailureKind::MissingCredential => Self::MISSING_CREDENTIAL,
            FailureKind::Configuration => Self::CLI_ARGS,
            _ => Self::STAGE_FAILURE,
        }
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

impl From<&LlmError> for ExitCode {
    fn from(err: &LlmError) -> Self {
        ExitCode::for_failure(err.kind())
    }
}

impl From<&StageError> for ExitCode {
    fn from(err: &StageError) -> Self {
        ExitCode::for_failure(err.kind())
    }
}

impl CompforgeError {
    /// Map this error onto the documented exit code table.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::Pipeline(_) => ExitCode::CLI_ARGS,
            Self::Llm(err) => err.into(),
            Self::Stage(err) => err.into(),
            Self::Io(_) => ExitCode::INTERNAL,
        }
    }
}
