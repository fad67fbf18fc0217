//! Exit codes of the `procrun` binary.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Child exited successfully |
//! | N | - | Child exited with status N (propagated) |
//! | 128+S | - | Child was killed by signal S |
//! | 2 | `CLI_ARGS` | Invalid arguments, configuration or API misuse |
//! | 124 | `CANCELLED` | Child was terminated after the timeout expired |
//! | 125 | `INTERNAL` | procrun itself failed (I/O bridging, runtime) |
//! | 126 | `NOT_EXECUTABLE` | Program exists but could not be executed |
//! | 127 | `NOT_FOUND` | Program not found |
//! | 130 | `INTERRUPTED` | Child was terminated after Ctrl-C |

use procrun_runner::{ErrorCategory, ExecError, ExitResult, StartupError};

/// Process exit code returned by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Invalid or missing command-line arguments, bad configuration
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Terminated because the timeout expired
    pub const CANCELLED: ExitCode = ExitCode(124);

    /// Failure inside procrun rather than in the child
    pub const INTERNAL: ExitCode = ExitCode(125);

    pub const NOT_EXECUTABLE: ExitCode = ExitCode(126);

    pub const NOT_FOUND: ExitCode = ExitCode(127);

    /// Terminated because of Ctrl-C
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Exit code that mirrors how a child ended.
    ///
    /// Signal deaths follow the shell convention of `128 + signal`.
    #[must_use]
    pub fn from_exit_result(result: &ExitResult) -> Self {
        match (result.code, result.signal) {
            (Some(code), _) => ExitCode(code),
            (None, Some(signal)) => ExitCode(128 + signal),
            (None, None) => Self::INTERNAL,
        }
    }

    /// Map a runner error to an exit code.
    ///
    /// Cancellation is not handled here: the caller knows whether the
    /// timeout or an interrupt fired the signal.
    #[must_use]
    pub fn from_exec_error(err: &ExecError) -> Self {
        match err {
            ExecError::Startup(startup) => Self::from_startup_error(startup),
            ExecError::Exit(exit) => Self::from_exit_result(&exit.result),
            _ => match err.kind() {
                ErrorCategory::Validation => Self::CLI_ARGS,
                ErrorCategory::Cancellation => Self::CANCELLED,
                _ => Self::INTERNAL,
            },
        }
    }

    fn from_startup_error(err: &StartupError) -> Self {
        if err.is_not_found() {
            Self::NOT_FOUND
        } else if err.is_not_executable() {
            Self::NOT_EXECUTABLE
        } else {
            match err {
                StartupError::ImplicitRelative { .. } | StartupError::ExtraFilesUnsupported { .. } => {
                    Self::CLI_ARGS
                }
                _ => Self::INTERNAL,
            }
        }
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}
