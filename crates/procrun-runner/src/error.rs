//! Error types for command execution
//!
//! Every failure is reported through a structured error from the operation
//! that detected it. Messages are prefixed `exec:` and carry the attempted
//! program name so they can be diagnosed without re-running.

use serde::Serialize;
use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::env::EnvError;
use crate::lookpath::LookupError;
use crate::process::ExitResult;
use crate::types::{CommandState, StreamName};

/// Coarse classification of an [`ExecError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The process never ran.
    Startup,
    /// The process ran and exited unsuccessfully.
    RuntimeExit,
    /// Bridging a stream failed.
    IoCopy,
    /// The process was terminated because of a cancellation request.
    Cancellation,
    /// The API was misused.
    Validation,
}

impl ErrorCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::RuntimeExit => "runtime_exit",
            Self::IoCopy => "io_copy",
            Self::Cancellation => "cancellation",
            Self::Validation => "validation",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures surfaced from `start`. The process was not created.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("exec: {name:?}: {source}")]
    Lookup {
        name: OsString,
        #[source]
        source: LookupError,
    },

    #[error(
        "exec: {name:?}: cannot run executable found relative to current directory ({})",
        path.display()
    )]
    ImplicitRelative { name: OsString, path: PathBuf },

    #[error("exec: {name:?}: cancelled before start")]
    CancelledBeforeStart { name: OsString },

    #[error("exec: {name:?}: extra files are not supported on this platform")]
    ExtraFilesUnsupported { name: OsString },

    #[error("exec: {name:?}: {source}")]
    Spawn {
        name: OsString,
        #[source]
        source: io::Error,
    },
}

impl StartupError {
    /// Whether the target does not exist (as opposed to existing but failing to run).
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::Lookup { source, .. } => matches!(
                source,
                LookupError::NotFound | LookupError::EmptyName
            ),
            Self::Spawn { source, .. } => source.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Whether the target exists but could not be executed.
    #[must_use]
    pub fn is_not_executable(&self) -> bool {
        match self {
            Self::Lookup { source, .. } => matches!(source, LookupError::NotExecutable),
            Self::Spawn { source, .. } => source.kind() == io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

/// API misuse, reported at the point of misuse.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("exec: already started")]
    AlreadyStarted,

    #[error("exec: not started")]
    NotStarted,

    #[error("exec: wait was already called")]
    AlreadyWaited,

    #[error("exec: command is in terminal state {state} and cannot be reused")]
    Terminal { state: CommandState },

    #[error("exec: {stream} pipe requested after process started")]
    PipeAfterStart { stream: StreamName },

    #[error("exec: {stream} already set")]
    StreamAlreadySet { stream: StreamName },

    #[error("exec: custom cancellation set on a command without a cancel signal")]
    CancelWithoutSignal,

    #[error("exec: {what} changed after process started")]
    ConfiguredAfterStart { what: &'static str },

    #[error(transparent)]
    Env(#[from] EnvError),
}

/// Unsuccessful exit of a process that did run.
#[derive(Debug)]
pub struct ExitError {
    pub name: OsString,
    pub result: ExitResult,
}

impl fmt::Display for ExitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "exec: {:?}: {}", self.name, self.result)?;
        let tail = self.result.stderr_string();
        let tail = tail.trim_end();
        if !tail.is_empty() {
            write!(f, "\nstderr:\n{tail}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ExitError {}

/// Any failure of a command's lifecycle.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Exit(#[from] ExitError),

    #[error("exec: {name:?}: copying {stream}: {source}")]
    Copy {
        name: OsString,
        stream: StreamName,
        #[source]
        source: io::Error,
    },

    #[error("exec: {name:?}: cancelled ({result})")]
    Cancelled { name: OsString, result: ExitResult },

    #[error("exec: {name:?}: termination request failed: {source}")]
    CancelFailed {
        name: OsString,
        #[source]
        source: io::Error,
    },

    #[error("exec: {name:?}: I/O still in progress after wait delay")]
    WaitDelayExceeded { name: OsString },

    #[error("exec: {name:?}: waiting for process: {source}")]
    Wait {
        name: OsString,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

impl ExecError {
    /// Classify the error.
    #[must_use]
    pub fn kind(&self) -> ErrorCategory {
        match self {
            Self::Startup(_) => ErrorCategory::Startup,
            Self::Exit(_) => ErrorCategory::RuntimeExit,
            Self::Copy { .. } | Self::WaitDelayExceeded { .. } | Self::Wait { .. } => {
                ErrorCategory::IoCopy
            }
            Self::Cancelled { .. } | Self::CancelFailed { .. } => ErrorCategory::Cancellation,
            Self::Validation(_) => ErrorCategory::Validation,
        }
    }

    /// How the process ended, when it ran and was reaped.
    #[must_use]
    pub fn exit_result(&self) -> Option<&ExitResult> {
        match self {
            Self::Exit(err) => Some(&err.result),
            Self::Cancelled { result, .. } => Some(result),
            _ => None,
        }
    }
}

impl From<EnvError> for ExecError {
    fn from(err: EnvError) -> Self {
        Self::Validation(ValidationError::Env(err))
    }
}
