use serde::Serialize;
use std::fmt;
use std::process::ExitStatus;

/// How a child process ended.
///
/// Available once [`Command::wait`](crate::Command::wait) has reaped the
/// process, whether or not the exit was successful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExitResult {
    /// Exit code (None if terminated by signal)
    pub code: Option<i32>,
    /// Terminating signal number (unix only)
    pub signal: Option<i32>,
    /// Whether the exit was caused by a cancellation request
    pub cancelled: bool,
    /// Bounded stderr excerpt, when stderr was captured by `output`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stderr: Option<Vec<u8>>,
}

impl ExitResult {
    pub(crate) fn from_status(status: ExitStatus, cancelled: bool) -> Self {
        Self {
            code: status.code(),
            signal: signal_of(status),
            cancelled,
            stderr: None,
        }
    }

    /// Check if the process exited with code 0.
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Get the stderr excerpt as a UTF-8 string, lossy conversion.
    #[must_use]
    pub fn stderr_string(&self) -> String {
        self.stderr
            .as_deref()
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .unwrap_or_default()
    }
}

#[cfg(unix)]
fn signal_of(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn signal_of(_status: ExitStatus) -> Option<i32> {
    None
}

#[cfg(unix)]
fn signal_name(signal: i32) -> String {
    nix::sys::signal::Signal::try_from(signal)
        .map(|s| s.as_str().trim_start_matches("SIG").to_lowercase())
        .unwrap_or_else(|_| signal.to_string())
}

#[cfg(not(unix))]
fn signal_name(signal: i32) -> String {
    signal.to_string()
}

impl fmt::Display for ExitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "exit status {code}"),
            (None, Some(signal)) => write!(f, "signal: {}", signal_name(signal)),
            (None, None) => f.write_str("exit status unknown"),
        }
    }
}
