//! Types shared across the runner modules

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three standard streams of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamName {
    Stdin,
    Stdout,
    Stderr,
}

impl StreamName {
    /// Convert the stream name to its string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Stdin => "stdin",
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a [`Command`](crate::Command).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandState {
    /// Configured but not yet started.
    Built,
    /// Process spawned; `wait` has not completed.
    Started,
    /// Process reaped. Terminal.
    Exited,
    /// `start` failed. Terminal.
    FailedToStart,
}

impl CommandState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::Started => "started",
            Self::Exited => "exited",
            Self::FailedToStart => "failed_to_start",
        }
    }

    /// Terminal states never transition again.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Exited | Self::FailedToStart)
    }
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_name_serializes_lowercase() {
        let json = serde_json::to_string(&StreamName::Stderr).unwrap();
        assert_eq!(json, "\"stderr\"");
    }

    #[test]
    fn test_terminal_states() {
        assert!(!CommandState::Built.is_terminal());
        assert!(!CommandState::Started.is_terminal());
        assert!(CommandState::Exited.is_terminal());
        assert!(CommandState::FailedToStart.is_terminal());
    }
}
