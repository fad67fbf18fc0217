//! procrun: run external programs the way a careful supervisor would
//!
//! The library re-exports the subprocess API from `procrun-runner` and the
//! configuration model from `procrun-config`; the `procrun` binary is a thin
//! CLI over both.
//!
//! ```no_run
//! # async fn demo() -> Result<(), procrun::ExecError> {
//! use procrun::{CancelSignal, Command};
//! use std::time::Duration;
//!
//! let signal = CancelSignal::new();
//! signal.cancel_after(Duration::from_secs(10));
//!
//! let mut cmd = Command::with_cancel(signal, "git");
//! cmd.args(["rev-parse", "HEAD"]);
//! let head = cmd.output().await?;
//! println!("{}", String::from_utf8_lossy(&head));
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod exit_codes;
pub mod logging;

pub use exit_codes::ExitCode;

pub use procrun_config::{CliArgs, Config, ConfigError, ConfigSource, RunnerConfig};
pub use procrun_runner::{
    CancelHook, CancelSignal, CaptureBuffer, Command, CommandState, DEFAULT_STDERR_CAPTURE_BYTES,
    Deduped, EnvError, EnvPolicy, ErrorCategory, ExecError, ExitError, ExitResult, Input,
    LookupError, Output, Resolution, RingBuffer, StartupError, StderrPipe, StdinPipe, StdoutPipe,
    StreamName, ValidationError, dedup_env, look_path,
};
