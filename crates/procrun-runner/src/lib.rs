//! Subprocess execution for procrun
//!
//! Builds, launches, supervises and collects external processes: stdio
//! plumbing with background copy tasks, environment normalization, bounded
//! stderr capture for diagnostics, and cooperative cancellation.
//!
//! All execution is argv-style. Nothing is passed through a shell.

pub mod cancel;
pub mod command;
mod copy;
pub mod env;
pub mod error;
pub mod lookpath;
pub mod platform;
pub mod process;
pub mod ring_buffer;
pub mod stdio;
pub mod types;

pub use cancel::{CancelHook, CancelSignal};
pub use command::{Command, DEFAULT_STDERR_CAPTURE_BYTES};
pub use env::{Deduped, EnvError, EnvPolicy, dedup_env};
pub use error::{ErrorCategory, ExecError, ExitError, StartupError, ValidationError};
pub use lookpath::{LookupError, Resolution, look_path};
pub use platform::{NativeBackend, ProcessBackend};
pub use process::ExitResult;
pub use ring_buffer::RingBuffer;
pub use stdio::{CaptureBuffer, Input, Output, PipeReader, PipeWriter, StderrPipe, StdinPipe, StdoutPipe};
pub use types::{CommandState, StreamName};
