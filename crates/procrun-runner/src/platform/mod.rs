//! Platform process backends
//!
//! Everything that differs between operating systems (spawning with extra
//! handles, killing, classifying broken-pipe errors, default lookup rules and
//! environment policy) sits behind [`ProcessBackend`]. The rest of the crate
//! never branches on the target OS.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tokio::process::{Child, Command as TokioCommand};

use crate::env::EnvPolicy;
use crate::lookpath::{self, LookupError, Resolution};

#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

#[cfg(unix)]
pub use unix::UnixBackend as NativeBackend;
#[cfg(windows)]
pub use windows::WindowsBackend as NativeBackend;

/// Capability set a platform provides to the command state machine.
pub trait ProcessBackend: fmt::Debug + Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Key comparison and NUL rules for environment normalization.
    fn env_policy(&self) -> EnvPolicy;

    /// Whether a bare name is first looked up in the current directory.
    fn implicit_current_dir_search(&self) -> bool;

    /// Whether handles beyond the standard three can be passed to the child.
    fn supports_extra_files(&self) -> bool;

    /// Resolve a bare program name.
    fn resolve(&self, name: &OsStr) -> Result<Resolution, LookupError> {
        lookpath::look_path_env(name, self.implicit_current_dir_search())
    }

    /// Spawn `cmd`, passing `extra_files` as descriptors `3..3 + n`.
    fn spawn(&self, cmd: &mut TokioCommand, extra_files: Vec<File>) -> io::Result<Child>;

    /// Issue a single forceful termination request.
    fn kill(&self, child: &mut Child) -> io::Result<()> {
        child.start_kill()
    }

    /// Whether `err` means the reading end of a pipe went away.
    fn is_broken_pipe(&self, err: &io::Error) -> bool;

    /// Entries the child needs even when the caller did not ask for them.
    ///
    /// `inherited` is true when the environment came from the parent rather
    /// than from an explicit list.
    fn add_critical_env(&self, env: &mut Vec<OsString>, dir: Option<&Path>, inherited: bool);
}

/// Backend for the platform this binary was compiled for.
#[must_use]
pub fn native() -> Arc<dyn ProcessBackend> {
    Arc::new(NativeBackend::default())
}
