//! Executable lookup
//!
//! Resolves a bare program name against a `PATH`-style search list. A hit
//! found through a relative search entry (`.`, an empty entry, or the
//! implicit current-directory search on Windows) is reported as
//! [`Resolution::ImplicitRelative`] rather than folded into success, so the
//! caller decides whether running it is acceptable.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::platform::{self, ProcessBackend};

/// Outcome of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Found through an absolute search entry, or given as an explicit path.
    Absolute(PathBuf),
    /// Found relative to the current directory. Requires explicit opt-in.
    ImplicitRelative(PathBuf),
}

impl Resolution {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Absolute(path) | Self::ImplicitRelative(path) => path,
        }
    }

    #[must_use]
    pub const fn is_implicit_relative(&self) -> bool {
        matches!(self, Self::ImplicitRelative(_))
    }
}

/// Lookup failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("executable file not found in $PATH")]
    NotFound,

    #[error("file exists but is not executable")]
    NotExecutable,

    #[error("empty program name")]
    EmptyName,

    #[error("cannot determine current directory: {reason}")]
    CurrentDir { reason: String },
}

/// Resolve `name` using the process `PATH` and current directory.
pub fn look_path(name: impl AsRef<OsStr>) -> Result<Resolution, LookupError> {
    platform::native().resolve(name.as_ref())
}

/// Resolve `name` against the process `PATH` and current directory.
pub fn look_path_env(name: &OsStr, implicit_cwd: bool) -> Result<Resolution, LookupError> {
    let cwd = std::env::current_dir().map_err(|e| LookupError::CurrentDir {
        reason: e.to_string(),
    })?;
    let path_var = std::env::var_os("PATH");
    look_path_in(
        name,
        path_var.as_deref(),
        &cwd,
        implicit_cwd,
    )
}

/// Resolve `name` against an explicit search list.
///
/// `implicit_cwd` adds the current directory ahead of `path_var`, the way
/// Windows searches by default.
pub fn look_path_in(
    name: &OsStr,
    path_var: Option<&OsStr>,
    cwd: &Path,
    implicit_cwd: bool,
) -> Result<Resolution, LookupError> {
    if name.is_empty() {
        return Err(LookupError::EmptyName);
    }
    if has_separator(name) {
        // Explicit paths bypass the search and are used verbatim.
        check_explicit(name, cwd)?;
        return Ok(Resolution::Absolute(PathBuf::from(name)));
    }

    if implicit_cwd {
        if let Some(found) = find_in_dir(name, Path::new("."), cwd) {
            return Ok(Resolution::ImplicitRelative(found));
        }
    }

    let Some(path_var) = path_var else {
        return Err(LookupError::NotFound);
    };
    for dir in std::env::split_paths(path_var) {
        // An empty entry means the current directory.
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        if let Some(found) = find_in_dir(name, &dir, cwd) {
            return Ok(if dir.is_absolute() {
                Resolution::Absolute(found)
            } else {
                Resolution::ImplicitRelative(found)
            });
        }
    }
    Err(LookupError::NotFound)
}

fn find_in_dir(name: &OsStr, dir: &Path, cwd: &Path) -> Option<PathBuf> {
    if dir.is_absolute() {
        return which::which_in(name, Some(dir.as_os_str()), cwd).ok();
    }
    // Search relative entries against `cwd`, but report the hit relative so
    // it stays recognizable as such.
    let found = which::which_in(name, Some(cwd.join(dir).as_os_str()), cwd).ok()?;
    Some(dir.join(found.file_name()?))
}

fn check_explicit(name: &OsStr, cwd: &Path) -> Result<(), LookupError> {
    if which::which_in(name, None::<&OsStr>, cwd).is_ok() {
        return Ok(());
    }
    if cwd.join(name).exists() {
        Err(LookupError::NotExecutable)
    } else {
        Err(LookupError::NotFound)
    }
}

pub(crate) fn has_separator(name: &OsStr) -> bool {
    let bytes = name.as_encoded_bytes();
    bytes.contains(&b'/') || (cfg!(windows) && (bytes.contains(&b'\\') || bytes.contains(&b':')))
}
