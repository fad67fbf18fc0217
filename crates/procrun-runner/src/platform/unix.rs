use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::path::Path;
use tokio::process::{Child, Command as TokioCommand};

use super::ProcessBackend;
use crate::env::{self, EnvPolicy};

/// First descriptor number used for extra files in the child.
const FIRST_EXTRA_FD: RawFd = 3;

#[derive(Debug, Clone, Copy, Default)]
pub struct UnixBackend;

impl ProcessBackend for UnixBackend {
    fn name(&self) -> &'static str {
        "unix"
    }

    fn env_policy(&self) -> EnvPolicy {
        EnvPolicy {
            case_insensitive: false,
            nul_allowed: false,
        }
    }

    fn implicit_current_dir_search(&self) -> bool {
        false
    }

    fn supports_extra_files(&self) -> bool {
        true
    }

    fn spawn(&self, cmd: &mut TokioCommand, extra_files: Vec<File>) -> io::Result<Child> {
        if !extra_files.is_empty() {
            let mut fds: Vec<RawFd> = extra_files.iter().map(AsRawFd::as_raw_fd).collect();
            let floor = relocation_floor(&fds);
            // SAFETY: the hook only calls fcntl/dup2, which are
            // async-signal-safe, and mutates a vector allocated before fork.
            //
            // std reports exec failure through a close-on-exec pipe opened
            // before this hook runs. If that pipe lands on a target slot the
            // dup2 replaces it: spawn then reports success and a failed exec
            // writes std's error bytes into the caller's file instead.
            unsafe {
                cmd.pre_exec(move || remap_fds(&mut fds, floor));
            }
        }
        let child = cmd.spawn();
        // The child has its own copies now.
        drop(extra_files);
        child
    }

    fn is_broken_pipe(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::BrokenPipe || err.raw_os_error() == Some(libc::EPIPE)
    }

    fn add_critical_env(&self, env: &mut Vec<OsString>, dir: Option<&Path>, inherited: bool) {
        // Only an inherited environment gets PWD; an explicit list is taken
        // as the caller's complete intent.
        if !inherited {
            return;
        }
        let Some(dir) = dir else { return };
        if let Ok(abs) = std::path::absolute(dir) {
            env.push(env::join_entry("PWD", abs));
        }
    }
}

/// Lowest descriptor number that is neither a source nor a target.
fn relocation_floor(fds: &[RawFd]) -> RawFd {
    let last_target = FIRST_EXTRA_FD + fds.len() as RawFd;
    let max_source = fds.iter().copied().max().unwrap_or(0) + 1;
    last_target.max(max_source)
}

/// Move `fds[i]` to descriptor `3 + i` in the child.
///
/// Targets are dense and low while sources are arbitrary, so a naive
/// in-order `dup2` can overwrite a source before it is moved. Any source
/// lower than its own target can only be clobbered by an earlier target, so
/// those are first relocated above every source and target.
fn remap_fds(fds: &mut [RawFd], floor: RawFd) -> io::Result<()> {
    for (i, fd) in fds.iter_mut().enumerate() {
        let target = FIRST_EXTRA_FD + i as RawFd;
        if *fd < target {
            // SAFETY: plain fcntl on a descriptor we own.
            let moved = unsafe { libc::fcntl(*fd, libc::F_DUPFD_CLOEXEC, floor) };
            if moved < 0 {
                return Err(io::Error::last_os_error());
            }
            *fd = moved;
        }
    }

    for (i, &fd) in fds.iter().enumerate() {
        let target = FIRST_EXTRA_FD + i as RawFd;
        // SAFETY: plain fcntl/dup2 on descriptors we own.
        let rc = unsafe {
            if fd == target {
                // Already in place: only clear close-on-exec.
                libc::fcntl(fd, libc::F_SETFD, 0)
            } else {
                libc::dup2(fd, target)
            }
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
    }
    Ok(())
}
