use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::Path;
use tokio::process::{Child, Command as TokioCommand};
use ::windows::Win32::Foundation::{ERROR_BROKEN_PIPE, ERROR_NO_DATA};

use super::ProcessBackend;
use crate::env::{self, EnvPolicy};

#[derive(Debug, Clone, Copy, Default)]
pub struct WindowsBackend;

impl ProcessBackend for WindowsBackend {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn env_policy(&self) -> EnvPolicy {
        EnvPolicy {
            case_insensitive: true,
            nul_allowed: false,
        }
    }

    fn implicit_current_dir_search(&self) -> bool {
        std::env::var_os("NoDefaultCurrentDirectoryInExePath").is_none()
    }

    fn supports_extra_files(&self) -> bool {
        false
    }

    fn spawn(&self, cmd: &mut TokioCommand, extra_files: Vec<File>) -> io::Result<Child> {
        if !extra_files.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "extra file handles are not supported on windows",
            ));
        }
        cmd.spawn()
    }

    fn is_broken_pipe(&self, err: &io::Error) -> bool {
        let code = err.raw_os_error();
        err.kind() == io::ErrorKind::BrokenPipe
            || code == Some(ERROR_BROKEN_PIPE.0 as i32)
            || code == Some(ERROR_NO_DATA.0 as i32)
    }

    fn add_critical_env(&self, env: &mut Vec<OsString>, _dir: Option<&Path>, _inherited: bool) {
        // Many system DLLs fail to load without SYSTEMROOT.
        if env::contains_key(env.as_slice(), "SYSTEMROOT", self.env_policy()) {
            return;
        }
        if let Some(root) = std::env::var_os("SYSTEMROOT") {
            env.push(env::join_entry("SYSTEMROOT", root));
        }
    }
}
