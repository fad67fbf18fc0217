//! `run` and `output`: launch a program under supervision.

use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use procrun_config::Config;
use procrun_runner::env::split_entry;
use procrun_runner::{CancelSignal, Command, EnvPolicy, ExecError, Input, Output};

use crate::ExitCode;
use crate::cli::args::ExecArgs;

/// What fired the cancellation signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelReason {
    Timeout(Duration),
    Interrupt,
}

impl CancelReason {
    fn exit_code(self) -> ExitCode {
        match self {
            Self::Timeout(_) => ExitCode::CANCELLED,
            Self::Interrupt => ExitCode::INTERRUPTED,
        }
    }
}

/// Fires `signal` on timeout or Ctrl-C, whichever comes first.
struct Watchdog {
    signal: CancelSignal,
    task: JoinHandle<CancelReason>,
}

impl Watchdog {
    fn spawn(timeout: Option<Duration>) -> Self {
        let signal = CancelSignal::new();
        let fire = signal.clone();
        let task = tokio::spawn(async move {
            let reason = tokio::select! {
                () = expire(timeout) => CancelReason::Timeout(timeout.unwrap_or_default()),
                () = interrupted() => CancelReason::Interrupt,
            };
            debug!(?reason, "cancelling command");
            fire.cancel();
            reason
        });
        Self { signal, task }
    }

    /// Reason the signal fired, if it did.
    async fn finish(self) -> Option<CancelReason> {
        if self.signal.is_cancelled() {
            self.task.await.ok()
        } else {
            self.task.abort();
            None
        }
    }
}

async fn expire(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No handler could be installed; never fire.
        std::future::pending::<()>().await;
    }
}

/// Environment key rules selected by the configuration.
pub(crate) fn env_policy(config: &Config) -> EnvPolicy {
    EnvPolicy {
        case_insensitive: config.env_case_insensitive(),
        ..EnvPolicy::native()
    }
}

/// Apply the shared launch options to a new command bound to `signal`.
fn build_command(exec: &ExecArgs, config: &Config, signal: &CancelSignal) -> Result<Command> {
    let (program, args) = exec
        .program
        .split_first()
        .context("no program given")?;

    let mut cmd = Command::with_cancel(signal.clone(), program);
    cmd.args(args)
        .env_policy(env_policy(config))
        .allow_implicit_relative(config.allow_implicit_relative())
        .stderr_capture_bytes(config.stderr_capture_bytes());
    if let Some(dir) = &exec.dir {
        cmd.current_dir(dir);
    }
    if exec.clear_env {
        cmd.env_clear();
    }
    for var in &exec.vars {
        let (key, value) = split_entry(var)
            .with_context(|| format!("invalid --env value {var:?}: expected KEY=VALUE"))?;
        cmd.env(key, value);
    }
    if let Some(delay) = config.wait_delay() {
        cmd.wait_delay(delay);
    }
    Ok(cmd)
}

/// Report a runner error on stderr and pick the exit code.
fn report(err: &ExecError, reason: Option<CancelReason>) -> ExitCode {
    match (err, reason) {
        (ExecError::Cancelled { .. }, Some(CancelReason::Timeout(after))) => {
            eprintln!("procrun: {err} after timeout of {}s", after.as_secs());
        }
        (ExecError::Cancelled { .. }, Some(CancelReason::Interrupt)) => {
            eprintln!("procrun: {err} by interrupt");
        }
        // The child already wrote its own stderr to the terminal.
        (ExecError::Exit(_), _) => {}
        _ => eprintln!("procrun: {err}"),
    }
    match (err, reason) {
        (ExecError::Cancelled { .. }, Some(reason)) => reason.exit_code(),
        _ => ExitCode::from_exec_error(err),
    }
}

/// Run a program with inherited stdio.
pub async fn execute_run_command(exec: &ExecArgs, config: &Config) -> Result<ExitCode> {
    let watchdog = Watchdog::spawn(config.timeout());
    let mut cmd = match build_command(exec, config, &watchdog.signal) {
        Ok(cmd) => cmd,
        Err(err) => {
            eprintln!("procrun: {err:#}");
            return Ok(ExitCode::CLI_ARGS);
        }
    };
    cmd.stdin(Input::Inherit)
        .stdout(Output::Inherit)
        .stderr(Output::Inherit);
    debug!(command = %cmd, "running");

    let outcome = cmd.run().await;
    let reason = watchdog.finish().await;
    match outcome {
        Ok(result) => {
            debug!(pid = ?cmd.id(), %result, "command finished");
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => Ok(report(&err, reason)),
    }
}

/// Run a program and print what it wrote.
pub async fn execute_output_command(
    exec: &ExecArgs,
    combined: bool,
    config: &Config,
) -> Result<ExitCode> {
    let watchdog = Watchdog::spawn(config.timeout());
    let mut cmd = match build_command(exec, config, &watchdog.signal) {
        Ok(cmd) => cmd,
        Err(err) => {
            eprintln!("procrun: {err:#}");
            return Ok(ExitCode::CLI_ARGS);
        }
    };
    cmd.stdin(Input::Inherit);
    debug!(command = %cmd, combined, "capturing output");

    let outcome = if combined {
        cmd.combined_output().await
    } else {
        cmd.output().await
    };
    let reason = watchdog.finish().await;
    match outcome {
        Ok(captured) => {
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&captured)
                .and_then(|()| stdout.flush())
                .context("Failed to write captured output")?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err @ ExecError::Exit(_)) => {
            // Captured stderr is part of the message.
            eprintln!("procrun: {err}");
            Ok(ExitCode::from_exec_error(&err))
        }
        Err(err) => Ok(report(&err, reason)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procrun_config::CliArgs;
    use std::ffi::OsString;

    fn exec_args(program: &[&str]) -> ExecArgs {
        ExecArgs {
            dir: None,
            vars: Vec::new(),
            clear_env: false,
            timeout: None,
            wait_delay_ms: None,
            allow_relative: false,
            program: program.iter().map(OsString::from).collect(),
        }
    }

    fn defaults() -> Config {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        Config::discover_from(dir.path(), &CliArgs::default()).unwrap()
    }

    #[tokio::test]
    async fn test_build_command_applies_options() {
        let mut exec = exec_args(&["prog", "a", "b"]);
        exec.clear_env = true;
        exec.vars = vec![OsString::from("K=1"), OsString::from("K=2")];
        let signal = CancelSignal::new();
        let cmd = build_command(&exec, &defaults(), &signal).unwrap();

        assert_eq!(cmd.get_args(), &[OsString::from("a"), OsString::from("b")]);
        assert_eq!(cmd.environ().entries, vec![OsString::from("K=2")]);
    }

    #[tokio::test]
    async fn test_build_command_uses_configured_env_policy() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let cli = CliArgs {
            env_case_insensitive: Some(true),
            ..CliArgs::default()
        };
        let config = Config::discover_from(dir.path(), &cli).unwrap();

        let mut exec = exec_args(&["prog"]);
        exec.clear_env = true;
        exec.vars = vec![OsString::from("k=1"), OsString::from("K=2")];
        let cmd = build_command(&exec, &config, &CancelSignal::new()).unwrap();
        assert_eq!(cmd.environ().entries, vec![OsString::from("K=2")]);
    }

    #[tokio::test]
    async fn test_build_command_rejects_bad_env() {
        let mut exec = exec_args(&["prog"]);
        exec.vars = vec![OsString::from("NOEQUALS")];
        let err = build_command(&exec, &defaults(), &CancelSignal::new()).unwrap_err();
        assert!(err.to_string().contains("expected KEY=VALUE"));
    }

    #[tokio::test]
    async fn test_watchdog_reports_timeout() {
        let watchdog = Watchdog::spawn(Some(Duration::from_millis(10)));
        watchdog.signal.cancelled().await;
        assert_eq!(
            watchdog.finish().await,
            Some(CancelReason::Timeout(Duration::from_millis(10)))
        );
    }

    #[tokio::test]
    async fn test_watchdog_idle_without_timeout() {
        let watchdog = Watchdog::spawn(None);
        assert_eq!(watchdog.finish().await, None);
    }

    #[test]
    fn test_cancel_reason_exit_codes() {
        assert_eq!(
            CancelReason::Timeout(Duration::from_secs(1)).exit_code(),
            ExitCode::CANCELLED
        );
        assert_eq!(CancelReason::Interrupt.exit_code(), ExitCode::INTERRUPTED);
    }
}
