//! Command execution state machine
//!
//! A [`Command`] moves `Built -> Started -> Exited`, or `Built ->
//! FailedToStart`. Exactly one `start` succeeds per instance; `wait`
//! requires a successful `start`; terminal instances are never restarted.

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::process::{Child, Command as TokioCommand};
use tracing::{debug, warn};

use crate::cancel::{self, CancelHook, CancelOutcome, CancelSignal};
use crate::copy::{CopySupervisor, Side};
use crate::env::{self, Deduped, EnvPolicy};
use crate::error::{ExecError, ExitError, StartupError, ValidationError};
use crate::lookpath::{self, LookupError, Resolution};
use crate::platform::{self, ProcessBackend};
use crate::process::ExitResult;
use crate::stdio::{
    Binding, CaptureBuffer, Input, Output, PipeSet, Plumbing, StderrPipe, StdinPipe, StdoutPipe,
};
use crate::types::{CommandState, StreamName};

/// Default capacity of each half of the stderr excerpt kept by `output`.
pub const DEFAULT_STDERR_CAPTURE_BYTES: usize = 32 << 10;

/// A configured external-process invocation.
///
/// Arguments are passed argv-style; nothing is interpreted by a shell.
///
/// ```no_run
/// # async fn demo() -> Result<(), procrun_runner::ExecError> {
/// use procrun_runner::Command;
///
/// let out = Command::new("echo").arg("hello").output().await?;
/// assert_eq!(out, b"hello\n");
/// # Ok(())
/// # }
/// ```
pub struct Command {
    name: OsString,
    resolution: Result<Resolution, LookupError>,
    args: Vec<OsString>,
    dir: Option<PathBuf>,
    /// Explicit environment; `None` inherits the parent's.
    env: Option<Vec<OsString>>,
    /// Entries layered on top of the base environment.
    env_added: Vec<OsString>,
    env_policy: EnvPolicy,
    stdin: Binding<Input>,
    stdout: Binding<Output>,
    stderr: Binding<Output>,
    extra_files: Vec<File>,
    signal: Option<CancelSignal>,
    cancel_hook: Option<CancelHook>,
    wait_delay: Option<Duration>,
    allow_implicit_relative: bool,
    stderr_capture_bytes: usize,
    backend: Arc<dyn ProcessBackend>,

    state: CommandState,
    child: Option<Child>,
    pid: Option<u32>,
    pipes: PipeSet,
    copies: CopySupervisor,
    stderr_capture: Option<CaptureBuffer>,
    exit_result: Option<ExitResult>,
    misuse: Option<&'static str>,
}

impl Command {
    /// Configure `name` for execution.
    ///
    /// A bare name is resolved against `PATH` now; a name containing a path
    /// separator is used as given. Resolution failures surface from `start`.
    pub fn new(name: impl AsRef<OsStr>) -> Self {
        let name = name.as_ref().to_os_string();
        let backend = platform::native();
        let resolution = if lookpath::has_separator(&name) {
            Ok(Resolution::Absolute(PathBuf::from(&name)))
        } else {
            backend.resolve(&name)
        };
        Self {
            name,
            resolution,
            args: Vec::new(),
            dir: None,
            env: None,
            env_added: Vec::new(),
            env_policy: backend.env_policy(),
            stdin: Binding::Unset,
            stdout: Binding::Unset,
            stderr: Binding::Unset,
            extra_files: Vec::new(),
            signal: None,
            cancel_hook: None,
            wait_delay: None,
            allow_implicit_relative: false,
            stderr_capture_bytes: DEFAULT_STDERR_CAPTURE_BYTES,
            backend,
            state: CommandState::Built,
            child: None,
            pid: None,
            pipes: PipeSet::default(),
            copies: CopySupervisor::default(),
            stderr_capture: None,
            exit_result: None,
            misuse: None,
        }
    }

    /// Like [`Command::new`], bound to a cancellation signal.
    pub fn with_cancel(signal: CancelSignal, name: impl AsRef<OsStr>) -> Self {
        let mut cmd = Self::new(name);
        cmd.signal = Some(signal);
        cmd
    }

    /// Record a setter call made after start. Returns whether it may proceed.
    fn configurable(&mut self, what: &'static str) -> bool {
        if self.state == CommandState::Built {
            return true;
        }
        debug!(what, state = %self.state, "ignoring configuration after start");
        if self.misuse.is_none() {
            self.misuse = Some(what);
        }
        false
    }

    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Self {
        if self.configurable("args") {
            self.args.push(arg.as_ref().to_os_string());
        }
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if self.configurable("args") {
            self.args
                .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        }
        self
    }

    /// Working directory of the child. Relative program paths are resolved
    /// against it.
    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        if self.configurable("dir") {
            self.dir = Some(dir.as_ref().to_path_buf());
        }
        self
    }

    /// Add or override one variable.
    pub fn env(&mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> &mut Self {
        if self.configurable("env") {
            self.env_added.push(env::join_entry(key, value));
        }
        self
    }

    pub fn envs<I, K, V>(&mut self, vars: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<OsStr>,
        V: AsRef<OsStr>,
    {
        if self.configurable("env") {
            self.env_added
                .extend(vars.into_iter().map(|(k, v)| env::join_entry(k, v)));
        }
        self
    }

    /// Replace the inherited environment with raw `KEY=VALUE` entries.
    ///
    /// Entries are kept verbatim until start, where they are normalized.
    pub fn env_entries<I, S>(&mut self, entries: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        if self.configurable("env") {
            self.env = Some(
                entries
                    .into_iter()
                    .map(|e| e.as_ref().to_os_string())
                    .collect(),
            );
        }
        self
    }

    /// Start from an empty environment.
    pub fn env_clear(&mut self) -> &mut Self {
        if self.configurable("env") {
            self.env = Some(Vec::new());
            self.env_added.clear();
        }
        self
    }

    /// Key comparison rules used to normalize the environment.
    ///
    /// Defaults to the platform's own rules.
    pub fn env_policy(&mut self, policy: EnvPolicy) -> &mut Self {
        if self.configurable("env policy") {
            self.env_policy = policy;
        }
        self
    }

    pub fn stdin(&mut self, input: Input) -> &mut Self {
        if self.configurable("stdin") {
            self.pipes.discard(StreamName::Stdin);
            self.stdin = Binding::Given(input);
        }
        self
    }

    pub fn stdout(&mut self, output: Output) -> &mut Self {
        if self.configurable("stdout") {
            self.pipes.discard(StreamName::Stdout);
            self.stdout = Binding::Given(output);
        }
        self
    }

    pub fn stderr(&mut self, output: Output) -> &mut Self {
        if self.configurable("stderr") {
            self.pipes.discard(StreamName::Stderr);
            self.stderr = Binding::Given(output);
            self.stderr_capture = None;
        }
        self
    }

    /// Pass `file` to the child as descriptor `3 + n`, where `n` is the
    /// number of extra files added before it.
    pub fn extra_file(&mut self, file: impl Into<File>) -> &mut Self {
        if self.configurable("extra files") {
            self.extra_files.push(file.into());
        }
        self
    }

    /// Replace the default kill with `hook` when the cancel signal fires.
    ///
    /// `Ok` attributes the exit to cancellation. An error is reported from
    /// `wait` unless the process had already exited.
    pub fn cancel_with<F>(&mut self, hook: F) -> &mut Self
    where
        F: FnMut(&mut Child) -> std::io::Result<()> + Send + 'static,
    {
        if self.configurable("cancel hook") {
            self.cancel_hook = Some(Box::new(hook));
        }
        self
    }

    /// Bound how long `wait` waits for I/O after the process exits, and for
    /// the process to exit after a custom cancellation request.
    pub fn wait_delay(&mut self, delay: Duration) -> &mut Self {
        if self.configurable("wait delay") {
            self.wait_delay = Some(delay);
        }
        self
    }

    /// Allow running an executable that was found relative to the current
    /// directory.
    pub fn allow_implicit_relative(&mut self, allow: bool) -> &mut Self {
        if self.configurable("implicit relative policy") {
            self.allow_implicit_relative = allow;
        }
        self
    }

    /// Capacity of each half of the stderr excerpt kept by `output`.
    pub fn stderr_capture_bytes(&mut self, max_bytes: usize) -> &mut Self {
        if self.configurable("stderr capture") {
            self.stderr_capture_bytes = max_bytes;
        }
        self
    }

    fn pipe_allowed(&self, stream: StreamName, unset: bool) -> Result<(), ValidationError> {
        if self.state != CommandState::Built {
            return Err(ValidationError::PipeAfterStart { stream });
        }
        if !unset {
            return Err(ValidationError::StreamAlreadySet { stream });
        }
        Ok(())
    }

    /// Pipe connected to the child's stdin once started.
    ///
    /// Close or drop the handle to deliver end-of-file. `wait` closes it if
    /// it is still open.
    pub fn stdin_pipe(&mut self) -> Result<StdinPipe, ValidationError> {
        self.pipe_allowed(StreamName::Stdin, self.stdin.is_unset())?;
        self.stdin = Binding::Pipe;
        Ok(self.pipes.stdin())
    }

    /// Pipe connected to the child's stdout once started.
    ///
    /// `wait` closes the handle, so read everything before waiting.
    pub fn stdout_pipe(&mut self) -> Result<StdoutPipe, ValidationError> {
        self.pipe_allowed(StreamName::Stdout, self.stdout.is_unset())?;
        self.stdout = Binding::Pipe;
        Ok(self.pipes.stdout())
    }

    pub fn stderr_pipe(&mut self) -> Result<StderrPipe, ValidationError> {
        self.pipe_allowed(StreamName::Stderr, self.stderr.is_unset())?;
        self.stderr = Binding::Pipe;
        Ok(self.pipes.stderr())
    }

    /// Normalized environment the child would receive.
    ///
    /// The entries are usable even when an error is reported; rejected
    /// entries have been dropped.
    #[must_use]
    pub fn environ(&self) -> Deduped {
        let inherited = self.env.is_none();
        let mut entries: Vec<OsString> = match &self.env {
            Some(explicit) => explicit.clone(),
            None => std::env::vars_os()
                .map(|(k, v)| env::join_entry(k, v))
                .collect(),
        };
        self.backend
            .add_critical_env(&mut entries, self.dir.as_deref(), inherited);
        entries.extend(self.env_added.iter().cloned());
        env::dedup_env(&entries, self.env_policy)
    }

    fn ensure_startable(&self) -> Result<(), ValidationError> {
        match self.state {
            CommandState::Built => Ok(()),
            CommandState::Started => Err(ValidationError::AlreadyStarted),
            state => Err(ValidationError::Terminal { state }),
        }
    }

    /// Launch the process without waiting for it.
    ///
    /// Must be called within a Tokio runtime: bridged streams are copied by
    /// spawned tasks.
    pub fn start(&mut self) -> Result<(), ExecError> {
        self.ensure_startable()?;
        match self.launch() {
            Ok(()) => {
                self.state = CommandState::Started;
                Ok(())
            }
            Err(err) => {
                debug!(program = ?self.name, error = %err, "start failed");
                self.state = CommandState::FailedToStart;
                self.pipes.close_all();
                Err(err)
            }
        }
    }

    fn launch(&mut self) -> Result<(), ExecError> {
        let path = match &self.resolution {
            Ok(Resolution::Absolute(path)) => path.clone(),
            Ok(Resolution::ImplicitRelative(path)) if self.allow_implicit_relative => path.clone(),
            Ok(Resolution::ImplicitRelative(path)) => {
                return Err(StartupError::ImplicitRelative {
                    name: self.name.clone(),
                    path: path.clone(),
                }
                .into());
            }
            Err(source) => {
                return Err(StartupError::Lookup {
                    name: self.name.clone(),
                    source: source.clone(),
                }
                .into());
            }
        };

        if self.cancel_hook.is_some() && self.signal.is_none() {
            return Err(ValidationError::CancelWithoutSignal.into());
        }
        if self.signal.as_ref().is_some_and(CancelSignal::is_cancelled) {
            return Err(StartupError::CancelledBeforeStart {
                name: self.name.clone(),
            }
            .into());
        }
        if !self.extra_files.is_empty() && !self.backend.supports_extra_files() {
            return Err(StartupError::ExtraFilesUnsupported {
                name: self.name.clone(),
            }
            .into());
        }

        let env = self.environ().into_result()?;

        let mut cmd = TokioCommand::new(&path);
        #[cfg(unix)]
        cmd.arg0(&self.name);
        cmd.args(&self.args);
        if let Some(dir) = &self.dir {
            cmd.current_dir(dir);
        }
        cmd.env_clear();
        for kv in &env {
            match env::split_entry(kv) {
                Some((key, value)) => {
                    cmd.env(key, value);
                }
                None => warn!(entry = ?kv, "skipping environment entry without a key"),
            }
        }
        cmd.kill_on_drop(true);

        let plumbing = Plumbing::prepare(
            &mut cmd,
            std::mem::take(&mut self.stdin),
            std::mem::take(&mut self.stdout),
            std::mem::take(&mut self.stderr),
        );

        let extra_files = std::mem::take(&mut self.extra_files);
        let mut child = self
            .backend
            .spawn(&mut cmd, extra_files)
            .map_err(|source| StartupError::Spawn {
                name: self.name.clone(),
                source,
            })?;

        plumbing.connect(&mut child, &self.pipes, &mut self.copies);
        self.pid = child.id();
        debug!(
            program = %path.display(),
            args = self.args.len(),
            pid = ?self.pid,
            backend = self.backend.name(),
            "process started"
        );
        self.child = Some(child);
        Ok(())
    }

    /// Wait for the process to exit and for every copy task to finish.
    ///
    /// Succeeds only for exit code 0 with no unsuppressed copy error. The
    /// [`ExitResult`] is also available from [`Command::exit_result`]
    /// whenever the process was reaped.
    pub async fn wait(&mut self) -> Result<ExitResult, ExecError> {
        match self.state {
            CommandState::Started => {}
            CommandState::Built => return Err(ValidationError::NotStarted.into()),
            CommandState::Exited => return Err(ValidationError::AlreadyWaited.into()),
            state @ CommandState::FailedToStart => {
                return Err(ValidationError::Terminal { state }.into());
            }
        }
        let Some(mut child) = self.child.take() else {
            return Err(ValidationError::NotStarted.into());
        };

        let waited = cancel::wait_for_exit(
            &mut child,
            self.signal.as_ref(),
            self.cancel_hook.as_mut(),
            self.backend.as_ref(),
            self.wait_delay,
        )
        .await;
        self.state = CommandState::Exited;
        self.pipes.close_all();

        let mut copies = std::mem::take(&mut self.copies);
        let (status, outcome) = match waited {
            Ok(waited) => waited,
            Err(source) => {
                copies.abort();
                return Err(ExecError::Wait {
                    name: self.name.clone(),
                    source,
                });
            }
        };
        let report = copies.join(self.wait_delay).await;

        let cancelled = matches!(outcome, CancelOutcome::Requested);
        let mut result = ExitResult::from_status(status, cancelled);
        if let Some(capture) = &self.stderr_capture {
            result.stderr = Some(capture.contents());
        }
        debug!(pid = ?self.pid, status = %result, cancelled, "process exited");
        self.exit_result = Some(result.clone());

        match outcome {
            CancelOutcome::Failed(source) => {
                return Err(ExecError::CancelFailed {
                    name: self.name.clone(),
                    source,
                });
            }
            CancelOutcome::Requested => {
                return Err(ExecError::Cancelled {
                    name: self.name.clone(),
                    result,
                });
            }
            CancelOutcome::NotRequested => {}
        }

        if !result.success() {
            return Err(ExitError {
                name: self.name.clone(),
                result,
            }
            .into());
        }

        for failure in report.failures {
            // A child that exits successfully without reading all of its
            // input is not a failure.
            if failure.stream == StreamName::Stdin
                && failure.side == Side::Write
                && self.backend.is_broken_pipe(&failure.error)
            {
                warn!(pid = ?self.pid, error = %failure.error, "ignoring stdin copy error after successful exit");
                continue;
            }
            return Err(ExecError::Copy {
                name: self.name.clone(),
                stream: failure.stream,
                source: failure.error,
            });
        }

        if report.timed_out {
            return Err(ExecError::WaitDelayExceeded {
                name: self.name.clone(),
            });
        }
        if let Some(what) = self.misuse.take() {
            return Err(ValidationError::ConfiguredAfterStart { what }.into());
        }
        Ok(result)
    }

    /// Start and wait.
    pub async fn run(&mut self) -> Result<ExitResult, ExecError> {
        self.start()?;
        self.wait().await
    }

    /// Run and return stdout.
    ///
    /// Unless stderr was set, a bounded excerpt of it is attached to the
    /// error of an unsuccessful exit.
    pub async fn output(&mut self) -> Result<Vec<u8>, ExecError> {
        self.ensure_startable()?;
        if !self.stdout.is_unset() {
            return Err(ValidationError::StreamAlreadySet {
                stream: StreamName::Stdout,
            }
            .into());
        }
        let stdout = CaptureBuffer::unbounded();
        self.stdout = Binding::Given(Output::writer(stdout.clone()));
        if self.stderr.is_unset() {
            let capture = CaptureBuffer::bounded(self.stderr_capture_bytes);
            self.stderr = Binding::Given(Output::writer(capture.clone()));
            self.stderr_capture = Some(capture);
        }
        self.run().await?;
        Ok(stdout.take())
    }

    /// Run and return stdout and stderr interleaved in one buffer.
    pub async fn combined_output(&mut self) -> Result<Vec<u8>, ExecError> {
        self.ensure_startable()?;
        for (stream, unset) in [
            (StreamName::Stdout, self.stdout.is_unset()),
            (StreamName::Stderr, self.stderr.is_unset()),
        ] {
            if !unset {
                return Err(ValidationError::StreamAlreadySet { stream }.into());
            }
        }
        let combined = CaptureBuffer::unbounded();
        self.stdout = Binding::Given(Output::writer(combined.clone()));
        self.stderr = Binding::Given(Output::writer(combined.clone()));
        self.run().await?;
        Ok(combined.take())
    }

    /// OS process id, once started.
    #[must_use]
    pub const fn id(&self) -> Option<u32> {
        self.pid
    }

    /// How the process ended, once reaped.
    #[must_use]
    pub const fn exit_result(&self) -> Option<&ExitResult> {
        self.exit_result.as_ref()
    }

    #[must_use]
    pub const fn state(&self) -> CommandState {
        self.state
    }

    /// Name the command was created with.
    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.name
    }

    /// Resolved executable path, if resolution succeeded.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.resolution.as_ref().ok().map(Resolution::path)
    }

    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    #[must_use]
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }
}

/// Human-readable rendering for diagnostics. Not suitable as shell input.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.path() {
            Some(path) => write!(f, "{}", path.display())?,
            None => write!(f, "{}", self.name.to_string_lossy())?,
        }
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("resolution", &self.resolution)
            .field("args", &self.args)
            .field("dir", &self.dir)
            .field("stdin", &self.stdin)
            .field("stdout", &self.stdout)
            .field("stderr", &self.stderr)
            .field("extra_files", &self.extra_files.len())
            .field("cancellable", &self.signal.is_some())
            .field("wait_delay", &self.wait_delay)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_new_resolves_bare_name() {
        let cmd = Command::new("sh");
        assert!(cmd.path().is_some_and(Path::is_absolute));
        assert_eq!(cmd.state(), CommandState::Built);
    }

    #[test]
    fn test_explicit_path_is_not_searched() {
        let cmd = Command::new("./does-not-matter");
        assert_eq!(cmd.path(), Some(Path::new("./does-not-matter")));
    }

    #[test]
    fn test_display_renders_path_and_args() {
        let mut cmd = Command::new("/bin/echo");
        cmd.arg("a b").arg("c");
        assert_eq!(cmd.to_string(), "/bin/echo a b c");
    }

    #[test]
    fn test_missing_program_fails_to_start() {
        let mut cmd = Command::new("procrun-definitely-missing-binary");
        let err = cmd.start().unwrap_err();
        match &err {
            ExecError::Startup(startup) => assert!(startup.is_not_found()),
            other => panic!("expected startup error, got {other:?}"),
        }
        assert_eq!(cmd.state(), CommandState::FailedToStart);
        assert!(matches!(
            cmd.start(),
            Err(ExecError::Validation(ValidationError::Terminal { .. }))
        ));
    }

    #[test]
    fn test_environ_explicit_list_is_deduped() {
        let mut cmd = Command::new("sh");
        cmd.env_entries(["A=1", "B=2", "A=3"]).current_dir("/tmp");
        let env = cmd.environ().into_result().unwrap();
        // An explicit list gets no PWD.
        assert_eq!(env, [OsString::from("B=2"), OsString::from("A=3")]);
    }

    #[test]
    fn test_environ_inherited_gets_pwd_and_overrides() {
        let mut cmd = Command::new("sh");
        cmd.current_dir("/tmp").env("PROCRUN_TEST_VAR", "x");
        let env = cmd.environ().into_result().unwrap();
        assert!(env.contains(&OsString::from("PWD=/tmp")));
        assert!(env.contains(&OsString::from("PROCRUN_TEST_VAR=x")));
    }

    #[test]
    fn test_environ_user_pwd_wins() {
        let mut cmd = Command::new("sh");
        cmd.current_dir("/tmp").env("PWD", "/elsewhere");
        let env = cmd.environ().into_result().unwrap();
        assert!(env.contains(&OsString::from("PWD=/elsewhere")));
        assert!(!env.contains(&OsString::from("PWD=/tmp")));
    }

    #[test]
    fn test_environ_follows_env_policy() {
        let mut cmd = Command::new("sh");
        cmd.env_entries(["k=1", "K=2"]);
        assert_eq!(cmd.environ().entries.len(), 2);

        cmd.env_policy(EnvPolicy {
            case_insensitive: true,
            nul_allowed: false,
        });
        assert_eq!(cmd.environ().entries, [OsString::from("K=2")]);
    }

    #[test]
    fn test_env_clear_drops_everything() {
        let mut cmd = Command::new("sh");
        cmd.env("X", "1").env_clear();
        assert!(cmd.environ().entries.is_empty());
    }

    #[test]
    fn test_nul_in_env_fails_start() {
        let mut cmd = Command::new("sh");
        cmd.env_entries(["OK=1", "BAD=a\0b"]);
        let err = cmd.start().unwrap_err();
        assert!(matches!(
            err,
            ExecError::Validation(ValidationError::Env(_))
        ));
    }

    #[test]
    fn test_pipe_when_stream_already_set() {
        let mut cmd = Command::new("sh");
        cmd.stdout(Output::Null);
        assert!(matches!(
            cmd.stdout_pipe(),
            Err(ValidationError::StreamAlreadySet {
                stream: StreamName::Stdout
            })
        ));
        let _stderr = cmd.stderr_pipe().unwrap();
        assert!(cmd.stderr_pipe().is_err());
    }

    #[test]
    fn test_cancel_hook_requires_signal() {
        let mut cmd = Command::new("sh");
        cmd.cancel_with(|child| child.start_kill());
        assert!(matches!(
            cmd.start(),
            Err(ExecError::Validation(ValidationError::CancelWithoutSignal))
        ));
    }

    #[test]
    fn test_cancelled_before_start() {
        let signal = CancelSignal::new();
        signal.cancel();
        let mut cmd = Command::with_cancel(signal, "sh");
        assert!(matches!(
            cmd.start(),
            Err(ExecError::Startup(StartupError::CancelledBeforeStart { .. }))
        ));
    }

    #[tokio::test]
    async fn test_wait_before_start() {
        let mut cmd = Command::new("sh");
        assert!(matches!(
            cmd.wait().await,
            Err(ExecError::Validation(ValidationError::NotStarted))
        ));
    }

    #[tokio::test]
    async fn test_configuration_after_start_is_reported() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 0"]);
        cmd.start().unwrap();
        cmd.arg("ignored");
        assert_eq!(cmd.get_args().len(), 2);
        assert!(matches!(
            cmd.wait().await,
            Err(ExecError::Validation(ValidationError::ConfiguredAfterStart { what: "args" }))
        ));
        assert!(cmd.exit_result().is_some_and(ExitResult::success));
    }
}
