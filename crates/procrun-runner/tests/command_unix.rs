//! End-to-end tests of the command lifecycle against real Unix utilities.

#![cfg(unix)]

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use procrun_runner::{
    CancelSignal, CaptureBuffer, Command, ErrorCategory, ExecError, Input, Output,
    ValidationError,
};
use tempfile::{NamedTempFile, TempDir};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const HANG_GUARD: Duration = Duration::from_secs(20);

fn sh(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[tokio::test]
async fn test_output_captures_stdout() {
    let out = Command::new("echo").arg("hello").output().await.unwrap();
    assert_eq!(out, b"hello\n");
}

#[tokio::test]
async fn test_nonzero_exit_reports_code() {
    let mut cmd = sh("exit 3");
    let err = cmd.run().await.unwrap_err();
    assert_eq!(err.kind(), ErrorCategory::RuntimeExit);
    let result = err.exit_result().unwrap();
    assert_eq!(result.code, Some(3));
    assert!(!result.cancelled);
    assert_eq!(cmd.exit_result().and_then(|r| r.code), Some(3));
}

#[tokio::test]
async fn test_signal_exit_is_not_cancellation() {
    let err = sh("kill -9 $$").run().await.unwrap_err();
    let result = err.exit_result().unwrap();
    assert_eq!(result.code, None);
    assert_eq!(result.signal, Some(9));
    assert!(!result.cancelled);
    assert_eq!(err.kind(), ErrorCategory::RuntimeExit);
}

#[tokio::test]
async fn test_start_twice_is_rejected() {
    let mut cmd = sh("exit 0");
    cmd.start().unwrap();
    assert!(matches!(
        cmd.start(),
        Err(ExecError::Validation(ValidationError::AlreadyStarted))
    ));
    cmd.wait().await.unwrap();
    assert!(matches!(
        cmd.wait().await,
        Err(ExecError::Validation(ValidationError::AlreadyWaited))
    ));
    assert!(cmd.start().is_err());
}

#[tokio::test]
async fn test_pipe_after_start_is_rejected() {
    let mut cmd = sh("exit 0");
    cmd.start().unwrap();
    assert!(matches!(
        cmd.stdout_pipe(),
        Err(ValidationError::PipeAfterStart { .. })
    ));
    assert!(cmd.stdin_pipe().is_err());
    cmd.wait().await.unwrap();
}

#[tokio::test]
async fn test_output_error_carries_stderr_tail() {
    let err = sh("echo boom >&2; exit 1").output().await.unwrap_err();
    let result = err.exit_result().unwrap();
    assert_eq!(result.stderr.as_deref(), Some(&b"boom\n"[..]));
    assert!(err.to_string().contains("boom"));
}

#[tokio::test]
async fn test_output_stderr_tail_is_bounded() {
    let mut cmd = sh("printf 0123456789abcdef >&2; exit 1");
    cmd.stderr_capture_bytes(4);
    let err = cmd.output().await.unwrap_err();
    assert_eq!(
        err.exit_result().unwrap().stderr_string(),
        "0123\n... omitting 8 bytes ...\ncdef"
    );
}

#[tokio::test]
async fn test_output_rejects_preset_stdout() {
    let mut cmd = Command::new("true");
    cmd.stdout(Output::Null);
    assert!(matches!(
        cmd.output().await,
        Err(ExecError::Validation(ValidationError::StreamAlreadySet { .. }))
    ));
}

#[tokio::test]
async fn test_combined_output_has_both_streams() {
    let out = sh("echo out; echo err >&2").combined_output().await.unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("out\n"));
    assert!(text.contains("err\n"));
}

#[tokio::test]
async fn test_stdin_bytes_are_copied() {
    let mut cmd = Command::new("cat");
    cmd.stdin(Input::bytes("fed through stdin"));
    assert_eq!(cmd.output().await.unwrap(), b"fed through stdin");
}

#[tokio::test]
async fn test_partially_consumed_stdin_still_succeeds() {
    let mut cmd = sh("head -c 1 >/dev/null");
    cmd.stdin(Input::bytes(vec![b'x'; 10 << 20]));
    let result = tokio::time::timeout(HANG_GUARD, cmd.run())
        .await
        .expect("run should not hang")
        .unwrap();
    assert!(result.success());
}

#[tokio::test]
async fn test_partially_consumed_stdin_with_failure_reports_exit() {
    let mut cmd = sh("head -c 1 >/dev/null; exit 2");
    cmd.stdin(Input::bytes(vec![b'x'; 10 << 20]));
    let err = tokio::time::timeout(HANG_GUARD, cmd.run())
        .await
        .expect("run should not hang")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorCategory::RuntimeExit);
    assert_eq!(err.exit_result().unwrap().code, Some(2));
}

#[tokio::test]
async fn test_cancel_before_exit_kills_process() {
    let signal = CancelSignal::new();
    let mut cmd = Command::with_cancel(signal.clone(), "sleep");
    cmd.arg("30");
    cmd.start().unwrap();
    signal.cancel_after(Duration::from_millis(50));

    let err = tokio::time::timeout(HANG_GUARD, cmd.wait())
        .await
        .expect("wait should not hang")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorCategory::Cancellation);
    let result = err.exit_result().unwrap();
    assert!(result.cancelled);
    assert_eq!(result.signal, Some(9));
}

#[tokio::test]
async fn test_cancel_after_exit_is_a_no_op() {
    let signal = CancelSignal::new();
    let mut cmd = Command::with_cancel(signal.clone(), "true");
    cmd.start().unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    signal.cancel();
    let result = cmd.wait().await.unwrap();
    assert!(result.success());
    assert!(!result.cancelled);

    // Firing again after wait has nothing to act on.
    signal.cancel();
    assert!(cmd.exit_result().is_some_and(|r| !r.cancelled));
}

#[tokio::test]
async fn test_custom_cancel_hook_runs_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let signal = CancelSignal::new();
    let mut cmd = Command::with_cancel(signal.clone(), "sleep");
    cmd.arg("30").cancel_with({
        let calls = Arc::clone(&calls);
        move |child| {
            calls.fetch_add(1, Ordering::SeqCst);
            child.start_kill()
        }
    });
    cmd.start().unwrap();
    signal.cancel();

    let err = tokio::time::timeout(HANG_GUARD, cmd.wait())
        .await
        .expect("wait should not hang")
        .unwrap_err();
    assert!(matches!(err, ExecError::Cancelled { .. }));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_ignored_cancel_hook_escalates_after_wait_delay() {
    let signal = CancelSignal::new();
    let mut cmd = Command::with_cancel(signal.clone(), "sleep");
    cmd.arg("30")
        .cancel_with(|_child| Ok(()))
        .wait_delay(Duration::from_millis(100));
    cmd.start().unwrap();
    signal.cancel();

    let err = tokio::time::timeout(HANG_GUARD, cmd.wait())
        .await
        .expect("wait should not hang")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorCategory::Cancellation);
    assert_eq!(err.exit_result().unwrap().signal, Some(9));
}

#[tokio::test]
async fn test_wait_delay_bounds_copy_after_exit() {
    // The background sleep keeps the stdout pipe open after the shell exits.
    let mut cmd = sh("sleep 5 & echo started");
    cmd.wait_delay(Duration::from_millis(200));
    let err = tokio::time::timeout(HANG_GUARD, cmd.output())
        .await
        .expect("output should not hang")
        .unwrap_err();
    assert!(matches!(err, ExecError::WaitDelayExceeded { .. }));
    assert!(cmd.exit_result().is_some_and(|r| r.success()));
}

#[tokio::test]
async fn test_stdout_pipe_reads_then_eof_after_wait() {
    let mut cmd = sh("echo piped");
    let mut stdout = cmd.stdout_pipe().unwrap();
    cmd.start().unwrap();

    let mut text = String::new();
    stdout.read_to_string(&mut text).await.unwrap();
    assert_eq!(text, "piped\n");
    cmd.wait().await.unwrap();

    let mut rest = Vec::new();
    assert_eq!(stdout.read_to_end(&mut rest).await.unwrap(), 0);
}

#[tokio::test]
async fn test_stdin_pipe_feeds_child() {
    let capture = CaptureBuffer::unbounded();
    let mut cmd = Command::new("cat");
    cmd.stdout(Output::writer(capture.clone()));
    let mut stdin = cmd.stdin_pipe().unwrap();
    cmd.start().unwrap();

    stdin.write_all(b"abc").await.unwrap();
    stdin.shutdown().await.unwrap();
    cmd.wait().await.unwrap();
    assert_eq!(capture.contents(), b"abc");

    let err = stdin.write_all(b"late").await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}

#[tokio::test]
async fn test_dropped_stdin_pipe_closes_child_stdin() {
    let mut cmd = Command::new("cat");
    let stdin = cmd.stdin_pipe().unwrap();
    drop(stdin);
    let out = tokio::time::timeout(HANG_GUARD, cmd.output())
        .await
        .expect("cat should see end-of-file")
        .unwrap();
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_extra_files_land_after_standard_streams() {
    let mut first = NamedTempFile::new().unwrap();
    first.write_all(b"first").unwrap();
    let mut second = NamedTempFile::new().unwrap();
    second.write_all(b"second").unwrap();

    // Opened in one order, passed in the other.
    let a = std::fs::File::open(first.path()).unwrap();
    let b = std::fs::File::open(second.path()).unwrap();

    let mut cmd = sh("cat <&3; cat <&4");
    cmd.extra_file(b).extra_file(a);
    assert_eq!(cmd.output().await.unwrap(), b"secondfirst");
}

#[tokio::test]
async fn test_extra_files_reversed_across_colliding_descriptors() {
    let sources: Vec<NamedTempFile> = ["A", "B", "C", "D"]
        .iter()
        .map(|body| {
            let mut file = NamedTempFile::new().unwrap();
            file.write_all(body.as_bytes()).unwrap();
            file
        })
        .collect();

    // Spacers keep the sources apart so several of them sit on another
    // file's target slot.
    let mut opened = Vec::new();
    let mut spacers = Vec::new();
    for source in &sources {
        opened.push(std::fs::File::open(source.path()).unwrap());
        spacers.push(std::fs::File::open(source.path()).unwrap());
    }

    let mut cmd = sh("cat <&3; cat <&4; cat <&5; cat <&6");
    for file in opened.into_iter().rev() {
        cmd.extra_file(file);
    }
    assert_eq!(cmd.output().await.unwrap(), b"DCBA");
    drop(spacers);
}

#[tokio::test]
async fn test_explicit_env_reaches_child() {
    let mut cmd = sh("echo $PROCRUN_GREETING");
    cmd.env_clear().env("PROCRUN_GREETING", "hi");
    assert_eq!(cmd.output().await.unwrap(), b"hi\n");
}

#[tokio::test]
async fn test_duplicate_env_last_wins_in_child() {
    let mut cmd = sh("echo $V");
    cmd.env_entries(["V=first", "V=second"]);
    assert_eq!(cmd.output().await.unwrap(), b"second\n");
}

#[tokio::test]
async fn test_working_directory_and_pwd() {
    let dir = TempDir::new().unwrap();
    let mut cmd = Command::new("pwd");
    cmd.current_dir(dir.path());
    let out = cmd.output().await.unwrap();
    let got = std::path::PathBuf::from(String::from_utf8(out).unwrap().trim_end());
    assert_eq!(
        got.canonicalize().unwrap(),
        dir.path().canonicalize().unwrap()
    );
}

#[tokio::test]
async fn test_missing_binary_is_startup_error() {
    let err = Command::new("procrun-no-such-binary")
        .run()
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorCategory::Startup);
    assert!(err.to_string().contains("procrun-no-such-binary"));
}
