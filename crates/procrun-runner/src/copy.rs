//! Background copy tasks bridging child pipes and user streams

use std::fmt;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::ChildStdin;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::stdio::{BoxReader, BoxWriter};
use crate::types::StreamName;

/// Size of the buffer used by each copy loop
const COPY_BUF_SIZE: usize = 8192;

/// Which side of a copy failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Side {
    Read,
    Write,
}

#[derive(Debug)]
pub(crate) struct CopyFailure {
    pub(crate) stream: StreamName,
    pub(crate) side: Side,
    pub(crate) error: io::Error,
}

impl fmt::Display for CopyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.side {
            Side::Read => "read",
            Side::Write => "write",
        };
        write!(f, "{} {side}: {}", self.stream, self.error)
    }
}

/// Outcome of joining all copy tasks.
#[derive(Debug, Default)]
pub(crate) struct JoinReport {
    /// Failures in the order the tasks were scheduled.
    pub(crate) failures: Vec<CopyFailure>,
    /// Tasks still running at the deadline were aborted.
    pub(crate) timed_out: bool,
}

type CopyResult = Result<u64, CopyFailure>;

/// Owns the copy tasks of one command.
///
/// Tasks still running when the supervisor is dropped are aborted, so no
/// copy outlives its command.
#[derive(Default)]
pub(crate) struct CopySupervisor {
    tasks: Vec<(StreamName, JoinHandle<CopyResult>)>,
}

impl CopySupervisor {
    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Copy `reader` into the child's stdin, closing it when done.
    pub(crate) fn spawn_input(&mut self, reader: BoxReader, stdin: ChildStdin) {
        debug!(stream = %StreamName::Stdin, "scheduling copy task");
        let handle = tokio::spawn(copy_stream(StreamName::Stdin, reader, stdin));
        self.tasks.push((StreamName::Stdin, handle));
    }

    /// Copy the child's `pipe` into `writer`.
    pub(crate) fn spawn_output<R>(&mut self, stream: StreamName, pipe: R, writer: BoxWriter)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        debug!(stream = %stream, "scheduling copy task");
        let handle = tokio::spawn(copy_stream(stream, pipe, writer));
        self.tasks.push((stream, handle));
    }

    /// Wait for every task. With a `deadline`, tasks still running when it
    /// passes are aborted and reported through `timed_out`.
    pub(crate) async fn join(mut self, deadline: Option<Duration>) -> JoinReport {
        let deadline = deadline.map(|d| Instant::now() + d);
        let mut report = JoinReport::default();

        for (stream, handle) in &mut self.tasks {
            let joined = match deadline {
                Some(at) => match timeout_at(at, &mut *handle).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        warn!(stream = %stream, "copy still running after wait delay; aborting");
                        handle.abort();
                        report.timed_out = true;
                        continue;
                    }
                },
                None => handle.await,
            };
            match joined {
                Ok(Ok(bytes)) => debug!(stream = %stream, bytes, "copy finished"),
                Ok(Err(failure)) => {
                    debug!(error = %failure, "copy failed");
                    report.failures.push(failure);
                }
                Err(join_err) => report.failures.push(CopyFailure {
                    stream: *stream,
                    side: Side::Write,
                    error: io::Error::other(join_err),
                }),
            }
        }
        self.tasks.clear();
        report
    }

    /// Abort every task without waiting.
    pub(crate) fn abort(&mut self) {
        for (_, handle) in self.tasks.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for CopySupervisor {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Copy until end-of-stream or the first error.
///
/// Both ends are owned and dropped on return: a failed output write drops
/// the child's pipe so the child sees a closed pipe instead of blocking,
/// and a finished stdin copy closes the child's stdin.
async fn copy_stream<R, W>(stream: StreamName, mut reader: R, mut writer: W) -> CopyResult
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let fail = |side, error| CopyFailure {
        stream,
        side,
        error,
    };
    let mut buf = vec![0u8; COPY_BUF_SIZE];
    let mut total = 0u64;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(fail(Side::Read, err)),
        };
        writer
            .write_all(&buf[..n])
            .await
            .map_err(|err| fail(Side::Write, err))?;
        total += n as u64;
    }
    writer.flush().await.map_err(|err| fail(Side::Write, err))?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdio::CaptureBuffer;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_copy_stream_moves_all_bytes() {
        let data = vec![7u8; COPY_BUF_SIZE * 3 + 5];
        let sink = CaptureBuffer::unbounded();
        let copied = copy_stream(StreamName::Stdout, io::Cursor::new(data.clone()), sink.clone())
            .await
            .unwrap();
        assert_eq!(copied, data.len() as u64);
        assert_eq!(sink.contents(), data);
    }

    #[tokio::test]
    async fn test_copy_stream_reports_write_side() {
        let failure = copy_stream(StreamName::Stderr, io::Cursor::new(b"x".to_vec()), FailingWriter)
            .await
            .unwrap_err();
        assert_eq!(failure.stream, StreamName::Stderr);
        assert_eq!(failure.side, Side::Write);
        assert_eq!(failure.error.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_join_aborts_stragglers_at_deadline() {
        let (_keep_open, pipe) = tokio::io::duplex(64);
        let mut copies = CopySupervisor::default();
        copies.spawn_output(StreamName::Stdout, pipe, Box::new(CaptureBuffer::unbounded()));
        assert_eq!(copies.len(), 1);

        let report = copies.join(Some(Duration::from_millis(20))).await;
        assert!(report.timed_out);
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_join_without_deadline_collects_failures() {
        let mut copies = CopySupervisor::default();
        copies.spawn_output(
            StreamName::Stdout,
            io::Cursor::new(b"data".to_vec()),
            Box::new(FailingWriter),
        );
        let report = copies.join(None).await;
        assert!(!report.timed_out);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].side, Side::Write);
    }
}
