//! Stdio plumbing
//!
//! Each standard stream resolves independently to one of: inherit, discard,
//! a passthrough file handle, a bridged user stream (pipe plus copy task), or
//! a caller-held pipe handle. Passthrough handles are given to the child
//! directly and never involve a copy task.

use std::fmt;
use std::fs::File;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::debug;

use crate::copy::CopySupervisor;
use crate::ring_buffer::RingBuffer;
use crate::types::StreamName;

/// Boxed user source for a bridged stdin.
pub type BoxReader = Box<dyn AsyncRead + Send + Unpin>;
/// Boxed user sink for a bridged stdout/stderr.
pub type BoxWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where the child's stdin comes from.
pub enum Input {
    /// The parent's stdin.
    Inherit,
    /// The null device.
    Null,
    /// Passthrough handle, given to the child as-is.
    File(File),
    /// Bridged: copied into the child by a background task.
    Reader(BoxReader),
}

impl Input {
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Feed a fixed byte string.
    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self::reader(io::Cursor::new(data.into()))
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str("Inherit"),
            Self::Null => f.write_str("Null"),
            Self::File(file) => f.debug_tuple("File").field(file).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

/// Where the child's stdout or stderr goes.
pub enum Output {
    Inherit,
    Null,
    File(File),
    /// Bridged: copied out of the child by a background task.
    Writer(BoxWriter),
}

impl Output {
    pub fn writer(writer: impl AsyncWrite + Send + Unpin + 'static) -> Self {
        Self::Writer(Box::new(writer))
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inherit => f.write_str("Inherit"),
            Self::Null => f.write_str("Null"),
            Self::File(file) => f.debug_tuple("File").field(file).finish(),
            Self::Writer(_) => f.write_str("Writer(..)"),
        }
    }
}

/// Per-stream binding held by a command until start.
#[derive(Debug, Default)]
pub(crate) enum Binding<T> {
    /// Nothing chosen: the stream is discarded.
    #[default]
    Unset,
    Given(T),
    /// A caller-held pipe handle was requested.
    Pipe,
}

impl<T> Binding<T> {
    pub(crate) const fn is_unset(&self) -> bool {
        matches!(self, Self::Unset)
    }
}

enum Slot<T> {
    /// Not started yet.
    Pending,
    Open(T),
    /// Closed by the caller or by `wait`.
    Closed,
}

struct Shared<T> {
    slot: Slot<T>,
    waker: Option<Waker>,
}

/// Command-side end of a caller-held pipe handle.
pub(crate) struct PipeSlot<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> PipeSlot<T> {
    fn new() -> (Self, Arc<Mutex<Shared<T>>>) {
        let shared = Arc::new(Mutex::new(Shared {
            slot: Slot::Pending,
            waker: None,
        }));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            shared,
        )
    }

    /// Hand the child's pipe end to the caller's handle.
    ///
    /// A handle dropped before start leaves the slot closed, and the pipe
    /// end is dropped here instead.
    fn open(&self, io: Option<T>) {
        let mut shared = lock(&self.shared);
        let pending = matches!(shared.slot, Slot::Pending);
        shared.slot = match io {
            Some(io) if pending => Slot::Open(io),
            _ => Slot::Closed,
        };
        if let Some(waker) = shared.waker.take() {
            waker.wake();
        }
    }

    fn close(&self) {
        close_shared(&self.shared);
    }
}

fn lock<T>(shared: &Mutex<Shared<T>>) -> MutexGuard<'_, Shared<T>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn close_shared<T>(shared: &Mutex<Shared<T>>) {
    let mut shared = lock(shared);
    shared.slot = Slot::Closed;
    if let Some(waker) = shared.waker.take() {
        waker.wake();
    }
}

fn not_started() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "exec: process not started")
}

/// Caller-held read end of the child's stdout or stderr.
///
/// Reads before start fail; once the command has been waited on (or the
/// handle closed), reads report end-of-stream.
pub struct PipeReader<R> {
    shared: Arc<Mutex<Shared<R>>>,
}

pub type StdoutPipe = PipeReader<ChildStdout>;
pub type StderrPipe = PipeReader<ChildStderr>;

impl<R> PipeReader<R> {
    /// Close the handle. Further reads report end-of-stream.
    pub fn close(&self) {
        close_shared(&self.shared);
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for PipeReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let mut shared = lock(&self.shared);
        let poll = match &mut shared.slot {
            Slot::Pending => return Poll::Ready(Err(not_started())),
            Slot::Closed => return Poll::Ready(Ok(())),
            Slot::Open(reader) => Pin::new(reader).poll_read(cx, buf),
        };
        if poll.is_pending() {
            shared.waker = Some(cx.waker().clone());
        }
        poll
    }
}

impl<R> Drop for PipeReader<R> {
    fn drop(&mut self) {
        close_shared(&self.shared);
    }
}

impl<R> fmt::Debug for PipeReader<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeReader").finish_non_exhaustive()
    }
}

/// Caller-held write end of the child's stdin.
///
/// Shutting down or dropping the handle closes the child's stdin. Writes
/// after `wait` fail with a broken pipe error.
pub struct PipeWriter {
    shared: Arc<Mutex<Shared<ChildStdin>>>,
}

pub type StdinPipe = PipeWriter;

impl PipeWriter {
    pub fn close(&self) {
        close_shared(&self.shared);
    }
}

impl AsyncWrite for PipeWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut shared = lock(&self.shared);
        let poll = match &mut shared.slot {
            Slot::Pending => return Poll::Ready(Err(not_started())),
            Slot::Closed => {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "exec: stdin pipe closed",
                )));
            }
            Slot::Open(writer) => Pin::new(writer).poll_write(cx, buf),
        };
        if poll.is_pending() {
            shared.waker = Some(cx.waker().clone());
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut shared = lock(&self.shared);
        match &mut shared.slot {
            Slot::Open(writer) => Pin::new(writer).poll_flush(cx),
            Slot::Pending | Slot::Closed => Poll::Ready(Ok(())),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut shared = lock(&self.shared);
        if let Slot::Open(writer) = &mut shared.slot {
            if let Poll::Ready(Err(err)) = Pin::new(writer).poll_flush(cx) {
                return Poll::Ready(Err(err));
            }
        }
        // Dropping the pipe end is what delivers end-of-file to the child.
        shared.slot = Slot::Closed;
        Poll::Ready(Ok(()))
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        close_shared(&self.shared);
    }
}

impl fmt::Debug for PipeWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeWriter").finish_non_exhaustive()
    }
}

/// Command-side ends of every caller-held pipe.
#[derive(Default)]
pub(crate) struct PipeSet {
    stdin: Option<PipeSlot<ChildStdin>>,
    stdout: Option<PipeSlot<ChildStdout>>,
    stderr: Option<PipeSlot<ChildStderr>>,
}

impl PipeSet {
    pub(crate) fn stdin(&mut self) -> PipeWriter {
        let (slot, shared) = PipeSlot::new();
        self.stdin = Some(slot);
        PipeWriter { shared }
    }

    pub(crate) fn stdout(&mut self) -> StdoutPipe {
        let (slot, shared) = PipeSlot::new();
        self.stdout = Some(slot);
        PipeReader { shared }
    }

    pub(crate) fn stderr(&mut self) -> StderrPipe {
        let (slot, shared) = PipeSlot::new();
        self.stderr = Some(slot);
        PipeReader { shared }
    }

    /// Forget the pipe of `stream`, closing its handle.
    pub(crate) fn discard(&mut self, stream: StreamName) {
        match stream {
            StreamName::Stdin => {
                if let Some(slot) = self.stdin.take() {
                    slot.close();
                }
            }
            StreamName::Stdout => {
                if let Some(slot) = self.stdout.take() {
                    slot.close();
                }
            }
            StreamName::Stderr => {
                if let Some(slot) = self.stderr.take() {
                    slot.close();
                }
            }
        }
    }

    pub(crate) fn close_all(&mut self) {
        if let Some(slot) = &self.stdin {
            slot.close();
        }
        if let Some(slot) = &self.stdout {
            slot.close();
        }
        if let Some(slot) = &self.stderr {
            slot.close();
        }
    }
}

enum InputPlan {
    Direct,
    Copy(BoxReader),
    Pipe,
}

enum OutputPlan {
    Direct,
    Copy(BoxWriter),
    Pipe,
}

/// Stdio decisions made before spawn that still need the child to complete.
pub(crate) struct Plumbing {
    stdin: InputPlan,
    stdout: OutputPlan,
    stderr: OutputPlan,
}

impl Plumbing {
    /// Configure `cmd`'s standard streams from the bindings.
    pub(crate) fn prepare(
        cmd: &mut TokioCommand,
        stdin: Binding<Input>,
        stdout: Binding<Output>,
        stderr: Binding<Output>,
    ) -> Self {
        let (stdio, stdin) = plan_input(stdin);
        cmd.stdin(stdio);
        let (stdio, stdout) = plan_output(stdout);
        cmd.stdout(stdio);
        let (stdio, stderr) = plan_output(stderr);
        cmd.stderr(stdio);
        Self {
            stdin,
            stdout,
            stderr,
        }
    }

    /// Attach the child's pipe ends to copy tasks or caller handles.
    pub(crate) fn connect(self, child: &mut Child, pipes: &PipeSet, copies: &mut CopySupervisor) {
        match self.stdin {
            InputPlan::Direct => {}
            InputPlan::Copy(reader) => {
                if let Some(stdin) = child.stdin.take() {
                    copies.spawn_input(reader, stdin);
                }
            }
            InputPlan::Pipe => {
                if let Some(slot) = &pipes.stdin {
                    slot.open(child.stdin.take());
                }
            }
        }

        match self.stdout {
            OutputPlan::Direct => {}
            OutputPlan::Copy(writer) => {
                if let Some(stdout) = child.stdout.take() {
                    copies.spawn_output(StreamName::Stdout, stdout, writer);
                }
            }
            OutputPlan::Pipe => {
                if let Some(slot) = &pipes.stdout {
                    slot.open(child.stdout.take());
                }
            }
        }

        match self.stderr {
            OutputPlan::Direct => {}
            OutputPlan::Copy(writer) => {
                if let Some(stderr) = child.stderr.take() {
                    copies.spawn_output(StreamName::Stderr, stderr, writer);
                }
            }
            OutputPlan::Pipe => {
                if let Some(slot) = &pipes.stderr {
                    slot.open(child.stderr.take());
                }
            }
        }
        debug!(copies = copies.len(), "stdio connected");
    }
}

fn plan_input(binding: Binding<Input>) -> (Stdio, InputPlan) {
    match binding {
        Binding::Unset | Binding::Given(Input::Null) => (Stdio::null(), InputPlan::Direct),
        Binding::Given(Input::Inherit) => (Stdio::inherit(), InputPlan::Direct),
        Binding::Given(Input::File(file)) => (Stdio::from(file), InputPlan::Direct),
        Binding::Given(Input::Reader(reader)) => (Stdio::piped(), InputPlan::Copy(reader)),
        Binding::Pipe => (Stdio::piped(), InputPlan::Pipe),
    }
}

fn plan_output(binding: Binding<Output>) -> (Stdio, OutputPlan) {
    match binding {
        Binding::Unset | Binding::Given(Output::Null) => (Stdio::null(), OutputPlan::Direct),
        Binding::Given(Output::Inherit) => (Stdio::inherit(), OutputPlan::Direct),
        Binding::Given(Output::File(file)) => (Stdio::from(file), OutputPlan::Direct),
        Binding::Given(Output::Writer(writer)) => (Stdio::piped(), OutputPlan::Copy(writer)),
        Binding::Pipe => (Stdio::piped(), OutputPlan::Pipe),
    }
}

enum Capture {
    Unbounded(Vec<u8>),
    Bounded(RingBuffer),
}

/// Clonable in-memory sink. All clones append to the same buffer.
///
/// Used for `output` (stdout in full, stderr bounded) and for
/// `combined_output`, where both streams share one buffer and interleave at
/// copy-chunk granularity.
#[derive(Clone)]
pub struct CaptureBuffer {
    inner: Arc<Mutex<Capture>>,
}

impl CaptureBuffer {
    /// Keep everything written.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Capture::Unbounded(Vec::new()))),
        }
    }

    /// Keep the first and last `max_bytes` written.
    #[must_use]
    pub fn bounded(max_bytes: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Capture::Bounded(RingBuffer::new(max_bytes)))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Capture> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Captured bytes so far, in write order.
    #[must_use]
    pub fn contents(&self) -> Vec<u8> {
        match &*self.lock() {
            Capture::Unbounded(buf) => buf.clone(),
            Capture::Bounded(ring) => ring.to_bytes(),
        }
    }

    /// Take the captured bytes, leaving the buffer empty.
    #[must_use]
    pub fn take(&self) -> Vec<u8> {
        match &mut *self.lock() {
            Capture::Unbounded(buf) => std::mem::take(buf),
            Capture::Bounded(ring) => {
                let bytes = ring.to_bytes();
                *ring = RingBuffer::new(ring.capacity());
                bytes
            }
        }
    }
}

impl AsyncWrite for CaptureBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self.lock() {
            Capture::Unbounded(out) => out.extend_from_slice(buf),
            Capture::Bounded(ring) => ring.write(buf),
        }
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bounded = matches!(&*self.lock(), Capture::Bounded(_));
        f.debug_struct("CaptureBuffer")
            .field("bounded", &bounded)
            .finish_non_exhaustive()
    }
}
