//! Cancellation of running commands
//!
//! A [`CancelSignal`] is bound to a command at construction. Between start
//! and process exit, the first of {process exit, signal fired} wins: if the
//! signal wins, exactly one termination request is issued and the exit is
//! attributed to cancellation; if the process wins, a later signal is a no-op.

use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::process::Child;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::platform::ProcessBackend;

/// A cloneable cancellation signal. All clones share state.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    /// Create a signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once the signal has fired.
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking the flag so a concurrent cancel
            // cannot slip between the check and the await.
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Fire the signal after `delay` on the current runtime.
    pub fn cancel_after(&self, delay: Duration) -> tokio::task::JoinHandle<()> {
        let signal = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            signal.cancel();
        })
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Custom termination request, used instead of the backend kill.
pub type CancelHook = Box<dyn FnMut(&mut Child) -> io::Result<()> + Send>;

/// What happened on the cancellation side while waiting for exit.
#[derive(Debug)]
pub(crate) enum CancelOutcome {
    /// The process exited on its own (or no signal was bound).
    NotRequested,
    /// A termination request was delivered; the exit is attributed to it.
    Requested,
    /// The termination request itself failed.
    Failed(io::Error),
}

/// Wait for `child` to exit, honoring `signal`.
///
/// `escalate_after` is the caller-chosen grace period after a custom hook;
/// if the process is still alive then, it is killed once via the backend.
pub(crate) async fn wait_for_exit(
    child: &mut Child,
    signal: Option<&CancelSignal>,
    hook: Option<&mut CancelHook>,
    backend: &dyn ProcessBackend,
    escalate_after: Option<Duration>,
) -> io::Result<(ExitStatus, CancelOutcome)> {
    let Some(signal) = signal else {
        return Ok((child.wait().await?, CancelOutcome::NotRequested));
    };

    tokio::select! {
        biased;
        status = child.wait() => return Ok((status?, CancelOutcome::NotRequested)),
        () = signal.cancelled() => {}
    }

    // An exited but unreaped process is a natural exit, not a cancellation.
    if let Some(status) = child.try_wait()? {
        debug!(pid = ?child.id(), "cancellation fired after process exit; ignoring");
        return Ok((status, CancelOutcome::NotRequested));
    }

    let custom = hook.is_some();
    let requested = match hook {
        Some(hook) => hook(child),
        None => backend.kill(child),
    };

    let outcome = match requested {
        Ok(()) => {
            debug!(pid = ?child.id(), custom, "termination requested after cancellation");
            CancelOutcome::Requested
        }
        Err(err) => match child.try_wait()? {
            Some(status) => return Ok((status, CancelOutcome::NotRequested)),
            None => {
                warn!(pid = ?child.id(), error = %err, "termination request failed");
                CancelOutcome::Failed(err)
            }
        },
    };

    let status = match (custom, escalate_after) {
        (true, Some(grace)) => match tokio::time::timeout(grace, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!(pid = ?child.id(), "process outlived its grace period; killing");
                // Best effort: the process may exit on its own meanwhile.
                let _ = backend.kill(child);
                child.wait().await?
            }
        },
        _ => child.wait().await?,
    };
    Ok((status, outcome))
}
