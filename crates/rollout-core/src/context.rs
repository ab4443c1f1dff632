//! Bounded outbound calls.
//!
//! Every call the engine makes to a version-control or chat backend goes
//! through [`CallContext::call`], which races the backend future against a
//! per-call timeout and a cancellation signal. Cancellation is observed at
//! the next outbound call of whichever pipeline holds the context.

use std::future::Future;
use std::time::Duration;

use rollout_backends::{BackendError, BackendResult};
use tokio::sync::watch;

/// Why an outbound call did not produce a value.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CallError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("{op} timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    #[error("{op} cancelled")]
    Cancelled { op: &'static str },
}

impl CallError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, CallError::Backend(e) if e.is_not_found())
    }
}

/// Trips the cancellation signal of every [`CallContext`] cloned from the
/// one it was created with.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Caller-supplied bounds for outbound calls.
#[derive(Debug, Clone)]
pub struct CallContext {
    timeout: Duration,
    cancel: watch::Receiver<bool>,
}

impl CallContext {
    /// Create a context and the handle that cancels it.
    pub fn new(timeout: Duration) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        (Self { timeout, cancel: rx }, CancelHandle { tx })
    }

    /// A context that is bounded by `timeout` only.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout).0
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Run one backend call under this context.
    pub async fn call<T, F>(&self, op: &'static str, fut: F) -> Result<T, CallError>
    where
        F: Future<Output = BackendResult<T>>,
    {
        if self.is_cancelled() {
            return Err(CallError::Cancelled { op });
        }
        let mut cancel = self.cancel.clone();
        tokio::select! {
            biased;
            _ = wait_for_cancel(&mut cancel) => Err(CallError::Cancelled { op }),
            res = tokio::time::timeout(self.timeout, fut) => match res {
                Ok(inner) => inner.map_err(CallError::Backend),
                Err(_) => Err(CallError::Timeout {
                    op,
                    timeout_ms: self.timeout.as_millis() as u64,
                }),
            },
        }
    }
}

async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // handle dropped without cancelling: never fires
            std::future::pending::<()>().await;
        }
    }
}
