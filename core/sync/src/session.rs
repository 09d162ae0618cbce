//! Sync sessions, cancellation and active-session accounting.

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use syncboard_common::{Error, Result};

/// One reconciliation run in one direction.
#[derive(Debug, Clone)]
pub struct SyncSession {
    /// Monotonically increasing per loop.
    pub id: u64,
    pub token: CancellationToken,
    pub started: Instant,
}

impl SyncSession {
    /// Time since the session started.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Issues sessions and cancels the one they supersede.
#[derive(Debug, Default)]
pub struct SessionSlot {
    current: Mutex<Option<CancellationToken>>,
    next_id: AtomicU64,
}

impl SessionSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the running session, if any, and start a fresh one.
    pub fn supersede(&self) -> SyncSession {
        let token = CancellationToken::new();
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        SyncSession {
            id: self.next_id.fetch_add(1, Ordering::SeqCst) + 1,
            token,
            started: Instant::now(),
        }
    }

    /// Cancel the running session without starting another.
    pub fn cancel(&self) {
        let current = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(current) = current {
            current.cancel();
        }
    }
}

/// Number of sessions between start and finish.
///
/// Sessions may overlap; only the zero crossings matter to observers.
/// A session first [`leave`](Self::leave)s, reports whatever the crossing
/// requires, then [`close`](Self::close)s; [`wait_idle`](Self::wait_idle)
/// returns once every session has closed.
#[derive(Debug, Default)]
pub struct SessionCounter {
    active: AtomicU32,
    open: AtomicU32,
    closed: Notify,
}

impl SessionCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns true if it is the only active one.
    pub fn enter(&self) -> bool {
        self.open.fetch_add(1, Ordering::SeqCst);
        self.active.fetch_add(1, Ordering::SeqCst) == 0
    }

    /// Unregister a session. Returns true if no session remains.
    pub fn leave(&self) -> bool {
        self.active.fetch_sub(1, Ordering::SeqCst) == 1
    }

    /// Mark a session's cleanup as done.
    pub fn close(&self) {
        if self.open.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.closed.notify_waiters();
        }
    }

    pub fn active(&self) -> u32 {
        self.active.load(Ordering::SeqCst)
    }

    /// Wait until every registered session has closed.
    pub async fn wait_idle(&self) {
        loop {
            let closed = self.closed.notified();
            tokio::pin!(closed);
            closed.as_mut().enable();
            if self.open.load(Ordering::SeqCst) == 0 {
                return;
            }
            closed.await;
        }
    }
}

/// Run `fut` unless `cancel` fires first.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result,
    }
}

/// Run a remote request bounded by `timeout` and `cancel`.
///
/// # Errors
/// - [`Error::Timeout`] when the deadline passes
/// - [`Error::Cancelled`] when the session is cancelled
pub async fn remote_call<T, F>(cancel: &CancellationToken, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    cancellable(cancel, async move {
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| Error::Timeout)?
    })
    .await
}

/// Sleep for `duration`, waking early with [`Error::Cancelled`].
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    cancellable(cancel, async move {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}
