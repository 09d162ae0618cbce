//! Mutual exclusion over the remote store.
//!
//! Push and pull run concurrently but the remote profile is single-writer.
//! Every remote read or write happens while holding a [`GateGuard`]; the
//! guard releases the gate when dropped, on every exit path including
//! errors, cancellation and task abort.

use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use syncboard_common::{Error, Result};

/// Process-wide gate serializing remote access.
#[derive(Debug, Clone, Default)]
pub struct RemoteGate {
    inner: Arc<Mutex<()>>,
}

impl RemoteGate {
    /// Create a new, free gate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the gate.
    ///
    /// # Errors
    /// - [`Error::Cancelled`] if `cancel` fires before the gate is free
    pub async fn acquire(&self, holder: &'static str, cancel: &CancellationToken) -> Result<GateGuard> {
        let guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            guard = self.inner.clone().lock_owned() => guard,
        };
        trace!(holder, "Remote gate acquired");
        Ok(GateGuard {
            _guard: guard,
            holder,
        })
    }

    /// Whether some loop currently holds the gate.
    pub fn is_held(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

/// Scoped hold on the [`RemoteGate`].
#[must_use = "the gate is released as soon as the guard is dropped"]
pub struct GateGuard {
    _guard: OwnedMutexGuard<()>,
    holder: &'static str,
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        trace!(holder = self.holder, "Remote gate released");
    }
}
