//! Local clipboard endpoint.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Mutex};
use tracing::debug;

use syncboard_common::{ContentSnapshot, Error, Result};

/// Capacity of the change channel. Lagging listeners still learn that
/// something changed, so a small buffer is enough.
const CHANGE_CAPACITY: usize = 16;

/// A change of local clipboard content.
#[derive(Debug, Clone)]
pub struct LocalChange {
    pub at: Instant,
}

impl LocalChange {
    pub fn now() -> Self {
        Self { at: Instant::now() }
    }
}

/// The local clipboard as seen by the coordinator.
#[async_trait]
pub trait LocalEndpoint: Send + Sync {
    /// Describe the current local content.
    ///
    /// Content that cannot be synchronized is reported as
    /// [`ContentKind::Unknown`](syncboard_common::ContentKind::Unknown).
    async fn capture(&self) -> Result<ContentSnapshot>;

    /// Replace the local content.
    ///
    /// # Preconditions
    /// - File-like snapshots carry a materialized payload
    ///
    /// # Errors
    /// - [`Error::Clipboard`] or [`Error::Io`] when the write fails
    async fn apply(&self, snapshot: &ContentSnapshot) -> Result<()>;

    /// Stream of change notifications. The endpoint may emit a change for
    /// its own [`apply`](Self::apply).
    fn subscribe(&self) -> broadcast::Receiver<LocalChange>;
}

/// In-memory clipboard.
///
/// Notifies on every write, optionally after a lag, like platform
/// clipboards that report changes asynchronously.
pub struct MemoryClipboard {
    content: Mutex<ContentSnapshot>,
    changes: broadcast::Sender<LocalChange>,
    notify_lag: Mutex<Duration>,
    failing_applies: AtomicUsize,
    applies: AtomicUsize,
    captures: AtomicUsize,
}

impl MemoryClipboard {
    /// Create an empty clipboard.
    pub fn new() -> Self {
        Self::with_content(ContentSnapshot::unknown())
    }

    /// Create a clipboard holding `snapshot`, without notifying.
    pub fn with_content(snapshot: ContentSnapshot) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            content: Mutex::new(snapshot),
            changes,
            notify_lag: Mutex::new(Duration::ZERO),
            failing_applies: AtomicUsize::new(0),
            applies: AtomicUsize::new(0),
            captures: AtomicUsize::new(0),
        }
    }

    /// Change the content as the user would, and notify.
    pub async fn set(&self, snapshot: ContentSnapshot) {
        *self.content.lock().await = snapshot;
        self.emit(Duration::ZERO);
    }

    /// Delay change notifications caused by [`apply`](LocalEndpoint::apply).
    pub async fn set_notify_lag(&self, lag: Duration) {
        *self.notify_lag.lock().await = lag;
    }

    /// Fail the next `count` applies.
    pub fn fail_next_applies(&self, count: usize) {
        self.failing_applies.store(count, Ordering::SeqCst);
    }

    /// Current content.
    pub async fn content(&self) -> ContentSnapshot {
        self.content.lock().await.clone()
    }

    /// Number of successful applies.
    pub fn apply_count(&self) -> usize {
        self.applies.load(Ordering::SeqCst)
    }

    pub fn capture_count(&self) -> usize {
        self.captures.load(Ordering::SeqCst)
    }

    fn emit(&self, lag: Duration) {
        if lag.is_zero() {
            // No receivers is fine.
            let _ = self.changes.send(LocalChange::now());
            return;
        }
        let changes = self.changes.clone();
        tokio::spawn(async move {
            tokio::time::sleep(lag).await;
            let _ = changes.send(LocalChange::now());
        });
    }

    fn take_failure(&self) -> bool {
        self.failing_applies
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalEndpoint for MemoryClipboard {
    async fn capture(&self) -> Result<ContentSnapshot> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(self.content.lock().await.clone())
    }

    async fn apply(&self, snapshot: &ContentSnapshot) -> Result<()> {
        if self.take_failure() {
            return Err(Error::Clipboard("Clipboard is busy".to_string()));
        }
        if snapshot.is_file_like() && !snapshot.is_materialized() {
            return Err(Error::InvalidInput(format!(
                "Cannot apply {} without its payload",
                snapshot
            )));
        }

        *self.content.lock().await = snapshot.clone();
        self.applies.fetch_add(1, Ordering::SeqCst);
        debug!("Clipboard set to {}", snapshot);

        let lag = *self.notify_lag.lock().await;
        self.emit(lag);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<LocalChange> {
        self.changes.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_notifies() {
        let clipboard = MemoryClipboard::new();
        let mut changes = clipboard.subscribe();

        clipboard.set(ContentSnapshot::text("hello")).await;

        assert!(changes.recv().await.is_ok());
        let captured = clipboard.capture().await.unwrap();
        assert_eq!(captured.as_text(), Some("hello"));
        assert_eq!(clipboard.capture_count(), 1);
    }

    #[tokio::test]
    async fn test_apply_lagged_notification() {
        let clipboard = MemoryClipboard::new();
        clipboard.set_notify_lag(Duration::from_millis(30)).await;
        let mut changes = clipboard.subscribe();

        clipboard.apply(&ContentSnapshot::text("late")).await.unwrap();
        assert!(changes.try_recv().is_err());

        let change = tokio::time::timeout(Duration::from_secs(1), changes.recv()).await;
        assert!(matches!(change, Ok(Ok(_))));
        assert_eq!(clipboard.apply_count(), 1);
    }

    #[tokio::test]
    async fn test_apply_failure_leaves_content() {
        let clipboard = MemoryClipboard::with_content(ContentSnapshot::text("keep"));
        clipboard.fail_next_applies(1);

        let result = clipboard.apply(&ContentSnapshot::text("lost")).await;
        assert!(matches!(result, Err(Error::Clipboard(_))));
        assert_eq!(clipboard.content().await.as_text(), Some("keep"));

        clipboard.apply(&ContentSnapshot::text("next")).await.unwrap();
        assert_eq!(clipboard.content().await.as_text(), Some("next"));
    }

    #[tokio::test]
    async fn test_apply_requires_payload() {
        let clipboard = MemoryClipboard::new();
        let image = ContentSnapshot::image(vec![1u8, 2, 3]);
        let deferred = ContentSnapshot::remote(image.descriptor().clone());

        let result = clipboard.apply(&deferred).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert_eq!(clipboard.apply_count(), 0);
    }
}
