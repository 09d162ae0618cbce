//! In-memory remote store for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::provider::{load_payload, ProgressReporter, RemoteStore};
use syncboard_common::{ContentSnapshot, Descriptor, Error, Result};

/// Remote operation, used to target injected faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    FetchSnapshot,
    FetchPayload,
    Upload,
}

/// Failure injected into the next call of an operation.
#[derive(Debug, Clone)]
pub enum Fault {
    Timeout,
    Transport(String),
}

impl Fault {
    fn into_error(self) -> Error {
        match self {
            Fault::Timeout => Error::Timeout,
            Fault::Transport(message) => Error::Transport(message),
        }
    }
}

/// Stored remote content.
#[derive(Debug, Clone)]
struct Stored {
    descriptor: Descriptor,
    data: Bytes,
}

/// In-memory remote store.
///
/// Useful for testing and development. Supports artificial latency,
/// queued faults per operation, and counts every call it serves.
pub struct MemoryRemote {
    stored: Mutex<Option<Stored>>,
    faults: Mutex<HashMap<Operation, VecDeque<Fault>>>,
    uploaded: Mutex<Vec<ContentSnapshot>>,
    latency: Mutex<Duration>,
    fetches: AtomicUsize,
    payload_fetches: AtomicUsize,
    uploads: AtomicUsize,
}

impl MemoryRemote {
    /// Create an empty memory remote.
    pub fn new() -> Self {
        Self {
            stored: Mutex::new(None),
            faults: Mutex::new(HashMap::new()),
            uploaded: Mutex::new(Vec::new()),
            latency: Mutex::new(Duration::ZERO),
            fetches: AtomicUsize::new(0),
            payload_fetches: AtomicUsize::new(0),
            uploads: AtomicUsize::new(0),
        }
    }

    /// Create a memory remote already holding `snapshot`.
    pub async fn with_content(snapshot: &ContentSnapshot) -> Result<Self> {
        let remote = Self::new();
        remote.set_content(snapshot).await?;
        Ok(remote)
    }

    /// Replace the remote content directly, as another device would.
    ///
    /// Does not count as an upload.
    pub async fn set_content(&self, snapshot: &ContentSnapshot) -> Result<()> {
        let data = load_payload(snapshot).await?;
        *self.stored.lock().await = Some(Stored {
            descriptor: snapshot.descriptor().clone(),
            data,
        });
        Ok(())
    }

    /// Delay every call by `latency`.
    pub async fn set_latency(&self, latency: Duration) {
        *self.latency.lock().await = latency;
    }

    /// Fail the next `count` calls of `operation` with `fault`.
    pub async fn fail_next(&self, operation: Operation, count: usize, fault: Fault) {
        let mut faults = self.faults.lock().await;
        let queue = faults.entry(operation).or_default();
        for _ in 0..count {
            queue.push_back(fault.clone());
        }
    }

    /// Current remote content, if any.
    pub async fn content(&self) -> Option<ContentSnapshot> {
        self.stored
            .lock()
            .await
            .as_ref()
            .map(|stored| ContentSnapshot::remote(stored.descriptor.clone()).with_payload(stored.data.clone()))
    }

    /// Snapshots accepted by successful uploads, oldest first.
    pub async fn uploaded(&self) -> Vec<ContentSnapshot> {
        self.uploaded.lock().await.clone()
    }

    /// Number of snapshot fetches served or failed.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of payload downloads served or failed.
    pub fn payload_fetch_count(&self) -> usize {
        self.payload_fetches.load(Ordering::SeqCst)
    }

    /// Number of upload calls served or failed.
    pub fn upload_count(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Total number of remote calls.
    pub fn call_count(&self) -> usize {
        self.fetch_count() + self.payload_fetch_count() + self.upload_count()
    }

    /// Simulate the round trip: wait out the latency, then pop a fault.
    async fn round_trip(&self, operation: Operation, cancel: &CancellationToken) -> Result<()> {
        let latency = *self.latency.lock().await;
        if !latency.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(latency) => {}
            }
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let fault = self
            .faults
            .lock()
            .await
            .get_mut(&operation)
            .and_then(|queue| queue.pop_front());
        match fault {
            Some(fault) => Err(fault.into_error()),
            None => Ok(()),
        }
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<ContentSnapshot> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.round_trip(Operation::FetchSnapshot, cancel).await?;

        let stored = self.stored.lock().await;
        Ok(match stored.as_ref() {
            Some(stored) => ContentSnapshot::remote(stored.descriptor.clone()),
            None => ContentSnapshot::unknown(),
        })
    }

    async fn fetch_payload(
        &self,
        snapshot: &ContentSnapshot,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<Bytes> {
        self.payload_fetches.fetch_add(1, Ordering::SeqCst);
        self.round_trip(Operation::FetchPayload, cancel).await?;

        let stored = self.stored.lock().await;
        match stored.as_ref() {
            Some(stored) if stored.descriptor == *snapshot.descriptor() => {
                let total = stored.data.len() as u64;
                progress.report(total, Some(total));
                progress.finish();
                Ok(stored.data.clone())
            }
            _ => Err(Error::NotFound(format!("Remote no longer holds {}", snapshot))),
        }
    }

    async fn upload(&self, snapshot: &ContentSnapshot, cancel: &CancellationToken) -> Result<()> {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let data = load_payload(snapshot).await?;
        self.round_trip(Operation::Upload, cancel).await?;

        *self.stored.lock().await = Some(Stored {
            descriptor: snapshot.descriptor().clone(),
            data: data.clone(),
        });
        self.uploaded.lock().await.push(snapshot.with_payload(data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::NoProgress;

    #[tokio::test]
    async fn test_empty_remote_is_unknown() {
        let remote = MemoryRemote::new();
        let snapshot = remote.fetch_snapshot(&CancellationToken::new()).await.unwrap();

        assert_eq!(snapshot.kind(), syncboard_common::ContentKind::Unknown);
        assert_eq!(remote.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_upload_then_fetch() {
        let remote = MemoryRemote::new();
        let token = CancellationToken::new();
        let local = ContentSnapshot::text("hello");

        remote.upload(&local, &token).await.unwrap();
        let fetched = remote.fetch_snapshot(&token).await.unwrap();

        assert!(fetched.same(&local));
        assert_eq!(remote.upload_count(), 1);
        assert_eq!(remote.uploaded().await.len(), 1);
    }

    #[tokio::test]
    async fn test_image_payload_roundtrip() {
        let image = ContentSnapshot::image(vec![9u8; 32]);
        let remote = MemoryRemote::with_content(&image).await.unwrap();
        let token = CancellationToken::new();

        let fetched = remote.fetch_snapshot(&token).await.unwrap();
        assert!(!fetched.is_materialized());

        let data = remote.fetch_payload(&fetched, &token, &NoProgress).await.unwrap();
        assert_eq!(data.len(), 32);
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let remote = MemoryRemote::new();
        let token = CancellationToken::new();
        remote.fail_next(Operation::Upload, 1, Fault::Timeout).await;
        remote
            .fail_next(Operation::Upload, 1, Fault::Transport("503".to_string()))
            .await;

        let local = ContentSnapshot::text("x");
        assert!(matches!(remote.upload(&local, &token).await, Err(Error::Timeout)));
        assert!(matches!(
            remote.upload(&local, &token).await,
            Err(Error::Transport(_))
        ));
        assert!(remote.upload(&local, &token).await.is_ok());
        assert_eq!(remote.upload_count(), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_latency() {
        let remote = MemoryRemote::new();
        remote.set_latency(Duration::from_secs(30)).await;
        let token = CancellationToken::new();
        token.cancel();

        let result = remote.fetch_snapshot(&token).await;
        assert!(matches!(result, Err(Error::Cancelled)));
    }
}
