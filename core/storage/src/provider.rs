//! Remote store trait definition.

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use syncboard_common::{ContentKind, ContentSnapshot, Error, Payload, Result};

/// Receives progress of a payload transfer.
///
/// Implementations must not block; the transfer calls them inline.
pub trait ProgressReporter: Send + Sync {
    /// Bytes transferred so far, out of `total` when known.
    fn report(&self, transferred: u64, total: Option<u64>);

    /// The transfer completed.
    fn finish(&self) {}

    /// The transfer was abandoned.
    fn cancel(&self) {}
}

/// Progress reporter that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _transferred: u64, _total: Option<u64>) {}
}

/// Remote store holding the single shared clipboard profile.
///
/// All operations take the caller's cancellation token and should return
/// [`Error::Cancelled`] promptly once it fires. Transport failures surface
/// as [`Error::Transport`] or [`Error::Timeout`].
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Get the store name (e.g., "memory", "directory").
    fn name(&self) -> &str;

    /// Fetch the snapshot describing the current remote content.
    ///
    /// # Postconditions
    /// - The returned snapshot's payload is [`Payload::Deferred`]
    /// - An empty remote is reported as [`ContentKind::Unknown`]
    async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<ContentSnapshot>;

    /// Download the payload of a file-like remote snapshot.
    ///
    /// # Preconditions
    /// - `snapshot` was returned by [`fetch_snapshot`](Self::fetch_snapshot)
    ///
    /// # Errors
    /// - Payload not found
    /// - Network/I/O errors
    async fn fetch_payload(
        &self,
        snapshot: &ContentSnapshot,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<Bytes>;

    /// Replace the remote content with `snapshot`.
    ///
    /// # Preconditions
    /// - File-like snapshots carry an inline or local-file payload
    async fn upload(&self, snapshot: &ContentSnapshot, cancel: &CancellationToken) -> Result<()>;
}

/// Materialize the raw bytes of a local snapshot for upload.
///
/// # Errors
/// - The payload was never fetched ([`Payload::Deferred`] on a file-like kind)
/// - Reading a local file failed
pub async fn load_payload(snapshot: &ContentSnapshot) -> Result<Bytes> {
    if let Some(text) = snapshot.as_text() {
        return Ok(Bytes::copy_from_slice(text.as_bytes()));
    }
    if snapshot.kind() == ContentKind::Unknown {
        return Err(Error::InvalidInput("Unknown content has no payload".to_string()));
    }

    match snapshot.payload() {
        Payload::Inline(data) => Ok(data.clone()),
        Payload::LocalFile(path) => Ok(Bytes::from(tokio::fs::read(path).await?)),
        Payload::Deferred => Err(Error::InvalidInput(format!(
            "Payload of {} is not materialized",
            snapshot
        ))),
    }
}
