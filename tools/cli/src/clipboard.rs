//! Clipboard backed by a plain text file.
//!
//! The file holds the clipboard text. Changes are detected by polling its
//! modification time. Files and images pulled from the remote are saved to
//! a download directory and reported as the clipboard content until the
//! text file changes again.

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, SystemTime};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use syncboard_common::{ContentSnapshot, Error, Payload, Result};
use syncboard_storage::load_payload;
use syncboard_sync::{LocalChange, LocalEndpoint};

#[derive(Default)]
struct Observed {
    /// Modification time of the text file last seen or written by us.
    modified: Option<SystemTime>,
    /// Non-text content applied since the text file last changed.
    applied: Option<ContentSnapshot>,
}

pub struct FileClipboard {
    path: PathBuf,
    download_dir: PathBuf,
    observed: Mutex<Observed>,
    changes: broadcast::Sender<LocalChange>,
}

impl FileClipboard {
    /// Use `path` as the clipboard; downloads go next to it.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let parent = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let download_dir = parent.join("downloads");
        std::fs::create_dir_all(&download_dir)
            .with_context(|| format!("Failed to create {}", download_dir.display()))?;

        let (changes, _) = broadcast::channel(16);
        Ok(Self {
            observed: Mutex::new(Observed {
                modified: modified_time(&path),
                applied: None,
            }),
            path,
            download_dir,
            changes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Poll the text file every `interval` until `shutdown` fires.
    pub fn watch(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                if this.poll_change() {
                    debug!("Clipboard file changed");
                    let _ = this.changes.send(LocalChange::now());
                }
            }
        })
    }

    /// Whether the text file changed since last seen.
    fn poll_change(&self) -> bool {
        let current = modified_time(&self.path);
        let mut observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        if observed.modified == current {
            return false;
        }
        observed.modified = current;
        observed.applied = None;
        true
    }

    fn remember(&self, applied: Option<ContentSnapshot>) {
        let mut observed = self.observed.lock().unwrap_or_else(PoisonError::into_inner);
        observed.modified = modified_time(&self.path);
        observed.applied = applied;
    }
}

#[async_trait]
impl LocalEndpoint for FileClipboard {
    async fn capture(&self) -> Result<ContentSnapshot> {
        let applied = self
            .observed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .applied
            .clone();
        if let Some(applied) = applied {
            return Ok(applied);
        }

        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) if !text.is_empty() => Ok(ContentSnapshot::text(text)),
            Ok(_) => Ok(ContentSnapshot::unknown()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ContentSnapshot::unknown()),
            Err(e) => Err(Error::Clipboard(format!(
                "Failed to read {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    async fn apply(&self, snapshot: &ContentSnapshot) -> Result<()> {
        if let Some(text) = snapshot.as_text() {
            tokio::fs::write(&self.path, text).await?;
            self.remember(None);
            return Ok(());
        }

        let name = snapshot
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("Cannot apply {}", snapshot)))?;
        if name.contains(['/', '\\']) || name == ".." {
            return Err(Error::InvalidInput(format!("Invalid file name: {}", name)));
        }

        let data = load_payload(snapshot).await?;
        let target = self.download_dir.join(&name);
        tokio::fs::write(&target, &data).await?;
        info!("Saved {} to {}", snapshot.describe(), target.display());

        let local = ContentSnapshot::new(snapshot.descriptor().clone(), Payload::LocalFile(target));
        self.remember(Some(local));
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<LocalChange> {
        self.changes.subscribe()
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    match std::fs::metadata(path).and_then(|meta| meta.modified()) {
        Ok(modified) => Some(modified),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            warn!("Failed to stat {}: {}", path.display(), e);
            None
        }
    }
}
