//! Directory-backed remote store.

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use crate::profile::{RemoteProfile, PAYLOAD_DIRNAME, PROFILE_FILENAME};
use crate::provider::{load_payload, ProgressReporter, RemoteStore};
use syncboard_common::{ContentSnapshot, Error, Result};

/// Read size for payload downloads.
const CHUNK_SIZE: usize = 64 * 1024;

/// Upper bound on the buffer reserved from the profile's size before reading.
const MAX_PREALLOCATION: u64 = 16 * CHUNK_SIZE as u64;

/// Remote store kept in a directory, typically a mounted network share.
///
/// Layout:
/// - `SyncClipboard.json`: profile document
/// - `file/<name>`: payload of file-like content
pub struct DirectoryRemote {
    root: PathBuf,
}

impl DirectoryRemote {
    /// Create a directory remote rooted at `root`.
    ///
    /// # Postconditions
    /// - Root and payload directories exist
    ///
    /// # Errors
    /// - Permission denied
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(PAYLOAD_DIRNAME))?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn profile_path(&self) -> PathBuf {
        self.root.join(PROFILE_FILENAME)
    }

    fn payload_path(&self, name: &str) -> Result<PathBuf> {
        payload_path(&self.root, name)
    }
}

/// Path of payload `name` under a remote rooted at `root`.
///
/// # Errors
/// - `name` is empty or would leave the payload directory
pub fn payload_path(root: &Path, name: &str) -> Result<PathBuf> {
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." || name == "." {
        return Err(Error::InvalidInput(format!("Invalid payload name: {}", name)));
    }
    Ok(root.join(PAYLOAD_DIRNAME).join(name))
}

/// Write `data` to `target` through a temp file in `dir` and rename, so
/// readers never observe a partial document.
///
/// `dir` must be on the same filesystem as `target`.
pub async fn write_atomic(dir: &Path, target: &Path, data: &[u8]) -> Result<()> {
    let temp = TempFile::new(dir);
    fs::write(temp.path(), data).await?;
    fs::rename(temp.path(), target).await?;
    temp.persist();
    Ok(())
}

/// Temp file removed on drop unless persisted.
///
/// Uploads can be dropped mid-write when their session is cancelled.
struct TempFile {
    path: Option<PathBuf>,
}

impl TempFile {
    fn new(dir: &Path) -> Self {
        Self {
            path: Some(dir.join(format!(".{}.tmp", Uuid::new_v4()))),
        }
    }

    fn path(&self) -> &Path {
        self.path.as_deref().unwrap_or_else(|| Path::new(""))
    }

    /// The file was renamed into place; nothing to clean up.
    fn persist(mut self) {
        self.path = None;
    }
}

impl Drop for TempFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(err) = std::fs::remove_file(&path) {
                if err.kind() != std::io::ErrorKind::NotFound {
                    debug!("Failed to remove {}: {}", path.display(), err);
                }
            }
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(Error::Cancelled)
    } else {
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for DirectoryRemote {
    fn name(&self) -> &str {
        "directory"
    }

    async fn fetch_snapshot(&self, cancel: &CancellationToken) -> Result<ContentSnapshot> {
        check_cancelled(cancel)?;

        let json = match fs::read_to_string(self.profile_path()).await {
            Ok(json) => json,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("No remote profile at {}", self.root.display());
                return Ok(ContentSnapshot::unknown());
            }
            Err(err) => return Err(err.into()),
        };

        let profile = RemoteProfile::from_json(&json)?;
        Ok(ContentSnapshot::remote(profile.descriptor()))
    }

    async fn fetch_payload(
        &self,
        snapshot: &ContentSnapshot,
        cancel: &CancellationToken,
        progress: &dyn ProgressReporter,
    ) -> Result<Bytes> {
        let name = snapshot
            .file_name()
            .ok_or_else(|| Error::InvalidInput(format!("{} has no payload file", snapshot)))?;
        let path = self.payload_path(&name)?;

        let mut file = match fs::File::open(&path).await {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::NotFound(format!("Payload not found: {}", name)));
            }
            Err(err) => return Err(err.into()),
        };

        let total = snapshot.size();
        let reserve = total.unwrap_or(0).min(MAX_PREALLOCATION) as usize;
        let mut data = BytesMut::with_capacity(reserve);
        let mut chunk = vec![0u8; CHUNK_SIZE];
        loop {
            check_cancelled(cancel)?;
            let read = file.read(&mut chunk).await?;
            if read == 0 {
                break;
            }
            data.extend_from_slice(&chunk[..read]);
            progress.report(data.len() as u64, total);
        }

        if let Some(expected) = total {
            if data.len() as u64 != expected {
                return Err(Error::Transport(format!(
                    "Payload {} has {} bytes, expected {}",
                    name,
                    data.len(),
                    expected
                )));
            }
        }

        progress.finish();
        Ok(data.freeze())
    }

    async fn upload(&self, snapshot: &ContentSnapshot, cancel: &CancellationToken) -> Result<()> {
        check_cancelled(cancel)?;
        let profile = RemoteProfile::from_snapshot(snapshot)?;

        if snapshot.is_file_like() {
            let data = load_payload(snapshot).await?;
            check_cancelled(cancel)?;
            let target = self.payload_path(&profile.file)?;
            write_atomic(&self.root, &target, &data).await?;
        }

        check_cancelled(cancel)?;
        let json = profile.to_json()?;
        write_atomic(&self.root, &self.profile_path(), json.as_bytes()).await
    }
}
