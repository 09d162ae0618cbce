//! Clipboard content snapshots.
//!
//! A snapshot pairs a cheap-to-compare [`Descriptor`] with a [`Payload`] that
//! is only materialized when a transfer actually happens. Equality between
//! snapshots is decided on descriptors alone.

use blake2::{Blake2b512, Digest};
use bytes::Bytes;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Longest text shown by [`ContentSnapshot::describe`] before truncation.
const DESCRIBE_TEXT_LIMIT: usize = 40;

/// Kind of clipboard content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
    Text,
    File,
    Image,
    /// Content the sync protocol cannot carry.
    Unknown,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentKind::Text => "Text",
            ContentKind::File => "File",
            ContentKind::Image => "Image",
            ContentKind::Unknown => "Unknown",
        };
        f.write_str(name)
    }
}

/// Identity of a file on the clipboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

impl FileDescriptor {
    /// Create a descriptor. The modification time is truncated to whole
    /// seconds so it survives stores with coarse timestamps.
    pub fn new(name: impl Into<String>, size: u64, modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            size,
            modified: modified.trunc_subsecs(0),
        }
    }
}

/// Identity of an image on the clipboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageDescriptor {
    /// Hex-encoded BLAKE2b digest of the encoded image.
    pub hash: String,
    pub size: u64,
}

impl ImageDescriptor {
    /// Hash encoded image bytes.
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest = Blake2b512::digest(data);
        let hash = digest.iter().map(|b| format!("{:02x}", b)).collect();
        Self {
            hash,
            size: data.len() as u64,
        }
    }

    /// File name used when the image is stored as a file.
    pub fn file_name(&self) -> String {
        let prefix: String = self.hash.chars().take(16).collect();
        format!("{}.png", prefix)
    }
}

/// Cheap surrogate for clipboard content, compared instead of payloads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Descriptor {
    Text(String),
    File(FileDescriptor),
    Image(ImageDescriptor),
    Unknown,
}

impl Descriptor {
    /// Kind of content this descriptor identifies.
    pub fn kind(&self) -> ContentKind {
        match self {
            Descriptor::Text(_) => ContentKind::Text,
            Descriptor::File(_) => ContentKind::File,
            Descriptor::Image(_) => ContentKind::Image,
            Descriptor::Unknown => ContentKind::Unknown,
        }
    }
}

/// Raw content behind a descriptor.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Not fetched yet; remote snapshots start here.
    Deferred,
    /// Bytes held in memory.
    Inline(Bytes),
    /// A local file read on demand.
    LocalFile(PathBuf),
}

/// Immutable description of clipboard content at a point in time.
#[derive(Debug, Clone)]
pub struct ContentSnapshot {
    descriptor: Descriptor,
    payload: Payload,
}

impl ContentSnapshot {
    /// Create a snapshot from its parts.
    pub fn new(descriptor: Descriptor, payload: Payload) -> Self {
        Self {
            descriptor,
            payload,
        }
    }

    /// Text content. Text carries its value in the descriptor.
    pub fn text(value: impl Into<String>) -> Self {
        Self::new(Descriptor::Text(value.into()), Payload::Deferred)
    }

    /// File content with a payload source.
    pub fn file(descriptor: FileDescriptor, payload: Payload) -> Self {
        Self::new(Descriptor::File(descriptor), payload)
    }

    /// Image content from its encoded bytes.
    pub fn image(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let descriptor = ImageDescriptor::from_bytes(&data);
        Self::new(Descriptor::Image(descriptor), Payload::Inline(data))
    }

    /// Content that cannot be synchronized.
    pub fn unknown() -> Self {
        Self::new(Descriptor::Unknown, Payload::Deferred)
    }

    /// Snapshot described by remote metadata, payload not yet fetched.
    pub fn remote(descriptor: Descriptor) -> Self {
        Self::new(descriptor, Payload::Deferred)
    }

    /// Same content with its payload materialized.
    pub fn with_payload(&self, data: impl Into<Bytes>) -> Self {
        Self::new(self.descriptor.clone(), Payload::Inline(data.into()))
    }

    pub fn kind(&self) -> ContentKind {
        self.descriptor.kind()
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Text value, for text snapshots.
    pub fn as_text(&self) -> Option<&str> {
        match &self.descriptor {
            Descriptor::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Whether two snapshots describe the same content.
    ///
    /// Only kinds and descriptors are compared; payloads never are.
    pub fn same(&self, other: &ContentSnapshot) -> bool {
        self.descriptor == other.descriptor
    }

    /// Like [`same`](Self::same), treating a missing snapshot as different.
    pub fn same_as(&self, other: Option<&ContentSnapshot>) -> bool {
        other.is_some_and(|other| self.same(other))
    }

    /// Whether the content travels as a separate file on the remote.
    pub fn is_file_like(&self) -> bool {
        matches!(self.kind(), ContentKind::File | ContentKind::Image)
    }

    /// Size in bytes of file-like content.
    pub fn size(&self) -> Option<u64> {
        match &self.descriptor {
            Descriptor::File(file) => Some(file.size),
            Descriptor::Image(image) => Some(image.size),
            _ => None,
        }
    }

    /// Name under which file-like content is stored.
    pub fn file_name(&self) -> Option<String> {
        match &self.descriptor {
            Descriptor::File(file) => Some(file.name.clone()),
            Descriptor::Image(image) => Some(image.file_name()),
            _ => None,
        }
    }

    /// Whether the raw content is available without a remote fetch.
    pub fn is_materialized(&self) -> bool {
        match self.kind() {
            ContentKind::Text => true,
            ContentKind::Unknown => false,
            ContentKind::File | ContentKind::Image => {
                !matches!(self.payload, Payload::Deferred)
            }
        }
    }

    /// Short label used in notifications.
    pub fn describe(&self) -> String {
        match &self.descriptor {
            Descriptor::Text(value) => {
                if value.chars().count() > DESCRIBE_TEXT_LIMIT + 2 {
                    let head: String = value.chars().take(DESCRIBE_TEXT_LIMIT).collect();
                    format!("{}...", head)
                } else {
                    value.clone()
                }
            }
            Descriptor::File(file) => format!("File: {}", file.name),
            Descriptor::Image(image) => format!("Image: {}", image.file_name()),
            Descriptor::Unknown => "Unknown content".to_string(),
        }
    }
}

impl fmt::Display for ContentSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.kind(), self.describe())
    }
}
