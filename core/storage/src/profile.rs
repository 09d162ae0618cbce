//! Remote profile document.
//!
//! The remote side keeps one JSON document describing the current content.
//! File-like content stores its bytes separately under [`PAYLOAD_DIRNAME`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use syncboard_common::{ContentSnapshot, Descriptor, Error, FileDescriptor, ImageDescriptor, Result};

/// Profile document name at the remote root.
pub const PROFILE_FILENAME: &str = "SyncClipboard.json";

/// Directory holding payload files at the remote root.
pub const PAYLOAD_DIRNAME: &str = "file";

/// Serialized form of the remote content description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteProfile {
    /// "Text", "File" or "Image".
    #[serde(rename = "Type")]
    pub kind: String,
    /// Text value, or the image hash.
    #[serde(default)]
    pub clipboard: String,
    /// Payload file name for file-like kinds.
    #[serde(default)]
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl RemoteProfile {
    /// Build the profile describing `snapshot`.
    ///
    /// # Errors
    /// - Unknown content cannot be described
    pub fn from_snapshot(snapshot: &ContentSnapshot) -> Result<Self> {
        let profile = match snapshot.descriptor() {
            Descriptor::Text(value) => Self {
                kind: "Text".to_string(),
                clipboard: value.clone(),
                file: String::new(),
                size: None,
                modified: None,
            },
            Descriptor::File(file) => Self {
                kind: "File".to_string(),
                clipboard: String::new(),
                file: file.name.clone(),
                size: Some(file.size),
                modified: Some(file.modified),
            },
            Descriptor::Image(image) => Self {
                kind: "Image".to_string(),
                clipboard: image.hash.clone(),
                file: image.file_name(),
                size: Some(image.size),
                modified: None,
            },
            Descriptor::Unknown => {
                return Err(Error::InvalidInput(
                    "Unknown content cannot be stored remotely".to_string(),
                ))
            }
        };
        Ok(profile)
    }

    /// Descriptor for this profile. Incomplete profiles map to
    /// [`Descriptor::Unknown`].
    pub fn descriptor(&self) -> Descriptor {
        match self.kind.as_str() {
            "Text" => Descriptor::Text(self.clipboard.clone()),
            "File" => match (self.file.is_empty(), self.size, self.modified) {
                (false, Some(size), Some(modified)) => {
                    Descriptor::File(FileDescriptor::new(self.file.clone(), size, modified))
                }
                _ => Descriptor::Unknown,
            },
            "Image" => match (self.clipboard.is_empty(), self.size) {
                (false, Some(size)) => Descriptor::Image(ImageDescriptor {
                    hash: self.clipboard.clone(),
                    size,
                }),
                _ => Descriptor::Unknown,
            },
            _ => Descriptor::Unknown,
        }
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use syncboard_common::Payload;

    #[test]
    fn test_text_profile_format() {
        let profile = RemoteProfile::from_snapshot(&ContentSnapshot::text("hi")).unwrap();
        let json: serde_json::Value = serde_json::from_str(&profile.to_json().unwrap()).unwrap();

        assert_eq!(json["Type"], "Text");
        assert_eq!(json["Clipboard"], "hi");
        assert!(json.get("Size").is_none());
    }

    #[test]
    fn test_file_profile_descriptor() {
        let modified = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
        let snapshot = ContentSnapshot::file(
            FileDescriptor::new("photo.raw", 2048, modified),
            Payload::Deferred,
        );

        let profile = RemoteProfile::from_snapshot(&snapshot).unwrap();
        let restored = RemoteProfile::from_json(&profile.to_json().unwrap()).unwrap();

        assert_eq!(restored.descriptor(), *snapshot.descriptor());
    }

    #[test]
    fn test_profile_without_extensions_parses() {
        let profile = RemoteProfile::from_json(r#"{"Type":"Text","Clipboard":"abc","File":""}"#)
            .unwrap();
        assert_eq!(profile.descriptor(), Descriptor::Text("abc".to_string()));
    }

    #[test]
    fn test_incomplete_file_profile_is_unknown() {
        let profile =
            RemoteProfile::from_json(r#"{"Type":"File","Clipboard":"","File":"a.txt"}"#).unwrap();
        assert_eq!(profile.descriptor(), Descriptor::Unknown);

        let profile = RemoteProfile::from_json(r#"{"Type":"Group"}"#).unwrap();
        assert_eq!(profile.descriptor(), Descriptor::Unknown);
    }

    #[test]
    fn test_unknown_snapshot_rejected() {
        assert!(RemoteProfile::from_snapshot(&ContentSnapshot::unknown()).is_err());
    }
}
